//! Discord-side text rendering: chat lines, status panels and map listings.
//! Colors use the ANSI escape palette Discord accepts inside ```ansi blocks.

use chrono::Local;

use moments::render::format_mmss;

use crate::commands::MapsPage;
use crate::webhook::InfoSnapshot;

pub const COLOR_RED: &str = "\u{1b}[0;31m";
pub const COLOR_GREEN: &str = "\u{1b}[0;32m";
pub const COLOR_BLUE: &str = "\u{1b}[0;34m";
pub const COLOR_WHITE: &str = "\u{1b}[0;37m";
pub const STYLE_BOLD: &str = "\u{1b}[1m";
pub const STYLE_RESET: &str = "\u{1b}[0m";

/// Renders one relayed chat line. The nick is tinted by team, terrorists
/// red, counter-terrorists blue, everyone else white.
pub fn format_message(nick: &str, text: &str, team: i64, channel_prefix: &str) -> String {
    let timestamp = Local::now().format("%H:%M:%S");
    let nick_color = match team {
        1 => COLOR_RED,
        2 => COLOR_BLUE,
        _ => COLOR_WHITE,
    };

    format!(
        "{}{}{} {} {}{}{}: {}\n",
        COLOR_GREEN, timestamp, STYLE_RESET, channel_prefix, nick_color, nick, STYLE_RESET, text
    )
}

fn team_header(label: &str, score: Option<i64>, color: &str) -> String {
    match score {
        Some(score) => format!("\n{}{}{}({}):{}", STYLE_BOLD, color, label, score, STYLE_RESET),
        None => format!("\n{}{}{}:{}", STYLE_BOLD, color, label, STYLE_RESET),
    }
}

fn indented(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| format!("\t{}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders a status snapshot as the multi-line panel text. Team sections
/// appear only when populated, the round-score goes into the section header
/// when the snapshot carries one, and the bomb carrier gets a marker behind
/// their scoreboard line.
pub fn format_info_message(snapshot: &InfoSnapshot) -> String {
    let mut terrorists = Vec::new();
    let mut counter_terrorists = Vec::new();
    let mut spectators = Vec::new();

    for player in &snapshot.players {
        let mut line = format!("{} - {}/{}", player.name, player.frags, player.deaths);
        if !snapshot.bomb_carrier_steam_id.is_empty()
            && player.steam_id == snapshot.bomb_carrier_steam_id
        {
            line.push_str(&format!(" {}(bomb){}", COLOR_GREEN, STYLE_RESET));
        }

        match player.team {
            1 => terrorists.push(line),
            2 => counter_terrorists.push(line),
            _ => spectators.push(line),
        }
    }

    let player_count = snapshot
        .player_count_override
        .unwrap_or(snapshot.players.len() as i64);
    let time_left = snapshot
        .map_timeleft_sec
        .map(format_mmss)
        .unwrap_or_else(|| "--:--".to_string());

    let mut sections = vec![
        format!("Time: {}", Local::now().format("%H:%M")),
        format!("Map: {}", snapshot.map_name),
        format!("Players: {} / {}", player_count, snapshot.max_players),
        format!("Time left: {}", time_left),
        format!("Round: {}", snapshot.round_number.unwrap_or(0)),
    ];

    if !terrorists.is_empty() {
        sections.push(team_header("Terrorists", snapshot.score_t, COLOR_RED));
        sections.push(indented(&terrorists));
    }
    if !counter_terrorists.is_empty() {
        sections.push(team_header("Counter-Terrorists", snapshot.score_ct, COLOR_BLUE));
        sections.push(indented(&counter_terrorists));
    }
    if !spectators.is_empty() {
        sections.push(team_header("Spectators", None, COLOR_WHITE));
        sections.push(indented(&spectators));
    }

    sections.join("\n")
}

/// Renders one page of a map listing.
pub fn format_maps_page(page: &MapsPage) -> String {
    if page.total_maps == 0 {
        return format!("Source: {}\nThe map list is empty.", page.mode.source_label());
    }

    let mut lines = vec![
        format!("Source: {}", page.mode.source_label()),
        format!("Total maps: {}", page.total_maps),
        format!("Page {}/{}", page.page, page.total_pages),
        String::new(),
    ];
    lines.extend(
        page.entries
            .iter()
            .map(|entry| format!("{}. {}", entry.index, entry.name)),
    );

    lines.join("\n")
}
