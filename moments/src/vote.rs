//! Inbound vote events and their payload parsing.

use chrono::Utc;
use serde_json::Value;

/// Tone of the voted moment, selecting the icon and label used when the
/// cluster is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MomentKind {
    Wow,
    Lol,
}

impl MomentKind {
    /// Anything that is not literally "lol" counts as a wow moment.
    pub fn parse(tag: &str) -> Self {
        if tag.trim().eq_ignore_ascii_case("lol") {
            MomentKind::Lol
        } else {
            MomentKind::Wow
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            MomentKind::Wow => "🌟",
            MomentKind::Lol => "😂",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MomentKind::Wow => "Wow moment",
            MomentKind::Lol => "Lol moment",
        }
    }
}

/// One player's vote about one target, immutable once parsed.
#[derive(Debug, Clone)]
pub struct MomentVote {
    pub map_name: String,
    pub round_number: i64,
    pub map_timeleft_sec: i64,
    pub map_elapsed_sec: i64,
    pub event_unix: i64,
    pub voter_name: String,
    pub voter_steam_id: String,
    pub voter_slot: i64,
    pub target_name: String,
    pub target_steam_id: String,
    pub target_slot: i64,
    pub target_team: i64,
    pub target_frags: i64,
    pub target_deaths: i64,
    pub kind: MomentKind,
}

impl MomentVote {
    /// Stable dedup key for the voter. Bots and players without a Steam ID
    /// fall back to their server slot.
    pub fn voter_key(&self) -> String {
        identity_key(&self.voter_steam_id, self.voter_slot)
    }

    /// Stable key identifying the voted target across votes.
    pub fn target_key(&self) -> String {
        identity_key(&self.target_steam_id, self.target_slot)
    }
}

pub(crate) fn identity_key(steam_id: &str, slot: i64) -> String {
    if steam_id.is_empty() || steam_id.eq_ignore_ascii_case("BOT") {
        format!("slot:{}", slot)
    } else {
        format!("steam:{}", steam_id)
    }
}

/// Parses a raw webhook payload into a vote. Returns `None` when the map,
/// voter name or target name is missing; every other field is coerced with
/// a safe default so a sloppy payload never aborts processing.
pub fn parse_vote_payload(payload: &Value) -> Option<MomentVote> {
    let map_name = field_str(payload, "map");
    let voter_name = field_str(payload, "voter_name");
    let target_name = field_str(payload, "target_name");
    if map_name.is_empty() || voter_name.is_empty() || target_name.is_empty() {
        return None;
    }

    let mut event_unix = field_int(payload, "event_unix", 0);
    if event_unix <= 0 {
        event_unix = Utc::now().timestamp();
    }

    Some(MomentVote {
        map_name,
        round_number: field_int(payload, "round_number", 0).max(0),
        map_timeleft_sec: field_int(payload, "map_timeleft_sec", -1).max(-1),
        map_elapsed_sec: field_int(payload, "map_elapsed_sec", -1).max(-1),
        event_unix,
        voter_name,
        voter_steam_id: field_str(payload, "voter_steam_id"),
        voter_slot: field_int(payload, "voter_slot", 0).max(0),
        target_name,
        target_steam_id: field_str(payload, "target_steam_id"),
        target_slot: field_int(payload, "target_slot", 0).max(0),
        target_team: field_int(payload, "target_team", 0).max(0),
        target_frags: field_int(payload, "target_frags", 0),
        target_deaths: field_int(payload, "target_deaths", 0),
        kind: MomentKind::parse(&field_str(payload, "kind")),
    })
}

fn field_str(payload: &Value, key: &str) -> String {
    match payload.get(key) {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    }
}

fn field_int(payload: &Value, key: &str, default: i64) -> i64 {
    match payload.get(key) {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f as i64))
            .unwrap_or(default),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(default),
        Some(Value::Bool(flag)) => *flag as i64,
        _ => default,
    }
}
