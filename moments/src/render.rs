//! Presentation strings for clusters, consumed by the chat front end.

use crate::cluster::MomentCluster;

/// Most star icons shown before switching to a numeric count.
pub const STAR_PREVIEW_LIMIT: usize = 10;
/// Most voter names listed before collapsing into an overflow count.
pub const VOTER_PREVIEW_LIMIT: usize = 5;

/// Renders seconds as `mm:ss`; negative means unknown.
pub fn format_mmss(seconds: i64) -> String {
    if seconds < 0 {
        return "--:--".to_string();
    }
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub fn format_stars(stars: u32, preview_limit: usize) -> String {
    if stars == 0 {
        return "—".to_string();
    }
    let limit = preview_limit.max(1);
    let visible = (stars as usize).min(limit);
    let icons = "⭐".repeat(visible);
    if stars as usize > limit {
        format!("{} x{}", icons, stars)
    } else {
        icons
    }
}

pub fn format_voter_preview(voter_names: &[String], preview_limit: usize) -> String {
    let limit = preview_limit.max(1);
    let shown = voter_names
        .iter()
        .take(limit)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if voter_names.len() > limit {
        format!("{} +{} more", shown, voter_names.len() - limit)
    } else {
        shown
    }
}

pub fn format_demo_line(demo_url: Option<&str>) -> String {
    match demo_url {
        Some(url) => format!("📼 {}", url),
        None => "📼 demo unavailable".to_string(),
    }
}

/// Full multi-line cluster report as posted to the chat front end.
pub fn format_cluster_summary(cluster: &MomentCluster) -> String {
    format!(
        "{} {}: {} ({}/{})\nMap: {} (round {})\nStars: {}\nVoters: {}\n{}",
        cluster.kind.icon(),
        cluster.kind.label(),
        cluster.target_name,
        cluster.target_frags,
        cluster.target_deaths,
        cluster.map_name,
        cluster.round_number,
        format_stars(cluster.stars, STAR_PREVIEW_LIMIT),
        format_voter_preview(&cluster.voter_names, VOTER_PREVIEW_LIMIT),
        format_demo_line(cluster.demo_url.as_deref()),
    )
}
