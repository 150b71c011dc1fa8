//! Intake for game-server webhooks.
//!
//! The server-side plugin posts JSON blobs whose `type` field is typed by
//! hand into plugin config more often than not, so recognition is lenient:
//! exact names, numeric codes, and near-miss spellings within one edit all
//! map onto the known types. Payload parsing is equally forgiving, a
//! malformed blob is logged and dropped rather than failing the intake.

use std::sync::Arc;

use log::{info, warn};
use serde_json::Value;

use crate::events::{BridgeEvent, EventBus};
use crate::format;
use crate::highlights::MomentService;

use moments::parse_vote_payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookType {
    Message,
    Info,
    MomentVote,
}

impl WebhookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookType::Message => "message",
            WebhookType::Info => "info",
            WebhookType::MomentVote => "moment_vote",
        }
    }
}

// (type, exact spelling, spelling collapsed to its a-z runs)
const KNOWN_TYPES: [(WebhookType, &str, &str); 3] = [
    (WebhookType::Message, "message", "message"),
    (WebhookType::Info, "info", "info"),
    (WebhookType::MomentVote, "moment_vote", "momentvote"),
];

/// Concatenates the a-z runs of an already lowercased string, dropping
/// whitespace, digits and control characters.
fn collapse_type_name(normalized: &str) -> String {
    normalized.chars().filter(char::is_ascii_lowercase).collect()
}

/// One-pass check that `value` is within a single insert, delete or
/// substitution of `target`.
fn is_edit_distance_le_one(value: &str, target: &str) -> bool {
    let value: Vec<char> = value.chars().collect();
    let target: Vec<char> = target.chars().collect();
    let value_len = value.len();
    let target_len = target.len();
    if value_len.abs_diff(target_len) > 1 {
        return false;
    }

    let mut i = 0;
    let mut j = 0;
    let mut edits = 0;

    while i < value_len && j < target_len {
        if value[i] == target[j] {
            i += 1;
            j += 1;
            continue;
        }

        edits += 1;
        if edits > 1 {
            return false;
        }

        if value_len > target_len {
            i += 1;
        } else if value_len < target_len {
            j += 1;
        } else {
            i += 1;
            j += 1;
        }
    }

    if i < value_len || j < target_len {
        edits += 1;
    }

    edits <= 1
}

/// Maps a raw type string onto a known webhook type, tolerating stray
/// whitespace, separators and a single typo.
pub fn normalize_webhook_type(raw_type: &str) -> Option<WebhookType> {
    let normalized = raw_type.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }

    for (kind, exact, _) in KNOWN_TYPES {
        if normalized == exact {
            return Some(kind);
        }
    }

    let collapsed = collapse_type_name(&normalized);
    for (kind, _, known_collapsed) in KNOWN_TYPES {
        if collapsed == known_collapsed {
            return Some(kind);
        }
    }

    for (kind, _, known_collapsed) in KNOWN_TYPES {
        if is_edit_distance_le_one(&collapsed, known_collapsed) {
            return Some(kind);
        }
    }

    None
}

/// Numeric codes some plugin builds send instead of a name.
pub fn webhook_type_from_code(code: i64) -> Option<WebhookType> {
    match code {
        1 => Some(WebhookType::Info),
        2 => Some(WebhookType::Message),
        3 => Some(WebhookType::MomentVote),
        _ => None,
    }
}

/// Recognizes the `type` field of a webhook payload. Strings go through the
/// lenient normalizer, numbers through the code table. Booleans are not
/// codes even though they look numeric.
pub fn webhook_type_from_value(value: &Value) -> Option<WebhookType> {
    match value {
        Value::String(raw) => normalize_webhook_type(raw),
        Value::Number(num) => {
            let code = num.as_i64().or_else(|| num.as_f64().map(|val| val as i64))?;
            webhook_type_from_code(code)
        }
        _ => None,
    }
}

/// A chat line relayed out of the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessagePayload {
    pub nick: String,
    pub message: String,
    pub team: i64,
    pub channel_prefix: String,
    pub steam_id: String,
}

/// One scoreboard row of a status snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerLine {
    pub name: String,
    pub steam_id: String,
    pub frags: i64,
    pub deaths: i64,
    pub team: i64,
}

/// Periodic server status pushed by the plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoSnapshot {
    pub map_name: String,
    pub round_number: Option<i64>,
    pub players: Vec<PlayerLine>,
    pub max_players: i64,
    pub player_count_override: Option<i64>,
    pub map_timeleft_sec: Option<i64>,
    pub score_t: Option<i64>,
    pub score_ct: Option<i64>,
    pub bomb_carrier_steam_id: String,
}

fn field_str(payload: &Value, key: &str) -> String {
    match payload.get(key) {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Number(num)) => num.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    }
}

fn value_as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(num) => num.as_i64().or_else(|| num.as_f64().map(|val| val as i64)),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(*flag as i64),
        _ => None,
    }
}

fn field_opt_int(payload: &Value, key: &str) -> Option<i64> {
    payload.get(key).and_then(value_as_int)
}

fn field_int(payload: &Value, key: &str, default: i64) -> i64 {
    field_opt_int(payload, key).unwrap_or(default)
}

/// Pulls a chat message out of a webhook payload. Requires a non-empty
/// message and nick plus a team field, everything else defaults.
pub fn parse_chat_message(payload: &Value) -> Option<ChatMessagePayload> {
    let message = field_str(payload, "message");
    let nick = field_str(payload, "nick");
    let team = field_opt_int(payload, "team")?;

    if message.is_empty() || nick.is_empty() {
        return None;
    }

    Some(ChatMessagePayload {
        nick,
        message,
        team,
        channel_prefix: field_str(payload, "channel"),
        steam_id: field_str(payload, "steam_id"),
    })
}

fn parse_player_line(entry: &Value) -> Option<PlayerLine> {
    if !entry.is_object() {
        return None;
    }

    let stats = entry.get("stats").and_then(Value::as_array);
    let stat = |idx: usize| -> i64 {
        stats
            .and_then(|items| items.get(idx))
            .and_then(value_as_int)
            .unwrap_or(0)
    };

    Some(PlayerLine {
        name: field_str(entry, "name"),
        steam_id: field_str(entry, "steam_id"),
        frags: stat(0),
        deaths: stat(1),
        team: stat(2),
    })
}

/// Pulls a status snapshot out of a webhook payload. Missing fields fall
/// back to defaults so a partial snapshot still renders.
pub fn parse_info_snapshot(payload: &Value) -> InfoSnapshot {
    let players = payload
        .get("current_players")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(parse_player_line).collect())
        .unwrap_or_default();

    InfoSnapshot {
        map_name: field_str(payload, "map"),
        round_number: field_opt_int(payload, "round_number"),
        players,
        max_players: field_int(payload, "max_players", 0),
        player_count_override: field_opt_int(payload, "player_count_override"),
        map_timeleft_sec: field_opt_int(payload, "map_timeleft_sec"),
        score_t: field_opt_int(payload, "score_t"),
        score_ct: field_opt_int(payload, "score_ct"),
        bomb_carrier_steam_id: field_str(payload, "bomb_carrier_steam_id"),
    }
}

/// Routes recognized webhook payloads to the chat relay, the status panel
/// and the moment engine.
pub struct WebhookIntake {
    bus: Arc<EventBus>,
    moments: Arc<MomentService>,
}

impl WebhookIntake {
    pub fn new(bus: Arc<EventBus>, moments: Arc<MomentService>) -> Self {
        WebhookIntake { bus, moments }
    }

    pub async fn dispatch(&self, payload: &Value) {
        let type_field = payload.get("type").unwrap_or(&Value::Null);
        let Some(kind) = webhook_type_from_value(type_field) else {
            warn!("webhook carried an unknown type: {}", type_field);
            return;
        };

        match kind {
            WebhookType::Message => self.handle_message(payload).await,
            WebhookType::Info => self.handle_info(payload).await,
            WebhookType::MomentVote => self.handle_moment_vote(payload).await,
        }
    }

    async fn handle_message(&self, payload: &Value) {
        let Some(chat) = parse_chat_message(payload) else {
            info!("chat webhook missing required fields, dropped");
            return;
        };

        info!("game chat from {}: {:.30}", chat.nick, chat.message);
        let text =
            format::format_message(&chat.nick, &chat.message, chat.team, &chat.channel_prefix);
        self.bus.notify(BridgeEvent::ChatToDiscord { text }).await;
    }

    async fn handle_info(&self, payload: &Value) {
        let snapshot = parse_info_snapshot(payload);
        self.moments
            .touch_info(&snapshot.map_name, snapshot.round_number.unwrap_or(0), None)
            .await;

        let text = format::format_info_message(&snapshot);
        self.bus.notify(BridgeEvent::StatusPanel { text }).await;
    }

    async fn handle_moment_vote(&self, payload: &Value) {
        let Some(vote) = parse_vote_payload(payload) else {
            info!("moment vote webhook missing required fields, dropped");
            return;
        };

        self.moments.handle_vote(vote).await;
    }
}
