//! Admin and chat commands issued to the game server over RCON.
//!
//! Chat relay targets the `ultrahc_ds_send_msg` command of the server-side
//! AMXX plugin, which imposes hard buffer limits on the author and message.
//! Map listings come back as a marker-framed block that has to be parsed
//! out of the console reply.

use std::fmt;
use std::sync::Arc;

use log::info;
use rcon::{RconSession, SessionError};

use crate::supervisor::ConnectionSupervisor;

const MAPS_BEGIN_MARKER: &str = "ULTRAHC_MAPS_BEGIN";
const MAPS_END_MARKER: &str = "ULTRAHC_MAPS_END";
const MAPS_ERROR_MARKER: &str = "ULTRAHC_MAPS_ERROR";

pub const MAPS_PAGE_DEFAULT: u32 = 1;
pub const MAPS_PER_PAGE_DEFAULT: u32 = 20;
pub const MAPS_PER_PAGE_MAX: u32 = 50;

// Buffer sizes in the AMXX plugin. The quoted payload `"author" "content"`
// must fit read_args, and the message itself has its own cap.
const CHAT_COMMAND_TEXT_LENGTH: usize = 256;
const CHAT_AUTHOR_LENGTH: usize = 64;
const CHAT_MESSAGE_LENGTH: usize = 192;

#[derive(Debug)]
pub enum CommandError {
    Session(SessionError),
    Rejected { command: String, reply: String },
    MissingBegin { command: String },
    MissingEnd { command: String },
    ModeMismatch { command: String, expected: &'static str, found: String },
    ServerSide { command: String, detail: String },
    InvalidPerPage { max: u32 },
    PageOutOfRange { page: u32, total_pages: u32 },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Session(err) => write!(f, "{}", err),
            CommandError::Rejected { command, reply } => {
                write!(f, "{} was rejected by the server: {}", command, reply)
            }
            CommandError::MissingBegin { command } => {
                write!(f, "{} reply carried no {} marker", command, MAPS_BEGIN_MARKER)
            }
            CommandError::MissingEnd { command } => {
                write!(f, "{} reply was incomplete (no {} marker)", command, MAPS_END_MARKER)
            }
            CommandError::ModeMismatch { command, expected, found } => {
                write!(f, "{} returned mode {}, expected {}", command, found, expected)
            }
            CommandError::ServerSide { command, detail } => {
                write!(f, "{} reported an error: {}", command, detail)
            }
            CommandError::InvalidPerPage { max } => {
                write!(f, "per_page must be between 1 and {}", max)
            }
            CommandError::PageOutOfRange { page, total_pages } => {
                write!(f, "page {} is out of range, available pages: 1..{}", page, total_pages)
            }
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Session(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SessionError> for CommandError {
    fn from(err: SessionError) -> Self {
        CommandError::Session(err)
    }
}

/// Which map list the server should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapListMode {
    Rotation,
    Installed,
}

impl MapListMode {
    pub fn as_arg(&self) -> &'static str {
        match self {
            MapListMode::Rotation => "rotation",
            MapListMode::Installed => "installed",
        }
    }

    pub fn source_label(&self) -> &'static str {
        match self {
            MapListMode::Rotation => "CS server (active rotation)",
            MapListMode::Installed => "CS server (maps folder)",
        }
    }
}

/// One page of a server map listing, with absolute 1-based indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapsPage {
    pub mode: MapListMode,
    pub page: u32,
    pub total_pages: u32,
    pub total_maps: usize,
    pub entries: Vec<MapsPageEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapsPageEntry {
    pub index: usize,
    pub name: String,
}

/// Outcome of a chat relay attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatOutcome {
    Sent { truncated: bool },
    SkippedEmpty,
}

/// Replaces characters that would break the quoted RCON argument syntax.
pub fn escape_rcon_param(value: &str) -> String {
    value.replace('"', "'").replace('\\', "\\\\")
}

/// Fits the author and message into the plugin's buffer limits. Returns the
/// sanitized pair plus a flag telling whether the message was cut short.
pub fn prepare_chat_payload(author: &str, content: &str) -> (String, String, bool) {
    let mut safe_author = escape_rcon_param(author)
        .replace('\r', " ")
        .replace('\n', " ")
        .trim()
        .to_string();
    let mut safe_content = escape_rcon_param(content)
        .replace('\r', " ")
        .replace('\n', " ")
        .trim()
        .to_string();

    if safe_author.is_empty() {
        safe_author = "Discord".to_string();
    }

    let author_limit = CHAT_AUTHOR_LENGTH - 1;
    if safe_author.chars().count() > author_limit {
        safe_author = safe_author.chars().take(author_limit).collect();
    }

    // 5 extra characters: two pairs of quotes plus the separating space.
    let author_chars = safe_author.chars().count() as i64;
    let by_command = CHAT_COMMAND_TEXT_LENGTH as i64 - 1 - (author_chars + 5);
    let by_message = CHAT_MESSAGE_LENGTH as i64 - 1;
    let content_limit = by_command.min(by_message).max(0) as usize;

    let truncated = safe_content.chars().count() > content_limit;
    if content_limit == 0 {
        safe_content.clear();
    } else if truncated {
        safe_content = safe_content.chars().take(content_limit).collect();
    }

    (safe_author, safe_content, truncated)
}

/// Screens a console reply for the stock error strings the server prints
/// instead of failing the command.
pub fn validate_rcon_response(command: &str, reply: &str) -> Result<(), CommandError> {
    if reply.is_empty() {
        return Ok(());
    }

    let lowered = reply.to_lowercase();
    if lowered.contains("unknown command")
        || lowered.contains("bad rcon_password")
        || lowered.contains("bad password")
    {
        return Err(CommandError::Rejected {
            command: command.to_string(),
            reply: reply.to_string(),
        });
    }

    Ok(())
}

fn normalize_maps_pagination(page: u32, per_page: u32) -> Result<(u32, u32), CommandError> {
    let page = if page == 0 { MAPS_PAGE_DEFAULT } else { page };
    let per_page = if per_page == 0 { MAPS_PER_PAGE_DEFAULT } else { per_page };

    if per_page > MAPS_PER_PAGE_MAX {
        return Err(CommandError::InvalidPerPage { max: MAPS_PER_PAGE_MAX });
    }

    Ok((page, per_page))
}

/// Extracts the map names framed between the begin and end markers. Error
/// lines inside the block and a missing or foreign mode token fail the parse.
fn parse_server_maps_response(
    command: &str,
    expected: MapListMode,
    reply: &str,
) -> Result<Vec<String>, CommandError> {
    let mut maps = Vec::new();
    let mut in_section = false;
    let mut end_found = false;
    let mut errors: Vec<String> = Vec::new();

    for raw_line in reply.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix(MAPS_BEGIN_MARKER) {
            in_section = true;
            if rest.starts_with(char::is_whitespace) {
                let mode = rest.trim().to_lowercase();
                if !mode.is_empty() && mode != expected.as_arg() {
                    return Err(CommandError::ModeMismatch {
                        command: command.to_string(),
                        expected: expected.as_arg(),
                        found: mode,
                    });
                }
            }
            continue;
        }

        if !in_section {
            continue;
        }

        if let Some(rest) = line.strip_prefix(MAPS_ERROR_MARKER) {
            let detail = rest.trim();
            errors.push(if detail.is_empty() {
                "unknown_error".to_string()
            } else {
                detail.to_string()
            });
            continue;
        }

        if line.starts_with(MAPS_END_MARKER) {
            end_found = true;
            break;
        }

        maps.push(line.to_string());
    }

    if !in_section {
        return Err(CommandError::MissingBegin { command: command.to_string() });
    }
    if !end_found {
        return Err(CommandError::MissingEnd { command: command.to_string() });
    }
    if !errors.is_empty() {
        return Err(CommandError::ServerSide {
            command: command.to_string(),
            detail: errors.join(", "),
        });
    }

    Ok(maps)
}

/// Deduplicates exact repeats and orders the names case-insensitively.
fn sort_installed_maps(maps: &mut Vec<String>) {
    maps.sort();
    maps.dedup();
    maps.sort_by_key(|name| name.to_lowercase());
}

fn paginate_maps(
    mode: MapListMode,
    maps: Vec<String>,
    page: u32,
    per_page: u32,
) -> Result<MapsPage, CommandError> {
    let total = maps.len();
    if total == 0 {
        return Ok(MapsPage {
            mode,
            page,
            total_pages: 0,
            total_maps: 0,
            entries: Vec::new(),
        });
    }

    let total_pages = (total as u32 + per_page - 1) / per_page;
    if page > total_pages {
        return Err(CommandError::PageOutOfRange { page, total_pages });
    }

    let start = ((page - 1) * per_page) as usize;
    let end = (start + per_page as usize).min(total);
    let entries = maps[start..end]
        .iter()
        .enumerate()
        .map(|(offset, name)| MapsPageEntry {
            index: start + offset + 1,
            name: name.clone(),
        })
        .collect();

    Ok(MapsPage {
        mode,
        page,
        total_pages,
        total_maps: total,
        entries,
    })
}

/// Issues game-server commands over the shared session. Only the chat relay
/// tears the session down on failure; admin commands surface their error and
/// leave the connection state to the supervisor.
pub struct CommandPipeline {
    session: Arc<RconSession>,
    supervisor: Arc<ConnectionSupervisor>,
}

impl CommandPipeline {
    pub fn new(session: Arc<RconSession>, supervisor: Arc<ConnectionSupervisor>) -> Self {
        CommandPipeline { session, supervisor }
    }

    /// Relays a chat message into the game. Empty messages (after
    /// sanitizing) are skipped, overlong ones are truncated to the plugin
    /// limits. A failed or rejected send disconnects the session so the
    /// supervisor can rebuild it.
    pub async fn send_chat_message(
        &self,
        author: &str,
        content: &str,
    ) -> Result<ChatOutcome, CommandError> {
        let (author, content, truncated) = prepare_chat_payload(author, content);
        if content.is_empty() {
            info!("skipping empty chat message for the game server");
            return Ok(ChatOutcome::SkippedEmpty);
        }

        if truncated {
            info!(
                "chat message from {} truncated to {} characters",
                author,
                content.chars().count()
            );
        }

        let command = format!("ultrahc_ds_send_msg \"{}\" \"{}\"", author, content);
        let reply = match self.session.exec(&command).await {
            Ok(reply) => reply,
            Err(err) => {
                self.teardown_session().await;
                return Err(err.into());
            }
        };

        if let Err(err) = validate_rcon_response("ultrahc_ds_send_msg", &reply) {
            self.teardown_session().await;
            return Err(err);
        }

        Ok(ChatOutcome::Sent { truncated })
    }

    pub async fn kick(&self, target: &str, reason: &str) -> Result<(), CommandError> {
        let command = format!(
            "ultrahc_ds_kick_player \"{}\" \"{}\"",
            escape_rcon_param(target),
            escape_rcon_param(reason)
        );
        self.session.exec(&command).await?;
        info!("kicked player {}, reason: {}", target, reason);
        Ok(())
    }

    pub async fn ban(&self, target: &str, minutes: u32, reason: &str) -> Result<(), CommandError> {
        let command = format!(
            "amx_ban \"{}\" \"{}\" \"{}\"",
            escape_rcon_param(target),
            minutes,
            escape_rcon_param(reason)
        );
        self.session.exec(&command).await?;
        info!("banned player {} for {} minutes, reason: {}", target, minutes, reason);
        Ok(())
    }

    /// Bans by steam id without the player being online.
    pub async fn ban_offline(
        &self,
        target: &str,
        minutes: u32,
        reason: &str,
    ) -> Result<(), CommandError> {
        let command = format!(
            "amx_addban \"{}\" \"{}\" \"{}\"",
            escape_rcon_param(target),
            minutes,
            escape_rcon_param(reason)
        );
        self.session.exec(&command).await?;
        info!("banned offline player {} for {} minutes, reason: {}", target, minutes, reason);
        Ok(())
    }

    pub async fn unban(&self, target: &str) -> Result<(), CommandError> {
        let command = format!("amx_unban \"{}\"", escape_rcon_param(target));
        self.session.exec(&command).await?;
        info!("unbanned player {}", target);
        Ok(())
    }

    /// Switches the server to the named map. The command takes the map name
    /// bare, without quoting.
    pub async fn change_map(&self, map_name: &str) -> Result<(), CommandError> {
        let map_name = map_name.trim();
        let command = format!("ultrahc_ds_change_map {}", map_name);
        self.session.exec(&command).await?;
        info!("changed map to {}", map_name);
        Ok(())
    }

    pub async fn reload_map_list(&self) -> Result<(), CommandError> {
        self.session.exec("ultrahc_ds_reload_map_list").await?;
        info!("reloaded the server map list");
        Ok(())
    }

    /// Runs an arbitrary console command and returns the raw reply.
    pub async fn raw_command(&self, command: &str) -> Result<String, CommandError> {
        let reply = self.session.exec(command).await?;
        info!("executed raw command: {}", command);
        Ok(reply)
    }

    /// Fetches one page of the requested map list. The installed list is
    /// deduplicated and sorted case-insensitively, the rotation keeps the
    /// server's order.
    pub async fn server_maps(
        &self,
        mode: MapListMode,
        page: u32,
        per_page: u32,
    ) -> Result<MapsPage, CommandError> {
        let (page, per_page) = normalize_maps_pagination(page, per_page)?;
        let command = format!("ultrahc_ds_get_maps {}", mode.as_arg());

        let reply = self.session.exec(&command).await?;
        validate_rcon_response(&command, &reply)?;
        let mut maps = parse_server_maps_response(&command, mode, &reply)?;

        if mode == MapListMode::Installed {
            sort_installed_maps(&mut maps);
        }

        paginate_maps(mode, maps, page, per_page)
    }

    async fn teardown_session(&self) {
        self.session.disconnect().await;
        self.supervisor.notify_disconnected_once().await;
    }
}
