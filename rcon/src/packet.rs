//! Connectionless packet framing and text decoding for the HLDS wire format.

use once_cell::sync::Lazy;
use regex::Regex;

/// Every connectionless request and reply starts with four 0xFF bytes.
pub const PACKET_PREFIX: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// Largest datagram the engine will send for a single reply piece.
pub const MAX_PACKET_SIZE: usize = 8192;

static CHALLENGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)challenge(?:\s+rcon)?\s+(-?\d+)").unwrap());
static INTEGER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+").unwrap());

/// Frames a request body into a connectionless datagram.
pub fn build_request(body: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(PACKET_PREFIX.len() + body.len() + 1);
    packet.extend_from_slice(&PACKET_PREFIX);
    packet.extend_from_slice(body.as_bytes());
    packet.push(b'\n');
    packet
}

pub fn build_challenge_request() -> Vec<u8> {
    build_request("getchallenge")
}

pub fn build_command(challenge: &str, password: &str, command: &str) -> Vec<u8> {
    build_request(&format!("rcon {} {} {}", challenge, password, command))
}

fn strip_packet_prefix(data: &[u8]) -> Option<&[u8]> {
    data.strip_prefix(&PACKET_PREFIX[..])
}

/// Decodes a single CP1251 byte. Old engine builds still answer in the
/// Windows-1251 codepage, so bytes above 0x7F are mapped by hand.
fn decode_byte(byte: u8) -> char {
    match byte {
        0x00..=0x7F => byte as char,
        0xC0..=0xFF => {
            char::from_u32(0x0410 + (byte - 0xC0) as u32).unwrap_or('\u{FFFD}')
        }
        _ => CP1251_HIGH[(byte - 0x80) as usize],
    }
}

/// CP1251 rows 0x80..0xBF; the rest of the table is ASCII plus a
/// contiguous Cyrillic block handled arithmetically.
const CP1251_HIGH: [char; 64] = [
    'Ђ', 'Ѓ', '‚', 'ѓ', '„', '…', '†', '‡', '€', '‰', 'Љ', '‹', 'Њ', 'Ќ', 'Ћ', 'Џ',
    'ђ', '‘', '’', '“', '”', '•', '–', '—', '\u{0098}', '™', 'љ', '›', 'њ', 'ќ', 'ћ', 'џ',
    '\u{00A0}', 'Ў', 'ў', 'Ј', '¤', 'Ґ', '¦', '§', 'Ё', '©', 'Є', '«', '¬', '\u{00AD}', '®', 'Ї',
    '°', '±', 'І', 'і', 'ґ', 'µ', '¶', '·', 'ё', '№', 'є', '»', 'ј', 'Ѕ', 'ѕ', 'ї',
];

pub fn decode_text(data: &[u8]) -> String {
    data.iter().map(|&byte| decode_byte(byte)).collect()
}

fn trim_reply(text: &str) -> &str {
    text.trim_matches(|c| c == '\0' || c == '\r' || c == '\n' || c == ' ')
}

/// Extracts the challenge token from a `getchallenge` reply. Engine builds
/// answer either `challenge rcon <n>` or `challenge <n>`; anything else is
/// scanned for a trailing integer token.
pub fn parse_challenge(data: &[u8]) -> Option<String> {
    let body = strip_packet_prefix(data)?;
    let text = decode_text(body);
    let text = trim_reply(&text);
    if let Some(captures) = CHALLENGE_RE.captures(text) {
        return Some(captures[1].to_string());
    }
    INTEGER_RE
        .find_iter(text)
        .last()
        .map(|token| token.as_str().to_string())
}

/// Strips the reply marker and decodes one datagram of command output.
/// Replies open with `print\n`, but engine console forwards use a single
/// `l` byte instead.
pub fn parse_command_reply(data: &[u8]) -> Option<String> {
    let body = strip_packet_prefix(data)?;
    let body = if let Some(rest) = body.strip_prefix(b"print") {
        rest.strip_prefix(b"\n").unwrap_or(rest)
    } else if let Some(rest) = body.strip_prefix(b"l") {
        rest
    } else {
        body
    };
    let text = decode_text(body);
    Some(trim_reply(&text).to_string())
}
