//! Map-name normalization and demo-filename parsing shared by the
//! clustering engine and the demo resolver.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static MODE_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_\d+x\d+$").unwrap());
static STAMP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[-_])(\d{10})(?:[-_]|$)").unwrap());
static STAMPED_MAP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[-_])\d{10}-(.+)$").unwrap());

/// Lower-cases a map name and strips one trailing `_<W>x<H>` mode suffix.
/// Servers rotate such cosmetic variants without changing the map itself.
pub fn normalize_map_name(name: &str) -> String {
    let trimmed = name.trim().to_lowercase();
    MODE_SUFFIX_RE.replace(&trimmed, "").into_owned()
}

pub fn same_map(a: &str, b: &str) -> bool {
    normalize_map_name(a) == normalize_map_name(b)
}

/// Decodes the ddMMyyHHmm stamp embedded in demo filenames to unix seconds.
/// Returns zero when the name carries no stamp or the digits do not form a
/// real date.
pub fn demo_stamp_unix(file_name: &str) -> i64 {
    let digits = match STAMP_RE.captures(file_name) {
        Some(captures) => captures[1].to_string(),
        None => return 0,
    };
    let day: u32 = digits[0..2].parse().unwrap_or(0);
    let month: u32 = digits[2..4].parse().unwrap_or(0);
    let year: i32 = digits[4..6].parse().unwrap_or(0);
    let hour: u32 = digits[6..8].parse().unwrap_or(0);
    let minute: u32 = digits[8..10].parse().unwrap_or(0);
    NaiveDate::from_ymd_opt(2000 + year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// Pulls the map name out of a demo path, normalized. Recorder names look
/// like `auto-2507201830-de_dust2.dem`; names without a stamp fall back to
/// the text after the last dash, then to the whole stem.
pub fn extract_map_from_demo_path(path: &str) -> String {
    let name = path.replace('\\', "/");
    let name = name.rsplit('/').next().unwrap_or("");
    let stem = if let Some(stripped) = strip_suffix_ci(name, ".dem.zip") {
        stripped
    } else if let Some(stripped) = strip_suffix_ci(name, ".dem") {
        stripped
    } else {
        return String::new();
    };
    let raw = if let Some(captures) = STAMPED_MAP_RE.captures(stem) {
        captures[1].to_string()
    } else if let Some((_, tail)) = stem.rsplit_once('-') {
        tail.to_string()
    } else {
        stem.to_string()
    };
    normalize_map_name(&raw)
}

/// A demo is usable for a map when either side is unknown or the extracted
/// map matches the expected one.
pub fn is_demo_map_compatible(expected_map: &str, demo_path: &str) -> bool {
    let expected = normalize_map_name(expected_map);
    if expected.is_empty() {
        return true;
    }
    let found = extract_map_from_demo_path(demo_path);
    if found.is_empty() {
        return true;
    }
    expected == found
}

fn strip_suffix_ci<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    if name.len() >= suffix.len() && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
    {
        Some(&name[..name.len() - suffix.len()])
    } else {
        None
    }
}
