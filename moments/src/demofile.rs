//! Demo file listings and candidate selection for the file-listing source.

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use crate::mapname::{demo_stamp_unix, is_demo_map_compatible, normalize_map_name};
use crate::resolver::{DemoSource, DemoSourceKind};

/// One file visible in the remote demo directory.
#[derive(Debug, Clone)]
pub struct DemoFileEntry {
    pub name: String,
    pub modified_unix: i64,
}

/// Directory listing on the transfer server. The wire client behind it is
/// an external collaborator; only the listing call crosses this boundary.
#[async_trait]
pub trait DemoFileListing: Send + Sync {
    async fn list_demo_files(
        &self,
    ) -> Result<Vec<DemoFileEntry>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Recorder output only; compressed copies of older demos are skipped.
pub fn is_plain_demo_file(name: &str) -> bool {
    let lowered = name.to_lowercase();
    lowered.ends_with(".dem") && !lowered.ends_with(".dem.zip")
}

/// Reduces a listing entry to a bare file name. Some servers return full
/// paths, some return Windows separators.
pub fn extract_file_name(raw_name: &str) -> String {
    let value = raw_name.trim().replace('\\', "/");
    match value.rsplit_once('/') {
        Some((_, name)) => name.to_string(),
        None => value,
    }
}

/// Picks the best demo from a listing: candidates matching the wanted map
/// when any do, newest first by embedded stamp, then modify time, then name.
pub fn pick_demo_filename(entries: &[DemoFileEntry], map_name: &str) -> Option<String> {
    let map_name = normalize_map_name(map_name);
    let mut filtered: Vec<&DemoFileEntry> =
        entries.iter().filter(|entry| !entry.name.is_empty()).collect();
    if filtered.is_empty() {
        return None;
    }

    if !map_name.is_empty() {
        let matches: Vec<&DemoFileEntry> = filtered
            .iter()
            .copied()
            .filter(|entry| is_demo_map_compatible(&map_name, &entry.name))
            .collect();
        if !matches.is_empty() {
            filtered = matches;
        }
    }

    filtered.sort_by(|a, b| {
        let key_a = (demo_stamp_unix(&a.name), a.modified_unix, a.name.as_str());
        let key_b = (demo_stamp_unix(&b.name), b.modified_unix, b.name.as_str());
        key_b.cmp(&key_a)
    });
    filtered.first().map(|entry| entry.name.clone())
}

/// Demo source backed by a remote directory listing.
pub struct FtpDemoSource {
    listing: Arc<dyn DemoFileListing>,
    demo_dir: String,
}

impl FtpDemoSource {
    pub fn new(listing: Arc<dyn DemoFileListing>, demo_dir: impl Into<String>) -> Self {
        FtpDemoSource {
            listing,
            demo_dir: demo_dir.into(),
        }
    }

    fn build_demo_path(&self, filename: &str) -> String {
        let filename = extract_file_name(filename);
        let prefix = self.demo_dir.trim().trim_matches('/').replace('\\', "/");
        if prefix.is_empty() {
            filename
        } else {
            format!("{}/{}", prefix, filename)
        }
    }
}

#[async_trait]
impl DemoSource for FtpDemoSource {
    fn kind(&self) -> DemoSourceKind {
        DemoSourceKind::Ftp
    }

    async fn candidate_demo_path(&self, map_name: &str) -> Option<String> {
        let map_name = normalize_map_name(map_name);
        let entries = match self.listing.list_demo_files().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    "demo resolve: file listing failed: dir={} error={}",
                    self.demo_dir, err
                );
                return None;
            }
        };

        let candidates: Vec<DemoFileEntry> = entries
            .into_iter()
            .map(|entry| DemoFileEntry {
                name: extract_file_name(&entry.name),
                modified_unix: entry.modified_unix,
            })
            .filter(|entry| is_plain_demo_file(&entry.name))
            .collect();

        let total = candidates.len();
        let map_matches = if map_name.is_empty() {
            total
        } else {
            candidates
                .iter()
                .filter(|entry| is_demo_map_compatible(&map_name, &entry.name))
                .count()
        };

        let chosen = match pick_demo_filename(&candidates, &map_name) {
            Some(name) => name,
            None => {
                info!(
                    "demo resolve: no suitable demo in listing: dir={} total_candidates={} map_expected={} map_matches={}",
                    self.demo_dir,
                    total,
                    or_dash(&map_name),
                    map_matches
                );
                return None;
            }
        };

        info!(
            "demo resolve: listing candidate selected: dir={} total_candidates={} map_expected={} map_matches={} chosen={}",
            self.demo_dir,
            total,
            or_dash(&map_name),
            map_matches,
            chosen
        );
        Some(self.build_demo_path(&chosen))
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
