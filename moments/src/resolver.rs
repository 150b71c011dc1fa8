//! Demo URL resolution across independent, mutually inconsistent sources.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rcon::{RconError, RconTransport, TransportConfig};
use tokio::sync::Mutex;

use crate::demofile::{DemoFileListing, FtpDemoSource};
use crate::mapname::{extract_map_from_demo_path, is_demo_map_compatible, normalize_map_name};

static RECORDING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)recording to\s+"?([^",\r\n]+?\.dem)"?"#).unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoSourceKind {
    Hltv,
    Ftp,
}

impl DemoSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemoSourceKind::Hltv => "hltv",
            DemoSourceKind::Ftp => "ftp",
        }
    }
}

/// One place a candidate demo path can come from. Sources return server-side
/// paths; the resolver owns map validation, URL building and caching.
#[async_trait]
pub trait DemoSource: Send + Sync {
    fn kind(&self) -> DemoSourceKind;
    async fn candidate_demo_path(&self, map_name: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveReason {
    ResolverDisabled,
    CacheHit,
    Resolved,
    MapMismatch,
    NoDemoFound,
}

impl ResolveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveReason::ResolverDisabled => "resolver_disabled",
            ResolveReason::CacheHit => "cache_hit",
            ResolveReason::Resolved => "resolved",
            ResolveReason::MapMismatch => "map_mismatch",
            ResolveReason::NoDemoFound => "no_demo_found",
        }
    }
}

/// Outcome of one resolution attempt. Mismatches and misses are ordinary
/// outcomes meant to be retried by policy, not errors.
#[derive(Debug, Clone)]
pub struct DemoResolveResult {
    pub demo_url: Option<String>,
    pub demo_path: Option<String>,
    pub map_mismatch: bool,
    pub source: &'static str,
    pub map_expected: String,
    pub map_found: String,
    pub reason: ResolveReason,
    pub attempted_sources: Vec<&'static str>,
}

impl DemoResolveResult {
    fn bare(reason: ResolveReason, map_expected: String) -> Self {
        DemoResolveResult {
            demo_url: None,
            demo_path: None,
            map_mismatch: false,
            source: "",
            map_expected,
            map_found: String::new(),
            reason,
            attempted_sources: Vec::new(),
        }
    }
}

/// Extracts the demo path from an HLTV `status` reply.
pub fn parse_hltv_recording_path(status_text: &str) -> Option<String> {
    let captures = RECORDING_RE.captures(status_text)?;
    let path = captures[1].trim();
    if path.is_empty() {
        return None;
    }
    Some(path.replace('\\', "/"))
}

/// Builds the panel download URL for a server-side demo path.
pub fn build_arena_demo_url(base_host: &str, hid: &str, demo_path: &str) -> Option<String> {
    let host = base_host.trim();
    let hid = hid.trim();
    let demo_path = demo_path.trim();
    if host.is_empty() || hid.is_empty() || demo_path.is_empty() {
        return None;
    }
    let host = host
        .strip_prefix("http://")
        .or_else(|| host.strip_prefix("https://"))
        .unwrap_or(host);
    // the panel expects slashes kept verbatim inside the dem parameter
    let encoded = urlencoding::encode(demo_path).replace("%2F", "/");
    Some(format!(
        "https://{}/getzipdemo.php?hid={}&dem={}",
        host, hid, encoded
    ))
}

#[derive(Debug, Clone)]
pub struct DemoResolverConfig {
    pub hltv_host: String,
    pub hltv_port: u16,
    pub hltv_password: String,
    pub timeout: Duration,
    pub arena_host: String,
    pub arena_hid: String,
    pub ftp_demo_dir: String,
    pub prefer_ftp: bool,
    pub cache_ttl: Duration,
}

impl Default for DemoResolverConfig {
    fn default() -> Self {
        DemoResolverConfig {
            hltv_host: String::new(),
            hltv_port: 27020,
            hltv_password: String::new(),
            timeout: Duration::from_secs(6),
            arena_host: String::new(),
            arena_hid: String::new(),
            ftp_demo_dir: "/cstrike".to_string(),
            prefer_ftp: false,
            cache_ttl: Duration::from_secs(20),
        }
    }
}

struct CacheEntry {
    url: String,
    path: String,
    stored_at: Instant,
}

/// Resolves a downloadable replay URL for a map, trying the configured
/// sources in preference order and keeping one short-lived cached result.
pub struct DemoResolver {
    arena_host: String,
    arena_hid: String,
    prefer_ftp: bool,
    cache_ttl: Duration,
    sources: Vec<Arc<dyn DemoSource>>,
    cache: Mutex<Option<CacheEntry>>,
}

impl DemoResolver {
    pub fn new(config: DemoResolverConfig, listing: Option<Arc<dyn DemoFileListing>>) -> Self {
        let mut sources: Vec<Arc<dyn DemoSource>> = Vec::new();
        if !config.hltv_host.trim().is_empty() && !config.hltv_password.is_empty() {
            let mut transport = TransportConfig::new(
                config.hltv_host.trim(),
                config.hltv_port.max(1),
                config.hltv_password.clone(),
            );
            transport.timeout = config.timeout;
            sources.push(Arc::new(HltvStatusSource::new(transport)));
        }
        if let Some(listing) = listing {
            sources.push(Arc::new(FtpDemoSource::new(
                listing,
                config.ftp_demo_dir.clone(),
            )));
        }
        Self::from_parts(config, sources)
    }

    /// Assembles a resolver from pre-built sources.
    pub fn from_parts(config: DemoResolverConfig, sources: Vec<Arc<dyn DemoSource>>) -> Self {
        DemoResolver {
            arena_host: config.arena_host.trim().to_string(),
            arena_hid: config.arena_hid.trim().to_string(),
            prefer_ftp: config.prefer_ftp,
            cache_ttl: config.cache_ttl.max(Duration::from_secs(3)),
            sources,
            cache: Mutex::new(None),
        }
    }

    /// True when the download panel is configured and at least one source
    /// exists. A disabled resolver answers every call immediately.
    pub fn enabled(&self) -> bool {
        !self.arena_host.is_empty() && !self.arena_hid.is_empty() && !self.sources.is_empty()
    }

    fn ordered_sources(&self) -> Vec<Arc<dyn DemoSource>> {
        let (preferred, rest): (Vec<_>, Vec<_>) = self
            .sources
            .iter()
            .cloned()
            .partition(|source| (source.kind() == DemoSourceKind::Ftp) == self.prefer_ftp);
        preferred.into_iter().chain(rest).collect()
    }

    pub async fn resolve_demo(&self, map_name: &str, force_refresh: bool) -> DemoResolveResult {
        let expected_map = normalize_map_name(map_name);
        if !self.enabled() {
            return DemoResolveResult::bare(ResolveReason::ResolverDisabled, expected_map);
        }

        let now = Instant::now();
        if !force_refresh {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.as_ref() {
                let fresh = now.duration_since(entry.stored_at) <= self.cache_ttl;
                if fresh
                    && (expected_map.is_empty()
                        || is_demo_map_compatible(&expected_map, &entry.path))
                {
                    return DemoResolveResult {
                        demo_url: Some(entry.url.clone()),
                        demo_path: Some(entry.path.clone()),
                        map_mismatch: false,
                        source: "cache",
                        map_expected: expected_map,
                        map_found: extract_map_from_demo_path(&entry.path),
                        reason: ResolveReason::CacheHit,
                        attempted_sources: vec!["cache"],
                    };
                }
            }
        }

        let mut attempted: Vec<&'static str> = Vec::new();
        let mut first_mismatch: Option<DemoResolveResult> = None;

        for source in self.ordered_sources() {
            let tag = source.kind().as_str();
            attempted.push(tag);

            let demo_path = match source.candidate_demo_path(&expected_map).await {
                Some(path) if !path.is_empty() => path,
                _ => continue,
            };

            let demo_map = extract_map_from_demo_path(&demo_path);
            if !expected_map.is_empty() && !is_demo_map_compatible(&expected_map, &demo_path) {
                if first_mismatch.is_none() {
                    first_mismatch = Some(DemoResolveResult {
                        demo_url: None,
                        demo_path: Some(demo_path),
                        map_mismatch: true,
                        source: tag,
                        map_expected: expected_map.clone(),
                        map_found: demo_map,
                        reason: ResolveReason::MapMismatch,
                        attempted_sources: attempted.clone(),
                    });
                }
                continue;
            }

            let demo_url =
                match build_arena_demo_url(&self.arena_host, &self.arena_hid, &demo_path) {
                    Some(url) => url,
                    None => {
                        info!("demo resolve: URL build failed for path={}", demo_path);
                        continue;
                    }
                };

            let mut cache = self.cache.lock().await;
            *cache = Some(CacheEntry {
                url: demo_url.clone(),
                path: demo_path.clone(),
                stored_at: now,
            });

            return DemoResolveResult {
                demo_url: Some(demo_url),
                demo_path: Some(demo_path),
                map_mismatch: false,
                source: tag,
                map_expected: expected_map,
                map_found: demo_map,
                reason: ResolveReason::Resolved,
                attempted_sources: attempted,
            };
        }

        if let Some(mut result) = first_mismatch {
            result.attempted_sources = attempted;
            return result;
        }

        let mut result = DemoResolveResult::bare(ResolveReason::NoDemoFound, expected_map);
        result.attempted_sources = attempted;
        result
    }
}

/// Demo source backed by a one-shot status query against the HLTV server.
/// Every query opens a fresh transport and drops it afterwards.
pub struct HltvStatusSource {
    config: TransportConfig,
}

impl HltvStatusSource {
    pub fn new(config: TransportConfig) -> Self {
        HltvStatusSource { config }
    }

    async fn fetch_status(&self) -> Result<String, RconError> {
        let transport = RconTransport::connect(&self.config, true).await?;
        transport.execute("status").await
    }
}

#[async_trait]
impl DemoSource for HltvStatusSource {
    fn kind(&self) -> DemoSourceKind {
        DemoSourceKind::Hltv
    }

    async fn candidate_demo_path(&self, map_name: &str) -> Option<String> {
        let status_text = match self.fetch_status().await {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    "demo resolve: HLTV status failed: host={} port={} error={}",
                    self.config.host, self.config.port, err
                );
                return None;
            }
        };

        let demo_path = match parse_hltv_recording_path(&status_text) {
            Some(path) => path,
            None => {
                info!("demo resolve: HLTV status has no recording path");
                return None;
            }
        };

        let demo_map = extract_map_from_demo_path(&demo_path);
        info!(
            "demo resolve: HLTV candidate path={} demo_map={} map_expected={}",
            demo_path,
            or_dash(&demo_map),
            or_dash(map_name)
        );
        Some(demo_path)
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        kind: DemoSourceKind,
        path: Option<String>,
    }

    impl FixedSource {
        fn new(kind: DemoSourceKind, path: Option<&str>) -> Arc<Self> {
            Arc::new(FixedSource {
                kind,
                path: path.map(str::to_string),
            })
        }
    }

    #[async_trait]
    impl DemoSource for FixedSource {
        fn kind(&self) -> DemoSourceKind {
            self.kind
        }

        async fn candidate_demo_path(&self, _map_name: &str) -> Option<String> {
            self.path.clone()
        }
    }

    fn config() -> DemoResolverConfig {
        DemoResolverConfig {
            arena_host: "arena.example".to_string(),
            arena_hid: "77".to_string(),
            ..DemoResolverConfig::default()
        }
    }

    fn resolver(
        hltv_path: Option<&str>,
        ftp_path: Option<&str>,
        prefer_ftp: bool,
    ) -> DemoResolver {
        let mut cfg = config();
        cfg.prefer_ftp = prefer_ftp;
        DemoResolver::from_parts(
            cfg,
            vec![
                FixedSource::new(DemoSourceKind::Hltv, hltv_path),
                FixedSource::new(DemoSourceKind::Ftp, ftp_path),
            ],
        )
    }

    #[test]
    fn test_recording_path_parsing() {
        let status = "HLTV status\nrecording to \"cstrike/auto-2507201830-de_dust2.dem\"\n";
        assert_eq!(
            parse_hltv_recording_path(status).as_deref(),
            Some("cstrike/auto-2507201830-de_dust2.dem")
        );
        assert_eq!(
            parse_hltv_recording_path("Recording to demos\\d.dem").as_deref(),
            Some("demos/d.dem")
        );
        assert_eq!(parse_hltv_recording_path("no recording line"), None);
    }

    #[test]
    fn test_arena_url_building() {
        assert_eq!(
            build_arena_demo_url("https://arena.example", "77", "cstrike/a demo.dem").as_deref(),
            Some("https://arena.example/getzipdemo.php?hid=77&dem=cstrike/a%20demo.dem")
        );
        assert_eq!(
            build_arena_demo_url("http://arena.example", "77", "d.dem").as_deref(),
            Some("https://arena.example/getzipdemo.php?hid=77&dem=d.dem")
        );
        assert_eq!(build_arena_demo_url("", "77", "d.dem"), None);
        assert_eq!(build_arena_demo_url("arena.example", "", "d.dem"), None);
        assert_eq!(build_arena_demo_url("arena.example", "77", ""), None);
    }

    #[tokio::test]
    async fn test_disabled_without_panel_config() {
        let resolver = DemoResolver::from_parts(
            DemoResolverConfig::default(),
            vec![FixedSource::new(DemoSourceKind::Hltv, Some("d.dem"))],
        );
        assert!(!resolver.enabled());
        let result = resolver.resolve_demo("de_dust2", false).await;
        assert_eq!(result.reason, ResolveReason::ResolverDisabled);
        assert_eq!(result.map_expected, "de_dust2");
        assert!(result.attempted_sources.is_empty());
    }

    #[tokio::test]
    async fn test_resolves_from_first_compatible_source() {
        let resolver = resolver(Some("cstrike/auto-2507201830-de_dust2.dem"), None, false);
        let result = resolver.resolve_demo("de_dust2", false).await;
        assert_eq!(result.reason, ResolveReason::Resolved);
        assert_eq!(result.source, "hltv");
        assert_eq!(result.attempted_sources, vec!["hltv"]);
        assert_eq!(
            result.demo_url.as_deref(),
            Some("https://arena.example/getzipdemo.php?hid=77&dem=cstrike/auto-2507201830-de_dust2.dem")
        );
        assert_eq!(result.map_found, "de_dust2");
    }

    #[tokio::test]
    async fn test_mismatch_falls_through_to_next_source() {
        let resolver = resolver(
            Some("cstrike/auto-2507201830-de_train_winter.dem"),
            Some("cstrike/auto-2507201840-de_dust2.dem"),
            false,
        );
        let result = resolver.resolve_demo("de_dust2", false).await;
        assert_eq!(result.reason, ResolveReason::Resolved);
        assert_eq!(result.source, "ftp");
        assert_eq!(result.attempted_sources, vec!["hltv", "ftp"]);
    }

    #[tokio::test]
    async fn test_all_mismatch_reports_first_seen() {
        let resolver = resolver(
            Some("cstrike/auto-2507201830-de_train_winter.dem"),
            Some("cstrike/auto-2507201840-de_aztec.dem"),
            false,
        );
        let result = resolver.resolve_demo("de_dust2", false).await;
        assert_eq!(result.reason, ResolveReason::MapMismatch);
        assert!(result.map_mismatch);
        assert_eq!(result.source, "hltv");
        assert_eq!(result.map_expected, "de_dust2");
        assert_eq!(result.map_found, "de_train_winter");
        assert_eq!(result.attempted_sources, vec!["hltv", "ftp"]);
        assert!(result.demo_url.is_none());
    }

    #[tokio::test]
    async fn test_no_candidates_reports_attempt_order() {
        let result = resolver(None, None, false).resolve_demo("de_dust2", false).await;
        assert_eq!(result.reason, ResolveReason::NoDemoFound);
        assert_eq!(result.attempted_sources, vec!["hltv", "ftp"]);

        let result = resolver(None, None, true).resolve_demo("de_dust2", false).await;
        assert_eq!(result.attempted_sources, vec!["ftp", "hltv"]);
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let resolver = resolver(Some("cstrike/auto-2507201830-de_dust2.dem"), None, false);
        let first = resolver.resolve_demo("de_dust2", false).await;
        assert_eq!(first.reason, ResolveReason::Resolved);

        let second = resolver.resolve_demo("de_dust2", false).await;
        assert_eq!(second.reason, ResolveReason::CacheHit);
        assert_eq!(second.source, "cache");
        assert_eq!(second.attempted_sources, vec!["cache"]);
        assert_eq!(second.demo_url, first.demo_url);
    }

    #[tokio::test]
    async fn test_force_refresh_skips_cache() {
        let resolver = resolver(Some("cstrike/auto-2507201830-de_dust2.dem"), None, false);
        resolver.resolve_demo("de_dust2", false).await;
        let result = resolver.resolve_demo("de_dust2", true).await;
        assert_eq!(result.reason, ResolveReason::Resolved);
        assert_eq!(result.source, "hltv");
    }

    #[tokio::test]
    async fn test_cached_demo_for_other_map_is_not_served() {
        let resolver = resolver(Some("cstrike/auto-2507201830-de_dust2.dem"), None, false);
        resolver.resolve_demo("de_dust2", false).await;
        // the cached dust2 demo does not satisfy an inferno request
        let result = resolver.resolve_demo("de_inferno", false).await;
        assert_eq!(result.reason, ResolveReason::MapMismatch);
        assert_eq!(result.map_found, "de_dust2");
    }

    #[tokio::test]
    async fn test_cache_serves_any_map_when_none_requested() {
        let resolver = resolver(Some("cstrike/auto-2507201830-de_dust2.dem"), None, false);
        resolver.resolve_demo("de_dust2", false).await;
        let result = resolver.resolve_demo("", false).await;
        assert_eq!(result.reason, ResolveReason::CacheHit);
    }
}
