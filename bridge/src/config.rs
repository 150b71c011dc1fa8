//! TOML configuration for the bridge process.

use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use moments::DemoResolverConfig;
use rcon::TransportConfig;
use serde::Deserialize;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "cannot read config file: {}", err),
            ConfigError::Parse(err) => write!(f, "cannot parse config file: {}", err),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err)
    }
}

/// Whole-process settings. Every section and field may be omitted from the
/// file; defaults mirror a plain local server setup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub moments: MomentsConfig,
    pub demos: DemosConfig,
}

impl BridgeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

/// Game server address, credential and supervision timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub timeout_sec: u64,
    pub min_retry_interval_sec: u64,
    pub reconnect_interval_sec: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 27015,
            password: String::new(),
            timeout_sec: 6,
            min_retry_interval_sec: 2,
            reconnect_interval_sec: 60,
        }
    }
}

impl ServerConfig {
    pub fn transport_config(&self) -> TransportConfig {
        let mut config = TransportConfig::new(self.host.clone(), self.port, self.password.clone());
        config.timeout = Duration::from_secs(self.timeout_sec.max(1));
        config
    }
}

/// Clustering windows and the demo retry policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MomentsConfig {
    pub window_sec: i64,
    pub session_idle_sec: i64,
    pub demo_retry_interval_sec: u64,
    pub demo_retry_window_sec: u64,
}

impl Default for MomentsConfig {
    fn default() -> Self {
        MomentsConfig {
            window_sec: 30,
            session_idle_sec: 900,
            demo_retry_interval_sec: 20,
            demo_retry_window_sec: 180,
        }
    }
}

/// Demo resolver endpoints. The resolver stays disabled until the panel
/// host and id plus at least one source are configured.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemosConfig {
    pub hltv_host: String,
    pub hltv_port: u16,
    pub hltv_password: String,
    pub timeout_sec: u64,
    pub arena_host: String,
    pub arena_hid: String,
    pub ftp_demo_dir: String,
    pub prefer_ftp: bool,
    pub cache_ttl_sec: u64,
}

impl Default for DemosConfig {
    fn default() -> Self {
        DemosConfig {
            hltv_host: String::new(),
            hltv_port: 27020,
            hltv_password: String::new(),
            timeout_sec: 6,
            arena_host: String::new(),
            arena_hid: String::new(),
            ftp_demo_dir: "/cstrike".to_string(),
            prefer_ftp: false,
            cache_ttl_sec: 20,
        }
    }
}

impl DemosConfig {
    pub fn resolver_config(&self) -> DemoResolverConfig {
        DemoResolverConfig {
            hltv_host: self.hltv_host.clone(),
            hltv_port: self.hltv_port,
            hltv_password: self.hltv_password.clone(),
            timeout: Duration::from_secs(self.timeout_sec.max(1)),
            arena_host: self.arena_host.clone(),
            arena_hid: self.arena_hid.clone(),
            ftp_demo_dir: self.ftp_demo_dir.clone(),
            prefer_ftp: self.prefer_ftp,
            cache_ttl: Duration::from_secs(self.cache_ttl_sec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config: BridgeConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 27015);
        assert_eq!(config.server.min_retry_interval_sec, 2);
        assert_eq!(config.moments.window_sec, 30);
        assert_eq!(config.demos.ftp_demo_dir, "/cstrike");
        assert!(!config.demos.prefer_ftp);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nhost = \"game.example\"\npassword = \"secret\"\n\n[demos]\nprefer_ftp = true\n"
        )
        .unwrap();

        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.server.host, "game.example");
        assert_eq!(config.server.password, "secret");
        assert_eq!(config.server.port, 27015);
        assert!(config.demos.prefer_ftp);
        assert_eq!(config.moments.session_idle_sec, 900);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nhost = ").unwrap();
        match BridgeConfig::load(file.path()) {
            Err(ConfigError::Parse(_)) => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_load_reports_missing_file() {
        match BridgeConfig::load("/nonexistent/bridge.toml") {
            Err(ConfigError::Io(_)) => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_transport_config_mapping() {
        let mut server = ServerConfig::default();
        server.timeout_sec = 10;
        let transport = server.transport_config();
        assert_eq!(transport.port, 27015);
        assert_eq!(transport.timeout, Duration::from_secs(10));
    }
}
