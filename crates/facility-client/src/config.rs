//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/facility/config.toml` by default. The `[client]` table holds
//! connection settings; the `[server]` table is read by `facility server`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use facility_server::ServerConfig;

/// Configuration for the facility client and embedded server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection settings.
    pub client: ClientSettings,

    /// Server settings.
    pub server: ServerConfig,
}

/// Connection settings for talking to a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Server address (`host:port`).
    pub server: String,

    /// Seconds to wait for each ACK and for each reply.
    pub timeout_secs: u64,

    /// Retransmissions after the first attempt.
    pub retries: u32,

    /// Print replies as JSON.
    pub json: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:3000".to_string(),
            timeout_secs: 2,
            retries: 3,
            json: false,
        }
    }
}

impl ClientSettings {
    /// Per-attempt wait as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facility")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facility_server::InvocationSemantics;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.client.server, "127.0.0.1:3000");
        assert_eq!(config.client.timeout(), Duration::from_secs(2));
        assert_eq!(config.client.retries, 3);
        assert_eq!(config.server.facilities.len(), 10);
    }

    #[test]
    fn load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[client]
server = "192.168.1.5:3000"
retries = 0

[server]
semantics = "at-most-once"

[[server.facilities]]
name = "Gym"
capacity = 12
"#
        )
        .unwrap();

        let config = ClientConfig::load_from(&file.path().to_path_buf()).unwrap();
        assert_eq!(config.client.server, "192.168.1.5:3000");
        assert_eq!(config.client.retries, 0);
        assert_eq!(config.client.timeout_secs, 2);
        assert_eq!(config.server.semantics, InvocationSemantics::AtMostOnce);
        assert_eq!(config.server.facilities.len(), 1);
        assert_eq!(config.server.facilities[0].name, "Gym");
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.starts_with("failed to read config"));
    }

    #[test]
    fn load_invalid_toml_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client\nserver = ").unwrap();
        let err = ClientConfig::load_from(&file.path().to_path_buf()).unwrap_err();
        assert!(err.starts_with("failed to parse config"));
    }

    #[test]
    fn dump_round_trips() {
        let config = ClientConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.client, config.client);
        assert_eq!(parsed.server, config.server);
    }

    #[test]
    fn default_path_ends_with_app_dir() {
        let path = ClientConfig::default_path();
        assert!(path.ends_with("facility/config.toml"));
    }
}
