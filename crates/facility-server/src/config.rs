//! Server configuration.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};
use crate::semantics::InvocationSemantics;

/// Default UDP port.
pub const DEFAULT_PORT: u16 = 3000;

/// A facility created at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilitySpec {
    pub name: String,
    pub capacity: u32,
}

impl FacilitySpec {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
        }
    }
}

/// Server configuration, usually read from the `[server]` table of the
/// config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the UDP socket binds to.
    pub bind: SocketAddr,

    /// Duplicate handling for retried requests.
    pub semantics: InvocationSemantics,

    /// Drop the ACK and reply of the first datagram.
    pub simulate_failure: bool,

    /// First confirmation id handed out.
    pub first_uid: u32,

    /// Timeout for connecting and writing a monitor push, in milliseconds.
    pub push_timeout_ms: u64,

    /// Interval between expired-subscription sweeps, in seconds. Zero disables.
    pub sweep_interval_secs: u64,

    /// Push availability to monitors after a cancellation as well.
    pub notify_on_cancel: bool,

    /// Facilities created at startup.
    pub facilities: Vec<FacilitySpec>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            semantics: InvocationSemantics::default(),
            simulate_failure: false,
            first_uid: 1,
            push_timeout_ms: 2_000,
            sweep_interval_secs: 60,
            notify_on_cancel: false,
            facilities: default_facilities(),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration bound to the given address.
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            ..Default::default()
        }
    }

    /// Builder: set the invocation semantics.
    pub fn with_semantics(mut self, semantics: InvocationSemantics) -> Self {
        self.semantics = semantics;
        self
    }

    /// Builder: drop the first datagram's ACK and reply.
    pub fn with_simulate_failure(mut self, simulate: bool) -> Self {
        self.simulate_failure = simulate;
        self
    }

    /// Builder: set the first confirmation id.
    pub fn with_first_uid(mut self, uid: u32) -> Self {
        self.first_uid = uid;
        self
    }

    /// Builder: set the push timeout.
    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Builder: set the sweep interval. `Duration::ZERO` disables sweeping.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_secs = interval.as_secs();
        self
    }

    /// Builder: notify monitors on cancel.
    pub fn with_notify_on_cancel(mut self, notify: bool) -> Self {
        self.notify_on_cancel = notify;
        self
    }

    /// Builder: replace the facility table.
    pub fn with_facilities(mut self, facilities: Vec<FacilitySpec>) -> Self {
        self.facilities = facilities;
        self
    }

    /// Push timeout as a duration.
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    /// Sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// Checks the facility table.
    pub fn validate(&self) -> ServerResult<()> {
        if self.facilities.is_empty() {
            return Err(ServerError::config("no facilities configured"));
        }
        let mut seen = HashSet::new();
        for facility in &self.facilities {
            if facility.name.is_empty() {
                return Err(ServerError::config("facility name must not be empty"));
            }
            if !seen.insert(facility.name.as_str()) {
                return Err(ServerError::config(format!(
                    "duplicate facility name: {}",
                    facility.name
                )));
            }
        }
        Ok(())
    }
}

/// The facilities a fresh server starts with.
pub fn default_facilities() -> Vec<FacilitySpec> {
    [
        ("Fitness Center", 50),
        ("Swimming Pool", 30),
        ("Conference Hall", 100),
        ("Research Library", 75),
        ("Main Cafeteria", 200),
        ("Computer Lab", 40),
        ("Auditorium", 350),
        ("Art Studio", 25),
        ("Student Lounge", 60),
        ("Sports Field", 120),
    ]
    .into_iter()
    .map(|(name, capacity)| FacilitySpec::new(name, capacity))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind.port(), 3000);
        assert_eq!(config.semantics, InvocationSemantics::AtLeastOnce);
        assert!(!config.simulate_failure);
        assert_eq!(config.first_uid, 1);
        assert_eq!(config.push_timeout(), Duration::from_secs(2));
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(60)));
        assert_eq!(config.facilities.len(), 10);
        assert_eq!(config.facilities[6], FacilitySpec::new("Auditorium", 350));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn custom_config() {
        let bind: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let config = ServerConfig::new(bind)
            .with_semantics(InvocationSemantics::AtMostOnce)
            .with_simulate_failure(true)
            .with_first_uid(500)
            .with_push_timeout(Duration::from_millis(250))
            .with_sweep_interval(Duration::ZERO)
            .with_notify_on_cancel(true)
            .with_facilities(vec![FacilitySpec::new("Gym", 10)]);

        assert_eq!(config.bind, bind);
        assert_eq!(config.semantics, InvocationSemantics::AtMostOnce);
        assert!(config.simulate_failure);
        assert_eq!(config.first_uid, 500);
        assert_eq!(config.push_timeout(), Duration::from_millis(250));
        assert_eq!(config.sweep_interval(), None);
        assert!(config.notify_on_cancel);
        assert_eq!(config.facilities.len(), 1);
    }

    #[test]
    fn validate_rejects_bad_tables() {
        let empty = ServerConfig::default().with_facilities(Vec::new());
        assert!(matches!(empty.validate(), Err(ServerError::Config { .. })));

        let duplicate = ServerConfig::default().with_facilities(vec![
            FacilitySpec::new("Gym", 10),
            FacilitySpec::new("Gym", 20),
        ]);
        assert!(duplicate.validate().is_err());

        let unnamed = ServerConfig::default().with_facilities(vec![FacilitySpec::new("", 1)]);
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn deserialize_partial_table() {
        let config: ServerConfig = toml::from_str(
            r#"
            bind = "127.0.0.1:3100"
            semantics = "at-most-once"

            [[facilities]]
            name = "Gym"
            capacity = 12
            "#,
        )
        .unwrap();

        assert_eq!(config.bind.port(), 3100);
        assert_eq!(config.semantics, InvocationSemantics::AtMostOnce);
        assert_eq!(config.first_uid, 1);
        assert_eq!(config.facilities, vec![FacilitySpec::new("Gym", 12)]);
    }

    #[test]
    fn huge_push_timeout_saturates() {
        let config = ServerConfig::default().with_push_timeout(Duration::MAX);
        assert_eq!(config.push_timeout_ms, u64::MAX);
    }
}
