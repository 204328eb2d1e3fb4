//! Settings types with compiled defaults.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatlineSettings {
    /// HTTP / WebSocket listener settings.
    pub server: ServerSettings,
    /// Broadcast hub tuning.
    pub hub: HubSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl ChatlineSettings {
    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.hub.queue_capacity == 0 {
            return Err(SettingsError::InvalidValue("hub.queueCapacity must be > 0".into()));
        }
        if self.hub.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "hub.heartbeatIntervalMs must be > 0".into(),
            ));
        }
        if self.hub.heartbeat_timeout_ms < self.hub.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(
                "hub.heartbeatTimeoutMs must be >= hub.heartbeatIntervalMs".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Network listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks an ephemeral port).
    pub port: u16,
    /// Maximum concurrent WebSocket sessions.
    pub max_connections: usize,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_connections: 1024,
            max_message_size: 64 * 1024,
        }
    }
}

/// Broadcast hub settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Messages retained for replay (`0` keeps everything).
    pub history_capacity: usize,
    /// Per-session outbound queue depth.
    pub queue_capacity: usize,
    /// How long a closing session may spend flushing its queue.
    pub drain_timeout_ms: u64,
    /// Interval between server pings.
    pub heartbeat_interval_ms: u64,
    /// Close a session after this long without a pong.
    pub heartbeat_timeout_ms: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            queue_capacity: 256,
            drain_timeout_ms: 2_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_validate() {
        assert!(ChatlineSettings::default().validate().is_ok());
    }

    #[test]
    fn zero_queue_capacity_rejected() {
        let mut settings = ChatlineSettings::default();
        settings.hub.queue_capacity = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn timeout_shorter_than_interval_rejected() {
        let mut settings = ChatlineSettings::default();
        settings.hub.heartbeat_interval_ms = 10_000;
        settings.hub.heartbeat_timeout_ms = 5_000;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn zero_history_capacity_is_allowed() {
        let mut settings = ChatlineSettings::default();
        settings.hub.history_capacity = 0;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(ChatlineSettings::default()).unwrap();
        assert_eq!(json["hub"]["historyCapacity"], 100);
        assert_eq!(json["server"]["maxConnections"], 1024);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: ChatlineSettings =
            serde_json::from_str(r#"{"server":{"port":4000}}"#).unwrap();
        assert_eq!(settings.server.port, 4000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.hub.queue_capacity, 256);
    }
}
