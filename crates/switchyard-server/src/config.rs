//! Control plane configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchyard_core::{ControlPlaneError, Result};
use switchyard_store::EntityCacheConfig;

/// Shortest accepted poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration of a control plane instance.
///
/// Every field has a default, so a JSON file only needs the keys it
/// overrides. Durations are written like `"2s"` or `"500ms"`.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use switchyard_server::ControlPlaneConfig;
///
/// let config = ControlPlaneConfig::from_json(r#"{ "pollInterval": "5s" }"#).unwrap();
/// assert_eq!(config.poll_interval, Duration::from_secs(5));
/// assert_eq!(config.discovery_listen.port(), 9901);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlPlaneConfig {
    /// Time between entity store polls.
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,
    /// Deadline for one collection fetch.
    #[serde(with = "duration_str")]
    pub store_timeout: Duration,
    /// Discovery (gRPC) listen address; also serves health checks.
    pub discovery_listen: SocketAddr,
    /// Admin listen address for metrics.
    pub admin_listen: SocketAddr,
    /// Capacity of the change notification channel.
    pub notification_buffer: usize,
    /// Capacity of the node event channel.
    pub node_event_buffer: usize,
    /// Time granted to in-flight work on shutdown.
    #[serde(with = "duration_str")]
    pub grace_period: Duration,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            store_timeout: Duration::from_secs(1),
            discovery_listen: SocketAddr::from(([0, 0, 0, 0], 9901)),
            admin_listen: SocketAddr::from(([0, 0, 0, 0], 9902)),
            notification_buffer: 8,
            node_event_buffer: 64,
            grace_period: Duration::from_secs(5),
        }
    }
}

impl ControlPlaneConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ControlPlaneError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ControlPlaneError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Check the settings are usable together.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval < MIN_POLL_INTERVAL {
            return Err(ControlPlaneError::Configuration(format!(
                "poll interval {:?} is below the minimum of {:?}",
                self.poll_interval, MIN_POLL_INTERVAL
            )));
        }
        if self.store_timeout.is_zero() || self.store_timeout > self.poll_interval {
            return Err(ControlPlaneError::Configuration(format!(
                "store timeout {:?} must be positive and at most the poll interval {:?}",
                self.store_timeout, self.poll_interval
            )));
        }
        if self.notification_buffer == 0 || self.node_event_buffer == 0 {
            return Err(ControlPlaneError::Configuration(
                "channel buffers must not be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Polling settings for the entity cache.
    pub fn entity_cache(&self) -> EntityCacheConfig {
        EntityCacheConfig {
            poll_interval: self.poll_interval,
            store_timeout: self.store_timeout,
        }
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};
    use switchyard_core::parse_duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}ms", value.as_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_duration(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid duration {text:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ControlPlaneConfig::default();
        config.validate().unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.store_timeout, Duration::from_secs(1));
        assert_eq!(config.discovery_listen.to_string(), "0.0.0.0:9901");
        assert_eq!(config.admin_listen.to_string(), "0.0.0.0:9902");
        assert_eq!(config.notification_buffer, 8);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ControlPlaneConfig::from_json(
            r#"{ "storeTimeout": "250ms", "adminListen": "127.0.0.1:9000" }"#,
        )
        .unwrap();
        assert_eq!(config.store_timeout, Duration::from_millis(250));
        assert_eq!(config.admin_listen.port(), 9000);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn rejects_invalid_settings() {
        let short = ControlPlaneConfig {
            poll_interval: Duration::from_millis(100),
            store_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        assert!(matches!(
            short.validate(),
            Err(ControlPlaneError::Configuration(_))
        ));

        let slow_store = ControlPlaneConfig {
            store_timeout: Duration::from_secs(3),
            ..Default::default()
        };
        assert!(slow_store.validate().is_err());

        let no_buffer = ControlPlaneConfig {
            notification_buffer: 0,
            ..Default::default()
        };
        assert!(no_buffer.validate().is_err());
    }

    #[test]
    fn rejects_bad_json() {
        assert!(ControlPlaneConfig::from_json(r#"{ "pollInterval": "soon" }"#).is_err());
        assert!(ControlPlaneConfig::from_json("not json").is_err());
        assert!(ControlPlaneConfig::from_json(r#"{ "pollInterval": "10ms" }"#).is_err());
    }

    #[test]
    fn serializes_durations_as_strings() {
        let json = serde_json::to_value(ControlPlaneConfig::default()).unwrap();
        assert_eq!(json["pollInterval"], "2000ms");
        let back: ControlPlaneConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, ControlPlaneConfig::default());
    }
}
