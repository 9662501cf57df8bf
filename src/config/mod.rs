//! Configuration management

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::error::Error;
use crate::shared::result::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub timeouts: TimeoutConfig,
    pub stanza: StanzaConfig,
}

/// Protocol timers, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Wait for a reply to a sent request before firing the error path
    pub reply_secs: u64,
    /// Wait on a stalled ICE `checking` state before giving up
    pub ice_checking_secs: u64,
    /// Wait on an ICE `disconnected` state before tearing down
    pub ice_disconnect_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StanzaConfig {
    /// Prefix for stanza ids of bare acknowledgements (`<prefix>_<sid>_<n>`)
    pub id_prefix: String,
}

impl TimeoutConfig {
    pub fn reply(&self) -> Duration {
        Duration::from_secs(self.reply_secs)
    }

    pub fn ice_checking(&self) -> Duration {
        Duration::from_secs(self.ice_checking_secs)
    }

    pub fn ice_disconnect(&self) -> Duration {
        Duration::from_secs(self.ice_disconnect_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig {
                reply_secs: 10,
                ice_checking_secs: 15,
                ice_disconnect_secs: 5,
            },
            stanza: StanzaConfig {
                id_prefix: "jingle".to_string(),
            },
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing sections
    pub fn from_file(path: &str) -> Result<Self> {
        let defaults = Self::default();

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&defaults).map_err(|e| {
                Error::Configuration(format!("failed to seed defaults: {}", e))
            })?)
            .add_source(config::File::with_name(path))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to read {}: {}", path, e)))?;

        settings
            .try_deserialize()
            .map_err(|e| Error::Configuration(format!("failed to parse {}: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timers() {
        let config = EngineConfig::default();
        assert_eq!(config.timeouts.reply(), Duration::from_secs(10));
        assert_eq!(config.timeouts.ice_checking(), Duration::from_secs(15));
        assert_eq!(config.timeouts.ice_disconnect(), Duration::from_secs(5));
        assert_eq!(config.stanza.id_prefix, "jingle");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = EngineConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.timeouts.reply_secs, config.timeouts.reply_secs);
        assert_eq!(parsed.stanza.id_prefix, config.stanza.id_prefix);
    }
}
