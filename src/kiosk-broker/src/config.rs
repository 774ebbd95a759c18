//! Broker configuration.
//!
//! Read from the same TOML file that carries the `[security]` section; keys
//! the broker does not know are ignored so the two can share a file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};

/// Default pending attendee expiry in seconds.
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Default text shown to viewers when the session ends.
pub const DEFAULT_DISCONNECTED_TEXT: &str = "The session has ended.";

/// Broker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Seconds an issued attendee name stays valid.
    pub connection_timeout_secs: u64,

    /// Maximum simultaneous attendees per invitation; 0 means unlimited.
    pub attendee_limit: u32,

    /// Password passed through to every invitation the engine mints.
    pub invitation_password: String,

    /// Text surfaced to the viewer once the session is over.
    pub disconnected_text: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            attendee_limit: 0,
            invitation_password: String::new(),
            disconnected_text: DEFAULT_DISCONNECTED_TEXT.to_string(),
        }
    }
}

impl BrokerConfig {
    /// Reads the broker settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BrokerError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses broker settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BrokerError::Config(format!("invalid broker config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.connection_timeout_secs == 0 {
            return Err(BrokerError::Config(
                "connection_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}
