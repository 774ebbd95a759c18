//! Attendee control levels.

use kiosk_security::Rights;
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, Result};

/// Interaction tier granted to a connected attendee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlLevel {
    /// Connected but sees nothing.
    #[default]
    None,

    /// Watches the shared desktop.
    View,

    /// Watches and sends input.
    Interactive,
}

impl ControlLevel {
    /// Rights an invitation must hold for an attendee to run at this level.
    pub fn required_rights(self) -> Rights {
        match self {
            ControlLevel::None => Rights::empty(),
            ControlLevel::View => Rights::VIEW,
            ControlLevel::Interactive => Rights::INTERACT,
        }
    }

    /// Highest level `rights` allow.
    pub fn max_for(rights: Rights) -> Self {
        if rights.contains(Rights::INTERACT) {
            ControlLevel::Interactive
        } else if rights.contains(Rights::VIEW) {
            ControlLevel::View
        } else {
            ControlLevel::None
        }
    }

    /// Returns true if `rights` allow this level.
    pub fn permitted_by(self, rights: Rights) -> bool {
        rights.contains(self.required_rights())
    }

    /// Resolves a level requested by a front-end caller.
    ///
    /// Accepts `view`, `interact` and `max` (case-insensitive). A level the
    /// caller lacks rights for is `Forbidden`; anything else is an invalid
    /// request.
    pub fn from_request(requested: &str, rights: Rights) -> Result<Self> {
        let level = match requested.trim().to_ascii_lowercase().as_str() {
            "view" => ControlLevel::View,
            "interact" => ControlLevel::Interactive,
            "max" | "" => return Ok(Self::max_for(rights)),
            other => {
                return Err(BrokerError::InvalidRequest(format!(
                    "unknown control level `{other}`"
                )));
            }
        };
        if level.permitted_by(rights) {
            Ok(level)
        } else {
            Err(BrokerError::Forbidden)
        }
    }
}

impl std::fmt::Display for ControlLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlLevel::None => write!(f, "none"),
            ControlLevel::View => write!(f, "view"),
            ControlLevel::Interactive => write!(f, "interactive"),
        }
    }
}
