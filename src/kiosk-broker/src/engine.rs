//! Boundary of the external session engine.
//!
//! The engine owns the actual remote-display session. The broker only
//! mints invitations through it, flips their revoked flag, sets attendee
//! control levels, terminates attendees and gates virtual channels.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::level::ControlLevel;

/// Transport-assigned attendee id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttendeeId(pub i32);

impl fmt::Display for AttendeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arguments of the engine's CreateInvitation.
#[derive(Debug, Clone)]
pub struct InvitationRequest {
    /// Optional engine-level authentication string.
    pub auth_string: Option<String>,
    /// Correlation hint the broker attaches to the invitation.
    pub group: String,
    pub password: String,
    /// Maximum simultaneous attendees; 0 means unlimited.
    pub attendee_limit: u32,
}

/// The external session engine.
#[async_trait]
pub trait SessionEngine: Send + Sync {
    /// Mints a new invitation with an engine-generated connection string.
    async fn create_invitation(
        &self,
        request: InvitationRequest,
    ) -> Result<Arc<dyn EngineInvitation>, EngineError>;

    /// Looks up a virtual channel by name, creating it if needed.
    async fn open_virtual_channel(&self, name: &str) -> Result<Arc<dyn VirtualChannel>, EngineError>;

    /// Has the session connect out to a client listening at `address`.
    async fn connect_to_client(
        &self,
        connection_string: &str,
        attendee_name: &str,
        address: &str,
    ) -> Result<(), EngineError>;
}

/// Handle to an invitation minted by the engine.
///
/// Setters are plain property writes on the engine object and return
/// without waiting on the network.
pub trait EngineInvitation: Send + Sync {
    /// The unguessable connection string clients present when connecting.
    fn connection_string(&self) -> &str;

    fn set_revoked(&self, revoked: bool);

    fn is_revoked(&self) -> bool;
}

/// Handle to a named virtual channel. Dropping it releases it.
pub trait VirtualChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Gives `attendee` read/write access to the channel.
    fn grant_access(&self, attendee: AttendeeId) -> Result<(), EngineError>;
}

/// Attendee object handed to event callbacks. Dropping it releases it.
pub trait Attendee: Send {
    /// Name the attendee presented when connecting.
    fn remote_name(&self) -> Option<&str>;

    fn id(&self) -> AttendeeId;

    /// Connection string of the invitation the attendee connected through.
    fn connection_string(&self) -> Option<&str>;

    fn set_control_level(&self, level: ControlLevel) -> Result<(), EngineError>;

    fn terminate_connection(&self);
}

/// Payload of the attendee-disconnected callback.
pub struct DisconnectInfo {
    pub attendee: Box<dyn Attendee>,
    /// Engine-specific reason code, logged only.
    pub reason: i32,
}
