//! Kiosk Broker - invitations and attendee lifecycle for a shared session.
//!
//! The broker sits between callers that want into the shared session and
//! the session engine that actually hosts it. Callers get a connection
//! string plus a single-use attendee name; the engine reports attendees as
//! they connect, and the broker admits only names it issued.
//!
//! # Flow
//!
//! ```text
//!   caller ──▶ BrokerService ──demand──▶ PermissionModel
//!                   │
//!                   ▼
//!           InvitationRegistry ──get_or_create──▶ SessionEngine
//!                   │                              (mints invitation)
//!                   ▼
//!              Invitation ◀── issue_pending ── attendee name ──▶ caller
//!                   ▲
//!                   │ on_connect / level change / on_disconnect
//!                   │
//!          SessionEventAdapter ◀──────── engine callbacks
//! ```
//!
//! # Locking
//!
//! Every invitation has its own lock over its pending, connected and
//! channel sets. Registry maps are locked only for the map operation, and
//! no lock is held across a call into the engine that may wait.

#[cfg(test)]
mod tests;

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod invitation;
pub mod level;
pub mod names;
pub mod registry;
pub mod service;

pub use config::BrokerConfig;
pub use engine::{
    Attendee, AttendeeId, DisconnectInfo, EngineInvitation, InvitationRequest,
    SessionEngine, VirtualChannel,
};
pub use error::{BrokerError, EngineError, Result};
pub use events::{EventOutcome, SessionEvent, SessionEventAdapter};
pub use invitation::{ConnectOutcome, Invitation, LevelDecision};
pub use level::ControlLevel;
pub use names::NameIssuer;
pub use registry::{AttendeeIndex, InvitationRegistry, InvitationSettings};
pub use service::{BrokerService, ChannelGrant, ConnectionDescriptor};
