//! Error types for the broker.

use kiosk_security::{DemandError, PolicyError};
use thiserror::Error;

use crate::engine::AttendeeId;

/// Failure reported by the external session engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine rejected or failed the call.
    #[error("session engine call failed: {0}")]
    Call(String),

    /// The attendee left before the call reached it.
    #[error("attendee {0} is no longer connected")]
    AttendeeGone(AttendeeId),
}

/// Errors for the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Caller lacks the required rights. Carries no detail on purpose.
    #[error("forbidden")]
    Forbidden,

    /// Malformed request input; nothing was changed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A callback referenced an attendee the broker never issued or has
    /// already retired. The transport connection must be terminated.
    #[error("unknown attendee (id {0})")]
    UnknownAttendee(AttendeeId),

    /// The session engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The security policy could not be loaded or evaluated.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// The broker configuration could not be read or is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<DemandError> for BrokerError {
    fn from(err: DemandError) -> Self {
        match err {
            DemandError::Forbidden => BrokerError::Forbidden,
            DemandError::Policy(e) => BrokerError::Policy(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
