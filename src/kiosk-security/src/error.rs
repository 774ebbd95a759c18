//! Error types for policy loading and access evaluation.

use thiserror::Error;

/// Errors raised while loading, persisting or evaluating a security policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The descriptor string could not be parsed.
    #[error("invalid security descriptor: {0}")]
    Parse(String),

    /// The policy source does not carry a descriptor at all.
    #[error("no security descriptor found in {0}")]
    MissingDescriptor(String),

    /// Reading the policy source failed.
    #[error("failed to read policy source: {0}")]
    Io(#[from] std::io::Error),

    /// Writing the policy back to its source failed.
    #[error("failed to persist security descriptor: {0}")]
    Persist(String),

    /// The access check itself could not be performed.
    #[error("access check failed: {0}")]
    Evaluation(String),
}

/// Outcome of a failed [`crate::PermissionModel::demand`].
///
/// `Forbidden` deliberately carries no detail about which right was missing.
#[derive(Debug, Error)]
pub enum DemandError {
    /// The caller lacks at least one of the demanded rights.
    #[error("forbidden")]
    Forbidden,

    /// Rights could not be computed.
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

pub type Result<T> = std::result::Result<T, PolicyError>;
