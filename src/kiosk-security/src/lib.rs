//! Kiosk Security - rights model and access policy for the session broker.
//!
//! This crate answers one question: what may this caller do with the shared
//! session?
//!
//! - [`Rights`] - the bitmask of session operations
//! - [`SecurityPolicy`] - an ordered allow/deny list over those rights,
//!   persisted as an SDDL-style string
//! - [`PermissionModel`] - maximum-allowed evaluation of an [`AccessToken`]
//! - [`SecurityDescriptorStore`] - the current policy, hot-reloaded from a
//!   [`PolicySource`] when it changes
//!
//! # Evaluation
//!
//! ```text
//! ┌──────────────┐      ┌─────────────────────────┐
//! │ AccessToken  │─────▶│ SecurityDescriptorStore │──▶ current policy
//! │ (user+groups)│      │  (reload on mtime bump) │
//! └──────────────┘      └────────────┬────────────┘
//!                                    │
//!                                    ▼
//!                       ┌─────────────────────────┐
//!                       │ no DACL?     ──▶ All    │
//!                       │ walk entries in order:  │
//!                       │  deny  ─▶ block bits    │
//!                       │  allow ─▶ grant bits    │
//!                       └─────────────────────────┘
//! ```


mod access;
mod descriptor;
mod error;
mod file_source;
mod rights;
mod sid;
mod store;
mod token;

pub use access::{PermissionModel, evaluate};
pub use descriptor::{Ace, AceKind, SecurityPolicy};
pub use error::{DemandError, PolicyError, Result};
pub use file_source::{DESCRIPTOR_KEY, FilePolicySource, SECURITY_SECTION};
pub use rights::{AccessMask, GenericRight, Rights};
pub use sid::Sid;
pub use store::{MemoryPolicySource, PolicySource, SecurityDescriptorStore};
pub use token::AccessToken;
