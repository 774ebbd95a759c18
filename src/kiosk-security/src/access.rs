//! Effective-rights evaluation.

use std::sync::Arc;

use tracing::debug;

use crate::descriptor::{AceKind, SecurityPolicy};
use crate::error::{DemandError, PolicyError, Result};
use crate::rights::Rights;
use crate::store::SecurityDescriptorStore;
use crate::token::AccessToken;

/// Computes the maximum rights `token` is allowed under `policy`.
///
/// Entries are walked in order. A deny entry removes the bits that have not
/// been granted yet; an allow entry grants the bits that have not been
/// denied yet. A policy without a DACL grants everything; an empty DACL
/// grants nothing.
///
/// Absent rights are not an error: the result is simply empty.
pub fn evaluate(policy: &SecurityPolicy, token: &AccessToken) -> Result<Rights> {
    if token.user().is_none() {
        return Err(PolicyError::Evaluation(
            "token does not identify a user".to_string(),
        ));
    }
    if policy.is_unrestricted() {
        return Ok(Rights::all());
    }

    let mut granted = Rights::empty();
    let mut denied = Rights::empty();
    for ace in policy.entries() {
        if !token.matches(&ace.sid) {
            continue;
        }
        let mask = ace.mask.map_generic()?;
        match ace.kind {
            AceKind::Allow => granted |= mask - denied,
            AceKind::Deny => denied |= mask - granted,
        }
    }
    Ok(granted)
}

/// Maps callers to rights using the current policy of a
/// [`SecurityDescriptorStore`].
///
/// Holds no state of its own beyond the store handle; every call sees the
/// policy that is current at that moment.
#[derive(Clone)]
pub struct PermissionModel {
    store: Arc<SecurityDescriptorStore>,
}

impl PermissionModel {
    pub fn new(store: Arc<SecurityDescriptorStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<SecurityDescriptorStore> {
        &self.store
    }

    /// Rights `token` effectively holds right now.
    pub fn effective_rights(&self, token: &AccessToken) -> Result<Rights> {
        let policy = self.store.current()?;
        let rights = evaluate(&policy, token)?;
        debug!(
            user = %token.user().map(ToString::to_string).unwrap_or_default(),
            %rights,
            "evaluated effective rights"
        );
        Ok(rights)
    }

    /// Succeeds with the full effective rights if they include every bit of
    /// `required`.
    pub fn demand(
        &self,
        token: &AccessToken,
        required: Rights,
    ) -> std::result::Result<Rights, DemandError> {
        let rights = self.effective_rights(token)?;
        if rights.contains(required) {
            Ok(rights)
        } else {
            Err(DemandError::Forbidden)
        }
    }
}
