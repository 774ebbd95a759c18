//! Invitations and the attendee lifecycle they own.
//!
//! ```text
//!   issue_pending ──▶ Pending(name, level, expiry) ──on_connect──▶ Connected(id)
//!                          │                                          │
//!                 expiry / no-show disconnect                    on_disconnect
//!                          ▼                                          ▼
//!                        gone                                       gone
//! ```
//!
//! Every transition happens under the invitation's own lock. The expiry
//! timer and a connect callback race for the same pending slot; whichever
//! removes it first wins and the other finds nothing.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use kiosk_security::{Rights, Sid};
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::engine::{AttendeeId, EngineInvitation, VirtualChannel};
use crate::error::{BrokerError, Result};
use crate::level::ControlLevel;
use crate::names::NameIssuer;
use crate::registry::AttendeeIndex;

/// An attendee name handed out but not yet used to connect.
struct PendingAttendee {
    level: ControlLevel,
    issued_at: Instant,
    expiry: AbortHandle,
}

#[derive(Default)]
struct LifecycleState {
    rights: Rights,
    initial_level: Option<ControlLevel>,
    pending: HashMap<String, PendingAttendee>,
    /// Connected transport ids and the name each one used.
    connected: HashMap<AttendeeId, String>,
    channels: HashMap<String, Arc<dyn VirtualChannel>>,
}

/// Result of a successful [`Invitation::on_connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A pending name was consumed; apply `level` to the attendee.
    Promoted { level: ControlLevel },
    /// The same attendee was already connected; nothing to apply.
    AlreadyConnected,
}

/// Verdict on a control-level change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelDecision {
    Allow,
    Deny,
}

/// An engine invitation bound to one caller identity and its rights.
pub struct Invitation {
    owner: Sid,
    group: String,
    handle: Arc<dyn EngineInvitation>,
    timeout: Duration,
    state: Mutex<LifecycleState>,
}

impl Invitation {
    pub(crate) fn new(
        owner: Sid,
        group: String,
        rights: Rights,
        initial_level: Option<ControlLevel>,
        handle: Arc<dyn EngineInvitation>,
        timeout: Duration,
    ) -> Self {
        Self {
            owner,
            group,
            handle,
            timeout,
            state: Mutex::new(LifecycleState {
                rights,
                initial_level,
                ..LifecycleState::default()
            }),
        }
    }

    pub fn owner(&self) -> &Sid {
        &self.owner
    }

    /// Correlation hint passed to the engine when the invitation was minted.
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn connection_string(&self) -> &str {
        self.handle.connection_string()
    }

    pub fn is_revoked(&self) -> bool {
        self.handle.is_revoked()
    }

    pub fn rights(&self) -> Rights {
        self.state.lock().rights
    }

    pub fn initial_level(&self) -> Option<ControlLevel> {
        self.state.lock().initial_level
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.state.lock().pending.contains_key(name)
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_connected(&self, id: AttendeeId) -> bool {
        self.state.lock().connected.contains_key(&id)
    }

    /// Connected transport ids, sorted.
    pub fn connected_ids(&self) -> Vec<AttendeeId> {
        let mut ids: Vec<_> = self.state.lock().connected.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Names of granted virtual channels, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state.lock().channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Replaces the stored rights with the caller's latest ones. Token,
    /// pending and connected sets are left alone.
    pub(crate) fn refresh(&self, rights: Rights, initial_level: Option<ControlLevel>) {
        let mut state = self.state.lock();
        if state.rights != rights {
            debug!(group = %self.group, old = %state.rights, new = %rights, "invitation rights refreshed");
        }
        state.rights = rights;
        if initial_level.is_some() {
            state.initial_level = initial_level;
        }
    }

    /// Registers a new pending attendee and returns its name.
    ///
    /// Without an explicit level the invitation's initial level is used,
    /// falling back to the highest level its rights allow. The name expires
    /// after the configured timeout unless it is consumed first.
    pub(crate) fn issue_pending(
        self: &Arc<Self>,
        names: &NameIssuer,
        level: Option<ControlLevel>,
    ) -> String {
        let name = names.issue(&self.owner);

        let mut state = self.state.lock();
        let level = level
            .or(state.initial_level)
            .unwrap_or_else(|| ControlLevel::max_for(state.rights));
        // Scheduled under the lock so the timer cannot look for the slot
        // before it exists.
        let expiry = self.schedule_expiry(name.clone());
        state.pending.insert(
            name.clone(),
            PendingAttendee {
                level,
                issued_at: Instant::now(),
                expiry,
            },
        );
        self.sync_revocation(&state);
        debug!(group = %self.group, %level, pending = state.pending.len(), "attendee name issued");

        name
    }

    fn schedule_expiry(self: &Arc<Self>, name: String) -> AbortHandle {
        let invitation: Weak<Self> = Arc::downgrade(self);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(invitation) = invitation.upgrade() {
                invitation.expire_pending(&name);
            }
        })
        .abort_handle()
    }

    /// Drops a pending attendee whose timer fired. No-op if it was already
    /// consumed or removed.
    fn expire_pending(&self, name: &str) -> bool {
        self.remove_pending(name, "pending attendee expired")
    }

    /// Takes back a name that was issued but can no longer be used, such as
    /// after a failed reverse connect.
    pub(crate) fn withdraw_pending(&self, name: &str) -> bool {
        self.remove_pending(name, "pending attendee withdrawn")
    }

    fn remove_pending(&self, name: &str, message: &'static str) -> bool {
        let mut state = self.state.lock();
        match state.pending.remove(name) {
            Some(pending) => {
                pending.expiry.abort();
                self.sync_revocation(&state);
                debug!(
                    group = %self.group,
                    waited_ms = pending.issued_at.elapsed().as_millis() as u64,
                    "{message}"
                );
                true
            }
            None => false,
        }
    }

    /// Promotes the pending attendee `name` to connected transport `id`.
    ///
    /// Removal from pending and insertion into connected happen in one
    /// critical section, together with the reverse index entry. Granted
    /// virtual channels are then opened to the new attendee outside the
    /// lock, ignoring per-channel failures.
    ///
    /// A re-delivered event for an attendee that is already connected
    /// under the same name succeeds without a level. Anything else is
    /// [`BrokerError::UnknownAttendee`].
    pub(crate) fn on_connect(
        self: &Arc<Self>,
        name: &str,
        id: AttendeeId,
        index: &AttendeeIndex,
    ) -> Result<ConnectOutcome> {
        let (level, channels) = {
            let mut state = self.state.lock();
            match state.pending.remove(name) {
                Some(pending) => {
                    pending.expiry.abort();
                    state.connected.insert(id, name.to_string());
                    index.insert(id, Arc::clone(self));
                    self.sync_revocation(&state);
                    let channels: Vec<_> = state.channels.values().cloned().collect();
                    (pending.level, channels)
                }
                None if state.connected.get(&id).is_some_and(|n| n == name) => {
                    debug!(group = %self.group, attendee_id = %id, "duplicate connect event");
                    return Ok(ConnectOutcome::AlreadyConnected);
                }
                None => return Err(BrokerError::UnknownAttendee(id)),
            }
        };

        debug!(group = %self.group, attendee_id = %id, %level, "attendee connected");
        for channel in channels {
            if let Err(e) = channel.grant_access(id) {
                warn!(channel = channel.name(), attendee_id = %id, error = %e, "cannot open channel to new attendee");
            }
        }
        Ok(ConnectOutcome::Promoted { level })
    }

    /// Authorizes a control-level change for connected attendee `id`.
    ///
    /// Every request is checked against the current rights, whatever level
    /// the attendee was given at connect time. `None` is always allowed.
    pub(crate) fn authorize_level_change(
        &self,
        id: AttendeeId,
        requested: ControlLevel,
    ) -> Result<LevelDecision> {
        let state = self.state.lock();
        if !state.connected.contains_key(&id) {
            return Err(BrokerError::UnknownAttendee(id));
        }
        if requested.permitted_by(state.rights) {
            Ok(LevelDecision::Allow)
        } else {
            Ok(LevelDecision::Deny)
        }
    }

    /// Retires attendee `id`, or the pending name if the attendee never got
    /// as far as a connect event. Returns whether anything was removed.
    pub(crate) fn on_disconnect(
        &self,
        name: Option<&str>,
        id: AttendeeId,
        index: &AttendeeIndex,
    ) -> bool {
        let mut state = self.state.lock();
        if state.connected.remove(&id).is_some() {
            index.remove(id);
            debug!(group = %self.group, attendee_id = %id, "attendee disconnected");
            return true;
        }

        let Some(pending) = name.and_then(|name| state.pending.remove(name)) else {
            return false;
        };
        pending.expiry.abort();
        self.sync_revocation(&state);
        debug!(group = %self.group, attendee_id = %id, "pending attendee disconnected before connecting");
        true
    }

    /// Records `channel` and opens it to every connected attendee.
    ///
    /// If a channel with the same name is already granted, the new handle is
    /// dropped and `false` is returned. Per-attendee failures are logged and
    /// skipped; an attendee disconnecting meanwhile is not an error.
    pub(crate) fn grant_channel(&self, channel: Arc<dyn VirtualChannel>) -> bool {
        let targets: Vec<AttendeeId> = {
            let mut state = self.state.lock();
            if state.channels.contains_key(channel.name()) {
                return false;
            }
            state
                .channels
                .insert(channel.name().to_string(), Arc::clone(&channel));
            state.connected.keys().copied().collect()
        };

        debug!(group = %self.group, channel = channel.name(), attendees = targets.len(), "channel granted");
        for id in targets {
            if let Err(e) = channel.grant_access(id) {
                warn!(channel = channel.name(), attendee_id = %id, error = %e, "cannot open channel to attendee");
            }
        }
        true
    }

    /// The engine accepts new connections only while a name is pending.
    fn sync_revocation(&self, state: &LifecycleState) {
        self.handle.set_revoked(state.pending.is_empty());
    }
}

impl std::fmt::Debug for Invitation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invitation")
            .field("owner", &self.owner)
            .field("group", &self.group)
            .field("revoked", &self.handle.is_revoked())
            .finish()
    }
}
