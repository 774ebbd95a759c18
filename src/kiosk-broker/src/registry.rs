//! Registry of outstanding invitations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kiosk_security::{Rights, Sid};
use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::BrokerConfig;
use crate::engine::{AttendeeId, InvitationRequest, SessionEngine, VirtualChannel};
use crate::error::{BrokerError, Result};
use crate::invitation::{ConnectOutcome, Invitation, LevelDecision};
use crate::level::ControlLevel;
use crate::names::NameIssuer;

/// Settings the registry passes through to every invitation it mints.
#[derive(Debug, Clone)]
pub struct InvitationSettings {
    pub connection_timeout: Duration,
    pub attendee_limit: u32,
    pub password: String,
}

impl From<&BrokerConfig> for InvitationSettings {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            connection_timeout: config.connection_timeout(),
            attendee_limit: config.attendee_limit,
            password: config.invitation_password.clone(),
        }
    }
}

/// Reverse index from connected transport id to owning invitation.
///
/// Only touched while the owning invitation's lock is held, and never
/// acquires another lock itself.
#[derive(Default)]
pub struct AttendeeIndex {
    attendees: Mutex<HashMap<AttendeeId, Arc<Invitation>>>,
}

impl AttendeeIndex {
    pub(crate) fn insert(&self, id: AttendeeId, invitation: Arc<Invitation>) {
        self.attendees.lock().insert(id, invitation);
    }

    pub(crate) fn remove(&self, id: AttendeeId) {
        self.attendees.lock().remove(&id);
    }

    pub fn get(&self, id: AttendeeId) -> Option<Arc<Invitation>> {
        self.attendees.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.attendees.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.attendees.lock().is_empty()
    }
}

/// Owns every invitation of the hosting session, keyed by caller identity
/// and by connection string, plus the attendee reverse index and the
/// issued-name set.
///
/// Map locks are held only for the map operation itself, never across a
/// call into the engine.
pub struct InvitationRegistry {
    engine: Arc<dyn SessionEngine>,
    settings: InvitationSettings,
    /// One cell per identity; the cell serializes concurrent first creation.
    by_identity: Mutex<HashMap<Sid, Arc<OnceCell<Arc<Invitation>>>>>,
    by_token: RwLock<HashMap<String, Arc<Invitation>>>,
    attendees: AttendeeIndex,
    names: NameIssuer,
}

impl InvitationRegistry {
    pub fn new(engine: Arc<dyn SessionEngine>, settings: InvitationSettings) -> Self {
        Self {
            engine,
            settings,
            by_identity: Mutex::new(HashMap::new()),
            by_token: RwLock::new(HashMap::new()),
            attendees: AttendeeIndex::default(),
            names: NameIssuer::new(),
        }
    }

    pub fn settings(&self) -> &InvitationSettings {
        &self.settings
    }

    /// Returns the invitation of `identity`, minting one through the engine
    /// if it has none yet.
    ///
    /// Concurrent calls for the same identity make exactly one engine call;
    /// the others wait for and share its result. A failed creation leaves
    /// nothing behind and the next call tries again. An existing
    /// invitation gets its rights refreshed to `rights`.
    pub async fn get_or_create(
        &self,
        identity: &Sid,
        rights: Rights,
        initial_level: Option<ControlLevel>,
    ) -> Result<Arc<Invitation>> {
        let cell = {
            let mut by_identity = self.by_identity.lock();
            Arc::clone(by_identity.entry(identity.clone()).or_default())
        };

        let invitation = cell
            .get_or_try_init(|| self.create(identity, rights, initial_level))
            .await?;
        invitation.refresh(rights, initial_level);
        Ok(Arc::clone(invitation))
    }

    async fn create(
        &self,
        identity: &Sid,
        rights: Rights,
        initial_level: Option<ControlLevel>,
    ) -> Result<Arc<Invitation>> {
        let group = Uuid::new_v4().to_string();
        let request = InvitationRequest {
            auth_string: None,
            group: group.clone(),
            password: self.settings.password.clone(),
            attendee_limit: self.settings.attendee_limit,
        };
        let handle = self.engine.create_invitation(request).await?;
        // Nothing is pending yet, so nobody may connect.
        handle.set_revoked(true);

        let invitation = Arc::new(Invitation::new(
            identity.clone(),
            group,
            rights,
            initial_level,
            handle,
            self.settings.connection_timeout,
        ));
        self.by_token.write().insert(
            invitation.connection_string().to_string(),
            Arc::clone(&invitation),
        );
        info!(owner = %identity, group = %invitation.group(), %rights, "invitation created");
        Ok(invitation)
    }

    /// Looks up an invitation by its connection string.
    pub fn lookup(&self, connection_string: &str) -> Option<Arc<Invitation>> {
        self.by_token.read().get(connection_string).cloned()
    }

    /// Looks up the invitation `identity` already holds, without creating one.
    pub fn lookup_identity(&self, identity: &Sid) -> Option<Arc<Invitation>> {
        let cell = self.by_identity.lock().get(identity).cloned()?;
        cell.get().cloned()
    }

    /// Invitation owning connected transport `id`.
    pub fn invitation_for_attendee(&self, id: AttendeeId) -> Option<Arc<Invitation>> {
        self.attendees.get(id)
    }

    pub fn attendees(&self) -> &AttendeeIndex {
        &self.attendees
    }

    pub fn len(&self) -> usize {
        self.by_token.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.read().is_empty()
    }

    /// Issues a pending attendee name on `invitation`.
    ///
    /// Arms the expiry timer with `tokio::spawn`, so it must be called from
    /// within a Tokio runtime. Outside the crate names are issued through
    /// the async [`BrokerService`](crate::service::BrokerService) front end.
    pub(crate) fn issue_pending(
        &self,
        invitation: &Arc<Invitation>,
        level: Option<ControlLevel>,
    ) -> String {
        invitation.issue_pending(&self.names, level)
    }

    /// Takes back a pending name issued on `invitation` that will never be
    /// used.
    pub fn withdraw_pending(&self, invitation: &Invitation, name: &str) -> bool {
        invitation.withdraw_pending(name)
    }

    /// Routes a connect event for `name`/`id` arriving through
    /// `connection_string`.
    pub fn connect(
        &self,
        connection_string: &str,
        name: &str,
        id: AttendeeId,
    ) -> Result<(Arc<Invitation>, ConnectOutcome)> {
        let invitation = self
            .lookup(connection_string)
            .ok_or(BrokerError::UnknownAttendee(id))?;
        let outcome = invitation.on_connect(name, id, &self.attendees)?;
        Ok((invitation, outcome))
    }

    /// Routes a control-level change request from connected attendee `id`.
    pub fn authorize_level_change(
        &self,
        id: AttendeeId,
        requested: ControlLevel,
    ) -> Result<LevelDecision> {
        let invitation = self
            .invitation_for_attendee(id)
            .ok_or(BrokerError::UnknownAttendee(id))?;
        invitation.authorize_level_change(id, requested)
    }

    /// Routes a disconnect event. Connected attendees are found through the
    /// reverse index; attendees that never connected through the invitation
    /// named by `connection_string`.
    pub fn disconnect(
        &self,
        connection_string: Option<&str>,
        name: Option<&str>,
        id: AttendeeId,
    ) -> bool {
        let invitation = self
            .invitation_for_attendee(id)
            .or_else(|| connection_string.and_then(|cs| self.lookup(cs)));
        match invitation {
            Some(invitation) => invitation.on_disconnect(name, id, &self.attendees),
            None => {
                debug!(attendee_id = %id, "disconnect for unknown attendee");
                false
            }
        }
    }

    /// Grants `channel` on `invitation`; see [`Invitation::grant_channel`].
    pub fn grant_channel(
        &self,
        invitation: &Invitation,
        channel: Arc<dyn VirtualChannel>,
    ) -> bool {
        invitation.grant_channel(channel)
    }
}
