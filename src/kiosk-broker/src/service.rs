//! Operations exposed to the network front end.
//!
//! Each operation demands the rights it needs before touching any state.
//! A caller without them gets [`BrokerError::Forbidden`] and nothing else.

use std::sync::Arc;

use kiosk_security::{AccessToken, PermissionModel, Rights, SecurityDescriptorStore, Sid};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::BrokerConfig;
use crate::engine::SessionEngine;
use crate::error::{BrokerError, Result};
use crate::events::SessionEventAdapter;
use crate::invitation::Invitation;
use crate::level::ControlLevel;
use crate::registry::{InvitationRegistry, InvitationSettings};

/// What a caller's client needs to open its transport connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionDescriptor {
    /// Connection string of the caller's invitation.
    pub connection_string: String,

    /// Single-use attendee name; present it when connecting.
    pub attendee_name: String,

    /// Control level the attendee receives on connect.
    pub control_level: ControlLevel,

    /// Seconds until `attendee_name` expires.
    pub expires_in_secs: u64,

    /// Text the viewer shows once the session is over.
    pub disconnected_text: String,
}

/// Outcome of [`BrokerService::request_virtual_channel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelGrant {
    pub channel: String,

    /// False if the channel had already been granted on the invitation.
    pub newly_granted: bool,
}

/// The broker: permission checks in front of the invitation registry.
pub struct BrokerService {
    config: BrokerConfig,
    permissions: PermissionModel,
    engine: Arc<dyn SessionEngine>,
    registry: Arc<InvitationRegistry>,
}

impl BrokerService {
    pub fn new(
        config: BrokerConfig,
        store: Arc<SecurityDescriptorStore>,
        engine: Arc<dyn SessionEngine>,
    ) -> Self {
        let registry = Arc::new(InvitationRegistry::new(
            Arc::clone(&engine),
            InvitationSettings::from(&config),
        ));
        Self {
            config,
            permissions: PermissionModel::new(store),
            engine,
            registry,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn permissions(&self) -> &PermissionModel {
        &self.permissions
    }

    pub fn registry(&self) -> &Arc<InvitationRegistry> {
        &self.registry
    }

    /// Adapter the engine binding delivers its callbacks to.
    pub fn event_adapter(&self) -> SessionEventAdapter {
        SessionEventAdapter::new(Arc::clone(&self.registry))
    }

    /// Rights `token` holds under the current policy.
    pub fn effective_rights(&self, token: &AccessToken) -> Result<Rights> {
        Ok(self.permissions.effective_rights(token)?)
    }

    /// Issues a connection for `token` at the requested control level
    /// (`view`, `interact` or `max`).
    pub async fn request_connection(
        &self,
        token: &AccessToken,
        level: &str,
    ) -> Result<ConnectionDescriptor> {
        let (user, rights) = self.demand(token, Rights::CONNECT)?;
        let level = ControlLevel::from_request(level, rights)?;

        let invitation = self.registry.get_or_create(user, rights, Some(level)).await?;
        Ok(self.issue(&invitation, level))
    }

    /// Opens virtual channel `name` to every attendee of the caller's
    /// invitation, present and future.
    pub async fn request_virtual_channel(
        &self,
        token: &AccessToken,
        name: &str,
    ) -> Result<ChannelGrant> {
        let (user, rights) = self.demand(token, Rights::CONNECT | Rights::CREATE_VIRTUAL_CHANNEL)?;
        validate_channel_name(name)?;

        let invitation = self.registry.get_or_create(user, rights, None).await?;
        let channel = self.engine.open_virtual_channel(name).await?;
        let newly_granted = self.registry.grant_channel(&invitation, channel);
        debug!(owner = %user, channel = name, newly_granted, "virtual channel requested");
        Ok(ChannelGrant {
            channel: name.to_string(),
            newly_granted,
        })
    }

    /// Issues a connection for `token` and has the session dial out to the
    /// client listening at `address` with it.
    ///
    /// If the engine cannot reach the client the issued name is withdrawn
    /// and the engine error returned.
    pub async fn forward_connect(
        &self,
        token: &AccessToken,
        level: &str,
        address: &str,
    ) -> Result<ConnectionDescriptor> {
        let (user, rights) = self.demand(token, Rights::CONNECT | Rights::CONNECT_TO_CLIENT)?;
        let address = address.trim();
        if address.is_empty() {
            return Err(BrokerError::InvalidRequest(
                "client address must not be empty".to_string(),
            ));
        }
        let level = ControlLevel::from_request(level, rights)?;

        let invitation = self.registry.get_or_create(user, rights, Some(level)).await?;
        let descriptor = self.issue(&invitation, level);
        if let Err(e) = self
            .engine
            .connect_to_client(&descriptor.connection_string, &descriptor.attendee_name, address)
            .await
        {
            warn!(owner = %user, address, error = %e, "reverse connect failed");
            self.registry
                .withdraw_pending(&invitation, &descriptor.attendee_name);
            return Err(e.into());
        }
        Ok(descriptor)
    }

    fn demand<'a>(&self, token: &'a AccessToken, required: Rights) -> Result<(&'a Sid, Rights)> {
        let user = token.user().ok_or(BrokerError::Forbidden)?;
        let rights = self.permissions.demand(token, required)?;
        Ok((user, rights))
    }

    fn issue(&self, invitation: &Arc<Invitation>, level: ControlLevel) -> ConnectionDescriptor {
        let attendee_name = self.registry.issue_pending(invitation, Some(level));
        ConnectionDescriptor {
            connection_string: invitation.connection_string().to_string(),
            attendee_name,
            control_level: level,
            expires_in_secs: self.config.connection_timeout_secs,
            disconnected_text: self.config.disconnected_text.clone(),
        }
    }
}

fn validate_channel_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(BrokerError::InvalidRequest(format!(
            "invalid virtual channel name `{name}`"
        )))
    }
}
