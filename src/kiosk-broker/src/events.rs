//! Session engine callbacks.
//!
//! The engine binding hands every callback to a [`SessionEventAdapter`],
//! either by calling one of its entry points directly or by pushing a
//! [`SessionEvent`] into the channel drained by [`SessionEventAdapter::run`].
//! Handlers take the engine's handles by value; they are released when the
//! handler returns, whatever the outcome.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::{Attendee, DisconnectInfo};
use crate::invitation::{ConnectOutcome, LevelDecision};
use crate::level::ControlLevel;
use crate::registry::InvitationRegistry;

/// A callback from the session engine.
pub enum SessionEvent {
    AttendeeConnected(Box<dyn Attendee>),
    ControlLevelChangeRequest {
        attendee: Box<dyn Attendee>,
        level: ControlLevel,
    },
    AttendeeDisconnected(DisconnectInfo),
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::AttendeeConnected(attendee) => f
                .debug_tuple("AttendeeConnected")
                .field(&attendee.id())
                .finish(),
            SessionEvent::ControlLevelChangeRequest { attendee, level } => f
                .debug_struct("ControlLevelChangeRequest")
                .field("attendee", &attendee.id())
                .field("level", level)
                .finish(),
            SessionEvent::AttendeeDisconnected(info) => f
                .debug_struct("AttendeeDisconnected")
                .field("attendee", &info.attendee.id())
                .field("reason", &info.reason)
                .finish(),
        }
    }
}

/// What the adapter did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event was applied.
    Accepted,
    /// A level change was refused; the attendee keeps its level.
    Refused,
    /// The attendee was not recognized and its connection was terminated.
    Terminated,
    /// Nothing was known about the attendee; no action taken.
    Ignored,
}

/// Routes engine callbacks into the invitation registry.
#[derive(Clone)]
pub struct SessionEventAdapter {
    registry: Arc<InvitationRegistry>,
}

impl SessionEventAdapter {
    pub fn new(registry: Arc<InvitationRegistry>) -> Self {
        Self { registry }
    }

    /// An attendee finished connecting.
    ///
    /// The attendee must present a pending name of the invitation it came
    /// through. Anything else is a forged or replayed name and the
    /// connection is terminated.
    pub fn on_attendee_connected(&self, attendee: Box<dyn Attendee>) -> EventOutcome {
        let id = attendee.id();
        let (Some(connection_string), Some(name)) =
            (attendee.connection_string(), attendee.remote_name())
        else {
            warn!(attendee_id = %id, "attendee without name or invitation, terminating");
            attendee.terminate_connection();
            return EventOutcome::Terminated;
        };

        match self.registry.connect(connection_string, name, id) {
            Ok((_, ConnectOutcome::Promoted { level })) => {
                if let Err(e) = attendee.set_control_level(level) {
                    warn!(attendee_id = %id, error = %e, "cannot apply control level, terminating");
                    attendee.terminate_connection();
                    self.registry
                        .disconnect(Some(connection_string), Some(name), id);
                    return EventOutcome::Terminated;
                }
                info!(attendee_id = %id, %level, "attendee admitted");
                EventOutcome::Accepted
            }
            Ok((_, ConnectOutcome::AlreadyConnected)) => EventOutcome::Accepted,
            Err(e) => {
                warn!(attendee_id = %id, error = %e, "rejecting attendee");
                attendee.terminate_connection();
                EventOutcome::Terminated
            }
        }
    }

    /// A connected attendee asked for a different control level.
    pub fn on_control_level_change_request(
        &self,
        attendee: Box<dyn Attendee>,
        level: ControlLevel,
    ) -> EventOutcome {
        let id = attendee.id();
        match self.registry.authorize_level_change(id, level) {
            Ok(LevelDecision::Allow) => match attendee.set_control_level(level) {
                Ok(()) => {
                    debug!(attendee_id = %id, %level, "control level changed");
                    EventOutcome::Accepted
                }
                Err(e) => {
                    warn!(attendee_id = %id, %level, error = %e, "cannot apply control level");
                    EventOutcome::Refused
                }
            },
            Ok(LevelDecision::Deny) => {
                debug!(attendee_id = %id, %level, "control level change denied");
                EventOutcome::Refused
            }
            Err(e) => {
                warn!(attendee_id = %id, error = %e, "level change from unknown attendee, terminating");
                attendee.terminate_connection();
                EventOutcome::Terminated
            }
        }
    }

    /// An attendee left, or gave up before it finished connecting.
    pub fn on_attendee_disconnected(&self, info: DisconnectInfo) -> EventOutcome {
        let attendee = &info.attendee;
        let id = attendee.id();
        let removed = self.registry.disconnect(
            attendee.connection_string(),
            attendee.remote_name(),
            id,
        );
        debug!(attendee_id = %id, reason = info.reason, removed, "attendee disconnected");
        if removed {
            EventOutcome::Accepted
        } else {
            EventOutcome::Ignored
        }
    }

    /// Dispatches one event to its handler.
    pub fn handle(&self, event: SessionEvent) -> EventOutcome {
        match event {
            SessionEvent::AttendeeConnected(attendee) => self.on_attendee_connected(attendee),
            SessionEvent::ControlLevelChangeRequest { attendee, level } => {
                self.on_control_level_change_request(attendee, level)
            }
            SessionEvent::AttendeeDisconnected(info) => self.on_attendee_disconnected(info),
        }
    }

    /// Handles events until every sender is dropped.
    pub async fn run(self, mut events: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        debug!("session event channel closed");
    }
}
