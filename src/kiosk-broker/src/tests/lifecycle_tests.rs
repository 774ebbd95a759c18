use std::sync::Arc;
use std::time::Duration;

use kiosk_security::Rights;
use pretty_assertions::assert_eq;

use super::mock::{ALICE, MockEngine, registry, sid};
use crate::engine::{AttendeeId, SessionEngine};
use crate::error::BrokerError;
use crate::invitation::{ConnectOutcome, Invitation, LevelDecision};
use crate::level::ControlLevel;
use crate::registry::{InvitationRegistry, InvitationSettings};

const VIEWER: Rights = Rights::CONNECT.union(Rights::VIEW);

async fn setup(rights: Rights) -> (Arc<MockEngine>, Arc<InvitationRegistry>, Arc<Invitation>) {
    let engine = MockEngine::new();
    let registry = registry(&engine);
    let invitation = registry
        .get_or_create(&sid(ALICE), rights, None)
        .await
        .unwrap();
    (engine, registry, invitation)
}

// =============================================================================
// Pending and connect
// =============================================================================

#[tokio::test]
async fn test_issue_then_connect_promotes() {
    let (_, registry, invitation) = setup(VIEWER).await;
    let cs = invitation.connection_string().to_string();

    let name = registry.issue_pending(&invitation, Some(ControlLevel::View));
    assert!(invitation.is_pending(&name));
    assert!(!invitation.is_revoked());

    let (_, outcome) = registry.connect(&cs, &name, AttendeeId(7)).unwrap();
    assert_eq!(
        outcome,
        ConnectOutcome::Promoted {
            level: ControlLevel::View
        }
    );
    assert!(!invitation.is_pending(&name));
    assert_eq!(invitation.connected_ids(), vec![AttendeeId(7)]);
    assert!(invitation.is_revoked());
    assert!(Arc::ptr_eq(
        &registry.invitation_for_attendee(AttendeeId(7)).unwrap(),
        &invitation
    ));
}

#[tokio::test]
async fn test_default_level_is_max_for_rights() {
    let (_, registry, invitation) = setup(VIEWER).await;
    let cs = invitation.connection_string().to_string();

    let name = registry.issue_pending(&invitation, None);
    let (_, outcome) = registry.connect(&cs, &name, AttendeeId(1)).unwrap();
    assert_eq!(
        outcome,
        ConnectOutcome::Promoted {
            level: ControlLevel::View
        }
    );
}

#[tokio::test]
async fn test_second_connect_same_id_is_idempotent() {
    let (_, registry, invitation) = setup(VIEWER).await;
    let cs = invitation.connection_string().to_string();
    let name = registry.issue_pending(&invitation, Some(ControlLevel::View));

    registry.connect(&cs, &name, AttendeeId(7)).unwrap();
    let (_, outcome) = registry.connect(&cs, &name, AttendeeId(7)).unwrap();
    assert_eq!(outcome, ConnectOutcome::AlreadyConnected);
    assert_eq!(invitation.connected_ids(), vec![AttendeeId(7)]);
}

#[tokio::test]
async fn test_second_connect_other_id_is_rejected() {
    let (_, registry, invitation) = setup(VIEWER).await;
    let cs = invitation.connection_string().to_string();
    let name = registry.issue_pending(&invitation, Some(ControlLevel::View));

    registry.connect(&cs, &name, AttendeeId(7)).unwrap();
    let err = registry.connect(&cs, &name, AttendeeId(8)).unwrap_err();
    assert!(matches!(err, BrokerError::UnknownAttendee(AttendeeId(8))));
    assert!(!invitation.is_connected(AttendeeId(8)));
}

#[tokio::test]
async fn test_forged_name_is_rejected() {
    let (_, registry, invitation) = setup(VIEWER).await;
    let cs = invitation.connection_string().to_string();
    registry.issue_pending(&invitation, None);

    let err = registry.connect(&cs, "guess", AttendeeId(3)).unwrap_err();
    assert!(matches!(err, BrokerError::UnknownAttendee(_)));
    assert_eq!(invitation.pending_count(), 1);
}

#[tokio::test]
async fn test_name_from_other_invitation_is_rejected() {
    let engine = MockEngine::new();
    let registry = registry(&engine);
    let a = registry
        .get_or_create(&sid(ALICE), VIEWER, None)
        .await
        .unwrap();
    let b = registry
        .get_or_create(&sid(super::mock::BOB), VIEWER, None)
        .await
        .unwrap();

    let name = registry.issue_pending(&a, None);
    assert!(registry.connect(b.connection_string(), &name, AttendeeId(1)).is_err());
    assert!(a.is_pending(&name));
}

#[tokio::test]
async fn test_invitation_reused_for_sequential_attendees() {
    let (engine, registry, invitation) = setup(VIEWER).await;
    let cs = invitation.connection_string().to_string();

    let first = registry.issue_pending(&invitation, None);
    let second = registry.issue_pending(&invitation, None);
    assert_ne!(first, second);

    registry.connect(&cs, &first, AttendeeId(1)).unwrap();
    assert!(!invitation.is_revoked());
    registry.connect(&cs, &second, AttendeeId(2)).unwrap();
    assert!(invitation.is_revoked());

    assert_eq!(invitation.connected_ids(), vec![AttendeeId(1), AttendeeId(2)]);
    assert_eq!(engine.created(), 1);
}

// =============================================================================
// Expiry
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_pending_expires_after_timeout() {
    let (_, registry, invitation) = setup(VIEWER).await;
    let cs = invitation.connection_string().to_string();
    let name = registry.issue_pending(&invitation, Some(ControlLevel::View));

    tokio::time::sleep(Duration::from_secs(31)).await;

    assert!(!invitation.is_pending(&name));
    assert!(invitation.is_revoked());
    let err = registry.connect(&cs, &name, AttendeeId(7)).unwrap_err();
    assert!(matches!(err, BrokerError::UnknownAttendee(_)));
    assert!(invitation.connected_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_before_timeout_survives_timer() {
    let (_, registry, invitation) = setup(VIEWER).await;
    let cs = invitation.connection_string().to_string();
    let name = registry.issue_pending(&invitation, Some(ControlLevel::View));

    tokio::time::sleep(Duration::from_secs(10)).await;
    registry.connect(&cs, &name, AttendeeId(7)).unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(invitation.is_connected(AttendeeId(7)));
    assert_eq!(invitation.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_keeps_other_pending_names() {
    let (_, registry, invitation) = setup(VIEWER).await;
    let early = registry.issue_pending(&invitation, None);
    tokio::time::sleep(Duration::from_secs(20)).await;
    let late = registry.issue_pending(&invitation, None);

    tokio::time::sleep(Duration::from_secs(15)).await;

    assert!(!invitation.is_pending(&early));
    assert!(invitation.is_pending(&late));
    assert!(!invitation.is_revoked());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_expiry_racing_connect_settles_each_name_once() {
    let engine = MockEngine::new();
    let registry = Arc::new(InvitationRegistry::new(
        Arc::clone(&engine) as Arc<dyn SessionEngine>,
        InvitationSettings {
            connection_timeout: Duration::from_millis(1),
            attendee_limit: 0,
            password: String::new(),
        },
    ));
    let invitation = registry
        .get_or_create(&sid(ALICE), VIEWER, None)
        .await
        .unwrap();
    let cs = invitation.connection_string().to_string();

    const ATTEMPTS: i32 = 3000;
    let tasks: Vec<_> = (0..ATTEMPTS)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let invitation = Arc::clone(&invitation);
            let cs = cs.clone();
            tokio::spawn(async move {
                let name = registry.issue_pending(&invitation, None);
                tokio::time::sleep(Duration::from_micros((i % 7) as u64 * 300)).await;
                match registry.connect(&cs, &name, AttendeeId(i)) {
                    Ok((_, ConnectOutcome::Promoted { .. })) => true,
                    Ok((_, outcome)) => panic!("unexpected outcome {outcome:?}"),
                    Err(BrokerError::UnknownAttendee(_)) => false,
                    Err(e) => panic!("unexpected error {e}"),
                }
            })
        })
        .collect();

    let mut promoted = 0;
    let mut rejected = 0;
    for task in futures::future::join_all(tasks).await {
        if task.unwrap() {
            promoted += 1;
        } else {
            rejected += 1;
        }
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(promoted + rejected, ATTEMPTS as usize);
    assert_eq!(invitation.pending_count(), 0);
    assert_eq!(invitation.connected_ids().len(), promoted);
    assert!(invitation.is_revoked());
}

// =============================================================================
// Control level changes
// =============================================================================

#[tokio::test]
async fn test_level_change_checked_against_rights() {
    let (_, registry, invitation) = setup(VIEWER).await;
    let cs = invitation.connection_string().to_string();
    let name = registry.issue_pending(&invitation, None);
    registry.connect(&cs, &name, AttendeeId(7)).unwrap();

    let id = AttendeeId(7);
    assert_eq!(
        registry
            .authorize_level_change(id, ControlLevel::Interactive)
            .unwrap(),
        LevelDecision::Deny
    );
    assert_eq!(
        registry.authorize_level_change(id, ControlLevel::View).unwrap(),
        LevelDecision::Allow
    );
    assert_eq!(
        registry.authorize_level_change(id, ControlLevel::None).unwrap(),
        LevelDecision::Allow
    );
}

#[tokio::test]
async fn test_level_change_denied_after_rights_shrink() {
    let engine = MockEngine::new();
    let registry = registry(&engine);
    let alice = sid(ALICE);
    let invitation = registry
        .get_or_create(&alice, Rights::all(), Some(ControlLevel::Interactive))
        .await
        .unwrap();
    let cs = invitation.connection_string().to_string();
    let name = registry.issue_pending(&invitation, None);
    let (_, outcome) = registry.connect(&cs, &name, AttendeeId(4)).unwrap();
    assert_eq!(
        outcome,
        ConnectOutcome::Promoted {
            level: ControlLevel::Interactive
        }
    );

    registry.get_or_create(&alice, VIEWER, None).await.unwrap();

    assert_eq!(
        registry
            .authorize_level_change(AttendeeId(4), ControlLevel::Interactive)
            .unwrap(),
        LevelDecision::Deny
    );
}

#[tokio::test]
async fn test_level_change_from_unknown_attendee() {
    let (_, registry, _) = setup(Rights::all()).await;
    let err = registry
        .authorize_level_change(AttendeeId(99), ControlLevel::View)
        .unwrap_err();
    assert!(matches!(err, BrokerError::UnknownAttendee(AttendeeId(99))));
}

// =============================================================================
// Disconnect
// =============================================================================

#[tokio::test]
async fn test_disconnect_connected_attendee() {
    let (_, registry, invitation) = setup(VIEWER).await;
    let cs = invitation.connection_string().to_string();
    let name = registry.issue_pending(&invitation, None);
    registry.connect(&cs, &name, AttendeeId(7)).unwrap();

    assert!(registry.disconnect(Some(&cs), Some(&name), AttendeeId(7)));
    assert!(invitation.connected_ids().is_empty());
    assert!(registry.invitation_for_attendee(AttendeeId(7)).is_none());
    assert!(!registry.disconnect(Some(&cs), Some(&name), AttendeeId(7)));
}

#[tokio::test]
async fn test_no_show_disconnect_clears_pending() {
    let (_, registry, invitation) = setup(VIEWER).await;
    let cs = invitation.connection_string().to_string();
    let name = registry.issue_pending(&invitation, None);

    assert!(registry.disconnect(Some(&cs), Some(&name), AttendeeId(9)));
    assert_eq!(invitation.pending_count(), 0);
    assert!(invitation.is_revoked());
    assert!(registry.connect(&cs, &name, AttendeeId(9)).is_err());
}

#[tokio::test]
async fn test_disconnect_unknown_attendee() {
    let (_, registry, _) = setup(VIEWER).await;
    assert!(!registry.disconnect(None, None, AttendeeId(5)));
    assert!(!registry.disconnect(Some("inv-missing"), Some("x"), AttendeeId(5)));
}

// =============================================================================
// Virtual channels
// =============================================================================

#[tokio::test]
async fn test_grant_channel_fans_out_once() {
    let (engine, registry, invitation) = setup(Rights::all()).await;
    let cs = invitation.connection_string().to_string();
    let name = registry.issue_pending(&invitation, None);
    registry.connect(&cs, &name, AttendeeId(7)).unwrap();

    let channel = engine.channel("clip");
    assert!(registry.grant_channel(&invitation, channel.clone()));
    assert!(!registry.grant_channel(&invitation, channel.clone()));

    assert_eq!(channel.granted_ids(), vec![AttendeeId(7)]);
    assert_eq!(invitation.channel_names(), vec!["clip".to_string()]);
}

#[tokio::test]
async fn test_channel_granted_to_later_attendees() {
    let (engine, registry, invitation) = setup(Rights::all()).await;
    let cs = invitation.connection_string().to_string();
    let channel = engine.channel("clip");
    registry.grant_channel(&invitation, channel.clone());
    assert!(channel.granted_ids().is_empty());

    let name = registry.issue_pending(&invitation, None);
    registry.connect(&cs, &name, AttendeeId(8)).unwrap();

    assert_eq!(channel.granted_ids(), vec![AttendeeId(8)]);
}

#[tokio::test]
async fn test_channel_failure_for_one_attendee_is_absorbed() {
    let (engine, registry, invitation) = setup(Rights::all()).await;
    let cs = invitation.connection_string().to_string();
    for id in [1, 2, 3] {
        let name = registry.issue_pending(&invitation, None);
        registry.connect(&cs, &name, AttendeeId(id)).unwrap();
    }

    let channel = engine.channel("clip");
    channel.failing.lock().insert(AttendeeId(2));
    assert!(registry.grant_channel(&invitation, channel.clone()));

    let mut granted = channel.granted_ids();
    granted.sort();
    assert_eq!(granted, vec![AttendeeId(1), AttendeeId(3)]);
}
