use std::sync::atomic::Ordering;

use kiosk_security::{AccessToken, Rights, SecurityPolicy};
use pretty_assertions::assert_eq;

use super::mock::{ALICE, BOB, MockEngine, attendee, service, token};
use crate::engine::AttendeeId;
use crate::error::BrokerError;
use crate::events::EventOutcome;
use crate::level::ControlLevel;

const ALICE_VIEWS: &str = "D:(A;;CCVW;;;S-1-5-21-1-2-3-1001)";
const ALICE_FULL: &str = "D:(A;;GA;;;S-1-5-21-1-2-3-1001)";

#[tokio::test]
async fn test_unconfigured_policy_grants_everything() {
    let engine = MockEngine::new();
    let service = service("D:NO_ACCESS_CONTROL", &engine);
    assert_eq!(service.effective_rights(&token(BOB)).unwrap(), Rights::all());
}

#[tokio::test]
async fn test_empty_policy_refuses_everyone() {
    let engine = MockEngine::new();
    let service = service("D:", &engine);
    assert_eq!(service.effective_rights(&token(BOB)).unwrap(), Rights::empty());
    let err = service
        .request_connection(&token(BOB), "view")
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Forbidden));
    assert_eq!(engine.created(), 0);
}

#[tokio::test]
async fn test_request_connection_issues_descriptor() {
    let engine = MockEngine::new();
    let service = service(ALICE_VIEWS, &engine);

    let descriptor = service
        .request_connection(&token(ALICE), "max")
        .await
        .unwrap();

    assert_eq!(descriptor.connection_string, "inv-1");
    assert_eq!(descriptor.control_level, ControlLevel::View);
    assert_eq!(descriptor.expires_in_secs, 30);
    assert_eq!(descriptor.disconnected_text, "The session has ended.");
    let invitation = service.registry().lookup("inv-1").unwrap();
    assert!(invitation.is_pending(&descriptor.attendee_name));
    assert!(!invitation.is_revoked());
}

#[tokio::test]
async fn test_request_connection_reuses_invitation() {
    let engine = MockEngine::new();
    let service = service(ALICE_VIEWS, &engine);

    let first = service.request_connection(&token(ALICE), "view").await.unwrap();
    let second = service.request_connection(&token(ALICE), "view").await.unwrap();

    assert_eq!(first.connection_string, second.connection_string);
    assert_ne!(first.attendee_name, second.attendee_name);
    assert_eq!(engine.created(), 1);
}

#[tokio::test]
async fn test_request_connection_forbidden() {
    let engine = MockEngine::new();
    let service = service(ALICE_VIEWS, &engine);

    let err = service
        .request_connection(&token(BOB), "view")
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Forbidden));

    let err = service
        .request_connection(&token(ALICE), "interact")
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Forbidden));

    let err = service
        .request_connection(&AccessToken::anonymous(), "view")
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Forbidden));

    assert_eq!(engine.created(), 0);
}

#[tokio::test]
async fn test_request_connection_invalid_level() {
    let engine = MockEngine::new();
    let service = service(ALICE_FULL, &engine);

    let err = service
        .request_connection(&token(ALICE), "drive")
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::InvalidRequest(_)));
    assert_eq!(engine.created(), 0);
}

#[tokio::test]
async fn test_engine_failure_surfaces() {
    let engine = MockEngine::new();
    engine.fail_create.store(true, Ordering::SeqCst);
    let service = service(ALICE_FULL, &engine);

    let err = service
        .request_connection(&token(ALICE), "max")
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Engine(_)));
}

#[tokio::test]
async fn test_view_only_scenario() {
    let engine = MockEngine::new();
    let service = service(ALICE_VIEWS, &engine);
    let adapter = service.event_adapter();

    let descriptor = service
        .request_connection(&token(ALICE), "view")
        .await
        .unwrap();
    let (handle, log) = attendee(7, &descriptor.connection_string, &descriptor.attendee_name);
    assert_eq!(adapter.on_attendee_connected(handle), EventOutcome::Accepted);
    assert_eq!(log.levels(), vec![ControlLevel::View]);

    let invitation = service
        .registry()
        .lookup(&descriptor.connection_string)
        .unwrap();
    assert_eq!(invitation.connected_ids(), vec![AttendeeId(7)]);

    let (handle, _) = attendee(7, &descriptor.connection_string, &descriptor.attendee_name);
    assert_eq!(
        adapter.on_control_level_change_request(handle, ControlLevel::Interactive),
        EventOutcome::Refused
    );
    assert_eq!(log.levels(), vec![ControlLevel::View]);

    let info = super::mock::disconnect(7, &descriptor.connection_string, &descriptor.attendee_name);
    assert_eq!(adapter.on_attendee_disconnected(info), EventOutcome::Accepted);
    assert!(invitation.connected_ids().is_empty());
}

#[tokio::test]
async fn test_policy_change_applies_to_next_request() {
    let engine = MockEngine::new();
    let service = service(ALICE_FULL, &engine);
    let adapter = service.event_adapter();

    let descriptor = service
        .request_connection(&token(ALICE), "interact")
        .await
        .unwrap();
    let (handle, log) = attendee(4, &descriptor.connection_string, &descriptor.attendee_name);
    adapter.on_attendee_connected(handle);
    assert_eq!(log.levels(), vec![ControlLevel::Interactive]);

    let narrowed: SecurityPolicy = ALICE_VIEWS.parse().unwrap();
    service.permissions().store().replace(&narrowed).unwrap();
    service
        .request_connection(&token(ALICE), "view")
        .await
        .unwrap();

    let (handle, log) = attendee(4, &descriptor.connection_string, &descriptor.attendee_name);
    assert_eq!(
        adapter.on_control_level_change_request(handle, ControlLevel::Interactive),
        EventOutcome::Refused
    );
    assert!(log.levels().is_empty());
}

#[tokio::test]
async fn test_request_virtual_channel() {
    let engine = MockEngine::new();
    let service = service(ALICE_FULL, &engine);
    let adapter = service.event_adapter();

    let descriptor = service
        .request_connection(&token(ALICE), "max")
        .await
        .unwrap();
    let (handle, _) = attendee(3, &descriptor.connection_string, &descriptor.attendee_name);
    adapter.on_attendee_connected(handle);

    let grant = service
        .request_virtual_channel(&token(ALICE), "clip")
        .await
        .unwrap();
    assert!(grant.newly_granted);
    let again = service
        .request_virtual_channel(&token(ALICE), "clip")
        .await
        .unwrap();
    assert!(!again.newly_granted);

    assert_eq!(engine.channel("clip").granted_ids(), vec![AttendeeId(3)]);
}

#[tokio::test]
async fn test_request_virtual_channel_needs_right() {
    let engine = MockEngine::new();
    let service = service(ALICE_VIEWS, &engine);

    let err = service
        .request_virtual_channel(&token(ALICE), "clip")
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Forbidden));

    let service = super::mock::service(ALICE_FULL, &engine);
    let err = service
        .request_virtual_channel(&token(ALICE), "bad name")
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_forward_connect() {
    let engine = MockEngine::new();
    let service = service(ALICE_FULL, &engine);

    let descriptor = service
        .forward_connect(&token(ALICE), "view", "10.0.0.5:3389")
        .await
        .unwrap();

    let forwarded = engine.forwarded.lock().clone();
    assert_eq!(
        forwarded,
        vec![(
            descriptor.connection_string.clone(),
            descriptor.attendee_name.clone(),
            "10.0.0.5:3389".to_string()
        )]
    );
}

#[tokio::test]
async fn test_forward_connect_failure_withdraws_name() {
    let engine = MockEngine::new();
    engine.fail_forward.store(true, Ordering::SeqCst);
    let service = service(ALICE_FULL, &engine);

    let err = service
        .forward_connect(&token(ALICE), "max", "10.0.0.5:3389")
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Engine(_)));

    let invitation = service.registry().lookup("inv-1").unwrap();
    assert_eq!(invitation.pending_count(), 0);
    assert!(invitation.is_revoked());
}

#[tokio::test]
async fn test_forward_connect_needs_right() {
    let engine = MockEngine::new();
    let service = service(ALICE_VIEWS, &engine);

    let err = service
        .forward_connect(&token(ALICE), "view", "10.0.0.5:3389")
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Forbidden));
    assert!(engine.forwarded.lock().is_empty());
}
