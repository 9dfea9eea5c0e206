//! Integration tests for Aegis core handshakes.
//!
//! These drive the handshake through the public API with a launcher that only
//! records, and feed callbacks in by hand the way a host application would.

use std::collections::HashMap;
use std::sync::Arc;

use aegis_core::{
    harness::{fixed_redirect, sample_params, RecordingLauncher},
    uri::parse_launch_uri,
    ConnectParams, HandshakeConfig, HandshakeCoordinator, HandshakeError, HandshakeState,
    RedirectConfig,
};

fn recording(launcher: RecordingLauncher) -> (Arc<RecordingLauncher>, HandshakeCoordinator<RecordingLauncher>) {
    let launcher = Arc::new(launcher);
    let coordinator = HandshakeCoordinator::new(launcher.clone(), HandshakeConfig::default());
    (launcher, coordinator)
}

/// Test: Host delivers the success callback while the handshake waits
#[tokio::test]
async fn integration_manual_callback_delivery() {
    let (launcher, coordinator) = recording(RecordingLauncher::succeeding());
    let ingestor = coordinator.ingestor();

    let mut handshake = coordinator.handshake();
    handshake.build(&sample_params(), &fixed_redirect("abc")).unwrap();
    handshake.launch().await.unwrap();

    let launched = launcher.launched();
    assert_eq!(launched.len(), 1);
    let request = parse_launch_uri(&launched[0]).unwrap();
    assert_eq!(request.target.scheme, "aegis");
    assert_eq!(request.target.path, "nip46Auth");
    assert_eq!(request.source, "myapp");

    assert!(ingestor.ingest(&format!("{}&foo=bar", request.success)));
    let cred = handshake.await_callback().await.unwrap();
    assert_eq!(
        cred.query_parameters,
        HashMap::from([
            ("state".to_string(), "abc".to_string()),
            ("foo".to_string(), "bar".to_string()),
        ])
    );
    assert_eq!(cred.callback_url, request.success);
}

/// Test: Empty redirect source fails before anything is registered or launched
#[tokio::test]
async fn integration_empty_source_rejected() {
    let (launcher, coordinator) = recording(RecordingLauncher::succeeding());
    let redirect = RedirectConfig::new(
        "",
        "myapp://x-callback-url/nip46AuthSuccess",
        "myapp://x-callback-url/nip46AuthError",
    );

    let mut handshake = coordinator.handshake();
    let err = handshake.run(&sample_params(), &redirect).await.unwrap_err();

    assert!(matches!(err, HandshakeError::InvalidParameter(_)));
    assert!(matches!(handshake.state(), HandshakeState::Failed(_)));
    assert!(coordinator.registry().is_empty());
    assert!(launcher.launched().is_empty());
}

/// Test: Missing key, secret, or relay is rejected up front
#[tokio::test]
async fn integration_invalid_request_fields() {
    let (_, coordinator) = recording(RecordingLauncher::succeeding());
    let redirect = RedirectConfig::for_scheme("myapp");

    let cases = [
        ConnectParams::new("", "s"),
        ConnectParams::new("zz".repeat(32), "s"),
        ConnectParams::new(aegis_core::harness::SAMPLE_PUBLIC_KEY, ""),
        ConnectParams {
            relays: vec![String::new()],
            ..sample_params()
        },
    ];
    for params in cases {
        let err = coordinator.connect(&params, &redirect).await.unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidParameter(_)), "{params:?}");
    }
    assert!(coordinator.registry().is_empty());
}

/// Test: Launch failure leaves no pending entry behind
#[tokio::test]
async fn integration_launch_failure_cleanup() {
    let (launcher, coordinator) = recording(RecordingLauncher::failing());

    let err = coordinator
        .connect(&sample_params(), &fixed_redirect("t"))
        .await
        .unwrap_err();
    assert_eq!(err, HandshakeError::UnableToLaunchExternalApp);
    assert!(!err.is_remote());
    assert_eq!(launcher.launched().len(), 1);
    assert!(coordinator.registry().is_empty());
}

/// Test: A token-less callback with two pending handshakes is dropped
#[tokio::test]
async fn integration_ambiguous_callback_dropped() {
    let (_, coordinator) = recording(RecordingLauncher::succeeding());
    let ingestor = coordinator.ingestor();

    let mut first = coordinator.handshake();
    first.build(&sample_params(), &fixed_redirect("one")).unwrap();
    first.launch().await.unwrap();

    let mut second = coordinator.handshake();
    second.build(&sample_params(), &fixed_redirect("two")).unwrap();
    second.launch().await.unwrap();

    assert!(!ingestor.ingest("myapp://x-callback-url/nip46AuthSuccess?pubkey=k"));
    assert_eq!(coordinator.registry().len(), 2);

    assert!(ingestor.ingest("myapp://x-callback-url/nip46AuthError?state=two&errorCode=USER_CANCEL"));
    assert_eq!(second.await_callback().await, Err(HandshakeError::UserCancelled));

    // Only one left: the token-less callback now has a single candidate.
    assert!(ingestor.ingest("myapp://x-callback-url/nip46AuthSuccess?pubkey=k"));
    let cred = first.await_callback().await.unwrap();
    assert_eq!(cred.callback_url, "myapp://x-callback-url/nip46AuthSuccess?state=one");
}

/// Test: Configured relays are used when the caller names none
#[tokio::test]
async fn integration_default_relays_from_config() {
    let launcher = Arc::new(RecordingLauncher::succeeding());
    let config = HandshakeConfig {
        relays: vec!["wss://relay.one".into(), "wss://relay.two".into()],
        ..HandshakeConfig::default()
    };
    let coordinator = HandshakeCoordinator::new(launcher.clone(), config);

    let mut handshake = coordinator.handshake();
    handshake.build(&sample_params(), &fixed_redirect("r")).unwrap();
    match handshake.state() {
        HandshakeState::Built { request, .. } => {
            assert_eq!(request.relays(), ["wss://relay.one", "wss://relay.two"]);
        }
        other => panic!("expected Built state, got {other:?}"),
    }
}
