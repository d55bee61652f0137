use std::sync::Arc;
use std::time::Duration;

use ffmpeg_ivf::EncoderSpec;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Connection;
use crate::manager::SessionRegistry;
use crate::rtc::{IceCandidate, SessionDescription};
use crate::session::{ConnectionId, Outbound, SessionState};
use crate::signaling::SignalingContext;
use crate::signaling::message::{Signal, SignalError};
use crate::test_utils::{Events, FakeFactory, events, snapshot};

struct Harness {
    connection: Connection,
    ctx: Arc<SignalingContext>,
    factory: Arc<FakeFactory>,
    events: Events,
    rx: mpsc::Receiver<Signal>,
}

fn harness_with(build: impl FnOnce(FakeFactory) -> FakeFactory) -> Harness {
    let events = events();
    let factory = Arc::new(build(FakeFactory::new(events.clone())));
    let ctx = Arc::new(SignalingContext {
        registry: Arc::new(SessionRegistry::new()),
        negotiators: factory.clone(),
        encoder: EncoderSpec::new(
            "missing",
            "/nonexistent/lite-rtc-ffmpeg",
            vec![],
            Duration::from_millis(33),
        ),
        shutdown: CancellationToken::new(),
    });
    let (outbound, rx) = Outbound::channel(16);
    Harness {
        connection: Connection::new(ConnectionId::new(), ctx.clone(), outbound),
        ctx,
        factory,
        events,
        rx,
    }
}

fn harness() -> Harness {
    harness_with(|factory| factory)
}

fn offer(sdp: &str) -> String {
    Signal::Offer(SessionDescription::offer(sdp)).to_text().unwrap()
}

fn candidate(name: &str) -> IceCandidate {
    IceCandidate {
        candidate: name.to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

fn candidate_text(name: &str) -> String {
    Signal::IceCandidate(candidate(name)).to_text().unwrap()
}

fn drain(rx: &mut mpsc::Receiver<Signal>) -> Vec<Signal> {
    let mut out = Vec::new();
    while let Ok(signal) = rx.try_recv() {
        out.push(signal);
    }
    out
}

// ------------------------------------------------------------------------
// Before an offer
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_malformed_offer_sends_nothing() {
    let mut h = harness();

    let err = h
        .connection
        .handle_text(r#"{"type":"offer","data":"not json"}"#)
        .await
        .unwrap_err();

    assert!(matches!(err, SignalError::Payload { kind: "offer", .. }));
    assert!(drain(&mut h.rx).is_empty());
    assert!(h.ctx.registry.is_empty().await);
    assert_eq!(h.factory.created(), 0);
}

#[tokio::test]
async fn test_candidates_before_offer_are_dropped() {
    let mut h = harness();

    h.connection.handle_text(&candidate_text("c1")).await.unwrap();
    h.connection.handle_text(&candidate_text("c2")).await.unwrap();

    assert!(h.ctx.registry.is_empty().await);
    assert_eq!(h.factory.created(), 0);
    assert!(snapshot(&h.events).is_empty());
    assert!(drain(&mut h.rx).is_empty());
}

#[tokio::test]
async fn test_unknown_and_unexpected_types() {
    let h = harness();

    let err = h
        .connection
        .handle_text(r#"{"type":"bye","data":""}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, SignalError::UnknownType(_)));

    let answer = Signal::Answer(SessionDescription::answer("v=0")).to_text().unwrap();
    let err = h.connection.handle_text(&answer).await.unwrap_err();
    assert!(matches!(err, SignalError::Unexpected("answer")));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_malformed_envelope_is_fatal() {
    let h = harness();
    let err = h.connection.handle_text("{").await.unwrap_err();
    assert!(err.is_fatal());
}

// ------------------------------------------------------------------------
// Offer / answer
// ------------------------------------------------------------------------

#[tokio::test]
async fn test_offer_answers_and_forwards_local_candidates() {
    let mut h =
        harness_with(|factory| factory.with_local_candidates(vec![candidate("local-1")]));

    h.connection.handle_text(&offer("remote-offer")).await.unwrap();

    assert_eq!(
        snapshot(&h.events),
        vec![
            "on_ice_candidate",
            "remote:remote-offer",
            "create_answer",
            "local:fake-answer",
        ]
    );
    let sent = drain(&mut h.rx);
    assert!(sent.contains(&Signal::IceCandidate(candidate("local-1"))));
    assert!(sent.contains(&Signal::Answer(SessionDescription::answer("fake-answer"))));

    let session = h.ctx.registry.lookup(h.connection.id()).await.unwrap();
    assert_eq!(session.state(), SessionState::Streaming);
}

#[tokio::test]
async fn test_missing_encoder_keeps_session_until_close() {
    let h = harness();

    h.connection.handle_text(&offer("v=0")).await.unwrap();
    // let the pipe try, and fail, to start the encoder
    tokio::time::sleep(Duration::from_millis(100)).await;

    let session = h.ctx.registry.lookup(h.connection.id()).await.unwrap();
    assert!(!session.is_closing());

    h.connection.close().await;

    assert!(h.ctx.registry.is_empty().await);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.cancel_token().is_cancelled());
    assert_eq!(snapshot(&h.events).last().map(String::as_str), Some("close"));
}

#[tokio::test]
async fn test_candidate_after_offer_is_applied() {
    let h = harness();

    h.connection.handle_text(&offer("v=0")).await.unwrap();
    h.connection.handle_text(&candidate_text("remote-1")).await.unwrap();

    assert!(snapshot(&h.events).contains(&"candidate:remote-1".to_string()));
}

#[tokio::test]
async fn test_second_offer_is_rejected() {
    let mut h = harness();

    h.connection.handle_text(&offer("first")).await.unwrap();
    let first = h.ctx.registry.lookup(h.connection.id()).await.unwrap();
    h.connection.handle_text(&offer("second")).await.unwrap();

    assert_eq!(h.factory.created(), 1);
    let answers = drain(&mut h.rx)
        .into_iter()
        .filter(|s| matches!(s, Signal::Answer(_)))
        .count();
    assert_eq!(answers, 1);
    let current = h.ctx.registry.lookup(h.connection.id()).await.unwrap();
    assert!(Arc::ptr_eq(&first, &current));
    assert!(!snapshot(&h.events).contains(&"remote:second".to_string()));
}

#[tokio::test]
async fn test_rejected_offer_keeps_partial_session() {
    let mut h = harness_with(FakeFactory::rejecting_offers);

    h.connection.handle_text(&offer("v=0")).await.unwrap();

    assert!(drain(&mut h.rx).is_empty());
    let session = h.ctx.registry.lookup(h.connection.id()).await.unwrap();
    assert_eq!(session.state(), SessionState::Negotiating);

    h.connection.close().await;
    assert!(h.ctx.registry.is_empty().await);
}

#[tokio::test]
async fn test_factory_failure_creates_nothing() {
    let mut h = harness_with(FakeFactory::failing);

    h.connection.handle_text(&offer("v=0")).await.unwrap();

    assert!(h.ctx.registry.is_empty().await);
    assert!(drain(&mut h.rx).is_empty());
}

#[tokio::test]
async fn test_offer_after_disconnect_is_discarded() {
    let h = harness();
    drop(h.rx);

    h.connection.handle_text(&offer("v=0")).await.unwrap();

    assert!(h.ctx.registry.is_empty().await);
    assert_eq!(snapshot(&h.events), vec!["close"]);
}

#[tokio::test]
async fn test_server_shutdown_cancels_session() {
    let h = harness();
    h.connection.handle_text(&offer("v=0")).await.unwrap();
    let session = h.ctx.registry.lookup(h.connection.id()).await.unwrap();

    h.ctx.shutdown.cancel();

    assert!(session.cancel_token().is_cancelled());
}

#[tokio::test]
async fn test_odd_data_keeps_live_session() {
    let h = harness();
    h.connection.handle_text(&offer("v=0")).await.unwrap();

    for text in [
        r#"{"type":"ping","data":{"x":1}}"#,
        r#"{"type":"ice-candidate","data":{"candidate":"c"}}"#,
        r#"{"type":"offer","data":{"type":"offer","sdp":"v=0"}}"#,
    ] {
        let err = h.connection.handle_text(text).await.unwrap_err();
        assert!(!err.is_fatal(), "{} closed the connection", text);
    }

    let session = h.ctx.registry.lookup(h.connection.id()).await.unwrap();
    assert!(!session.is_closing());
    assert_eq!(h.factory.created(), 1);
}
