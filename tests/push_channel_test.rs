mod common;

use std::sync::Arc;
use std::time::Duration;

use httpmock::Method::GET;
use httpmock::MockServer;
use notification_sync::channel::sse::SseDecoder;
use notification_sync::{EventChannel, PushEvent, ReconnectConfig, SseTransport};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;

use common::sse_frame;

fn slow_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        base_delay_ms: 2_000,
        max_delay_ms: 2_000,
        max_attempts: None,
    }
}

fn forward_to(tx: mpsc::UnboundedSender<PushEvent>) -> impl Fn(&PushEvent) + Send + Sync + 'static {
    move |event| {
        let _ = tx.send(event.clone());
    }
}

#[tokio::test]
async fn sse_events_reach_subscribers_by_name() {
    let server = MockServer::start();
    let body = format!(
        ": keep-alive\n\n{}{}",
        sse_frame("CREATE_GAME", "evt-1", &json!({ "gameId": 3 })),
        sse_frame("GENERATE_QUIZ_SUCCESS", "evt-2", &json!({ "classAssignmentId": 12 })),
    );
    let stream = server.mock(|when, then| {
        when.method(GET)
            .path("/events")
            .header("authorization", "Bearer push-token")
            .header("accept", "text/event-stream");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(body);
    });

    let transport = SseTransport::new(&server.url("/events"), Duration::from_secs(2))
        .expect("transport should build");
    let channel = EventChannel::connect(Arc::new(transport), "push-token", slow_reconnect());

    let (tx, mut rx) = mpsc::unbounded_channel();
    channel.subscribe("GENERATE_QUIZ_SUCCESS", forward_to(tx));

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event should arrive")
        .expect("channel open");
    assert_eq!(event.event_type, "GENERATE_QUIZ_SUCCESS");
    assert_eq!(event.data, json!({ "classAssignmentId": 12 }));
    assert_eq!(event.id.as_deref(), Some("evt-2"));
    assert!(stream.hits() >= 1);

    channel.teardown();
    assert!(channel.is_closed());
}

#[tokio::test]
async fn rejected_stream_is_retried_until_torn_down() {
    let server = MockServer::start();
    let rejected = server.mock(|when, then| {
        when.method(GET).path("/events");
        then.status(503).body("maintenance");
    });

    let transport = SseTransport::new(&server.url("/events"), Duration::from_secs(2))
        .expect("transport should build");
    let channel = EventChannel::connect(
        Arc::new(transport),
        "push-token",
        ReconnectConfig {
            base_delay_ms: 20,
            max_delay_ms: 20,
            max_attempts: None,
        },
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while rejected.hits() < 3 {
        assert!(tokio::time::Instant::now() < deadline, "channel stopped retrying");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(channel.stats().connects, 0);

    channel.teardown();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let hits_after_teardown = rejected.hits();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(rejected.hits(), hits_after_teardown);
}

#[tokio::test]
async fn handlers_are_silent_after_teardown() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/events");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(sse_frame("CREATE_GAME", "evt-1", &json!({})));
    });

    let transport = SseTransport::new(&server.url("/events"), Duration::from_secs(2))
        .expect("transport should build");
    let channel = EventChannel::connect(
        Arc::new(transport),
        "push-token",
        ReconnectConfig {
            base_delay_ms: 20,
            max_delay_ms: 20,
            max_attempts: None,
        },
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    channel.subscribe("CREATE_GAME", forward_to(tx));

    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("first delivery")
        .expect("channel open");

    channel.teardown();
    channel.teardown();
    while rx.try_recv().is_ok() {}

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(channel.subscriber_count(), 0);
}

#[test]
fn decoder_reassembles_frames_split_across_chunks() {
    let frame = sse_frame("EXTRACT_ISSUE_FAILED", "9", &json!({ "reason": "timeout" }));
    let (head, tail) = frame.as_bytes().split_at(frame.len() / 2);

    let mut decoder = SseDecoder::default();
    assert!(decoder.push(head).expect("within limit").is_empty());
    let events = decoder.push(tail).expect("within limit");
    assert_eq!(events.len(), 1);

    let event = PushEvent::from(events[0].clone());
    assert_eq!(event.event_type, "EXTRACT_ISSUE_FAILED");
    assert_eq!(event.data["reason"], json!("timeout"));
}
