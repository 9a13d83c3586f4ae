//! End-to-end chat streaming: framing, cumulative rendering, terminal states.

use std::convert::Infallible;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use ragchat_client::consume_event_stream;
use ragchat_engine::session::SessionStep;
use ragchat_engine::{Completion, RenderState, StreamSession, SubmitOutcome, TurnOutcome};
use ragchat_types::StreamEvent;
use tokio::sync::mpsc;
use wiremock::MockServer;

use crate::common::{app_for, mount_answer, mount_chat, sse_response, within};

const BODY: &str = concat!(
    ": keep-alive\n",
    "data: {\"chunk\":\"Héllo\"}\r\n",
    "\n",
    "event: message\n",
    "data: {\"chunk\":\", wörld\"}\n",
    "data: {not json}\n",
    "data:{\"chunk\":\"!\"}\n",
    "data: {\"done\":true}\n",
    "data: {\"chunk\":\"after done\"}\n",
);

async fn events_for(pieces: Vec<Vec<u8>>) -> Vec<StreamEvent> {
    let (tx, mut rx) = mpsc::channel(64);
    let body = stream::iter(pieces.into_iter().map(Ok::<_, Infallible>));
    consume_event_stream(body, &tx, Duration::from_secs(5)).await;
    drop(tx);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn events_are_independent_of_read_boundaries() {
    let bytes = BODY.as_bytes();
    let whole = events_for(vec![bytes.to_vec()]).await;
    assert_eq!(
        whole,
        vec![
            StreamEvent::Chunk("Héllo".to_string()),
            StreamEvent::Chunk(", wörld".to_string()),
            StreamEvent::Chunk("!".to_string()),
            StreamEvent::Done,
        ]
    );

    for split in 1..bytes.len() {
        let pieces = vec![bytes[..split].to_vec(), bytes[split..].to_vec()];
        assert_eq!(events_for(pieces).await, whole, "split at byte {split}");
    }

    let bytewise = bytes.iter().map(|b| vec![*b]).collect();
    assert_eq!(events_for(bytewise).await, whole);
}

#[tokio::test]
async fn done_stops_reading_an_open_stream() {
    let (tx, mut rx) = mpsc::channel(8);
    let body = stream::iter([Ok::<_, Infallible>(b"data: {\"done\":true}\n".to_vec())])
        .chain(stream::pending());

    within(consume_event_stream(body, &tx, Duration::from_secs(3600))).await;
    assert_eq!(rx.recv().await, Some(StreamEvent::Done));
}

#[test]
fn renderer_receives_cumulative_text() {
    let mut session = StreamSession::new();
    session.mark_sending();

    let mut seen = Vec::new();
    for chunk in ["Hel", "lo"] {
        if let SessionStep::Render(text) = session.apply(StreamEvent::Chunk(chunk.to_string())) {
            seen.push(text.to_string());
        }
    }
    assert_eq!(seen, vec!["Hel", "Hello"]);
}

#[tokio::test]
async fn hi_there_turn_ends_once_with_formatted_content() {
    let server = MockServer::start().await;
    mount_answer(&server, &["Hi", " there"]).await;
    let mut app = app_for(&server);

    let SubmitOutcome::Started(entry) = app.submit("hello") else {
        panic!("turn should start");
    };
    let outcome = within(app.wait_for_turn()).await;
    assert_eq!(
        outcome,
        Some(TurnOutcome::Completed {
            entry,
            completion: Completion::Done
        })
    );
    assert_eq!(app.wait_for_turn().await, None);

    let response = app.conversation().get(entry).unwrap();
    assert_eq!(response.content(), "Hi there");
    assert_eq!(response.markup(), "Hi there");
    assert_eq!(response.render_state(), RenderState::Final);
}

#[tokio::test]
async fn premature_close_is_not_an_error() {
    let server = MockServer::start().await;
    mount_chat(
        &server,
        sse_response(&[serde_json::json!({ "chunk": "partial" })]),
    )
    .await;
    let mut app = app_for(&server);

    app.submit("hello");
    let outcome = within(app.wait_for_turn()).await.unwrap();
    assert!(matches!(
        outcome,
        TurnOutcome::Completed {
            completion: Completion::ClosedEarly,
            ..
        }
    ));
    let response = app.conversation().get(outcome.entry()).unwrap();
    assert_eq!(response.content(), "partial");
    assert_eq!(response.render_state(), RenderState::Final);
}

#[tokio::test]
async fn model_output_is_escaped_before_formatting() {
    let server = MockServer::start().await;
    mount_answer(&server, &["<script>**bold**</script>"]).await;
    let mut app = app_for(&server);

    app.submit("hello");
    let outcome = within(app.wait_for_turn()).await.unwrap();
    assert_eq!(
        app.conversation().get(outcome.entry()).unwrap().markup(),
        "&lt;script&gt;<strong>bold</strong>&lt;/script&gt;"
    );
}
