//! One chat turn at a time; uploads may overlap with a turn.

use std::time::Duration;

use ragchat_engine::{ChatAction, RenderState, Role, SubmitOutcome};
use wiremock::MockServer;

use crate::common::{app_for, mount_chat, sse_response, within};

#[tokio::test]
async fn second_submission_is_rejected_until_turn_ends() {
    let server = MockServer::start().await;
    mount_chat(
        &server,
        sse_response(&[
            serde_json::json!({ "chunk": "one" }),
            serde_json::json!({ "done": true }),
        ])
        .set_delay(Duration::from_millis(300)),
    )
    .await;
    let mut app = app_for(&server);

    let SubmitOutcome::Started(first) = app.submit("first question") else {
        panic!("first turn should start");
    };
    assert_eq!(app.submit("second question"), SubmitOutcome::Busy);
    assert_eq!(
        app.submit_action(ChatAction::Explain, Some("vectors")),
        SubmitOutcome::Busy
    );

    let roles: Vec<_> = app.conversation().entries().iter().map(|e| e.role()).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
    assert_eq!(
        app.conversation().get(first).unwrap().render_state(),
        RenderState::Pending
    );

    within(app.wait_for_turn()).await.unwrap();
    assert!(!app.is_streaming());

    assert!(matches!(app.submit("second question"), SubmitOutcome::Started(_)));
    within(app.wait_for_turn()).await.unwrap();
    assert_eq!(app.conversation().len(), 4);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn failed_turn_releases_the_gate() {
    let server = MockServer::start().await;
    mount_chat(
        &server,
        wiremock::ResponseTemplate::new(503).set_body_string("overloaded"),
    )
    .await;
    let mut app = app_for(&server);

    app.submit("hello");
    within(app.wait_for_turn()).await.unwrap();
    assert!(!app.is_streaming());
    assert!(matches!(app.submit("again"), SubmitOutcome::Started(_)));
    within(app.wait_for_turn()).await.unwrap();

    // No automatic retry: one request per submission.
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}
