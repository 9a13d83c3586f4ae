//! Context mode derivation from the server's file listing.

use ragchat_engine::{ContextIndicator, ContextMode};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{app_for, mount_files};

#[tokio::test]
async fn no_files_means_direct_mode() {
    let server = MockServer::start().await;
    mount_files(&server, &[]).await;
    let app = app_for(&server);

    let indicator = app.refresh_context().await;
    assert_eq!(indicator, ContextIndicator::Known(ContextMode::Direct));
    assert_eq!(indicator.label(), "Direct mode: no documents uploaded");
}

#[tokio::test]
async fn three_files_means_augmented_mode() {
    let server = MockServer::start().await;
    mount_files(&server, &["a.pdf", "b.docx", "c.md"]).await;
    let app = app_for(&server);

    assert_eq!(
        app.refresh_context().await,
        ContextIndicator::Known(ContextMode::Augmented { count: 3 })
    );
    assert_eq!(app.files().len(), 3);
}

#[tokio::test]
async fn listing_failure_is_advisory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let app = app_for(&server);

    assert_eq!(app.refresh_context().await, ContextIndicator::Unknown);
    assert_eq!(app.context_indicator().label(), "Checking documents...");
}

#[tokio::test]
async fn unreachable_server_keeps_neutral_indicator() {
    let server = MockServer::start().await;
    let app = app_for(&server);
    drop(server);

    assert_eq!(app.refresh_context().await, ContextIndicator::Unknown);
}
