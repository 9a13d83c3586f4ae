//! Upload coordination through the app shell.

use ragchat_engine::{ContextIndicator, ContextMode, StatusKind, UploadError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{app_for, mount_files, mount_upload_success, within};

#[tokio::test]
async fn upload_without_selection_never_reaches_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let mut app = app_for(&server);

    assert!(matches!(app.start_upload(), Err(UploadError::Validation(_))));
    assert_eq!(app.upload_status().unwrap().kind, StatusKind::Error);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn successful_upload_switches_to_document_mode() {
    let server = MockServer::start().await;
    mount_upload_success(&server).await;
    mount_files(&server, &["syllabus.pdf"]).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("syllabus.pdf");
    std::fs::write(&file, b"%PDF-1.4").unwrap();

    let mut app = app_for(&server);
    let mut updates = app.context().subscribe();
    app.start();
    within(updates.changed()).await.unwrap();

    app.select_file(&file);
    app.start_upload().unwrap();
    let outcome = within(app.wait_for_upload()).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.message, "File uploaded and processed successfully");
    assert_eq!(app.upload_status().unwrap().kind, StatusKind::Success);

    within(updates.changed()).await.unwrap();
    assert_eq!(
        app.context_indicator(),
        ContextIndicator::Known(ContextMode::Augmented { count: 1 })
    );
    let uploads = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.url.path() == "/upload")
        .count();
    assert_eq!(uploads, 1);
}

#[tokio::test]
async fn server_detail_is_shown_on_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({ "detail": "File type .pdf not supported" })),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("report.pdf");
    std::fs::write(&file, b"%PDF").unwrap();

    let mut app = app_for(&server);
    app.select_file(&file);
    app.start_upload().unwrap();
    let outcome = within(app.wait_for_upload()).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.message, "File type .pdf not supported");
    assert_eq!(app.upload_status().unwrap().text, "File type .pdf not supported");
}
