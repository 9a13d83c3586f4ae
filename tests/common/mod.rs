//! Shared test utilities and fixtures
//!
//! Mock assistant server endpoints and settings for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use ragchat_engine::{App, Settings};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Build an SSE body from `data:` payloads, one event per payload.
pub fn sse_body(payloads: &[serde_json::Value]) -> String {
    let mut body = String::new();
    for payload in payloads {
        body.push_str(&format!("data: {payload}\n\n"));
    }
    body
}

pub fn sse_response(payloads: &[serde_json::Value]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(sse_body(payloads))
}

/// Mount a streamed answer made of `chunks` followed by `done`.
pub async fn mount_answer(server: &MockServer, chunks: &[&str]) {
    let mut payloads: Vec<_> = chunks
        .iter()
        .map(|chunk| serde_json::json!({ "chunk": chunk }))
        .collect();
    payloads.push(serde_json::json!({ "done": true }));
    mount_chat(server, sse_response(&payloads)).await;
}

pub async fn mount_chat(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Mount a file listing with the given filenames.
pub async fn mount_files(server: &MockServer, names: &[&str]) {
    let files: Vec<_> = names
        .iter()
        .map(|name| serde_json::json!({ "filename": name }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": files })))
        .mount(server)
        .await;
}

pub async fn mount_upload_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "message": "File uploaded and processed successfully"
        })))
        .mount(server)
        .await;
}

pub fn settings_for(server: &MockServer) -> Settings {
    Settings {
        base_url: server.uri().parse().expect("mock server URI"),
        stream_idle_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_secs(3600),
        success_clear: Duration::from_secs(3),
    }
}

pub fn app_for(server: &MockServer) -> App {
    App::new(&settings_for(server)).expect("client builds for mock server")
}

/// Bound any await in a test so a hang fails instead of stalling the run.
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("operation finished in time")
}
