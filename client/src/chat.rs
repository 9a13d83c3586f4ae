//! Streamed chat requests.
//!
//! [`RagClient::stream_chat`] posts one message and forwards the decoded event stream
//! to a channel. Exactly one terminal [`StreamEvent`] is sent last, unless the
//! receiver goes away first. Nothing is retried: one submission is one attempt.

use std::fmt::Display;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use ragchat_types::{ChatAction, StreamEvent, TransportError};
use tokio::sync::mpsc;

use crate::framing::{Frame, LineBuffer, decode_line};
use crate::{RagClient, read_capped_body};

/// One outgoing chat turn.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    pub action: Option<ChatAction>,
}

impl<'a> ChatRequest<'a> {
    #[must_use]
    pub const fn new(message: &'a str) -> Self {
        Self {
            message,
            action: None,
        }
    }

    #[must_use]
    pub const fn with_action(mut self, action: ChatAction) -> Self {
        self.action = Some(action);
        self
    }

    fn form(&self) -> Vec<(&'static str, &'a str)> {
        let mut form = vec![("message", self.message)];
        if let Some(action) = self.action {
            form.push(("action", action.as_str()));
        }
        form
    }
}

pub(crate) async fn send_event(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    tx.send(event).await.is_ok()
}

impl RagClient {
    /// Send `request` and stream its answer into `tx`.
    pub async fn stream_chat(&self, request: ChatRequest<'_>, tx: &mpsc::Sender<StreamEvent>) {
        let response = match self
            .http
            .post(self.endpoints.chat.clone())
            .form(&request.form())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%e, "Chat request failed");
                let _ = send_event(tx, StreamEvent::Failed(TransportError::Request(e.to_string())))
                    .await;
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = read_capped_body(response).await;
            tracing::warn!(status = status.as_u16(), "Chat request rejected");
            let _ = send_event(
                tx,
                StreamEvent::Failed(TransportError::Status {
                    status: status.as_u16(),
                    body,
                }),
            )
            .await;
            return;
        }

        if !send_event(tx, StreamEvent::Opened).await {
            return;
        }
        consume_event_stream(response.bytes_stream(), tx, self.stream_idle_timeout).await;
    }
}

/// Decode an event-stream body and forward its events.
///
/// Stops reading at the first `done` or `error` frame even if the body continues.
/// Malformed frames are logged and skipped. A body that ends without `done` yields
/// [`StreamEvent::Closed`].
pub async fn consume_event_stream<S, B, E>(
    stream: S,
    tx: &mpsc::Sender<StreamEvent>,
    idle_timeout: Duration,
) where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut buffer = LineBuffer::new();
    let mut chunks = 0usize;

    loop {
        let Ok(next) = tokio::time::timeout(idle_timeout, stream.next()).await else {
            tracing::warn!(chunks, "Chat stream idle timeout");
            let _ = send_event(
                tx,
                StreamEvent::Failed(TransportError::IdleTimeout(idle_timeout.as_secs())),
            )
            .await;
            return;
        };

        let Some(read) = next else { break };
        let bytes = match read {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%e, chunks, "Chat stream read failed");
                let _ = send_event(tx, StreamEvent::Failed(TransportError::Read(e.to_string())))
                    .await;
                return;
            }
        };

        let lines = match buffer.push(bytes.as_ref()) {
            Ok(lines) => lines,
            Err(e) => {
                let _ = send_event(
                    tx,
                    StreamEvent::Failed(TransportError::LineTooLong { limit: e.limit }),
                )
                .await;
                return;
            }
        };

        for line in lines {
            let frame = match decode_line(&line) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(%e, "Skipping malformed chat event");
                    continue;
                }
            };

            match frame {
                Frame::Chunk(text) => {
                    chunks += 1;
                    if !send_event(tx, StreamEvent::Chunk(text)).await {
                        return;
                    }
                }
                Frame::Error(message) => {
                    tracing::debug!(chunks, "Chat stream reported an error");
                    let _ = send_event(tx, StreamEvent::Error(message)).await;
                    return;
                }
                Frame::Done => {
                    tracing::debug!(chunks, "Chat stream completed");
                    let _ = send_event(tx, StreamEvent::Done).await;
                    return;
                }
                Frame::Unrecognized => {}
            }
        }
    }

    if !buffer.remainder().is_empty() {
        tracing::debug!(
            bytes = buffer.remainder().len(),
            "Discarding unterminated trailing line"
        );
    }
    tracing::debug!(chunks, "Chat stream closed without completion");
    let _ = send_event(tx, StreamEvent::Closed).await;
}
