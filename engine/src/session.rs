//! Per-turn stream session state machine.
//!
//! ```text
//! Idle ──mark_sending──► Sending ──Opened/Chunk──► Streaming
//!                           │                         │
//!                           └───────┬─────────────────┘
//!                                   ▼
//!                      Completed(Done | ClosedEarly)
//!                      Failed(Transport | Application)
//! ```
//!
//! `apply` is pure with respect to I/O: it consumes one [`StreamEvent`] and says what
//! the view should do next. Terminal phases are absorbing.

use ragchat_types::{StreamEvent, TransportError};
use uuid::Uuid;

/// How a successful session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The server sent `done`.
    Done,
    /// The body ended without `done`; partial content is kept.
    ClosedEarly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    Transport(TransportError),
    /// Error reported by the server inside the stream.
    Application(String),
}

impl SessionFailure {
    /// Text shown in place of the assistant's answer.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            SessionFailure::Transport(e) => format!("Connection error: {e}"),
            SessionFailure::Application(message) => format!("Error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Sending,
    Streaming,
    Completed(Completion),
    Failed(SessionFailure),
}

impl SessionPhase {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Completed(_) | SessionPhase::Failed(_))
    }
}

/// Coarse session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Open,
    Closed,
    Failed,
}

/// Result of applying one event.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionStep<'a> {
    /// Nothing for the view to do.
    Unchanged,
    /// Re-render with the full accumulated text.
    Render(&'a str),
    Completed(Completion),
    Failed(SessionFailure),
}

#[derive(Debug)]
pub struct StreamSession {
    request_id: Uuid,
    accumulated: String,
    phase: SessionPhase,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            accumulated: String::new(),
            phase: SessionPhase::Idle,
        }
    }

    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    #[must_use]
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    #[must_use]
    pub const fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        match self.phase {
            SessionPhase::Idle | SessionPhase::Sending | SessionPhase::Streaming => {
                SessionStatus::Open
            }
            SessionPhase::Completed(_) => SessionStatus::Closed,
            SessionPhase::Failed(_) => SessionStatus::Failed,
        }
    }

    /// `Idle → Sending`. No-op from any other phase.
    pub fn mark_sending(&mut self) {
        if self.phase == SessionPhase::Idle {
            self.phase = SessionPhase::Sending;
        } else {
            tracing::debug!(request_id = %self.request_id, phase = ?self.phase, "mark_sending ignored");
        }
    }

    pub fn apply(&mut self, event: StreamEvent) -> SessionStep<'_> {
        if self.phase.is_terminal() {
            tracing::debug!(
                request_id = %self.request_id,
                ?event,
                "Ignoring stream event after terminal phase"
            );
            return SessionStep::Unchanged;
        }

        match event {
            StreamEvent::Opened => {
                if matches!(self.phase, SessionPhase::Idle | SessionPhase::Sending) {
                    self.phase = SessionPhase::Streaming;
                }
                SessionStep::Unchanged
            }
            StreamEvent::Chunk(text) => {
                self.phase = SessionPhase::Streaming;
                self.accumulated.push_str(&text);
                SessionStep::Render(&self.accumulated)
            }
            StreamEvent::Done => self.complete(Completion::Done),
            StreamEvent::Closed => self.complete(Completion::ClosedEarly),
            StreamEvent::Error(message) => self.fail(SessionFailure::Application(message)),
            StreamEvent::Failed(error) => self.fail(SessionFailure::Transport(error)),
        }
    }

    fn complete(&mut self, completion: Completion) -> SessionStep<'_> {
        self.phase = SessionPhase::Completed(completion);
        SessionStep::Completed(completion)
    }

    fn fail(&mut self, failure: SessionFailure) -> SessionStep<'_> {
        self.phase = SessionPhase::Failed(failure.clone());
        SessionStep::Failed(failure)
    }
}
