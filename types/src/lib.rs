//! Core domain types for ragchat.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! The client, engine, and terminal front end all speak in these types.

mod sanitize;
pub use sanitize::sanitize_terminal_text;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// NonEmpty String Types
// ============================================================================

/// A string guaranteed to be non-empty (after trimming).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyString(String);

#[derive(Debug, Error)]
#[error("message content must not be empty")]
pub struct EmptyStringError;

impl NonEmptyString {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyStringError)
        } else {
            Ok(Self(value))
        }
    }

    /// Trim surrounding whitespace, rejecting input that is blank.
    pub fn trimmed(value: &str) -> Result<Self, EmptyStringError> {
        Self::new(value.trim())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for NonEmptyString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for NonEmptyString {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

// ============================================================================
// Conversation Types
// ============================================================================

/// Who authored a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Display lifecycle of a conversation entry.
///
/// `Pending` and `Streaming` are live; `Final` and `Errored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderState {
    /// Waiting for the first content or terminal event.
    #[default]
    Pending,
    Streaming,
    Final,
    Errored,
}

impl RenderState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, RenderState::Final | RenderState::Errored)
    }
}

/// Prompt template selector understood by the chat endpoint.
///
/// Sent as the optional `action` form field alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatAction {
    Summarize,
    SuggestProjects,
    Explain,
}

impl ChatAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ChatAction::Summarize => "summarize",
            ChatAction::SuggestProjects => "suggest_projects",
            ChatAction::Explain => "explain",
        }
    }

    /// Default message text sent with the action when the user typed none.
    #[must_use]
    pub const fn default_prompt(self) -> &'static str {
        match self {
            ChatAction::Summarize => "Summarize the uploaded documents.",
            ChatAction::SuggestProjects => "Suggest projects based on the uploaded documents.",
            ChatAction::Explain => "Explain the key concepts in the uploaded documents.",
        }
    }
}

// ============================================================================
// Context Mode
// ============================================================================

/// Answer mode derived from the number of uploaded documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextMode {
    /// No documents; answers come from the model alone.
    Direct,
    /// Answers are grounded in `count` uploaded documents (`count >= 1`).
    Augmented { count: usize },
}

impl ContextMode {
    #[must_use]
    pub const fn from_file_count(count: usize) -> Self {
        if count == 0 {
            ContextMode::Direct
        } else {
            ContextMode::Augmented { count }
        }
    }

    #[must_use]
    pub const fn file_count(self) -> usize {
        match self {
            ContextMode::Direct => 0,
            ContextMode::Augmented { count } => count,
        }
    }

    #[must_use]
    pub fn label(self) -> String {
        match self {
            ContextMode::Direct => "Direct mode: no documents uploaded".to_string(),
            ContextMode::Augmented { count: 1 } => "Document mode: 1 document".to_string(),
            ContextMode::Augmented { count } => format!("Document mode: {count} documents"),
        }
    }
}

/// What the mode indicator currently shows.
///
/// Starts `Unknown` and only ever moves to `Known`; a failed refresh never
/// moves it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContextIndicator {
    #[default]
    Unknown,
    Known(ContextMode),
}

impl ContextIndicator {
    #[must_use]
    pub const fn mode(self) -> Option<ContextMode> {
        match self {
            ContextIndicator::Unknown => None,
            ContextIndicator::Known(mode) => Some(mode),
        }
    }

    #[must_use]
    pub fn label(self) -> String {
        match self {
            ContextIndicator::Unknown => "Checking documents...".to_string(),
            ContextIndicator::Known(mode) => mode.label(),
        }
    }
}

/// One entry of the server's uploaded-file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub filename: String,
    #[serde(default)]
    pub id: Option<String>,
}

// ============================================================================
// Stream Events
// ============================================================================

/// Failure of the HTTP exchange itself, as opposed to an error reported by the server
/// inside a healthy event stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("connection lost while reading the response: {0}")]
    Read(String),
    #[error("no data received for {0} seconds")]
    IdleTimeout(u64),
    #[error("event line exceeded the {limit} byte buffer limit")]
    LineTooLong { limit: usize },
}

/// Events produced while consuming one chat response stream.
///
/// A well-behaved producer emits at most one `Opened`, any number of `Chunk`s, and
/// exactly one terminal event (`Done`, `Error`, `Failed`, or `Closed`) last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Response headers arrived with a success status.
    Opened,
    /// A partial answer fragment (delta, not cumulative).
    Chunk(String),
    /// The server signalled completion.
    Done,
    /// The server reported an error inside the stream.
    Error(String),
    /// The transport failed; no further events follow.
    Failed(TransportError),
    /// The body ended without a completion signal.
    Closed,
}

impl StreamEvent {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Done | StreamEvent::Error(_) | StreamEvent::Failed(_) | StreamEvent::Closed
        )
    }
}
