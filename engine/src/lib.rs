//! Core engine for ragchat - conversation state machine and orchestration.
//!
//! [`App`] owns every piece of client state: the conversation view, the single
//! in-flight stream session, the context mode tracker, and the upload coordinator.
//! It is driven from one task; network work happens on spawned tasks that report
//! back over channels.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

pub use ragchat_client::{self, ClientBuildError, ClientConfig, RagClient};
pub use ragchat_types::{
    ChatAction, ContextIndicator, ContextMode, EmptyStringError, FileDescriptor, NonEmptyString,
    RenderState, Role, StreamEvent, TransportError, sanitize_terminal_text,
};

mod config;
pub use config::{
    ChatConfig, ConfigError, ContextConfig, DEFAULT_BASE_URL, MAX_TIMING_SECS, RagChatConfig,
    SERVER_URL_ENV,
    STREAM_IDLE_TIMEOUT_ENV, ServerConfig, Settings, UploadConfig, config_path,
    expand_env_vars_with,
};

pub mod context_mode;
pub mod conversation;
pub mod render;
pub mod session;
pub mod upload;

pub use context_mode::{ContextModeTracker, ContextSnapshot, RefreshHandle};
pub use conversation::{ConversationView, EntryHandle, MessageEntry, ViewError};
pub use session::{Completion, SessionFailure, SessionPhase, SessionStatus, StreamSession};
pub use upload::{
    FileSelection, StatusKind, StatusMessage, UploadCoordinator, UploadError, UploadOutcome,
};

use session::SessionStep;

/// Bounded so a stalled shell applies backpressure to the reader task.
const STREAM_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum stream events applied per `process_stream_events` call.
const DEFAULT_STREAM_EVENT_BUDGET: usize = 512;

// ============================================================================
// Operation state
// ============================================================================

/// The chat turn currently streaming. Existence proves submission is gated.
#[derive(Debug)]
pub struct ActiveStream {
    session: StreamSession,
    entry: EntryHandle,
    receiver: mpsc::Receiver<StreamEvent>,
    task: JoinHandle<()>,
}

impl ActiveStream {
    #[must_use]
    pub const fn entry(&self) -> EntryHandle {
        self.entry
    }
}

#[derive(Debug, Default)]
pub enum OperationState {
    #[default]
    Idle,
    Streaming(ActiveStream),
}

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A turn started; the handle is the assistant entry being filled.
    Started(EntryHandle),
    /// Empty or whitespace-only input; nothing happened.
    Ignored,
    /// A response is still streaming.
    Busy,
}

/// How a chat turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed {
        entry: EntryHandle,
        completion: Completion,
    },
    Failed {
        entry: EntryHandle,
        failure: SessionFailure,
    },
}

impl TurnOutcome {
    #[must_use]
    pub const fn entry(&self) -> EntryHandle {
        match self {
            TurnOutcome::Completed { entry, .. } | TurnOutcome::Failed { entry, .. } => *entry,
        }
    }
}

/// Everything that settled during one [`App::tick`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub turn: Option<TurnOutcome>,
    pub upload: Option<UploadOutcome>,
    pub status_expired: bool,
}

// ============================================================================
// App
// ============================================================================

#[derive(Debug)]
pub struct App {
    client: RagClient,
    conversation: ConversationView,
    state: OperationState,
    context: ContextModeTracker,
    uploads: UploadCoordinator,
}

impl App {
    pub fn new(settings: &Settings) -> Result<Self, ClientBuildError> {
        let client = RagClient::new(
            ClientConfig::new(settings.base_url.clone())
                .with_stream_idle_timeout(settings.stream_idle_timeout),
        )?;
        let context = ContextModeTracker::new(client.clone(), settings.poll_interval);
        let uploads = UploadCoordinator::new(
            client.clone(),
            context.refresh_handle(),
            settings.success_clear,
        );

        Ok(Self {
            client,
            conversation: ConversationView::new(),
            state: OperationState::Idle,
            context,
            uploads,
        })
    }

    /// Start background polling. Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        self.context.start();
    }

    /// Stop polling and abandon any in-flight stream.
    pub fn shutdown(&mut self) {
        self.context.stop();
        if let OperationState::Streaming(active) = std::mem::take(&mut self.state) {
            tracing::debug!(request_id = %active.session.request_id(), "Aborting stream on shutdown");
            active.task.abort();
        }
    }

    fn busy_reason(&self) -> Option<&'static str> {
        match self.state {
            OperationState::Idle => None,
            OperationState::Streaming(_) => Some("a response is still streaming"),
        }
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self.state, OperationState::Streaming(_))
    }

    #[must_use]
    pub fn active_stream(&self) -> Option<&ActiveStream> {
        match &self.state {
            OperationState::Streaming(active) => Some(active),
            OperationState::Idle => None,
        }
    }

    // ------------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------------

    /// Submit user text as a new chat turn.
    pub fn submit(&mut self, text: &str) -> SubmitOutcome {
        let Ok(message) = NonEmptyString::trimmed(text) else {
            return SubmitOutcome::Ignored;
        };
        self.start_turn(message, None)
    }

    /// Submit a quick action. `topic` replaces the action's default prompt when given.
    pub fn submit_action(&mut self, action: ChatAction, topic: Option<&str>) -> SubmitOutcome {
        let message = topic
            .and_then(|topic| NonEmptyString::trimmed(topic).ok())
            .or_else(|| NonEmptyString::new(action.default_prompt()).ok());
        let Some(message) = message else {
            return SubmitOutcome::Ignored;
        };
        self.start_turn(message, Some(action))
    }

    fn start_turn(&mut self, message: NonEmptyString, action: Option<ChatAction>) -> SubmitOutcome {
        if let Some(reason) = self.busy_reason() {
            tracing::debug!(reason, "Submission rejected");
            return SubmitOutcome::Busy;
        }

        self.conversation.append_entry(Role::User, message.as_str());
        let entry = self.conversation.begin_response();

        let mut session = StreamSession::new();
        session.mark_sending();
        let request_id = session.request_id();
        tracing::debug!(%request_id, ?action, "Starting chat turn");

        let (tx, receiver) = mpsc::channel(STREAM_EVENT_CHANNEL_CAPACITY);
        let client = self.client.clone();
        let task = tokio::spawn(
            async move {
                let mut request = ragchat_client::ChatRequest::new(message.as_str());
                if let Some(action) = action {
                    request = request.with_action(action);
                }
                client.stream_chat(request, &tx).await;
            }
            .instrument(tracing::debug_span!("chat_stream", %request_id)),
        );

        self.state = OperationState::Streaming(ActiveStream {
            session,
            entry,
            receiver,
            task,
        });
        SubmitOutcome::Started(entry)
    }

    /// Apply whatever stream events are queued, without waiting.
    pub fn process_stream_events(&mut self) -> Option<TurnOutcome> {
        for _ in 0..DEFAULT_STREAM_EVENT_BUDGET {
            let OperationState::Streaming(active) = &mut self.state else {
                return None;
            };
            let event = match active.receiver.try_recv() {
                Ok(event) => event,
                Err(mpsc::error::TryRecvError::Empty) => return None,
                Err(mpsc::error::TryRecvError::Disconnected) => disconnected_event(),
            };
            if let Some(outcome) = self.handle_stream_event(event) {
                return Some(outcome);
            }
        }
        None
    }

    /// Wait until the current turn ends. Returns `None` if nothing is streaming.
    pub async fn wait_for_turn(&mut self) -> Option<TurnOutcome> {
        loop {
            let OperationState::Streaming(active) = &mut self.state else {
                return None;
            };
            let event = active.receiver.recv().await.unwrap_or_else(disconnected_event);
            if let Some(outcome) = self.handle_stream_event(event) {
                return Some(outcome);
            }
        }
    }

    fn handle_stream_event(&mut self, event: StreamEvent) -> Option<TurnOutcome> {
        let OperationState::Streaming(active) = &mut self.state else {
            return None;
        };
        let entry = active.entry;
        let request_id = active.session.request_id();

        let outcome = match active.session.apply(event) {
            SessionStep::Unchanged => return None,
            SessionStep::Render(text) => {
                if let Err(e) = self.conversation.update_streaming(entry, text) {
                    tracing::warn!(%request_id, %e, "Dropped streaming update");
                }
                return None;
            }
            SessionStep::Completed(completion) => {
                if let Err(e) = self.conversation.finalize(entry) {
                    tracing::warn!(%request_id, %e, "Could not finalize response entry");
                }
                if completion == Completion::ClosedEarly {
                    tracing::warn!(%request_id, "Chat stream closed without a completion signal");
                }
                TurnOutcome::Completed { entry, completion }
            }
            SessionStep::Failed(failure) => {
                if let Err(e) = self.conversation.fail(entry, &failure.display_message()) {
                    tracing::warn!(%request_id, %e, "Could not mark response entry failed");
                }
                TurnOutcome::Failed { entry, failure }
            }
        };

        tracing::info!(
            %request_id,
            chars = active.session.accumulated().len(),
            phase = ?active.session.phase(),
            "Chat turn ended"
        );
        self.state = OperationState::Idle;
        Some(outcome)
    }

    // ------------------------------------------------------------------------
    // Uploads and context mode
    // ------------------------------------------------------------------------

    pub fn select_file(&mut self, path: impl Into<PathBuf>) {
        self.uploads.select(FileSelection::new(path));
    }

    /// Upload the selected file in the background.
    pub fn start_upload(&mut self) -> Result<(), UploadError> {
        self.uploads.start()
    }

    pub async fn wait_for_upload(&mut self) -> Option<UploadOutcome> {
        self.uploads.wait().await
    }

    #[must_use]
    pub fn is_uploading(&self) -> bool {
        self.uploads.is_uploading()
    }

    #[must_use]
    pub fn upload_status(&self) -> Option<&StatusMessage> {
        self.uploads.status()
    }

    #[must_use]
    pub fn context_indicator(&self) -> ContextIndicator {
        self.context.indicator()
    }

    #[must_use]
    pub fn files(&self) -> Vec<FileDescriptor> {
        self.context.files()
    }

    /// Refresh the context indicator now, bypassing the poll interval.
    pub async fn refresh_context(&self) -> ContextIndicator {
        self.context.refresh().await
    }

    #[must_use]
    pub fn context(&self) -> &ContextModeTracker {
        &self.context
    }

    #[must_use]
    pub fn conversation(&self) -> &ConversationView {
        &self.conversation
    }

    // ------------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------------

    /// Advance everything that can settle without waiting.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        TickReport {
            turn: self.process_stream_events(),
            upload: self.uploads.poll(now),
            status_expired: self.uploads.expire_status(now),
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn disconnected_event() -> StreamEvent {
    tracing::warn!("Stream channel disconnected");
    StreamEvent::Failed(TransportError::Read(
        "stream task ended before completion".to_string(),
    ))
}
