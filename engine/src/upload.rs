//! Upload coordination: one file at a time, with an ephemeral status line.
//!
//! Success statuses clear themselves after a short delay; error and info statuses
//! stay until the next action replaces them. A successful upload asks the context
//! mode tracker for an immediate refresh.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ragchat_client::{RagClient, UploadReply};
use ragchat_types::TransportError;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::context_mode::RefreshHandle;

/// File extensions the ingestion server accepts, lowercase, without the dot.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "docx", "png", "jpg", "jpeg"];

/// Shown when the server gives no explanation.
pub const GENERIC_UPLOAD_FAILURE: &str = "Upload failed";

pub const DEFAULT_SUCCESS_TTL: Duration = Duration::from_secs(3);

/// The file the user picked for the next upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    path: PathBuf,
}

impl FileSelection {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
    /// Only success statuses expire, and only when the TTL fits in an `Instant`.
    pub expires_at: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("{0}")]
    Validation(String),
    #[error("an upload is already in progress")]
    InProgress,
}

/// Final result of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
enum UploadFailure {
    #[error("could not read {filename}: {source}")]
    Read {
        filename: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

type UploadResult = Result<UploadReply, UploadFailure>;

#[derive(Debug)]
struct PendingUpload {
    selection: FileSelection,
    filename: String,
    receiver: oneshot::Receiver<UploadResult>,
}

#[derive(Debug)]
pub struct UploadCoordinator {
    client: RagClient,
    refresh: RefreshHandle,
    success_ttl: Duration,
    selection: Option<FileSelection>,
    status: Option<StatusMessage>,
    pending: Option<PendingUpload>,
}

impl UploadCoordinator {
    #[must_use]
    pub fn new(client: RagClient, refresh: RefreshHandle, success_ttl: Duration) -> Self {
        Self {
            client,
            refresh,
            success_ttl,
            selection: None,
            status: None,
            pending: None,
        }
    }

    pub fn select(&mut self, selection: FileSelection) {
        self.selection = Some(selection);
    }

    #[must_use]
    pub fn selection(&self) -> Option<&FileSelection> {
        self.selection.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    #[must_use]
    pub fn is_uploading(&self) -> bool {
        self.pending.is_some()
    }

    /// Validate the selection and start uploading it in the background.
    ///
    /// Validation failures never touch the network. Must be called from within a
    /// tokio runtime.
    pub fn start(&mut self) -> Result<(), UploadError> {
        if self.pending.is_some() {
            return Err(UploadError::InProgress);
        }

        let Some(selection) = self.selection.clone() else {
            return Err(self.reject("Please select a file to upload"));
        };
        let Some(filename) = selection.file_name().map(str::to_string) else {
            return Err(self.reject("Selected path is not a file name"));
        };
        let extension = selection.extension();
        if !extension
            .as_deref()
            .is_some_and(|ext| ACCEPTED_EXTENSIONS.contains(&ext))
        {
            let shown = extension.map_or_else(|| "(none)".to_string(), |ext| format!(".{ext}"));
            return Err(self.reject(&format!(
                "File type {shown} is not supported. Accepted: .{}",
                ACCEPTED_EXTENSIONS.join(", .")
            )));
        }

        tracing::info!(%filename, "Starting upload");
        self.set_status(StatusKind::Info, format!("Uploading {filename}..."), None);

        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let path = selection.path().to_path_buf();
        let task_filename = filename.clone();
        tokio::spawn(async move {
            let result = run_upload(&client, &path, task_filename).await;
            let _ = tx.send(result);
        });

        self.pending = Some(PendingUpload {
            selection,
            filename,
            receiver: rx,
        });
        Ok(())
    }

    /// Collect a finished upload without waiting.
    pub fn poll(&mut self, now: Instant) -> Option<UploadOutcome> {
        let pending = self.pending.as_mut()?;
        let result = match pending.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => None,
        };
        let pending = self.pending.take()?;
        Some(self.settle(pending, result, now))
    }

    /// Wait for the in-flight upload, if any, and collect it.
    pub async fn wait(&mut self) -> Option<UploadOutcome> {
        let pending = self.pending.as_mut()?;
        let result = (&mut pending.receiver).await.ok();
        let pending = self.pending.take()?;
        Some(self.settle(pending, result, Instant::now()))
    }

    /// Drop an expired success status. Returns whether the status changed.
    pub fn expire_status(&mut self, now: Instant) -> bool {
        let expired = self
            .status
            .as_ref()
            .and_then(|status| status.expires_at)
            .is_some_and(|at| now >= at);
        if expired {
            self.status = None;
        }
        expired
    }

    fn reject(&mut self, message: &str) -> UploadError {
        self.set_status(StatusKind::Error, message.to_string(), None);
        UploadError::Validation(message.to_string())
    }

    fn set_status(&mut self, kind: StatusKind, text: String, expires_at: Option<Instant>) {
        self.status = Some(StatusMessage {
            kind,
            text,
            expires_at,
        });
    }

    fn settle(
        &mut self,
        pending: PendingUpload,
        result: Option<UploadResult>,
        now: Instant,
    ) -> UploadOutcome {
        let PendingUpload {
            selection,
            filename,
            ..
        } = pending;

        let outcome = match result {
            Some(Ok(UploadReply::Accepted { message, .. })) => UploadOutcome {
                success: true,
                message: message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| format!("Uploaded {filename}")),
            },
            Some(Ok(UploadReply::Rejected { message })) => UploadOutcome {
                success: false,
                message: message.unwrap_or_else(|| GENERIC_UPLOAD_FAILURE.to_string()),
            },
            Some(Err(e)) => UploadOutcome {
                success: false,
                message: format!("{GENERIC_UPLOAD_FAILURE}: {e}"),
            },
            None => UploadOutcome {
                success: false,
                message: GENERIC_UPLOAD_FAILURE.to_string(),
            },
        };

        if outcome.success {
            tracing::info!(%filename, "Upload succeeded");
            if self.selection.as_ref() == Some(&selection) {
                self.selection = None;
            }
            self.refresh.request();
            // A TTL too large to represent keeps the status until it is replaced.
            let expires_at = now.checked_add(self.success_ttl);
            self.set_status(StatusKind::Success, outcome.message.clone(), expires_at);
        } else {
            tracing::warn!(%filename, message = %outcome.message, "Upload failed");
            self.set_status(StatusKind::Error, outcome.message.clone(), None);
        }
        outcome
    }
}

async fn run_upload(client: &RagClient, path: &Path, filename: String) -> UploadResult {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(source) => return Err(UploadFailure::Read { filename, source }),
    };
    Ok(client.upload_file(&filename, bytes).await?)
}
