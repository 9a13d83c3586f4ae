//! HTTP client for the RAG assistant server.
//!
//! # Architecture
//!
//! [`RagClient`] wraps one `reqwest::Client` and the three endpoints the server exposes:
//!
//! | Endpoint | Method | Module |
//! |----------|--------|--------|
//! | `/chat` | `POST` form, streamed response | [`chat`] |
//! | `/upload` | `POST` multipart | [`upload`] |
//! | `/files` | `GET` JSON | [`files`] |
//!
//! Chat answers are delivered through a [`tokio::sync::mpsc::Sender<StreamEvent>`]
//! so the caller can render partial output as it arrives.
//!
//! # Error Handling
//!
//! Chat failures are delivered as [`StreamEvent::Failed`] or [`StreamEvent::Error`]
//! events rather than `Result::Err` returns, so partial output received before the
//! failure stays with the caller. Upload and listing calls return `Result`.

pub mod chat;
pub mod files;
pub mod framing;
pub mod upload;

use std::time::Duration;

use url::Url;

pub use chat::{ChatRequest, consume_event_stream};
pub use files::ListingError;
pub use framing::{Frame, FramingError, LineBuffer};
pub use ragchat_types;
pub use ragchat_types::StreamEvent;
pub use upload::UploadReply;

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Default idle limit between body reads of a chat stream.
pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

const MAX_BODY_BYTES: usize = 32 * 1024;

/// Where the server lives and how patient to be with it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub stream_idle_timeout: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            stream_idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("base URL {url} cannot address endpoints: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("base URL {0} must use http or https")]
    UnsupportedScheme(String),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub(crate) struct Endpoints {
    pub(crate) chat: Url,
    pub(crate) upload: Url,
    pub(crate) files: Url,
}

impl Endpoints {
    fn resolve(base: &Url) -> Result<Self, ClientBuildError> {
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientBuildError::UnsupportedScheme(base.to_string()));
        }

        // Joining replaces the last path segment unless the base ends in '/'.
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let join = |segment: &str| {
            base.join(segment)
                .map_err(|source| ClientBuildError::InvalidBaseUrl {
                    url: base.to_string(),
                    source,
                })
        };
        Ok(Self {
            chat: join("chat")?,
            upload: join("upload")?,
            files: join("files")?,
        })
    }
}

/// Client for one assistant server. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct RagClient {
    pub(crate) http: reqwest::Client,
    pub(crate) endpoints: Endpoints,
    pub(crate) stream_idle_timeout: Duration,
}

impl RagClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientBuildError> {
        let endpoints = Endpoints::resolve(&config.base_url)?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
            .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
            .build()?;

        Ok(Self {
            http,
            endpoints,
            stream_idle_timeout: config.stream_idle_timeout,
        })
    }

    #[must_use]
    pub fn chat_url(&self) -> &Url {
        &self.endpoints.chat
    }
}

/// Read at most 32 KiB of a response body, lossily decoded.
pub async fn read_capped_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_BODY_BYTES {
            body.truncate(MAX_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}
