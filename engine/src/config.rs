use serde::Deserialize;
use std::{env, path::Path, path::PathBuf, time::Duration};
use url::Url;

use crate::context_mode::DEFAULT_POLL_INTERVAL;
use crate::upload::DEFAULT_SUCCESS_TTL;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Overrides `[server] base_url`.
pub const SERVER_URL_ENV: &str = "RAGCHAT_SERVER_URL";
/// Overrides `[chat] stream_idle_timeout_secs`.
pub const STREAM_IDLE_TIMEOUT_ENV: &str = "RAGCHAT_STREAM_IDLE_TIMEOUT_SECS";

/// Upper bound for every timing setting. Larger values are clamped to it.
pub const MAX_TIMING_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Default, Deserialize)]
pub struct RagChatConfig {
    pub server: Option<ServerConfig>,
    pub chat: Option<ChatConfig>,
    pub context: Option<ContextConfig>,
    pub upload: Option<UploadConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid server URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// Supports `${VAR}` expansion.
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatConfig {
    /// Longest silence tolerated between body reads of a streamed answer.
    pub stream_idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContextConfig {
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadConfig {
    /// How long an upload success message stays visible.
    pub success_clear_secs: Option<u64>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: Url,
    pub stream_idle_timeout: Duration,
    pub poll_interval: Duration,
    pub success_clear: Duration,
}

/// Replace `${VAR}` references using `lookup`. Unknown variables become empty.
pub fn expand_env_vars_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(end_rel) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + end_rel];
        if !var.is_empty() {
            out.push_str(&lookup(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + end_rel + 1..];
    }

    out.push_str(rest);
    out
}

fn positive_secs(secs: Option<u64>) -> Option<Duration> {
    secs.filter(|&secs| secs > 0).map(|secs| {
        if secs > MAX_TIMING_SECS {
            tracing::warn!(secs, max = MAX_TIMING_SECS, "Clamping oversized timing setting");
        }
        Duration::from_secs(secs.min(MAX_TIMING_SECS))
    })
}

impl RagChatConfig {
    /// Load `~/.ragchat/config.toml`. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        self.resolve_with_env(|var| env::var(var).ok())
    }

    /// Merge file values, environment overrides, and defaults.
    ///
    /// Environment beats file, file beats default. Zero durations fall through to the
    /// next source; durations above [`MAX_TIMING_SECS`] are clamped.
    pub fn resolve_with_env(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Settings, ConfigError> {
        let raw_url = lookup(SERVER_URL_ENV)
            .filter(|url| !url.trim().is_empty())
            .or_else(|| {
                self.server
                    .as_ref()
                    .and_then(|server| server.base_url.as_deref())
                    .map(|url| expand_env_vars_with(url, &lookup))
                    .filter(|url| !url.trim().is_empty())
            })
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(raw_url.trim()).map_err(|source| ConfigError::InvalidUrl {
            url: raw_url.clone(),
            source,
        })?;

        let env_idle = lookup(STREAM_IDLE_TIMEOUT_ENV).and_then(|value| {
            let parsed = value.trim().parse::<u64>().ok();
            if parsed.is_none() {
                tracing::warn!(%value, "Ignoring non-numeric {STREAM_IDLE_TIMEOUT_ENV}");
            }
            parsed
        });
        let stream_idle_timeout = positive_secs(env_idle)
            .or_else(|| {
                positive_secs(self.chat.as_ref().and_then(|c| c.stream_idle_timeout_secs))
            })
            .unwrap_or(ragchat_client::DEFAULT_STREAM_IDLE_TIMEOUT);

        let poll_interval = positive_secs(self.context.as_ref().and_then(|c| c.poll_interval_secs))
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        let success_clear =
            positive_secs(self.upload.as_ref().and_then(|u| u.success_clear_secs))
                .unwrap_or(DEFAULT_SUCCESS_TTL);

        Ok(Settings {
            base_url,
            stream_idle_timeout,
            poll_interval,
            success_clear,
        })
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ragchat").join("config.toml"))
}
