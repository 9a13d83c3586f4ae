//! Single-file multipart upload.

use ragchat_types::TransportError;
use serde::Deserialize;

use crate::{RagClient, read_capped_body};

/// Multipart field name the server reads the file from.
pub const FILE_FIELD: &str = "file";

/// How the server answered an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadReply {
    /// `status: "success"`; the document was stored and ingested.
    Accepted {
        message: Option<String>,
        filename: Option<String>,
        file_id: Option<String>,
    },
    /// Any other status, or an HTTP error carrying a JSON explanation.
    Rejected { message: Option<String> },
}

#[derive(Debug, Default, Deserialize)]
struct RawUploadReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    /// FastAPI-style error body; a string for `HTTPException`, a list for validation errors.
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    file_id: Option<String>,
}

impl RawUploadReply {
    fn explanation(self) -> Option<String> {
        self.message
            .filter(|m| !m.trim().is_empty())
            .or_else(|| match self.detail {
                Some(serde_json::Value::String(detail)) if !detail.trim().is_empty() => Some(detail),
                _ => None,
            })
    }
}

impl RagClient {
    /// Upload one file's bytes under `filename`.
    ///
    /// HTTP error statuses whose body explains the failure come back as
    /// [`UploadReply::Rejected`]; ones without a usable body are transport errors.
    pub async fn upload_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadReply, TransportError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part(FILE_FIELD, part);

        let response = self
            .http
            .post(self.endpoints.upload.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        let body = read_capped_body(response).await;
        let parsed = serde_json::from_str::<RawUploadReply>(&body);

        match parsed {
            Ok(raw) if status.is_success() && raw.status.as_deref() == Some("success") => {
                Ok(UploadReply::Accepted {
                    message: raw.message,
                    filename: raw.filename,
                    file_id: raw.file_id,
                })
            }
            Ok(raw) => {
                let message = raw.explanation();
                if message.is_none() && !status.is_success() {
                    return Err(TransportError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                Ok(UploadReply::Rejected { message })
            }
            Err(e) if status.is_success() => {
                tracing::warn!(%e, "Upload response was not JSON");
                Ok(UploadReply::Rejected { message: None })
            }
            Err(_) => Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }),
        }
    }
}
