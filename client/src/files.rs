//! Uploaded-file listing.

use ragchat_types::FileDescriptor;
use serde::Deserialize;

use crate::RagClient;

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("file listing request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("file listing returned status {0}")]
    Status(u16),
    #[error("file listing response was malformed: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct FileListing {
    files: Vec<FileDescriptor>,
}

impl RagClient {
    /// Fetch the files currently known to the server, in server order.
    pub async fn list_files(&self) -> Result<Vec<FileDescriptor>, ListingError> {
        let response = self
            .http
            .get(self.endpoints.files.clone())
            .send()
            .await
            .map_err(ListingError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListingError::Status(status.as_u16()));
        }

        let listing: FileListing = response.json().await.map_err(ListingError::Decode)?;
        Ok(listing.files)
    }
}
