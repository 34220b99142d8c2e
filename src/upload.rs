pub use kikcore::upload::{ContentHashes, ContentUpload};

use crate::client::Client;
use crate::error::ClientError;
use kikcore::upload::{UploadAuth, content_upload_request};
use log::{info, warn};

impl Client {
    /// Uploads a single-chunk piece of content and returns the HTTP status.
    ///
    /// Needs a `node`, so call it after login.
    pub async fn upload_content(&self, upload: &ContentUpload<'_>) -> Result<u16, ClientError> {
        let request = {
            let credentials = self.credentials.read().await;
            let jid = credentials.jid().ok_or(ClientError::NotConnected)?.to_string();
            let password_key = credentials.password_key();
            content_upload_request(
                upload,
                &UploadAuth {
                    jid: &jid,
                    password_key: &password_key,
                    version: &self.verifier.version().version,
                },
            )
        };
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(ClientError::Transport)?;
        if response.is_success() {
            info!(target: "Client/Upload", "Uploaded content {}", upload.content_id);
        } else {
            warn!(
                target: "Client/Upload",
                "Upload of {} answered with HTTP {}: {}",
                upload.content_id,
                response.status_code,
                String::from_utf8_lossy(&response.body)
            );
        }
        Ok(response.status_code)
    }
}
