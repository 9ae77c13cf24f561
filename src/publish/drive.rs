//! Google Drive v3 upload client.
//!
//! Uses the resumable upload protocol in its simplest form: one POST with
//! the file metadata opens a session, one PUT streams the whole file into it.
//! Nothing is resumed; a failed PUT is a failed publish.

use super::{CredentialProvider, Destination, PublishError, Publisher, RemoteId};
use crate::artifacts::Artifact;
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

const MP4_MIME: &str = "video/mp4";

#[derive(Debug, Deserialize)]
struct UploadedFile {
    id: String,
}

/// [`Publisher`] that uploads into Google Drive.
pub struct DriveClient {
    http: reqwest::Client,
    upload_url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl DriveClient {
    /// Create a client posting to `upload_url` (normally
    /// `https://www.googleapis.com/upload/drive/v3/files`).
    pub fn new(
        http: reqwest::Client,
        upload_url: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> clipforge_common::Result<Self> {
        let upload_url = Url::parse(upload_url).map_err(|e| {
            clipforge_common::Error::internal(format!("invalid Drive upload URL {upload_url:?}: {e}"))
        })?;
        Ok(Self {
            http,
            upload_url,
            credentials,
        })
    }

    fn session_url(&self) -> Url {
        let mut url = self.upload_url.clone();
        url.query_pairs_mut()
            .append_pair("uploadType", "resumable")
            .append_pair("fields", "id");
        url
    }

    async fn open_session(
        &self,
        access_token: &str,
        destination: &Destination,
        size: u64,
    ) -> Result<Url, PublishError> {
        let mut metadata = serde_json::json!({ "name": destination.file_name });
        if let Some(ref folder) = destination.folder {
            metadata["parents"] = serde_json::json!([folder]);
        }

        let response = self
            .http
            .post(self.session_url())
            .bearer_auth(access_token)
            .header("X-Upload-Content-Type", MP4_MIME)
            .header("X-Upload-Content-Length", size.to_string())
            .json(&metadata)
            .send()
            .await
            .map_err(|e| PublishError::Transfer(format!("cannot reach Drive: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Auth(format!(
                "Drive rejected the access token: {}",
                body.trim()
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Transfer(format!(
                "Drive refused the upload session ({status}): {}",
                body.trim()
            )));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                PublishError::Transfer("Drive did not return an upload session URL".to_string())
            })?;

        self.upload_url
            .join(location)
            .map_err(|e| PublishError::Transfer(format!("bad upload session URL: {e}")))
    }
}

#[async_trait]
impl Publisher for DriveClient {
    async fn publish(
        &self,
        artifact: &Artifact,
        destination: &Destination,
    ) -> Result<RemoteId, PublishError> {
        let credential = self.credentials.valid_credential().await?;

        let file = tokio::fs::File::open(artifact.path())
            .await
            .map_err(|e| PublishError::Transfer(format!("cannot open artifact: {e}")))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| PublishError::Transfer(format!("cannot stat artifact: {e}")))?
            .len();

        let session = self
            .open_session(&credential.access_token, destination, size)
            .await?;

        tracing::info!(
            name = %destination.file_name,
            folder = ?destination.folder,
            bytes = size,
            "Uploading to Drive"
        );

        let response = self
            .http
            .put(session)
            .header(CONTENT_TYPE, MP4_MIME)
            .header(CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|e| PublishError::Transfer(format!("upload interrupted: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Transfer(format!(
                "Drive rejected the upload ({status}): {}",
                body.trim()
            )));
        }

        let uploaded: UploadedFile = response
            .json()
            .await
            .map_err(|e| PublishError::Transfer(format!("malformed Drive response: {e}")))?;

        tracing::info!(remote_id = %uploaded.id, "Drive upload complete");
        Ok(RemoteId::new(uploaded.id))
    }

    fn view_url(&self, id: &RemoteId) -> String {
        format!("https://drive.google.com/file/d/{}/view?usp=sharing", id)
    }
}
