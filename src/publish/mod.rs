//! Publish stage: push a finished artifact to remote storage.
//!
//! The [`Publisher`] trait is the seam the pipeline talks to; [`DriveClient`]
//! is the Google Drive implementation. Credential problems and transfer
//! problems are reported as distinct [`PublishError`] kinds.

pub mod authorize;
pub mod credentials;
pub mod drive;

pub use credentials::{CachedCredential, Credential, CredentialProvider, FileCredentialCache};
pub use drive::DriveClient;

use crate::artifacts::Artifact;
use async_trait::async_trait;
use std::fmt;

/// Identifier of an object in remote storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an artifact should land remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Name the remote object gets.
    pub file_name: String,
    /// Optional parent container (a Drive folder id).
    pub folder: Option<String>,
}

/// Why a publish attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// No usable credential; the operator has to re-authorize.
    #[error("authorization failed: {0}")]
    Auth(String),

    /// The upload itself failed.
    #[error("transfer failed: {0}")]
    Transfer(String),
}

impl From<PublishError> for clipforge_common::Error {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::Auth(msg) => Self::Auth(msg),
            PublishError::Transfer(msg) => Self::Transfer(msg),
        }
    }
}

/// Uploads an artifact in a single attempt.
///
/// Either a [`RemoteId`] comes back or nothing is considered to exist
/// remotely.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        artifact: &Artifact,
        destination: &Destination,
    ) -> Result<RemoteId, PublishError>;

    /// Human-facing link for a published object.
    fn view_url(&self, id: &RemoteId) -> String;
}
