//! Storage credentials backed by an on-disk cache.
//!
//! The cache file is written by `clipforge authorize` and holds an OAuth
//! access token plus, normally, a refresh token. [`FileCredentialCache`]
//! hands out the access token while it is fresh, refreshes it silently when
//! it has expired, and reports [`PublishError::Auth`] when neither works.

use super::PublishError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tokens are treated as expired this long before their real expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// A bearer token ready to put on a request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(..)")
    }
}

/// Source of valid storage credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn valid_credential(&self) -> Result<Credential, PublishError>;
}

/// Serialized form of the credential cache file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedCredential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub client_id: String,
    pub client_secret: String,
    pub token_uri: String,
    #[serde(default)]
    pub scope: Option<String>,
}

impl CachedCredential {
    /// Whether the access token is still usable at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => now + Duration::seconds(EXPIRY_SKEW_SECS) < expiry,
            None => true,
        }
    }

    /// Fold a token endpoint response into this credential.
    ///
    /// An `expires_in` that does not fit a timestamp leaves the credential
    /// untouched and is reported as [`PublishError::Auth`].
    pub fn apply(&mut self, response: TokenResponse, now: DateTime<Utc>) -> Result<(), PublishError> {
        let expires_at = match response.expires_in {
            Some(secs) => Some(
                Duration::try_seconds(secs)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
                    .ok_or_else(|| {
                        PublishError::Auth(format!(
                            "token endpoint returned an unusable expires_in: {secs}"
                        ))
                    })?,
            ),
            None => None,
        };

        self.access_token = response.access_token;
        self.expires_at = expires_at;
        if let Some(refresh) = response.refresh_token {
            self.refresh_token = Some(refresh);
        }
        if response.scope.is_some() {
            self.scope = response.scope;
        }
        Ok(())
    }

    /// Read a cache file.
    pub async fn load(path: &Path) -> Result<Self, PublishError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PublishError::Auth(format!(
                    "no cached credential at {}; run `clipforge authorize`",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(PublishError::Auth(format!(
                    "cannot read credential cache {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        serde_json::from_str(&content).map_err(|e| {
            PublishError::Auth(format!(
                "credential cache {} is corrupt: {}; run `clipforge authorize`",
                path.display(),
                e
            ))
        })
    }

    /// Write a cache file, replacing any previous one.
    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await
    }
}

/// Successful response from an OAuth token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// POST a grant to a token endpoint and decode the response.
pub(crate) async fn request_token(
    http: &reqwest::Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, PublishError> {
    let response = http
        .post(token_uri)
        .form(form)
        .send()
        .await
        .map_err(|e| PublishError::Auth(format!("token endpoint unreachable: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(PublishError::Auth(format!(
            "token endpoint rejected the grant ({status}): {}",
            body.trim()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| PublishError::Auth(format!("malformed token response: {e}")))
}

/// [`CredentialProvider`] reading and refreshing a JSON cache file.
pub struct FileCredentialCache {
    path: PathBuf,
    http: reqwest::Client,
    // Serializes refreshes so concurrent uploads don't each spend the refresh grant.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl FileCredentialCache {
    pub fn new(path: impl Into<PathBuf>, http: reqwest::Client) -> Self {
        Self {
            path: path.into(),
            http,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn refresh(&self, mut cached: CachedCredential) -> Result<Credential, PublishError> {
        let Some(refresh_token) = cached.refresh_token.clone() else {
            return Err(PublishError::Auth(
                "cached credential expired and has no refresh token; run `clipforge authorize`"
                    .to_string(),
            ));
        };

        tracing::info!(path = %self.path.display(), "Refreshing storage credential");

        let response = request_token(
            &self.http,
            &cached.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", cached.client_id.as_str()),
                ("client_secret", cached.client_secret.as_str()),
            ],
        )
        .await?;

        cached.apply(response, Utc::now())?;

        if let Err(e) = cached.save(&self.path).await {
            // The fresh token is still good for this request.
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to persist refreshed credential");
        }

        Ok(Credential {
            access_token: cached.access_token,
        })
    }
}

#[async_trait]
impl CredentialProvider for FileCredentialCache {
    async fn valid_credential(&self) -> Result<Credential, PublishError> {
        let _guard = self.refresh_lock.lock().await;

        let cached = CachedCredential::load(&self.path).await?;
        if cached.is_fresh(Utc::now()) {
            return Ok(Credential {
                access_token: cached.access_token,
            });
        }

        self.refresh(cached).await
    }
}
