//! Interactive OAuth authorization for the storage account.
//!
//! Runs the installed-app loopback flow once, on an operator's machine:
//! a one-route axum listener on `127.0.0.1:<random port>` receives the
//! browser redirect, the authorization code is exchanged for tokens, and the
//! result is written to the credential cache that
//! [`super::FileCredentialCache`] reads.

use super::credentials::{request_token, CachedCredential};
use anyhow::{anyhow, Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Url;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Client secrets file as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecretsFile {
    #[serde(alias = "web")]
    pub installed: ClientSecrets,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ClientSecrets {
    /// Load client secrets from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read client secrets: {:?}", path))?;
        let file: ClientSecretsFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse client secrets: {:?}", path))?;
        Ok(file.installed)
    }

    /// Consent page URL the operator opens in a browser.
    pub fn consent_url(&self, redirect_uri: &str, scope: &str, state: &str) -> Result<Url> {
        let mut url = Url::parse(&self.auth_uri).context("Invalid auth_uri in client secrets")?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", scope)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        Ok(url)
    }
}

/// Query parameters of the browser redirect.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// What a request to the loopback listener turned out to be.
#[derive(Debug, PartialEq, Eq)]
pub enum Callback {
    Code(String),
    Denied(String),
    /// Not the redirect we are waiting for; the flow keeps listening.
    Ignored(&'static str),
}

/// Classify a redirect against the `state` sent with the consent URL.
pub fn parse_callback(params: &CallbackParams, expected_state: &str) -> Callback {
    if params.state.as_deref() != Some(expected_state) {
        return Callback::Ignored("state mismatch");
    }
    if let Some(error) = &params.error {
        return Callback::Denied(error.clone());
    }
    match &params.code {
        Some(code) if !code.is_empty() => Callback::Code(code.clone()),
        _ => Callback::Ignored("no code"),
    }
}

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    outcome: Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>,
}

async fn receive_callback(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, &'static str) {
    let outcome = match parse_callback(&params, &state.expected_state) {
        Callback::Code(code) => Ok(code),
        Callback::Denied(reason) => Err(anyhow!("Authorization was denied: {reason}")),
        Callback::Ignored(why) => {
            tracing::debug!(reason = why, "Ignoring non-callback request");
            return (StatusCode::BAD_REQUEST, "Not an authorization callback.");
        }
    };

    let denied = outcome.is_err();
    if let Some(tx) = state.outcome.lock().take() {
        let _ = tx.send(outcome);
    }

    if denied {
        (StatusCode::BAD_REQUEST, "Authorization was denied.")
    } else {
        (StatusCode::OK, "Authorization complete. You may close this window.")
    }
}

/// Run the loopback flow and write the credential cache.
///
/// `show_url` receives the consent URL; the CLI prints it.
pub async fn authorize(
    secrets: &ClientSecrets,
    scope: &str,
    cache_path: &Path,
    show_url: impl FnOnce(&Url),
) -> Result<CachedCredential> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind loopback listener")?;
    let redirect_uri = format!("http://127.0.0.1:{}/", listener.local_addr()?.port());
    let state = uuid::Uuid::new_v4().simple().to_string();
    let consent_url = secrets.consent_url(&redirect_uri, scope, &state)?;

    let (code_tx, code_rx) = oneshot::channel();
    let app = Router::new()
        .route("/", get(receive_callback))
        .with_state(CallbackState {
            expected_state: Arc::from(state.as_str()),
            outcome: Arc::new(Mutex::new(Some(code_tx))),
        });

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    show_url(&consent_url);

    let received = code_rx.await;
    let _ = stop_tx.send(());
    // Give the browser its answer, but don't wait on connections it keeps open.
    if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
        server.abort();
    }
    let code = received.context("Loopback listener stopped before the redirect arrived")??;

    let response = request_token(
        &reqwest::Client::new(),
        &secrets.token_uri,
        &[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
        ],
    )
    .await?;

    let mut credential = CachedCredential {
        access_token: String::new(),
        refresh_token: None,
        expires_at: None,
        client_id: secrets.client_id.clone(),
        client_secret: secrets.client_secret.clone(),
        token_uri: secrets.token_uri.clone(),
        scope: Some(scope.to_string()),
    };
    credential.apply(response, Utc::now())?;

    if credential.refresh_token.is_none() {
        tracing::warn!("No refresh token granted; authorization will have to be repeated when the access token expires");
    }

    credential
        .save(cache_path)
        .await
        .with_context(|| format!("Failed to write credential cache: {:?}", cache_path))?;

    Ok(credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params(query: &str) -> CallbackParams {
        let url = Url::parse(&format!("http://127.0.0.1/?{query}")).unwrap();
        let mut params = CallbackParams::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }

    #[test]
    fn test_parse_callback() {
        assert_eq!(
            parse_callback(&params("state=s1&code=4%2F0Adeu5&scope=drive.file"), "s1"),
            Callback::Code("4/0Adeu5".into())
        );
    }

    #[test]
    fn test_parse_callback_rejects_wrong_state() {
        assert_matches!(parse_callback(&params("state=other&code=abc"), "s1"), Callback::Ignored(_));
        assert_matches!(parse_callback(&params("code=abc"), "s1"), Callback::Ignored(_));
    }

    #[test]
    fn test_parse_callback_reports_denial() {
        assert_eq!(
            parse_callback(&params("error=access_denied&state=s1"), "s1"),
            Callback::Denied("access_denied".into())
        );
    }

    #[test]
    fn test_parse_callback_needs_a_code() {
        assert_matches!(parse_callback(&params("state=s1"), "s1"), Callback::Ignored(_));
        assert_matches!(parse_callback(&params("state=s1&code="), "s1"), Callback::Ignored(_));
        assert_matches!(parse_callback(&CallbackParams::default(), "s1"), Callback::Ignored(_));
    }

    #[test]
    fn test_client_secrets_accepts_installed_and_web() {
        let installed: ClientSecretsFile = serde_json::from_str(
            r#"{"installed":{"client_id":"id","client_secret":"secret"}}"#,
        )
        .unwrap();
        assert_eq!(installed.installed.token_uri, "https://oauth2.googleapis.com/token");

        let web: ClientSecretsFile = serde_json::from_str(
            r#"{"web":{"client_id":"id","client_secret":"secret","token_uri":"http://t"}}"#,
        )
        .unwrap();
        assert_eq!(web.installed.token_uri, "http://t");
    }

    #[test]
    fn test_consent_url() {
        let secrets = ClientSecrets {
            client_id: "id".into(),
            client_secret: "secret".into(),
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
        };
        let url = secrets
            .consent_url("http://127.0.0.1:4000/", "https://www.googleapis.com/auth/drive.file", "st")
            .unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "id");
        assert_eq!(pairs["redirect_uri"], "http://127.0.0.1:4000/");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["state"], "st");
    }

    async fn token_endpoint() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-1",
                "refresh_token": "refresh-1",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    /// Start the flow in a task; returns it with the redirect URI and state.
    async fn start_flow(
        server: &MockServer,
        cache_path: &Path,
    ) -> (tokio::task::JoinHandle<Result<CachedCredential>>, String, String) {
        let secrets = ClientSecrets {
            client_id: "id".into(),
            client_secret: "secret".into(),
            auth_uri: "http://accounts.invalid/auth".into(),
            token_uri: format!("{}/token", server.uri()),
        };

        let (url_tx, url_rx) = oneshot::channel::<Url>();
        let cache_path = cache_path.to_path_buf();
        let flow = tokio::spawn(async move {
            authorize(&secrets, "scope", &cache_path, |url| {
                let _ = url_tx.send(url.clone());
            })
            .await
        });

        let consent = url_rx.await.unwrap();
        let pairs: std::collections::HashMap<_, _> = consent.query_pairs().into_owned().collect();
        (flow, pairs["redirect_uri"].clone(), pairs["state"].clone())
    }

    #[tokio::test]
    async fn test_full_loopback_flow() {
        let server = token_endpoint().await;
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("token.json");
        let (flow, redirect_uri, state) = start_flow(&server, &cache_path).await;

        // Stray requests first, then the real redirect.
        let stray = reqwest::get(format!("{}favicon.ico", redirect_uri)).await.unwrap();
        assert!(stray.status().is_client_error());
        let forged = reqwest::get(format!("{}?state=forged&code=the-code", redirect_uri))
            .await
            .unwrap();
        assert_eq!(forged.status(), 400);

        let resp = reqwest::get(format!("{}?state={}&code=the-code", redirect_uri, state))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let credential = flow.await.unwrap().unwrap();
        assert_eq!(credential.access_token, "access-1");
        assert_eq!(credential.refresh_token.as_deref(), Some("refresh-1"));

        let saved = CachedCredential::load(&cache_path).await.unwrap();
        assert_eq!(saved, credential);
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_block_callback() {
        let server = token_endpoint().await;
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("token.json");
        let (flow, redirect_uri, state) = start_flow(&server, &cache_path).await;

        // A browser pre-connect: open a socket and never send anything.
        let port = Url::parse(&redirect_uri).unwrap().port().unwrap();
        let _idle = tokio::net::TcpStream::connect(("127.0.0.1", port)).await.unwrap();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap();
        let resp = client
            .get(format!("{}?state={}&code=the-code", redirect_uri, state))
            .send()
            .await
            .expect("callback answered while another connection sits idle");
        assert_eq!(resp.status(), 200);

        let credential = tokio::time::timeout(Duration::from_secs(10), flow)
            .await
            .expect("authorize finished")
            .unwrap()
            .unwrap();
        assert_eq!(credential.access_token, "access-1");
    }

    #[tokio::test]
    async fn test_denied_consent_ends_flow() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("token.json");
        let (flow, redirect_uri, state) = start_flow(&server, &cache_path).await;

        let resp = reqwest::get(format!("{}?state={}&error=access_denied", redirect_uri, state))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let err = flow.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("access_denied"));
        assert!(!cache_path.exists());
    }
}
