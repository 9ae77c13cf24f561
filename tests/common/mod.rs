//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which builds a full [`AppContext`] over a temp
//! artifact directory with fake transcode and publish stages. The
//! [`TestHarness::with_server`] constructor starts Axum on a random port for
//! HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clipforge::artifacts::{Artifact, ArtifactKind, ArtifactStore};
use clipforge::config::Config;
use clipforge::publish::{Destination, PublishError, Publisher, RemoteId};
use clipforge::server::{self, AppContext};
use clipforge::transcode::Transcoder;
use clipforge_common::{Error, Result, Token};
use tempfile::TempDir;
use tokio::sync::oneshot;

/// Transcoder that copies the input, prefixed so tests can tell it ran.
pub struct CopyTranscoder;

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let mut data = b"MP4:".to_vec();
        data.extend(tokio::fs::read(input).await?);
        tokio::fs::write(output, data).await?;
        Ok(())
    }
}

/// Transcoder that writes some output and then fails like a bad input would.
pub struct FailingTranscoder;

#[async_trait]
impl Transcoder for FailingTranscoder {
    async fn convert(&self, _input: &Path, output: &Path) -> Result<()> {
        tokio::fs::write(output, b"partial").await?;
        Err(Error::tool(
            "ffmpeg",
            "Invalid data found when processing input",
        ))
    }
}

/// Publisher returning a fixed outcome and recording what it was asked.
pub struct FakePublisher {
    outcome: std::result::Result<String, PublishError>,
    calls: AtomicUsize,
    destinations: Mutex<Vec<Destination>>,
}

impl FakePublisher {
    pub fn ok(id: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(id.to_string()),
            calls: AtomicUsize::new(0),
            destinations: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(err: PublishError) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(err),
            calls: AtomicUsize::new(0),
            destinations: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.destinations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(
        &self,
        artifact: &Artifact,
        destination: &Destination,
    ) -> std::result::Result<RemoteId, PublishError> {
        assert!(artifact.path().exists(), "published artifact must exist");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.destinations.lock().unwrap().push(destination.clone());
        self.outcome.clone().map(RemoteId::new)
    }

    fn view_url(&self, id: &RemoteId) -> String {
        format!("https://drive.google.com/file/d/{}/view?usp=sharing", id)
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub publisher: Arc<FakePublisher>,
    pub dir: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<tokio::task::JoinHandle<()>>,
}

impl TestHarness {
    /// Copy transcoder, publisher answering `abc123`.
    pub fn new() -> Self {
        Self::with_stages(Arc::new(CopyTranscoder), FakePublisher::ok("abc123"))
    }

    pub fn with_stages(transcoder: Arc<dyn Transcoder>, publisher: Arc<FakePublisher>) -> Self {
        Self::with_config(Config::default(), transcoder, publisher)
    }

    pub fn with_config(
        mut config: Config,
        transcoder: Arc<dyn Transcoder>,
        publisher: Arc<FakePublisher>,
    ) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        config.artifacts.temp_dir = Some(dir.path().to_path_buf());

        let store = ArtifactStore::with_default_suffixes(dir.path()).expect("failed to create store");
        let ctx = AppContext::new(config, store, transcoder, publisher.clone());

        Self {
            ctx,
            publisher,
            dir,
            shutdown: None,
            server: None,
        }
    }

    /// Start Axum on a random port and return the bound address.
    pub async fn start(&mut self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        let (tx, rx) = oneshot::channel::<()>();
        let ctx = self.ctx.clone();
        let handle = tokio::spawn(async move {
            server::serve(listener, ctx, async move {
                let _ = rx.await;
            })
            .await
            .ok();
        });

        self.shutdown = Some(tx);
        self.server = Some(handle);
        addr
    }

    /// Default harness with a running server.
    pub async fn with_server() -> (Self, SocketAddr) {
        let mut harness = Self::new();
        let addr = harness.start().await;
        (harness, addr)
    }

    /// Trigger graceful shutdown and wait for the server task to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server.take() {
            handle.await.expect("server task panicked");
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        self.ctx.pipeline.store()
    }

    /// Register a ready output artifact directly, bypassing upload.
    pub fn mint(&self, content: &[u8], display_name: &str) -> Token {
        let artifact = self
            .store()
            .create(ArtifactKind::Output)
            .expect("failed to create artifact");
        std::fs::write(artifact.path(), content).expect("failed to write artifact");
        self.ctx.registry.mint(artifact.with_display_name(display_name))
    }

    /// Number of files currently in the artifact directory.
    pub fn files_on_disk(&self) -> usize {
        std::fs::read_dir(self.dir.path())
            .expect("failed to read temp dir")
            .count()
    }

    /// Wait briefly for released artifacts to disappear.
    ///
    /// A download body is released when the server finishes with it, which
    /// can be just after the client has read the last byte.
    pub async fn wait_for_files(&self, expected: usize) -> usize {
        for _ in 0..100 {
            if self.files_on_disk() == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.files_on_disk()
    }
}

/// Multipart form with a single `file` field.
pub fn upload_form(file_name: &str, content: &[u8]) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(content.to_vec()).file_name(file_name.to_string());
    reqwest::multipart::Form::new().part("file", part)
}

/// Pull the `/download/{token}` path out of a success page.
pub fn download_path(page: &str) -> Option<String> {
    let start = page.find("/download/")?;
    let token: String = page[start + "/download/".len()..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    (token.len() == 32).then(|| format!("/download/{}", token))
}
