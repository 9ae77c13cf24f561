//! Per-upload orchestration.
//!
//! One request walks `Received → InputStaged → Transcoded → Published →
//! TokenIssued`, or drops into `Failed` from any stage after staging. The
//! artifacts involved are owned by local bindings, so a failed step releases
//! them on the way out; on success the output artifact moves into the token
//! registry and the pipeline holds nothing.

use crate::artifacts::{Artifact, ArtifactKind, ArtifactStore};
use crate::publish::{Destination, Publisher, RemoteId};
use crate::tokens::TokenRegistry;
use crate::transcode::{self, Transcoder};
use bytes::Bytes;
use clipforge_common::paths::{has_allowed_extension, sanitize_filename, with_extension};
use clipforge_common::{Error, RequestId, Result, Token};
use futures::{Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Where a request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    InputStaged,
    Transcoded,
    Published,
    TokenIssued,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::InputStaged => "input_staged",
            Self::Transcoded => "transcoded",
            Self::Published => "published",
            Self::TokenIssued => "token_issued",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Transient context of one upload.
#[derive(Debug)]
pub struct PipelineRequest {
    pub id: RequestId,
    /// Sanitised client file name, e.g. `clip.mts`.
    pub file_name: String,
    state: PipelineState,
}

impl PipelineRequest {
    fn new(file_name: String) -> Self {
        let request = Self {
            id: RequestId::new(),
            file_name,
            state: PipelineState::Received,
        };
        tracing::info!(request_id = %request.id, file = %request.file_name, "Upload received");
        request
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn advance(&mut self, next: PipelineState) {
        tracing::debug!(request_id = %self.id, from = %self.state, to = %next, "Pipeline transition");
        self.state = next;
    }

    fn fail(&mut self, error: &Error) {
        tracing::warn!(
            request_id = %self.id,
            stage = %self.state,
            code = error.code(),
            error = %error,
            "Upload failed"
        );
        self.state = PipelineState::Failed;
    }
}

/// Terminal success of a request.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub request_id: RequestId,
    pub token: Token,
    pub remote_id: RemoteId,
    /// Link to the published object.
    pub view_url: String,
    /// Name the converted file is published and downloaded under.
    pub file_name: String,
}

impl PipelineOutcome {
    /// Local one-time download path.
    pub fn download_path(&self) -> String {
        format!("/download/{}", self.token)
    }
}

/// Everything needed to run uploads through transcode and publish.
pub struct Pipeline {
    store: ArtifactStore,
    transcoder: Arc<dyn Transcoder>,
    publisher: Arc<dyn Publisher>,
    registry: Arc<TokenRegistry>,
    allowed_extensions: Vec<String>,
    output_extension: String,
    folder: Option<String>,
}

impl Pipeline {
    pub fn new(
        store: ArtifactStore,
        transcoder: Arc<dyn Transcoder>,
        publisher: Arc<dyn Publisher>,
        registry: Arc<TokenRegistry>,
    ) -> Self {
        Self {
            store,
            transcoder,
            publisher,
            registry,
            allowed_extensions: vec!["mts".to_string()],
            output_extension: "mp4".to_string(),
            folder: None,
        }
    }

    /// Restrict uploads to these extensions (case-insensitive).
    pub fn allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = extensions;
        self
    }

    /// Extension given to published/downloaded names.
    pub fn output_extension(mut self, ext: impl Into<String>) -> Self {
        self.output_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    /// Remote folder uploads go into.
    pub fn folder(mut self, folder: Option<String>) -> Self {
        self.folder = folder;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<TokenRegistry> {
        &self.registry
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Check the client file name before anything touches the disk.
    pub fn accept(&self, file_name: Option<&str>) -> Result<PipelineRequest> {
        let raw = file_name.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(Error::validation("no file selected"));
        }
        if !has_allowed_extension(raw, &self.allowed_extensions) {
            return Err(Error::validation(format!(
                "only {} files are accepted",
                self.allowed_list()
            )));
        }
        let file_name = sanitize_filename(raw)
            .filter(|name| has_allowed_extension(name, &self.allowed_extensions))
            .ok_or_else(|| Error::validation("file name is not usable"))?;

        Ok(PipelineRequest::new(file_name))
    }

    fn allowed_list(&self) -> String {
        self.allowed_extensions
            .iter()
            .map(|e| format!(".{}", e.trim_start_matches('.')))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Write the upload body into a fresh input artifact.
    ///
    /// The artifact is released if the body errors or turns out empty. A body
    /// error is returned as the caller converted it, so a size-limit error
    /// stays distinguishable from a dropped connection.
    pub async fn stage<S, E>(&self, request: &mut PipelineRequest, mut body: S) -> Result<Artifact>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: Into<Error>,
    {
        let result = async {
            let mut input = self.store.create(ArtifactKind::Input)?;
            input.mark_in_use();

            let mut file = tokio::fs::File::create(input.path())
                .await
                .map_err(|e| Error::resource(format!("cannot open staging file: {e}")))?;

            let mut written: u64 = 0;
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(Into::<Error>::into)?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| Error::resource(format!("cannot write staging file: {e}")))?;
                written += chunk.len() as u64;
            }
            file.flush()
                .await
                .map_err(|e| Error::resource(format!("cannot write staging file: {e}")))?;

            if written == 0 {
                return Err(Error::validation("uploaded file is empty"));
            }

            tracing::debug!(request_id = %request.id, bytes = written, "Upload staged");
            Ok::<_, Error>(input)
        }
        .await;

        match result {
            Ok(input) => {
                request.advance(PipelineState::InputStaged);
                Ok(input)
            }
            Err(e) => {
                request.fail(&e);
                Err(e)
            }
        }
    }

    /// Transcode, publish and mint a token for a staged input.
    ///
    /// Runs to completion; callers that must survive a dropped connection
    /// should spawn it.
    pub async fn process(
        &self,
        mut request: PipelineRequest,
        input: Artifact,
    ) -> Result<PipelineOutcome> {
        let output = match transcode::transcode(self.transcoder.as_ref(), &self.store, input).await {
            Ok(output) => output,
            Err(e) => {
                request.fail(&e);
                return Err(e);
            }
        };
        request.advance(PipelineState::Transcoded);

        let destination = Destination {
            file_name: with_extension(&request.file_name, &self.output_extension),
            folder: self.folder.clone(),
        };

        let remote_id = match self.publisher.publish(&output, &destination).await {
            Ok(id) => id,
            Err(e) => {
                let e = Error::from(e);
                request.fail(&e);
                return Err(e);
            }
        };
        request.advance(PipelineState::Published);

        let token = self
            .registry
            .mint(output.with_display_name(destination.file_name.clone()));
        request.advance(PipelineState::TokenIssued);

        tracing::info!(
            request_id = %request.id,
            remote_id = %remote_id,
            "Upload converted and published"
        );

        Ok(PipelineOutcome {
            request_id: request.id,
            token,
            view_url: self.publisher.view_url(&remote_id),
            remote_id,
            file_name: destination.file_name,
        })
    }

    /// Validate, stage and process one upload end to end.
    pub async fn run<S, E>(&self, file_name: Option<&str>, body: S) -> Result<PipelineOutcome>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: Into<Error>,
    {
        let mut request = self.accept(file_name)?;
        let input = self.stage(&mut request, body).await?;
        self.process(request, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::PublishError;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTranscoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transcoder for CountingTranscoder {
        async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::copy(input, output).await?;
            Ok(())
        }
    }

    struct FixedPublisher(std::result::Result<&'static str, PublishError>);

    #[async_trait]
    impl Publisher for FixedPublisher {
        async fn publish(
            &self,
            artifact: &Artifact,
            _destination: &Destination,
        ) -> std::result::Result<RemoteId, PublishError> {
            assert!(artifact.path().exists());
            self.0.clone().map(RemoteId::new)
        }

        fn view_url(&self, id: &RemoteId) -> String {
            format!("https://storage.test/{id}")
        }
    }

    fn body(chunks: &[&'static [u8]]) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> + Unpin {
        futures::stream::iter(
            chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c)))
                .collect::<Vec<_>>(),
        )
    }

    fn pipeline(
        dir: &Path,
        publish: std::result::Result<&'static str, PublishError>,
    ) -> (Pipeline, Arc<CountingTranscoder>) {
        let transcoder = Arc::new(CountingTranscoder::default());
        let pipeline = Pipeline::new(
            ArtifactStore::with_default_suffixes(dir).unwrap(),
            transcoder.clone(),
            Arc::new(FixedPublisher(publish)),
            Arc::new(TokenRegistry::new()),
        );
        (pipeline, transcoder)
    }

    #[tokio::test]
    async fn test_success_issues_token() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, transcoder) = pipeline(dir.path(), Ok("abc123"));

        let outcome = pipeline
            .run(Some("clip.mts"), body(&[b"mts ", b"bytes"]))
            .await
            .unwrap();

        assert_eq!(outcome.remote_id.as_str(), "abc123");
        assert_eq!(outcome.view_url, "https://storage.test/abc123");
        assert_eq!(outcome.file_name, "clip.mp4");
        assert_eq!(outcome.download_path(), format!("/download/{}", outcome.token));
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 1);

        // Only the registered output remains.
        assert_eq!(pipeline.store().stats(), crate::artifacts::ArtifactStats { created: 2, released: 1, leaked: 0 });
        assert_eq!(pipeline.registry().len(), 1);

        let artifact = pipeline.registry().redeem(&outcome.token).unwrap();
        assert_eq!(std::fs::read(artifact.path()).unwrap(), b"mts bytes");
        assert_eq!(artifact.display_name(), "clip.mp4");
    }

    #[tokio::test]
    async fn test_disallowed_extension_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, transcoder) = pipeline(dir.path(), Ok("abc123"));

        let err = pipeline.run(Some("clip.mov"), body(&[b"x"])).await.unwrap_err();

        assert_matches!(err, Error::Validation(ref msg) if msg.contains(".mts"));
        assert_eq!(pipeline.store().stats().created, 0);
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(dir.path(), Ok("abc123"));

        assert_matches!(pipeline.accept(None), Err(Error::Validation(_)));
        assert_matches!(pipeline.accept(Some("  ")), Err(Error::Validation(_)));
        assert_eq!(pipeline.store().stats().created, 0);
    }

    #[tokio::test]
    async fn test_accept_sanitises_name() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(dir.path(), Ok("abc123"));

        let request = pipeline.accept(Some("../My Holiday.MTS")).unwrap();
        assert_eq!(request.file_name, "My_Holiday.MTS");
        assert_eq!(request.state(), PipelineState::Received);
    }

    #[tokio::test]
    async fn test_empty_upload_is_rejected_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, transcoder) = pipeline(dir.path(), Ok("abc123"));

        let err = pipeline.run(Some("clip.mts"), body(&[])).await.unwrap_err();

        assert_matches!(err, Error::Validation(_));
        assert_eq!(pipeline.store().stats().outstanding(), 0);
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_interrupted_upload_is_released() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(dir.path(), Ok("abc123"));

        let broken = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(Error::validation("upload interrupted: connection reset")),
        ]);
        let err = pipeline.run(Some("clip.mts"), broken).await.unwrap_err();

        assert_matches!(err, Error::Validation(ref msg) if msg.contains("connection reset"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_body_over_limit_keeps_its_status() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, transcoder) = pipeline(dir.path(), Ok("abc123"));

        let oversized = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"first chunk")),
            Err(Error::too_large("length limit exceeded")),
        ]);
        let mut request = pipeline.accept(Some("clip.mts")).unwrap();
        let err = pipeline.stage(&mut request, oversized).await.unwrap_err();

        assert_eq!(err.http_status(), 413);
        assert_eq!(request.state, PipelineState::Failed);
        assert_eq!(pipeline.store().stats().outstanding(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_releases_output_and_mints_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(dir.path(), Err(PublishError::Transfer("503".into())));

        let err = pipeline.run(Some("clip.mts"), body(&[b"x"])).await.unwrap_err();

        assert_matches!(err, Error::Transfer(_));
        assert!(pipeline.registry().is_empty());
        assert_eq!(pipeline.store().stats(), crate::artifacts::ArtifactStats { created: 2, released: 2, leaked: 0 });
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_auth_failure_is_distinguishable() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(dir.path(), Err(PublishError::Auth("expired".into())));

        let err = pipeline.run(Some("clip.mts"), body(&[b"x"])).await.unwrap_err();
        assert_matches!(err, Error::Auth(_));
        assert_eq!(pipeline.store().stats().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_folder_is_passed_to_publisher() {
        struct FolderCheck;

        #[async_trait]
        impl Publisher for FolderCheck {
            async fn publish(
                &self,
                _artifact: &Artifact,
                destination: &Destination,
            ) -> std::result::Result<RemoteId, PublishError> {
                assert_eq!(destination.folder.as_deref(), Some("folder-9"));
                assert_eq!(destination.file_name, "clip.mp4");
                Ok(RemoteId::new("id"))
            }

            fn view_url(&self, id: &RemoteId) -> String {
                id.to_string()
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            ArtifactStore::with_default_suffixes(dir.path()).unwrap(),
            Arc::new(CountingTranscoder::default()),
            Arc::new(FolderCheck),
            Arc::new(TokenRegistry::new()),
        )
        .folder(Some("folder-9".into()));

        pipeline.run(Some("clip.mts"), body(&[b"x"])).await.unwrap();
    }
}
