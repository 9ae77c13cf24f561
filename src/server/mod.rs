use crate::artifacts::ArtifactStore;
use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::publish::{DriveClient, FileCredentialCache, Publisher};
use crate::tokens::TokenRegistry;
use crate::transcode::{FfmpegTranscoder, Transcoder};
use anyhow::{Context, Result};
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

pub mod error;
pub mod pages;
pub mod routes_download;
pub mod routes_upload;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Upload pipeline (transcode, publish, mint)
    pub pipeline: Arc<Pipeline>,
    /// Outstanding one-time downloads
    pub registry: Arc<TokenRegistry>,
}

impl AppContext {
    /// Wire the context from explicit collaborators.
    pub fn new(
        config: Config,
        store: ArtifactStore,
        transcoder: Arc<dyn Transcoder>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let registry = Arc::new(TokenRegistry::new());
        let pipeline = Pipeline::new(store, transcoder, publisher, Arc::clone(&registry))
            .allowed_extensions(config.upload.allowed_extensions.clone())
            .output_extension(config.artifacts.output_suffix.clone())
            .folder(config.storage.folder_id.clone());

        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            registry,
        }
    }

    /// Build the production context: ffmpeg on disk, Drive behind the
    /// cached credential.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = ArtifactStore::new(
            config.artifacts.temp_dir(),
            config.artifacts.input_suffix.clone(),
            config.artifacts.output_suffix.clone(),
        )
        .context("Failed to prepare artifact directory")?;

        let transcoder =
            FfmpegTranscoder::from_config(&config.transcode).context("ffmpeg is not available")?;
        tracing::info!("Using ffmpeg at {}", transcoder.binary().display());

        let http = reqwest::Client::new();
        let credentials = Arc::new(FileCredentialCache::new(
            config.storage.credentials_path.clone(),
            http.clone(),
        ));
        let drive = DriveClient::new(http, &config.storage.upload_url, credentials)
            .context("Invalid storage configuration")?;

        Ok(Self::new(config, store, Arc::new(transcoder), Arc::new(drive)))
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let max_upload = ctx.config.server.max_upload_bytes;

    Router::new()
        .route("/health", get(health_check))
        .merge(routes_upload::upload_routes())
        .merge(routes_download::download_routes())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> &'static str {
    "ok"
}

/// Start the HTTP server on the configured address
pub async fn start_server(ctx: AppContext) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        .parse()
        .context("Invalid server address")?;

    tracing::info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    serve(listener, ctx, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// Downloads that were never redeemed are released once the server stops.
pub async fn serve(
    listener: TcpListener,
    ctx: AppContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let registry = Arc::clone(&ctx.registry);
    let app = create_router(ctx);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    drop(registry.drain());
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
