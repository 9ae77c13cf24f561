//! One-time download of converted files.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use bytes::Bytes;
use clipforge_common::{Error, Token};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use super::error::AppError;
use super::AppContext;
use crate::artifacts::Artifact;

pub fn download_routes() -> Router<AppContext> {
    Router::new().route("/download/:token", get(download))
}

/// Response body that owns the artifact it streams.
///
/// The artifact is released when the stream reaches its end, or when the
/// body is dropped early (client went away, write error).
struct ArtifactBody {
    inner: ReaderStream<File>,
    artifact: Option<Artifact>,
}

impl ArtifactBody {
    fn new(file: File, artifact: Artifact) -> Self {
        Self {
            inner: ReaderStream::new(file),
            artifact: Some(artifact),
        }
    }
}

impl Stream for ArtifactBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let poll = Pin::new(&mut self.inner).poll_next(cx);
        if let Poll::Ready(None) = poll {
            if let Some(artifact) = self.artifact.take() {
                tracing::info!(file = %artifact.display_name(), "Download complete");
                artifact.release();
            }
        }
        poll
    }
}

/// Stream the converted file once, then forget the token.
///
/// Unknown, malformed and already-redeemed tokens all get the same 404;
/// nothing is read from disk for them.
async fn download(
    State(ctx): State<AppContext>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let token: Token = token
        .parse()
        .map_err(|_| Error::not_found("download token"))?;
    let artifact = ctx.registry.redeem(&token)?;

    let file = match File::open(artifact.path()).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found("download file").into());
        }
        Err(e) => return Err(Error::from(e).into()),
    };
    let size = file.metadata().await.map_err(Error::from)?.len();
    let file_name = artifact.display_name();

    tracing::info!(token = ?token, file = %file_name, bytes = size, "Serving download");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name.replace('"', "_")),
        )
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from_stream(ArtifactBody::new(file, artifact)))
        .map_err(|e| Error::internal(format!("cannot build download response: {e}")).into())
}
