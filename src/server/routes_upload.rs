//! Upload form and submission.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use clipforge_common::Error;
use futures::TryStreamExt;
use std::sync::Arc;

use super::error::AppError;
use super::{pages, AppContext};

pub fn upload_routes() -> Router<AppContext> {
    Router::new().route("/", get(index).post(upload))
}

async fn index(State(ctx): State<AppContext>) -> Html<String> {
    Html(pages::index_page(ctx.pipeline.allowed()))
}

/// Accept one multipart `file` field and run it through the pipeline.
///
/// The body is staged inside the handler; conversion and publishing run in
/// their own task so a client that disconnects mid-conversion does not abort
/// ffmpeg or the storage upload half way.
async fn upload(
    State(ctx): State<AppContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Html<String>, AppError> {
    let mut multipart =
        multipart.map_err(|e| Error::validation(format!("expected a multipart upload: {e}")))?;

    let (request, input) = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| body_error("malformed upload", e))?
            .ok_or_else(|| Error::validation("no file part in request"))?;

        if field.name() != Some("file") {
            continue;
        }

        let mut request = ctx.pipeline.accept(field.file_name())?;
        let body = field.map_err(|e| body_error("upload interrupted", e));
        let input = ctx.pipeline.stage(&mut request, Box::pin(body)).await?;
        break (request, input);
    };

    let pipeline = Arc::clone(&ctx.pipeline);
    let outcome = tokio::spawn(async move { pipeline.process(request, input).await })
        .await
        .map_err(|e| Error::internal(format!("pipeline task failed: {e}")))??;

    Ok(Html(pages::success_page(
        &outcome.view_url,
        &outcome.download_path(),
        &outcome.file_name,
        ctx.pipeline.allowed(),
    )))
}

/// Body read errors; going over the request body limit is a 413 wherever it
/// is noticed.
fn body_error(context: &str, e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::too_large(format!("{context}: {}", e.body_text()))
    } else {
        Error::validation(format!("{context}: {}", e.body_text()))
    }
}
