//! Mapping request errors onto HTTP responses.

use super::pages;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use clipforge_common::Error;

/// Handler-level error; renders the error page with the matching status.
#[derive(Debug)]
pub struct AppError(pub Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Message shown to the user.
    fn user_message(&self) -> String {
        match &self.0 {
            Error::Validation(msg) => msg.clone(),
            Error::TooLarge(_) => "The upload is larger than this server accepts.".to_string(),
            Error::NotFound(_) => "This download is not available: it was already downloaded or is missing.".to_string(),
            Error::Tool { .. } => "Conversion failed. Please check that the file is a valid video.".to_string(),
            Error::Auth(_) => "Could not authorize with storage. The server operator needs to run `clipforge authorize`.".to_string(),
            Error::Transfer(_) => "Upload to storage failed. Please try again.".to_string(),
            Error::Resource(_) | Error::Io(_) | Error::Internal(_) => {
                "The server could not process this upload.".to_string()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self.0 {
            Error::NotFound(what) => tracing::debug!(what = %what, "Not found"),
            Error::Validation(msg) | Error::TooLarge(msg) => {
                tracing::debug!(code = self.0.code(), error = %msg, "Rejected upload")
            }
            err if status.is_server_error() => {
                tracing::error!(code = err.code(), error = %err, "Request failed")
            }
            err => tracing::warn!(code = err.code(), error = %err, "Request failed"),
        }

        (status, Html(pages::error_page(&self.user_message()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError(Error::validation("x")).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError(Error::not_found("t")).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError(Error::too_large("limit")).status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(AppError(Error::tool("ffmpeg", "boom")).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError(Error::auth("expired")).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError(Error::transfer("503")).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError(Error::resource("disk full")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_are_not_shown() {
        let message = AppError(Error::resource("/tmp/clipforge: disk full")).user_message();
        assert!(!message.contains("/tmp"));

        let message = AppError(Error::auth("token revoked")).user_message();
        assert!(message.contains("clipforge authorize"));
    }
}
