//! Common error types used throughout clipforge.
//!
//! Every failure an upload or download can hit is folded into [`Error`]
//! before it reaches the HTTP layer, so handlers only ever see these kinds.

/// Request-level error type for clipforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The upload was missing, empty, or had a disallowed extension.
    #[error("Invalid upload: {0}")]
    Validation(String),

    /// The upload body went over the configured size limit.
    #[error("Upload too large: {0}")]
    TooLarge(String),

    /// The external conversion tool could not be launched or exited non-zero.
    #[error("{tool} failed: {message}")]
    Tool {
        /// Tool name (e.g. "ffmpeg").
        tool: String,
        /// Diagnostic output or launch error.
        message: String,
    },

    /// No valid storage credential could be obtained.
    #[error("Storage authorization failed: {0}")]
    Auth(String),

    /// The storage upload itself failed.
    #[error("Storage upload failed: {0}")]
    Transfer(String),

    /// Temp space could not be allocated or written.
    #[error("Resource error: {0}")]
    Resource(String),

    /// The requested download token is unknown or already redeemed.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new Validation error.
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new TooLarge error.
    pub fn too_large<S: Into<String>>(msg: S) -> Self {
        Self::TooLarge(msg.into())
    }

    /// Create a new Tool error.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a new Auth error.
    pub fn auth<S: Into<String>>(msg: S) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a new Transfer error.
    pub fn transfer<S: Into<String>>(msg: S) -> Self {
        Self::Transfer(msg.into())
    }

    /// Create a new Resource error.
    pub fn resource<S: Into<String>>(msg: S) -> Self {
        Self::Resource(msg.into())
    }

    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status code a handler should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::TooLarge(_) => 413,
            Error::NotFound(_) => 404,
            Error::Tool { .. } => 502,
            Error::Auth(_) => 502,
            Error::Transfer(_) => 502,
            Error::Resource(_) => 500,
            Error::Io(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code for logs and response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::TooLarge(_) => "payload_too_large",
            Error::NotFound(_) => "not_found",
            Error::Tool { .. } => "transcode_error",
            Error::Auth(_) => "auth_error",
            Error::Transfer(_) => "transfer_error",
            Error::Resource(_) => "resource_error",
            Error::Io(_) => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
