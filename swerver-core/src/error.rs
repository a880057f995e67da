//! Error types for swerver.
//!
//! This module provides a unified error type for the request pipeline,
//! enabling consistent status mapping and client-safe error bodies.

use thiserror::Error;

/// Result type alias for swerver operations.
pub type Result<T> = std::result::Result<T, ServeError>;

/// Unified error type for the request pipeline and its collaborators.
///
/// Every request that does not produce a regular response produces exactly
/// one of these. The variants map onto the fixed status/slug/message table
/// that is exposed to clients; the payload strings are diagnostics for the
/// log only and are never written into a response body.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The request path escapes the public root or is otherwise malformed.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No file, directory or companion file matched the request path.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A content source whose seeks fail cannot be served.
    #[error("Seeker error: {0}")]
    SeekerError(String),

    /// Invalid configuration detected at startup.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A user-supplied pattern failed to compile.
    #[error("Pattern error: {0}")]
    PatternError(String),

    /// The upstream of a proxy rule failed or misbehaved.
    #[error("Upstream error: {0}")]
    UpstreamError(String),

    /// Filesystem failure other than not-exist / permission-denied.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error (from reqwest).
    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),
}

impl ServeError {
    /// Returns the HTTP status code to send for this error.
    pub fn status_code(&self) -> hyper::StatusCode {
        use hyper::StatusCode;

        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::SeekerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PatternError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io(err) => match err.kind() {
                std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
                std::io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::HttpClientError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the machine-readable code used in JSON error bodies.
    ///
    /// The set is closed: `bad_request`, `not_found` and
    /// `internal_server_error`. Everything else, including permission
    /// failures, collapses to `internal_server_error` the same way
    /// upstream transport errors do.
    pub fn slug(&self) -> &'static str {
        use hyper::StatusCode;

        match self.status_code() {
            StatusCode::BAD_REQUEST => "bad_request",
            StatusCode::NOT_FOUND => "not_found",
            _ => "internal_server_error",
        }
    }

    /// Returns the client-safe message for this error.
    ///
    /// The original diagnostic is never exposed; only this fixed table is.
    pub fn user_message(&self) -> &'static str {
        use hyper::StatusCode;

        match self.status_code() {
            StatusCode::BAD_REQUEST => "Bad request",
            StatusCode::NOT_FOUND => "The requested path could not be found",
            _ => "A server error has occurred",
        }
    }

    /// Returns true if this error should be logged at error level.
    ///
    /// Expected outcomes (404, preconditions, ranges) only warrant debug
    /// logging.
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}
