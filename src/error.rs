//! Error types for mangadex-cbz
//!
//! This module provides the error taxonomy shared by the fetcher, the
//! archive pipeline, the job orchestrator and the control plane:
//! - Transport and HTTP status failures from the bounded fetcher
//! - Catalog resolution failures (missing volume, missing chapter data)
//! - Job failures recorded on a failed job
//! - HTTP status code mapping and a JSON error envelope for the API

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for mangadex-cbz operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mangadex-cbz
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "jobs.max_concurrent_jobs")
        key: Option<String>,
    },

    /// Transport-level failure (DNS, connect, timeout, body read)
    #[error("network error for {url}: {message}")]
    Network {
        /// The locator that was being fetched
        url: String,
        /// Description of the transport failure
        message: String,
    },

    /// The remote answered with a non-2xx status
    #[error("GET {url} → HTTP {status}")]
    HttpStatus {
        /// The locator that was fetched
        url: String,
        /// HTTP status code returned by the remote
        status: u16,
        /// Response body (lossy UTF-8, truncated)
        body: String,
    },

    /// A logical catalog item could not be resolved
    #[error("{0}")]
    Resolution(String),

    /// A job ended in the failed state
    #[error(transparent)]
    Job(#[from] JobFailure),

    /// Artifact or task not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Control-plane request was malformed
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Asset transform (decode/rotate/encode) failed
    #[error("failed to transform {name}: {message}")]
    Transform {
        /// Entry name of the asset being transformed
        name: String,
        /// Underlying decoder/encoder message
        message: String,
    },

    /// Archive writer failure
    #[error("archive error for {path}: {message}")]
    Archive {
        /// Path of the archive being written
        path: PathBuf,
        /// Underlying zip writer message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The async bridge worker is no longer running
    #[error("async bridge is stopped")]
    BridgeStopped,

    /// A synchronous wait on a bridge task elapsed
    #[error("timed out after {0:?} waiting for task result")]
    Timeout(std::time::Duration),

    /// A task panicked instead of returning a result
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Failure detail attached to a job in the failed state
///
/// Holds the rendered message of whichever error ended the job, so the
/// failure can be cloned into snapshots without keeping the source error alive.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, ToSchema)]
#[error("{detail}")]
pub struct JobFailure {
    /// Human-readable failure detail
    pub detail: String,
}

impl JobFailure {
    /// Build a failure record from any displayable error
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl From<&Error> for JobFailure {
    fn from(error: &Error) -> Self {
        match error {
            Error::Job(failure) => failure.clone(),
            other => JobFailure::new(other.to_string()),
        }
    }
}

impl Error {
    /// True for errors caused by the remote side rather than local state
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Network { .. } | Error::HttpStatus { .. })
    }
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "not found: artifact for task 3f2a…",
///     "details": { "task_id": "3f2a…" }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "invalid_request")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // Malformed control-plane input is answered like an unknown route
            Error::InvalidRequest(_) => 404,
            Error::NotFound(_) => 404,
            Error::Resolution(_) => 404,

            Error::Config { .. } => 400,
            Error::Job(_) => 422,
            Error::Transform { .. } => 422,

            Error::Network { .. } => 502,
            Error::HttpStatus { .. } => 502,

            Error::BridgeStopped => 503,
            Error::Timeout(_) => 504,

            Error::Archive { .. } => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::TaskPanicked(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Network { .. } => "network_error",
            Error::HttpStatus { .. } => "http_status_error",
            Error::Resolution(_) => "resolution_error",
            Error::Job(_) => "job_failed",
            Error::NotFound(_) => "not_found",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Transform { .. } => "transform_error",
            Error::Archive { .. } => "archive_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::BridgeStopped => "bridge_stopped",
            Error::Timeout(_) => "timeout",
            Error::TaskPanicked(_) => "internal_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::HttpStatus { url, status, .. } => Some(serde_json::json!({
                "url": url,
                "status": status,
            })),
            Error::Network { url, .. } => Some(serde_json::json!({ "url": url })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            Error::Archive { path, .. } => Some(serde_json::json!({ "path": path })),
            _ => None,
        };

        match details {
            Some(details) => ApiError::with_details(code, message, details),
            None => ApiError::new(code, message),
        }
    }
}
