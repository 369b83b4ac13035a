//! Error types for the Cloud Build launcher core.

use thiserror::Error;

/// Errors produced by the transport, decoding, API and batch layers.
#[derive(Debug, Error)]
pub enum CloudBuildError {
    /// Connection, DNS or protocol failure. These are not distinguished.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a status other than the one the operation expects.
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),

    /// The request did not complete before the per-call deadline.
    #[error("request timed out")]
    Timeout,

    /// The response body was malformed or missing required fields.
    #[error("decode error: {0}")]
    Decode(String),

    /// Endpoint configuration is incomplete or unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Caller-supplied input (selection, branch name, identifier) was rejected.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A batch step reported failure.
    #[error("{verb} target:{target_id} failed.")]
    StepFailed { verb: String, target_id: String },

    /// The settings file could not be parsed or written.
    #[error("settings error: {0}")]
    Settings(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CloudBuildError {
    fn from(err: serde_json::Error) -> Self {
        CloudBuildError::Decode(err.to_string())
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, CloudBuildError>;
