// src/core/errors.rs

//! The error type every subsystem reports through.

use thiserror::Error;

/// Every failure the control plane can surface. Most variants end the
/// current message and bubble up through the dispatcher; `RollbackFailed`
/// additionally signals that cluster state may be inconsistent, and
/// `Cancelled` marks an orderly shutdown rather than a fault.
#[derive(Error, Debug)]
pub enum ScaleGuardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Elasticsearch returned {status}: {body}")]
    Elasticsearch { status: u16, body: String },

    #[error("Cloud control plane error: {0}")]
    CloudApi(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Malformed lifecycle message: {0}")]
    MessageDecode(String),

    #[error("Unknown lifecycle transition '{0}'")]
    UnknownTransition(String),

    #[error("Inconsistent node responses: {0}")]
    InconsistentNodes(String),

    #[error("Unparseable shard node cell '{0}'")]
    ShardCellParse(String),

    #[error("Snapshot repository '{repository}' exists with type '{actual}', expected '{expected}'")]
    WrongRepoType {
        repository: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Rollback failed, cluster state may be inconsistent: {0}")]
    RollbackFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

// --- From conversions ---

impl From<reqwest::Error> for ScaleGuardError {
    fn from(e: reqwest::Error) -> Self {
        ScaleGuardError::HttpClient(e.to_string())
    }
}

impl From<serde_json::Error> for ScaleGuardError {
    fn from(e: serde_json::Error) -> Self {
        ScaleGuardError::MessageDecode(format!("JSON error: {e}"))
    }
}

impl From<chrono::ParseError> for ScaleGuardError {
    fn from(e: chrono::ParseError) -> Self {
        ScaleGuardError::MessageDecode(format!("bad timestamp: {e}"))
    }
}

impl From<url::ParseError> for ScaleGuardError {
    fn from(e: url::ParseError) -> Self {
        ScaleGuardError::InvalidConfig(format!("bad URL: {e}"))
    }
}
