//! Error types for the simulation core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CyberscapeError {
    /// A shape factory was asked for a variant that does not exist.
    #[error("unknown shape kind: {0:?}")]
    UnknownShapeKind(String),

    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CyberscapeError>;
