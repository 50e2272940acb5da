//! Error types for glbridge

use thiserror::Error;

/// Main error type for glbridge operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid index references inside a mesh. Fatal for that object only.
    #[error("Malformed mesh '{object}': {reason}")]
    MalformedMesh { object: String, reason: String },

    /// An optional decimation backend is not compiled into this build.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Decimation produced a degenerate result: {0}")]
    DecimationDegenerate(String),

    #[error("Atlas packing failed for group '{group}': {reason}")]
    AtlasPackFailure { group: String, reason: String },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Server I/O error: {0}")]
    ServerIo(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn malformed(object: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedMesh {
            object: object.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for glbridge operations
pub type Result<T> = std::result::Result<T, Error>;
