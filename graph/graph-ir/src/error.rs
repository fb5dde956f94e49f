//! Error types for graph serialization and loading.

use thiserror::Error;

/// Errors that can occur when reading or writing graph artifacts.
#[derive(Debug, Error)]
pub enum GraphError {
    /// IO error while reading or writing the artifact.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File does not start with the `IRG1` magic bytes.
    #[error("invalid graph magic bytes: {0:?}")]
    InvalidMagic([u8; 4]),

    /// File declares a format version this build does not understand.
    #[error("unsupported graph format version: {0}")]
    UnsupportedVersion(u32),

    /// Payload could not be encoded.
    #[error("graph serialization failed: {0}")]
    Serialize(String),

    /// Payload could not be decoded.
    #[error("graph deserialization failed: {0}")]
    Deserialize(String),
}

/// Result type for graph-ir operations.
pub type Result<T> = std::result::Result<T, GraphError>;
