//! Error types for checkpoint reading and normalization.

use model_ir::ModelError;
use thiserror::Error;

/// Errors from the binary archive container.
#[derive(Debug, Error)]
pub enum FormatError {
    /// IO error while reading or writing the archive.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File does not start with the `CFA1` magic bytes.
    #[error("invalid archive magic bytes: {0:?}")]
    InvalidMagic([u8; 4]),

    /// File declares a container version this build does not understand.
    #[error("unsupported archive version: {0}")]
    UnsupportedVersion(u32),

    /// Payload could not be encoded.
    #[error("archive serialization failed: {0}")]
    Encode(String),

    /// Payload could not be decoded.
    #[error("archive deserialization failed: {0}")]
    Decode(String),
}

/// Errors from normalizing a resolved checkpoint handle.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The checkpoint carries only parameters. Without an architecture
    /// definition it cannot be made invocable; this is structurally
    /// unrecoverable rather than a transient failure.
    #[error(
        "checkpoint contains only a state dictionary ({params} parameters); \
         an architecture definition is required to rebuild an invocable module"
    )]
    ArchitectureRequired {
        /// Number of parameters in the orphaned state dictionary.
        params: usize,
    },

    /// A supplied architecture reconstructor was tried and failed.
    #[error("architecture reconstruction failed: {0}")]
    Reconstruct(String),

    /// The wrapped container holds neither a `model` nor a `state_dict`
    /// entry.
    #[error("unrecognized checkpoint container; top-level keys: [{keys}]")]
    UnrecognizedContainer {
        /// Comma-joined top-level keys, for diagnostics.
        keys: String,
    },

    /// A wrapped entry exists but does not decode to the expected payload.
    #[error("failed to decode wrapped `{entry}` entry: {reason}")]
    Decode {
        /// Entry name (`model` or `state_dict`).
        entry: &'static str,
        /// Decoder message.
        reason: String,
    },

    /// Module construction from the decoded archive failed.
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn architecture_required_names_param_count() {
        let err = NormalizeError::ArchitectureRequired { params: 12 };
        assert!(err.to_string().contains("12 parameters"));
        assert!(err.to_string().contains("architecture definition"));
    }

    #[test]
    fn unrecognized_container_lists_keys() {
        let err = NormalizeError::UnrecognizedContainer {
            keys: "epoch, optimizer".into(),
        };
        assert!(err.to_string().contains("epoch, optimizer"));
    }

    #[test]
    fn format_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: FormatError = io_err.into();
        assert!(matches!(err, FormatError::Io(_)));
    }
}
