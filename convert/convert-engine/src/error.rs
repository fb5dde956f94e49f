//! Error taxonomy for export and conversion.

use std::path::PathBuf;

use graph_ir::ValidationReport;
use model_ir::ModelError;
use model_resolve::{NormalizeError, ResolutionFailure};
use thiserror::Error;

/// Problems with an [`crate::ExportConfig`], rejected before tracing
/// begins. Distinct from trace failures by construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Input shape does not have rank 4 (batch, channels, height, width).
    #[error("input shape must have rank 4 (batch, channels, height, width), got rank {0}")]
    InvalidRank(usize),

    /// Input shape declares a zero extent.
    #[error("input shape axis {axis} has zero extent")]
    ZeroDimension {
        /// Offending axis.
        axis: usize,
    },

    /// No input names configured.
    #[error("at least one input name is required")]
    MissingInputName,

    /// No output names configured.
    #[error("at least one output name is required")]
    MissingOutputName,

    /// The same tensor name is declared twice.
    #[error("tensor name `{0}` is declared more than once")]
    DuplicateName(String),

    /// A dynamic-axes entry names a tensor that is not declared.
    #[error("dynamic axes reference undeclared tensor `{0}`")]
    UnknownDynamicTensor(String),

    /// A dynamic axis index exceeds the tensor's rank.
    #[error("dynamic axis {axis} is out of range for tensor `{tensor}` of rank {rank}")]
    AxisOutOfRange {
        /// Tensor name.
        tensor: String,
        /// Offending axis index.
        axis: usize,
        /// Tensor rank.
        rank: usize,
    },

    /// The exporter binds exactly one input tensor.
    #[error("this exporter binds exactly one input name, got {0}")]
    InputNameCount(usize),

    /// The exporter binds exactly one output tensor.
    #[error("this exporter binds exactly one output name, got {0}")]
    OutputNameCount(usize),
}

/// Errors from one export run.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Configuration rejected before tracing.
    #[error("invalid export configuration: {0}")]
    Config(#[from] ConfigError),

    /// The module's forward pass failed on the synthetic input.
    #[error("trace failed: {0}")]
    Trace(#[from] ModelError),

    /// A traced operation has no equivalent at the configured opset.
    #[error("operation {op} requires opset >= {required}, configured opset is {opset}")]
    UnsupportedOp {
        /// Graph operation name.
        op: &'static str,
        /// Minimum opset the operation needs.
        required: u32,
        /// Opset the configuration declares.
        opset: u32,
    },

    /// The artifact could not be written.
    #[error("failed to write artifact to {path}: {reason}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },
}

/// Failure outcome of a full conversion, tagged by stage.
///
/// Every stage reports explicitly; nothing is caught and continued past a
/// stage boundary. Retries exist only inside the strategy chain.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The input file does not exist; checked before any strategy runs.
    #[error("input checkpoint not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// No resolution strategy could produce a handle.
    #[error(transparent)]
    Resolution(#[from] ResolutionFailure),

    /// The resolved handle could not be normalized.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// The export stage failed.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// The written artifact failed structural validation; the bytes on
    /// disk are not a usable graph even though they were written.
    #[error("exported graph failed validation: {0}")]
    Validation(ValidationReport),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_descriptive() {
        assert!(ConfigError::InvalidRank(3).to_string().contains("rank 3"));
        assert!(ConfigError::AxisOutOfRange {
            tensor: "output".into(),
            axis: 5,
            rank: 3,
        }
        .to_string()
        .contains("rank 3"));
    }

    #[test]
    fn unsupported_op_names_the_gap() {
        let err = ExportError::UnsupportedOp {
            op: "Resize",
            required: 11,
            opset: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("Resize"));
        assert!(msg.contains("11"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn config_error_converts_to_export_error() {
        let err: ExportError = ConfigError::InvalidRank(2).into();
        assert!(matches!(err, ExportError::Config(ConfigError::InvalidRank(2))));
    }
}
