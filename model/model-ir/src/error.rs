//! Error types for module construction and execution.

use thiserror::Error;

/// Errors that can occur when building or running a detector module.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Architecture description is internally inconsistent.
    #[error("invalid detector spec: {0}")]
    InvalidSpec(String),

    /// A parameter named by the spec is absent from the state dictionary.
    #[error("missing parameter: {name}")]
    MissingParameter {
        /// Parameter name.
        name: String,
    },

    /// A parameter's stored shape differs from the shape the spec implies.
    #[error("shape mismatch for {name}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Parameter or tensor name.
        name: String,
        /// Expected shape.
        expected: String,
        /// Actual shape.
        actual: String,
    },

    /// Input channel count differs from the module's expectation.
    #[error("input has {actual} channels, module expects {expected}")]
    ChannelMismatch {
        /// Channels the module was built for.
        expected: usize,
        /// Channels in the provided input.
        actual: usize,
    },

    /// Input spatial extent is not divisible by the module's total stride.
    #[error("input extent {size} is not divisible by total stride {stride}")]
    StrideMismatch {
        /// Offending spatial extent.
        size: usize,
        /// Required divisor.
        stride: usize,
    },

    /// Trace was requested while the module is in training mode.
    #[error("tracing requires evaluation mode; call set_training(false) first")]
    TrainingMode,

    /// Tensor data could not be extracted from the backend.
    #[error("tensor data capture failed: {0}")]
    TensorData(String),
}

impl ModelError {
    /// Creates an invalid-spec error.
    #[must_use]
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        Self::InvalidSpec(reason.into())
    }

    /// Creates a missing-parameter error.
    #[must_use]
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    /// Creates a shape-mismatch error.
    #[must_use]
    pub fn shape_mismatch(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ShapeMismatch {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Result type for model-ir operations.
pub type Result<T> = std::result::Result<T, ModelError>;
