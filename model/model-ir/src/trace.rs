//! Trace recording for trace-based export.
//!
//! A trace is the flat list of tensor operations one forward pass actually
//! performed, with every intermediate value named and every output shape
//! frozen from the concrete tensors. The export engine lowers a trace into
//! the portable graph format.

/// Captured parameter data attached to a traced operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceParam {
    /// Parameter name (shared with the state-dict naming scheme).
    pub name: String,
    /// Tensor dimensions.
    pub dims: Vec<usize>,
    /// Row-major element data.
    pub data: Vec<f32>,
}

/// The operation kinds a forward pass can record.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceOpKind {
    /// 2D convolution; params carry weight and optional bias.
    Conv {
        /// Spatial stride.
        stride: usize,
        /// Spatial zero padding.
        padding: usize,
        /// Square kernel extent.
        kernel: usize,
    },
    /// Batch normalization with frozen statistics; params carry
    /// gamma, beta, mean, and variance.
    BatchNorm {
        /// Numerical stability term.
        epsilon: f32,
    },
    /// Sigmoid-weighted linear unit.
    Silu,
    /// Leaky rectified linear unit.
    LeakyRelu {
        /// Slope for negative inputs.
        slope: f32,
    },
    /// Logistic sigmoid.
    Sigmoid,
    /// 2D max pooling.
    MaxPool {
        /// Square window extent.
        kernel: usize,
        /// Spatial stride.
        stride: usize,
    },
    /// Nearest-neighbor spatial upsampling.
    Upsample {
        /// Integer scale factor.
        scale: usize,
    },
    /// Shape change; a leading `0` copies the incoming batch extent.
    Reshape {
        /// Target shape.
        shape: Vec<i64>,
    },
    /// Axis permutation.
    Transpose {
        /// Axis order.
        perm: Vec<usize>,
    },
    /// Concatenation along one axis.
    Concat {
        /// Concatenation axis.
        axis: usize,
    },
}

/// One recorded operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceOp {
    /// Operation name, derived from the module path (e.g. `stem.0`).
    pub name: String,
    /// Operation kind with its attributes.
    pub kind: TraceOpKind,
    /// Consumed value names.
    pub inputs: Vec<String>,
    /// Produced value name.
    pub output: String,
    /// Captured parameters consumed in addition to `inputs`.
    pub params: Vec<TraceParam>,
    /// Concrete output shape observed during the traced run.
    pub out_dims: Vec<usize>,
}

/// A completed trace: the recorded operations plus the input and output
/// bindings of the traced run.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceGraph {
    /// Value name bound to the traced input.
    pub input: String,
    /// Concrete input shape.
    pub input_dims: Vec<usize>,
    /// Value name holding the final output.
    pub output: String,
    /// Concrete output shape.
    pub output_dims: Vec<usize>,
    /// Operations in execution order.
    pub ops: Vec<TraceOp>,
}

impl TraceGraph {
    /// Starts a trace for an input of the given shape.
    #[must_use]
    pub fn new(input: impl Into<String>, input_dims: Vec<usize>) -> Self {
        let input = input.into();
        Self {
            output: input.clone(),
            input,
            input_dims,
            output_dims: Vec::new(),
            ops: Vec::new(),
        }
    }

    /// Records one operation and advances the running output binding.
    pub fn record(&mut self, op: TraceOp) {
        self.output = op.output.clone();
        self.output_dims = op.out_dims.clone();
        self.ops.push(op);
    }

    /// Number of recorded operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn record_advances_output_binding() {
        let mut trace = TraceGraph::new("input", vec![1, 3, 8, 8]);
        assert_eq!(trace.output, "input");
        trace.record(TraceOp {
            name: "stem.0".into(),
            kind: TraceOpKind::Conv {
                stride: 2,
                padding: 1,
                kernel: 3,
            },
            inputs: vec!["input".into()],
            output: "stem.0.out".into(),
            params: Vec::new(),
            out_dims: vec![1, 4, 4, 4],
        });
        assert_eq!(trace.output, "stem.0.out");
        assert_eq!(trace.output_dims, vec![1, 4, 4, 4]);
        assert_eq!(trace.len(), 1);
        assert!(!trace.is_empty());
    }
}
