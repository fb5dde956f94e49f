//! In-memory data model for serialized computation graphs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::signature::TensorSignature;

/// Operation kinds understood by the target graph representation.
///
/// Each kind declares the minimum opset version that admits it; the
/// validator rejects graphs whose declared opset is below any node's
/// requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// 2D convolution.
    Conv,
    /// Batch normalization with frozen running statistics.
    BatchNormalization,
    /// Leaky rectified linear activation.
    LeakyRelu,
    /// Logistic sigmoid.
    Sigmoid,
    /// Elementwise multiplication.
    Mul,
    /// 2D max pooling.
    MaxPool,
    /// Shape change without data movement.
    Reshape,
    /// Axis permutation.
    Transpose,
    /// Concatenation along one axis.
    Concat,
    /// Spatial resampling (nearest-neighbor upsampling).
    Resize,
    /// Pass-through; subject to constant folding.
    Identity,
}

impl OpKind {
    /// Minimum opset version in which this operation is available.
    #[must_use]
    pub const fn min_opset(&self) -> u32 {
        match self {
            Self::Conv | Self::Transpose | Self::Identity => 1,
            Self::Concat => 4,
            Self::Reshape => 5,
            Self::LeakyRelu | Self::Sigmoid => 6,
            Self::Mul => 7,
            Self::MaxPool => 8,
            Self::BatchNormalization => 9,
            Self::Resize => 11,
        }
    }

    /// Operation name as spelled in the serialized graph.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Conv => "Conv",
            Self::BatchNormalization => "BatchNormalization",
            Self::LeakyRelu => "LeakyRelu",
            Self::Sigmoid => "Sigmoid",
            Self::Mul => "Mul",
            Self::MaxPool => "MaxPool",
            Self::Reshape => "Reshape",
            Self::Transpose => "Transpose",
            Self::Concat => "Concat",
            Self::Resize => "Resize",
            Self::Identity => "Identity",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Attribute value attached to a graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// Single integer.
    Int(i64),
    /// Integer list (strides, pads, permutations, shapes).
    Ints(Vec<i64>),
    /// Single float.
    Float(f32),
    /// Float list (resize scales).
    Floats(Vec<f32>),
    /// Text value.
    Text(String),
}

/// One operation in the frozen computation graph.
///
/// Inputs reference values produced by earlier nodes, declared graph
/// inputs, or initializers; outputs introduce new value names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique node name.
    pub name: String,
    /// Operation kind.
    pub op: OpKind,
    /// Consumed value names, in operator-defined order.
    pub inputs: Vec<String>,
    /// Produced value names.
    pub outputs: Vec<String>,
    /// Operator attributes.
    pub attrs: Vec<(String, AttrValue)>,
}

impl GraphNode {
    /// Creates a node with no attributes.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        op: OpKind,
        inputs: Vec<String>,
        outputs: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            op,
            inputs,
            outputs,
            attrs: Vec::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.push((name.into(), value));
        self
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// A weight constant embedded in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Initializer {
    /// Value name referenced by node inputs.
    pub name: String,
    /// Tensor dimensions.
    pub dims: Vec<u64>,
    /// Row-major element data.
    pub data: Vec<f32>,
}

impl Initializer {
    /// Creates a new initializer.
    #[must_use]
    pub fn new(name: impl Into<String>, dims: Vec<u64>, data: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            dims,
            data,
        }
    }

    /// Number of elements implied by the dimensions.
    #[must_use]
    pub fn element_count(&self) -> u64 {
        self.dims.iter().product()
    }
}

/// A complete serialized computation graph.
///
/// The declared `opset` applies to every node; `inputs` and `outputs`
/// carry the tensor signatures bound at export time, including symbolic
/// (dynamic) axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphModel {
    /// Declared operation-set version.
    pub opset: u32,
    /// Producing tool identifier.
    pub producer: String,
    /// Free-form metadata (model name, class names, source checkpoint).
    pub metadata: BTreeMap<String, String>,
    /// Declared graph inputs.
    pub inputs: Vec<TensorSignature>,
    /// Declared graph outputs.
    pub outputs: Vec<TensorSignature>,
    /// Topologically ordered operations.
    pub nodes: Vec<GraphNode>,
    /// Embedded weight constants.
    pub initializers: Vec<Initializer>,
}

impl GraphModel {
    /// Creates an empty graph with the given opset and producer.
    #[must_use]
    pub fn new(opset: u32, producer: impl Into<String>) -> Self {
        Self {
            opset,
            producer: producer.into(),
            metadata: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            nodes: Vec::new(),
            initializers: Vec::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Total number of weight elements across all initializers.
    #[must_use]
    pub fn parameter_count(&self) -> u64 {
        self.initializers.iter().map(Initializer::element_count).sum()
    }

    /// Looks up an initializer by value name.
    #[must_use]
    pub fn initializer(&self, name: &str) -> Option<&Initializer> {
        self.initializers.iter().find(|i| i.name == name)
    }
}
