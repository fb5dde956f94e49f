//! Tensor signatures with static and symbolic dimensions.

use serde::{Deserialize, Serialize};

/// Element type of a graph tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DType {
    /// 32-bit IEEE float.
    #[default]
    F32,
    /// 64-bit signed integer (shape and index tensors).
    I64,
}

impl DType {
    /// Returns the type name as used in signature displays.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::I64 => "i64",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single dimension of a tensor signature.
///
/// Static dimensions are fixed at export time; symbolic dimensions are left
/// unconstrained so the graph accepts any extent along that axis at
/// inference time (typically the batch axis).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dim {
    /// Fixed extent, frozen during tracing.
    Static(u64),
    /// Unconstrained extent, named for display (e.g. `batch`).
    Symbolic(String),
}

impl Dim {
    /// Returns the static extent, or `None` for symbolic dimensions.
    #[must_use]
    pub fn as_static(&self) -> Option<u64> {
        match self {
            Self::Static(n) => Some(*n),
            Self::Symbolic(_) => None,
        }
    }

    /// Returns `true` if this dimension is symbolic.
    #[must_use]
    pub const fn is_symbolic(&self) -> bool {
        matches!(self, Self::Symbolic(_))
    }
}

impl std::fmt::Display for Dim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(n) => write!(f, "{n}"),
            Self::Symbolic(name) => write!(f, "{name}"),
        }
    }
}

/// Declared name, type, and shape of a graph input or output.
///
/// # Example
///
/// ```
/// use graph_ir::{TensorSignature, DType, Dim};
///
/// let sig = TensorSignature::new(
///     "output",
///     DType::F32,
///     vec![Dim::Symbolic("batch".into()), Dim::Static(25200), Dim::Static(85)],
/// );
/// assert_eq!(sig.rank(), 3);
/// assert!(sig.dims[0].is_symbolic());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSignature {
    /// Tensor name bound at export time.
    pub name: String,
    /// Element type.
    pub dtype: DType,
    /// Per-axis dimensions.
    pub dims: Vec<Dim>,
}

impl TensorSignature {
    /// Creates a new signature.
    #[must_use]
    pub fn new(name: impl Into<String>, dtype: DType, dims: Vec<Dim>) -> Self {
        Self {
            name: name.into(),
            dtype,
            dims,
        }
    }

    /// Number of axes.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Indices of the symbolic axes.
    #[must_use]
    pub fn symbolic_axes(&self) -> Vec<usize> {
        self.dims
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.is_symbolic().then_some(i))
            .collect()
    }
}

impl std::fmt::Display for TensorSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(ToString::to_string).collect();
        write!(f, "{}: {}[{}]", self.name, self.dtype, dims.join(", "))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn dim_as_static() {
        assert_eq!(Dim::Static(640).as_static(), Some(640));
        assert_eq!(Dim::Symbolic("batch".into()).as_static(), None);
    }

    #[test]
    fn dim_display() {
        assert_eq!(Dim::Static(3).to_string(), "3");
        assert_eq!(Dim::Symbolic("batch".into()).to_string(), "batch");
    }

    #[test]
    fn signature_rank_and_symbolic_axes() {
        let sig = TensorSignature::new(
            "images",
            DType::F32,
            vec![
                Dim::Symbolic("batch".into()),
                Dim::Static(3),
                Dim::Static(640),
                Dim::Static(640),
            ],
        );
        assert_eq!(sig.rank(), 4);
        assert_eq!(sig.symbolic_axes(), vec![0]);
    }

    #[test]
    fn signature_display() {
        let sig = TensorSignature::new(
            "images",
            DType::F32,
            vec![Dim::Symbolic("batch".into()), Dim::Static(3)],
        );
        assert_eq!(sig.to_string(), "images: f32[batch, 3]");
    }

    #[test]
    fn signature_serde_roundtrip() {
        let sig = TensorSignature::new("x", DType::I64, vec![Dim::Static(2)]);
        let json = serde_json::to_string(&sig).unwrap();
        let back: TensorSignature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
    }
}
