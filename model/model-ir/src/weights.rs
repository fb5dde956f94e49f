//! Parameter storage shared by every checkpoint convention.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ModelError, Result};

/// A single stored parameter: dimensions plus row-major element data.
///
/// # Example
///
/// ```
/// use model_ir::WeightTensor;
///
/// let w = WeightTensor::new(vec![2, 3], vec![0.0; 6]).unwrap();
/// assert_eq!(w.element_count(), 6);
/// assert_eq!(w.rank(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTensor {
    /// Tensor dimensions.
    pub dims: Vec<usize>,
    /// Row-major element data.
    pub data: Vec<f32>,
}

impl WeightTensor {
    /// Creates a weight tensor, checking that the data length matches the
    /// dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ShapeMismatch`] if `data.len()` differs from
    /// the product of `dims`.
    pub fn new(dims: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = dims.iter().product();
        if data.len() != expected {
            return Err(ModelError::shape_mismatch(
                "weight tensor",
                format!("{expected} elements"),
                format!("{} elements", data.len()),
            ));
        }
        Ok(Self { dims, data })
    }

    /// Creates a zero-filled tensor of the given dimensions.
    #[must_use]
    pub fn zeros(dims: Vec<usize>) -> Self {
        let count = dims.iter().product();
        Self {
            dims,
            data: vec![0.0; count],
        }
    }

    /// Number of stored elements.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.data.len()
    }

    /// Number of axes.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Checks the stored dimensions against an expected shape.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ShapeMismatch`] naming `name` when the shapes
    /// differ.
    pub fn expect_dims(&self, name: &str, expected: &[usize]) -> Result<()> {
        if self.dims != expected {
            return Err(ModelError::shape_mismatch(
                name,
                format!("{expected:?}"),
                format!("{:?}", self.dims),
            ));
        }
        Ok(())
    }
}

/// Mapping from parameter name to parameter value, without an accompanying
/// executable structure.
pub type StateDict = BTreeMap<String, WeightTensor>;

/// Fetches a parameter from a state dictionary by name.
///
/// # Errors
///
/// Returns [`ModelError::MissingParameter`] when the name is absent.
pub fn take_param(state: &StateDict, name: &str) -> Result<WeightTensor> {
    state
        .get(name)
        .cloned()
        .ok_or_else(|| ModelError::missing_parameter(name))
}
