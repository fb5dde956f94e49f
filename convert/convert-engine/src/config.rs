//! The export configuration value object.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ConfigError;

/// Everything one export run needs, threaded explicitly through every
/// stage. There is no process-wide default state.
///
/// The default matches the conventional detector export: a
/// `[1, 3, 640, 640]` synthetic input, opset 12, tensors named `images`
/// and `output`, the batch axis dynamic on both, and constant folding
/// enabled.
///
/// # Example
///
/// ```
/// use convert_engine::ExportConfig;
///
/// let config = ExportConfig::default().with_input_size(320).with_opset(13);
/// assert_eq!(config.input_shape, vec![1, 3, 320, 320]);
/// assert_eq!(config.opset, 13);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// Synthetic input shape: batch, channels, height, width.
    pub input_shape: Vec<usize>,
    /// Declared operation-set version.
    pub opset: u32,
    /// Names bound to the graph inputs, in order.
    pub input_names: Vec<String>,
    /// Names bound to the graph outputs, in order.
    pub output_names: Vec<String>,
    /// Per-tensor axes left unconstrained at inference time.
    pub dynamic_axes: BTreeMap<String, BTreeSet<usize>>,
    /// Whether to fold pass-through nodes and orphaned initializers.
    pub constant_folding: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        let mut dynamic_axes = BTreeMap::new();
        dynamic_axes.insert("images".to_string(), BTreeSet::from([0]));
        dynamic_axes.insert("output".to_string(), BTreeSet::from([0]));
        Self {
            input_shape: vec![1, 3, 640, 640],
            opset: 12,
            input_names: vec!["images".to_string()],
            output_names: vec!["output".to_string()],
            dynamic_axes,
            constant_folding: true,
        }
    }
}

impl ExportConfig {
    /// Replaces the full input shape.
    #[must_use]
    pub fn with_input_shape(mut self, shape: Vec<usize>) -> Self {
        self.input_shape = shape;
        self
    }

    /// Sets a square `size x size` input with batch 1 and three channels.
    #[must_use]
    pub fn with_input_size(mut self, size: usize) -> Self {
        self.input_shape = vec![1, 3, size, size];
        self
    }

    /// Sets the target opset version.
    #[must_use]
    pub const fn with_opset(mut self, opset: u32) -> Self {
        self.opset = opset;
        self
    }

    /// Replaces the input names.
    #[must_use]
    pub fn with_input_names(mut self, names: Vec<String>) -> Self {
        self.input_names = names;
        self
    }

    /// Replaces the output names.
    #[must_use]
    pub fn with_output_names(mut self, names: Vec<String>) -> Self {
        self.output_names = names;
        self
    }

    /// Replaces the dynamic-axes map.
    #[must_use]
    pub fn with_dynamic_axes(mut self, axes: BTreeMap<String, BTreeSet<usize>>) -> Self {
        self.dynamic_axes = axes;
        self
    }

    /// Enables or disables constant folding.
    #[must_use]
    pub const fn with_constant_folding(mut self, enabled: bool) -> Self {
        self.constant_folding = enabled;
        self
    }

    /// Dynamic axes declared for `tensor`, if any.
    #[must_use]
    pub fn dynamic_axes_for(&self, tensor: &str) -> Option<&BTreeSet<usize>> {
        self.dynamic_axes.get(tensor)
    }

    /// Checks the configuration before any tracing happens.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found: wrong input rank, zero
    /// extents, missing or duplicate tensor names, or dynamic axes that
    /// reference undeclared tensors or out-of-range input axes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rank = self.input_shape.len();
        if rank != 4 {
            return Err(ConfigError::InvalidRank(rank));
        }
        for (axis, &extent) in self.input_shape.iter().enumerate() {
            if extent == 0 {
                return Err(ConfigError::ZeroDimension { axis });
            }
        }
        if self.input_names.is_empty() {
            return Err(ConfigError::MissingInputName);
        }
        if self.output_names.is_empty() {
            return Err(ConfigError::MissingOutputName);
        }

        let mut seen = BTreeSet::new();
        for name in self.input_names.iter().chain(&self.output_names) {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateName(name.clone()));
            }
        }

        for (tensor, axes) in &self.dynamic_axes {
            if !seen.contains(tensor.as_str()) {
                return Err(ConfigError::UnknownDynamicTensor(tensor.clone()));
            }
            if self.input_names.iter().any(|n| n == tensor) {
                for &axis in axes {
                    if axis >= rank {
                        return Err(ConfigError::AxisOutOfRange {
                            tensor: tensor.clone(),
                            axis,
                            rank,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_detector_convention() {
        let config = ExportConfig::default();
        assert_eq!(config.input_shape, vec![1, 3, 640, 640]);
        assert_eq!(config.opset, 12);
        assert_eq!(config.input_names, vec!["images".to_string()]);
        assert_eq!(config.output_names, vec!["output".to_string()]);
        assert_eq!(config.dynamic_axes_for("images"), Some(&BTreeSet::from([0])));
        assert_eq!(config.dynamic_axes_for("output"), Some(&BTreeSet::from([0])));
        assert!(config.constant_folding);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rank_other_than_four_is_rejected() {
        let config = ExportConfig::default().with_input_shape(vec![3, 640, 640]);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRank(3))));
    }

    #[test]
    fn zero_extent_is_rejected() {
        let config = ExportConfig::default().with_input_shape(vec![0, 3, 640, 640]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDimension { axis: 0 })
        ));
    }

    #[test]
    fn empty_names_are_rejected() {
        let config = ExportConfig::default().with_input_names(Vec::new());
        assert!(matches!(config.validate(), Err(ConfigError::MissingInputName)));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let config = ExportConfig::default().with_output_names(vec!["images".into()]);
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateName(_))));
    }

    #[test]
    fn dynamic_axes_must_reference_declared_tensors() {
        let mut axes = BTreeMap::new();
        axes.insert("ghost".to_string(), BTreeSet::from([0]));
        let config = ExportConfig::default().with_dynamic_axes(axes);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownDynamicTensor(_))
        ));
    }

    #[test]
    fn input_dynamic_axis_must_be_in_range() {
        let mut axes = BTreeMap::new();
        axes.insert("images".to_string(), BTreeSet::from([4]));
        let config = ExportConfig::default().with_dynamic_axes(axes);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AxisOutOfRange { axis: 4, .. })
        ));
    }

    #[test]
    fn input_size_builder_keeps_batch_and_channels() {
        let config = ExportConfig::default().with_input_size(416);
        assert_eq!(config.input_shape, vec![1, 3, 416, 416]);
    }
}
