//! The complete exportable unit produced by the detector trainer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::spec::DetectorSpec;
use crate::weights::StateDict;

/// Architecture plus parameters plus training metadata.
///
/// This is the payload of the modern binary checkpoint convention and of
/// the `model` entry in dict-wrapped checkpoints. An archive is sufficient
/// to build an invocable [`crate::DetectorModule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorArchive {
    /// Architecture description.
    pub spec: DetectorSpec,
    /// Bound parameters.
    pub weights: StateDict,
    /// Class labels, indexed by class id.
    #[serde(default)]
    pub class_names: Vec<String>,
    /// Free-form training metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DetectorArchive {
    /// Creates an archive from a spec and its weights.
    #[must_use]
    pub fn new(spec: DetectorSpec, weights: StateDict) -> Self {
        Self {
            spec,
            weights,
            class_names: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Sets the class labels.
    #[must_use]
    pub fn with_class_names(mut self, names: Vec<String>) -> Self {
        self.class_names = names;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Total parameter element count.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.weights.values().map(super::WeightTensor::element_count).sum()
    }

    /// Checks that the stored weights cover the spec's parameters with the
    /// expected shapes.
    ///
    /// # Errors
    ///
    /// Returns a missing-parameter or shape-mismatch error for the first
    /// discrepancy.
    pub fn check_weights(&self) -> Result<()> {
        for (name, dims) in self.spec.param_shapes() {
            let tensor = crate::weights::take_param(&self.weights, &name)?;
            tensor.expect_dims(&name, &dims)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::spec::{ConvSpec, HeadSpec, LayerSpec};
    use crate::ModelError;

    fn tiny_spec() -> DetectorSpec {
        DetectorSpec {
            name: "tiny".into(),
            input_channels: 3,
            stem: vec![LayerSpec::Conv(ConvSpec::downsample(4))],
            heads: vec![HeadSpec::new(vec![LayerSpec::Conv(ConvSpec::downsample(4))])],
            num_classes: 1,
            anchors: 2,
        }
    }

    #[test]
    fn archive_with_init_weights_checks_out() {
        let spec = tiny_spec();
        let archive = DetectorArchive::new(spec.clone(), spec.init_weights())
            .with_class_names(vec!["plate".into()])
            .with_metadata("trainer", "forge-train 0.4");
        assert!(archive.check_weights().is_ok());
        assert!(archive.param_count() > 0);
        assert_eq!(archive.class_names, vec!["plate".to_string()]);
    }

    #[test]
    fn check_weights_reports_missing_parameter() {
        let spec = tiny_spec();
        let mut weights = spec.init_weights();
        weights.remove("head.0.predict.bias");
        let archive = DetectorArchive::new(spec, weights);
        let err = archive.check_weights().unwrap_err();
        assert!(matches!(err, ModelError::MissingParameter { .. }));
    }

    #[test]
    fn check_weights_reports_wrong_shape() {
        let spec = tiny_spec();
        let mut weights = spec.init_weights();
        weights.insert(
            "stem.0.weight".into(),
            crate::WeightTensor::zeros(vec![4, 1, 3, 3]),
        );
        let archive = DetectorArchive::new(spec, weights);
        let err = archive.check_weights().unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn archive_json_roundtrip() {
        let spec = tiny_spec();
        let archive = DetectorArchive::new(spec.clone(), spec.init_weights());
        let json = serde_json::to_string(&archive).unwrap();
        let back: DetectorArchive = serde_json::from_str(&json).unwrap();
        assert_eq!(back, archive);
    }
}
