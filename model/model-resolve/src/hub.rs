//! Architecture registry for hub-style checkpoints.

use std::collections::BTreeMap;

use model_ir::{ConvSpec, DetectorArchive, DetectorSpec, HeadSpec, LayerSpec, StateDict};

/// Named architecture definitions available to the hub strategy.
///
/// Hub bundles carry weights plus an architecture name; the registry is
/// where those names resolve to buildable specs. Ships with the
/// well-known detector layouts and accepts caller registrations.
///
/// # Example
///
/// ```
/// use model_resolve::HubRegistry;
///
/// let registry = HubRegistry::builtin();
/// assert!(registry.get("yolo-640").is_some());
/// assert!(registry.get("unknown").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HubRegistry {
    specs: BTreeMap<String, DetectorSpec>,
}

impl HubRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry preloaded with the built-in architectures:
    /// `yolo-640` (80 classes) and `plate-640` (single class).
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(three_scale_detector("yolo-640", 80));
        registry.register(three_scale_detector("plate-640", 1));
        registry
    }

    /// Registers an architecture under its spec name, replacing any
    /// previous entry.
    pub fn register(&mut self, spec: DetectorSpec) {
        self.specs.insert(spec.name.clone(), spec);
    }

    /// Looks up an architecture by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DetectorSpec> {
        self.specs.get(name)
    }

    /// Registered architecture names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.specs.keys().map(String::as_str).collect()
    }
}

/// Optional collaborator that rebuilds an architecture for a bare state
/// dictionary.
///
/// Whether such a reconstructor exists is deployment-specific; without
/// one, state-dictionary-only checkpoints are a terminal failure.
pub trait ArchReconstructor: Send + Sync {
    /// Rebuilds a complete archive around the given parameters.
    ///
    /// # Errors
    ///
    /// Returns a model error when no known architecture fits the
    /// parameter names and shapes.
    fn reconstruct(&self, state: &StateDict) -> model_ir::Result<DetectorArchive>;
}

/// The standard three-scale detector layout: a stride-4 stem and heads at
/// strides 8, 16, and 32 with three anchors per cell.
fn three_scale_detector(name: &str, num_classes: usize) -> DetectorSpec {
    DetectorSpec {
        name: name.into(),
        input_channels: 3,
        stem: vec![
            LayerSpec::Conv(ConvSpec::downsample(8)),
            LayerSpec::Conv(ConvSpec::downsample(16)),
        ],
        heads: vec![
            HeadSpec::new(vec![LayerSpec::Conv(ConvSpec::downsample(16))]),
            HeadSpec::new(vec![
                LayerSpec::Conv(ConvSpec::downsample(16)),
                LayerSpec::Conv(ConvSpec::downsample(32)),
            ]),
            HeadSpec::new(vec![
                LayerSpec::Conv(ConvSpec::downsample(16)),
                LayerSpec::Conv(ConvSpec::downsample(32)),
                LayerSpec::Conv(ConvSpec::downsample(32)),
            ]),
        ],
        num_classes,
        anchors: 3,
    }
}
