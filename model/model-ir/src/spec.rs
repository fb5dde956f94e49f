//! Architecture descriptions for detector modules.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::weights::{StateDict, WeightTensor};

/// Activation applied after a convolution block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Activation {
    /// No activation.
    #[default]
    Linear,
    /// Sigmoid-weighted linear unit.
    Silu,
    /// Leaky rectified linear unit with the given negative slope.
    LeakyRelu {
        /// Slope for negative inputs.
        slope: f32,
    },
}

/// Configuration of one convolution block.
///
/// A block is convolution, optional batch normalization, then activation.
/// The convolution carries a bias only when batch normalization is absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvSpec {
    /// Output channel count.
    pub out_channels: usize,
    /// Square kernel extent.
    pub kernel: usize,
    /// Stride along both spatial axes.
    pub stride: usize,
    /// Zero padding along both spatial axes.
    pub padding: usize,
    /// Whether the block carries batch normalization.
    pub batch_norm: bool,
    /// Activation applied last.
    pub activation: Activation,
}

impl ConvSpec {
    /// A stride-2 "same" downsampling block with batch norm and SiLU.
    #[must_use]
    pub const fn downsample(out_channels: usize) -> Self {
        Self {
            out_channels,
            kernel: 3,
            stride: 2,
            padding: 1,
            batch_norm: true,
            activation: Activation::Silu,
        }
    }

    /// `true` if the convolution carries a bias term.
    #[must_use]
    pub const fn has_bias(&self) -> bool {
        !self.batch_norm
    }
}

/// One layer in a stem or head chain. Layers map 4D feature maps to 4D
/// feature maps; pooling and upsampling carry no parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LayerSpec {
    /// Convolution block.
    Conv(ConvSpec),
    /// Max pooling.
    MaxPool {
        /// Square window extent.
        kernel: usize,
        /// Stride along both spatial axes.
        stride: usize,
    },
    /// Nearest-neighbor upsampling by an integer factor.
    Upsample {
        /// Spatial scale factor.
        scale: usize,
    },
}

impl LayerSpec {
    /// Output channels given the input channels.
    #[must_use]
    pub const fn out_channels(&self, in_channels: usize) -> usize {
        match self {
            Self::Conv(conv) => conv.out_channels,
            Self::MaxPool { .. } | Self::Upsample { .. } => in_channels,
        }
    }

    /// Multiplicative effect on spatial stride (upsampling divides).
    const fn stride_factor(&self) -> (usize, usize) {
        match self {
            Self::Conv(conv) => (conv.stride, 1),
            Self::MaxPool { stride, .. } => (*stride, 1),
            Self::Upsample { scale } => (1, *scale),
        }
    }
}

/// One detection head: further layers after the stem, then an implicit
/// 1x1 prediction convolution producing `anchors * (classes + 5)` channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HeadSpec {
    /// Layers applied to the stem output before prediction.
    pub layers: Vec<LayerSpec>,
}

impl HeadSpec {
    /// Creates a head from its layer chain.
    #[must_use]
    pub fn new(layers: Vec<LayerSpec>) -> Self {
        Self { layers }
    }
}

/// Complete architecture description of a detector.
///
/// A spec plus a matching [`StateDict`] is sufficient to build an
/// invocable module; the parameter names are fixed by [`Self::param_shapes`].
///
/// # Example
///
/// ```
/// use model_ir::{ConvSpec, DetectorSpec, HeadSpec, LayerSpec};
///
/// let spec = DetectorSpec {
///     name: "tiny".into(),
///     input_channels: 3,
///     stem: vec![LayerSpec::Conv(ConvSpec::downsample(8))],
///     heads: vec![HeadSpec::new(vec![LayerSpec::Conv(ConvSpec::downsample(8))])],
///     num_classes: 1,
///     anchors: 2,
/// };
/// assert!(spec.validate().is_ok());
/// assert_eq!(spec.features(), 6);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorSpec {
    /// Architecture name.
    pub name: String,
    /// Expected input channel count.
    pub input_channels: usize,
    /// Shared trunk layers.
    pub stem: Vec<LayerSpec>,
    /// Detection heads branching from the stem output.
    pub heads: Vec<HeadSpec>,
    /// Number of object classes.
    pub num_classes: usize,
    /// Anchor boxes predicted per grid cell.
    pub anchors: usize,
}

impl DetectorSpec {
    /// Features per prediction: class scores plus box and objectness terms.
    #[must_use]
    pub const fn features(&self) -> usize {
        self.num_classes + 5
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidSpec`] naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.input_channels == 0 {
            return Err(ModelError::invalid_spec("input_channels must be positive"));
        }
        if self.anchors == 0 {
            return Err(ModelError::invalid_spec("anchors must be positive"));
        }
        if self.heads.is_empty() {
            return Err(ModelError::invalid_spec("at least one head is required"));
        }
        for (chain, layers) in self.chains() {
            for (i, layer) in layers.iter().enumerate() {
                match layer {
                    LayerSpec::Conv(conv) => {
                        if conv.out_channels == 0 || conv.kernel == 0 || conv.stride == 0 {
                            return Err(ModelError::invalid_spec(format!(
                                "{chain}.{i}: conv extents must be positive"
                            )));
                        }
                    }
                    LayerSpec::MaxPool { kernel, stride } => {
                        if *kernel == 0 || *stride == 0 {
                            return Err(ModelError::invalid_spec(format!(
                                "{chain}.{i}: pool extents must be positive"
                            )));
                        }
                    }
                    LayerSpec::Upsample { scale } => {
                        if *scale == 0 {
                            return Err(ModelError::invalid_spec(format!(
                                "{chain}.{i}: upsample scale must be positive"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Channel count at the stem output.
    #[must_use]
    pub fn stem_channels(&self) -> usize {
        self.stem
            .iter()
            .fold(self.input_channels, |c, l| l.out_channels(c))
    }

    /// Total spatial stride of head `index`, stem included.
    ///
    /// Returns `None` when the combined up/downsampling does not reduce to
    /// an integer stride.
    #[must_use]
    pub fn head_stride(&self, index: usize) -> Option<usize> {
        let head = self.heads.get(index)?;
        let mut down = 1usize;
        let mut up = 1usize;
        for layer in self.stem.iter().chain(&head.layers) {
            let (d, u) = layer.stride_factor();
            down *= d;
            up *= u;
        }
        (down % up == 0).then(|| down / up)
    }

    /// Expected parameter names and shapes, in deterministic order.
    ///
    /// Naming scheme: `stem.{i}.weight`, `stem.{i}.bias`,
    /// `stem.{i}.bn.{gamma,beta,mean,var}`, `head.{h}.{i}.*`, and
    /// `head.{h}.predict.{weight,bias}`.
    #[must_use]
    pub fn param_shapes(&self) -> Vec<(String, Vec<usize>)> {
        let mut params = Vec::new();
        let mut channels = self.input_channels;
        for (i, layer) in self.stem.iter().enumerate() {
            push_layer_params(&mut params, &format!("stem.{i}"), layer, &mut channels);
        }
        let stem_out = channels;
        for (h, head) in self.heads.iter().enumerate() {
            let mut c = stem_out;
            for (i, layer) in head.layers.iter().enumerate() {
                push_layer_params(&mut params, &format!("head.{h}.{i}"), layer, &mut c);
            }
            let predict_out = self.anchors * self.features();
            params.push((format!("head.{h}.predict.weight"), vec![predict_out, c, 1, 1]));
            params.push((format!("head.{h}.predict.bias"), vec![predict_out]));
        }
        params
    }

    /// Builds a deterministic state dictionary matching this spec.
    ///
    /// Values follow a fixed low-amplitude ramp; intended for fixtures,
    /// registry smoke tests, and hub bundles that ship architecture-only
    /// definitions.
    #[must_use]
    pub fn init_weights(&self) -> StateDict {
        let mut state = StateDict::new();
        for (name, dims) in self.param_shapes() {
            let count: usize = dims.iter().product();
            let data = (0..count)
                .map(|i| {
                    #[allow(clippy::cast_precision_loss)]
                    let x = ((i * 31 + name.len() * 7) % 97) as f32;
                    (x / 97.0 - 0.5) * 0.2
                })
                .collect();
            state.insert(name, WeightTensor { dims, data });
        }
        // Running variances start at one, not zero.
        for (name, tensor) in &mut state {
            if name.ends_with(".bn.var") || name.ends_with(".bn.gamma") {
                tensor.data.fill(1.0);
            }
        }
        state
    }

    fn chains(&self) -> Vec<(String, &[LayerSpec])> {
        let mut chains = vec![("stem".to_string(), self.stem.as_slice())];
        for (h, head) in self.heads.iter().enumerate() {
            chains.push((format!("head.{h}"), head.layers.as_slice()));
        }
        chains
    }
}

fn push_layer_params(
    params: &mut Vec<(String, Vec<usize>)>,
    prefix: &str,
    layer: &LayerSpec,
    channels: &mut usize,
) {
    if let LayerSpec::Conv(conv) = layer {
        params.push((
            format!("{prefix}.weight"),
            vec![conv.out_channels, *channels, conv.kernel, conv.kernel],
        ));
        if conv.has_bias() {
            params.push((format!("{prefix}.bias"), vec![conv.out_channels]));
        }
        if conv.batch_norm {
            for stat in ["gamma", "beta", "mean", "var"] {
                params.push((format!("{prefix}.bn.{stat}"), vec![conv.out_channels]));
            }
        }
        *channels = conv.out_channels;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

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
    fn features_counts_box_and_objectness() {
        assert_eq!(tiny_spec().features(), 6);
    }

    #[test]
    fn validate_accepts_tiny_spec() {
        assert!(tiny_spec().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_channels() {
        let mut spec = tiny_spec();
        spec.input_channels = 0;
        assert!(matches!(spec.validate(), Err(ModelError::InvalidSpec(_))));
    }

    #[test]
    fn validate_rejects_headless_spec() {
        let mut spec = tiny_spec();
        spec.heads.clear();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn stem_channels_follow_convs() {
        assert_eq!(tiny_spec().stem_channels(), 4);
    }

    #[test]
    fn head_stride_multiplies_through() {
        let spec = tiny_spec();
        assert_eq!(spec.head_stride(0), Some(4));
        assert_eq!(spec.head_stride(1), None);
    }

    #[test]
    fn head_stride_accounts_for_upsampling() {
        let mut spec = tiny_spec();
        spec.heads[0].layers.push(LayerSpec::Upsample { scale: 2 });
        assert_eq!(spec.head_stride(0), Some(2));
    }

    #[test]
    fn param_shapes_use_deterministic_naming() {
        let spec = tiny_spec();
        let names: Vec<String> = spec.param_shapes().into_iter().map(|(n, _)| n).collect();
        assert!(names.contains(&"stem.0.weight".to_string()));
        assert!(names.contains(&"stem.0.bn.gamma".to_string()));
        assert!(names.contains(&"head.0.predict.weight".to_string()));
        // Batch-norm blocks carry no conv bias.
        assert!(!names.contains(&"stem.0.bias".to_string()));
    }

    #[test]
    fn predict_shape_covers_anchors_and_features() {
        let spec = tiny_spec();
        let shapes = spec.param_shapes();
        let (_, dims) = shapes
            .iter()
            .find(|(n, _)| n == "head.0.predict.weight")
            .unwrap();
        assert_eq!(dims, &vec![12, 4, 1, 1]);
    }

    #[test]
    fn init_weights_matches_param_shapes() {
        let spec = tiny_spec();
        let state = spec.init_weights();
        for (name, dims) in spec.param_shapes() {
            let tensor = state.get(&name).unwrap();
            assert_eq!(tensor.dims, dims, "shape for {name}");
        }
        // Variances are initialized to one.
        assert!(state.get("stem.0.bn.var").unwrap().data.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn spec_serde_roundtrip() {
        let spec = tiny_spec();
        let json = serde_json::to_string(&spec).unwrap();
        let back: DetectorSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
