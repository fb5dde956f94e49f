//! Invocable detector module bound from an archive.

use burn::prelude::Backend;
use burn::tensor::activation::{leaky_relu, sigmoid, silu};
use burn::tensor::module::{conv2d, max_pool2d};
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Tensor, TensorData};

use crate::archive::DetectorArchive;
use crate::error::{ModelError, Result};
use crate::spec::{Activation, ConvSpec, LayerSpec};
use crate::trace::{TraceGraph, TraceOp, TraceOpKind, TraceParam};
use crate::weights::{take_param, StateDict, WeightTensor};

/// Numerical stability term for batch normalization.
const BN_EPSILON: f32 = 1e-5;

/// Internal value name bound to the traced input; the export engine maps
/// it to the configured input name.
pub(crate) const TRACE_INPUT: &str = "input";

#[derive(Debug)]
struct Norm<B: Backend> {
    gamma: Tensor<B, 1>,
    beta: Tensor<B, 1>,
    mean: Tensor<B, 1>,
    var: Tensor<B, 1>,
}

#[derive(Debug)]
struct ConvBlock<B: Backend> {
    weight: Tensor<B, 4>,
    bias: Option<Tensor<B, 1>>,
    norm: Option<Norm<B>>,
    activation: Activation,
    kernel: usize,
    stride: usize,
    padding: usize,
}

#[derive(Debug)]
enum Layer<B: Backend> {
    Conv(ConvBlock<B>),
    MaxPool { kernel: usize, stride: usize },
    Upsample { scale: usize },
}

#[derive(Debug)]
struct Head<B: Backend> {
    layers: Vec<Layer<B>>,
    predict_weight: Tensor<B, 4>,
    predict_bias: Tensor<B, 1>,
}

/// An invocable detector with a known call contract: it accepts one
/// `[batch, channels, height, width]` tensor and returns one
/// `[batch, predictions, classes + 5]` tensor.
///
/// Built from a [`DetectorArchive`]; parameters are bound by the naming
/// scheme of [`crate::DetectorSpec::param_shapes`]. The module starts in
/// training mode, matching the state checkpoints are written in; callers
/// switch it to evaluation mode before export.
#[derive(Debug)]
pub struct DetectorModule<B: Backend> {
    name: String,
    input_channels: usize,
    anchors: usize,
    features: usize,
    stem: Vec<Layer<B>>,
    heads: Vec<Head<B>>,
    head_strides: Vec<usize>,
    class_names: Vec<String>,
    training: bool,
}

impl<B: Backend> DetectorModule<B> {
    /// Binds an archive's weights into an invocable module on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error when the spec is inconsistent, a parameter is
    /// missing, or a stored shape differs from the spec's expectation.
    pub fn from_archive(archive: &DetectorArchive, device: &B::Device) -> Result<Self> {
        let spec = &archive.spec;
        spec.validate()?;

        let state = &archive.weights;
        let mut channels = spec.input_channels;
        let mut stem = Vec::with_capacity(spec.stem.len());
        for (i, layer) in spec.stem.iter().enumerate() {
            stem.push(build_layer(layer, &format!("stem.{i}"), state, &mut channels, device)?);
        }

        let stem_out = channels;
        let features = spec.features();
        let mut heads = Vec::with_capacity(spec.heads.len());
        let mut head_strides = Vec::with_capacity(spec.heads.len());
        for (h, head_spec) in spec.heads.iter().enumerate() {
            let mut c = stem_out;
            let mut layers = Vec::with_capacity(head_spec.layers.len());
            for (i, layer) in head_spec.layers.iter().enumerate() {
                layers.push(build_layer(layer, &format!("head.{h}.{i}"), state, &mut c, device)?);
            }

            let predict_out = spec.anchors * features;
            let w_name = format!("head.{h}.predict.weight");
            let weight = take_param(state, &w_name)?;
            weight.expect_dims(&w_name, &[predict_out, c, 1, 1])?;
            let b_name = format!("head.{h}.predict.bias");
            let bias = take_param(state, &b_name)?;
            bias.expect_dims(&b_name, &[predict_out])?;

            heads.push(Head {
                layers,
                predict_weight: to_tensor4(&weight, device)?,
                predict_bias: to_tensor1(&bias, device)?,
            });
            head_strides.push(
                spec.head_stride(h)
                    .ok_or_else(|| ModelError::invalid_spec(format!(
                        "head {h} does not reduce to an integer stride"
                    )))?,
            );
        }

        Ok(Self {
            name: spec.name.clone(),
            input_channels: spec.input_channels,
            anchors: spec.anchors,
            features,
            stem,
            heads,
            head_strides,
            class_names: archive.class_names.clone(),
            training: true,
        })
    }

    /// Architecture name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class labels carried over from the archive.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Expected input channel count.
    #[must_use]
    pub const fn input_channels(&self) -> usize {
        self.input_channels
    }

    /// Number of detection heads.
    #[must_use]
    pub fn head_count(&self) -> usize {
        self.heads.len()
    }

    /// Total parameter element count.
    #[must_use]
    pub fn param_count(&self) -> usize {
        let mut count = 0;
        for layer in self.stem.iter().chain(self.heads.iter().flat_map(|h| &h.layers)) {
            if let Layer::Conv(block) = layer {
                count += block.weight.dims().iter().product::<usize>();
                if let Some(bias) = &block.bias {
                    count += bias.dims()[0];
                }
                if let Some(norm) = &block.norm {
                    count += 4 * norm.gamma.dims()[0];
                }
            }
        }
        for head in &self.heads {
            count += head.predict_weight.dims().iter().product::<usize>();
            count += head.predict_bias.dims()[0];
        }
        count
    }

    /// Device the module's parameters live on.
    #[must_use]
    pub fn device(&self) -> B::Device {
        self.heads[0].predict_weight.device()
    }

    /// Switches between training and evaluation behavior.
    ///
    /// Idempotent; the only observable effect is whether batch
    /// normalization uses batch statistics (training) or frozen running
    /// statistics (evaluation), and whether predictions pass through a
    /// final sigmoid (evaluation).
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    /// `true` while the module is in training mode.
    #[must_use]
    pub const fn is_training(&self) -> bool {
        self.training
    }

    /// Runs the forward pass.
    ///
    /// # Errors
    ///
    /// Returns a shape error when the input channel count or spatial
    /// extents do not fit the module.
    pub fn forward(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 3>> {
        self.run(input, &mut None)
    }

    /// Runs the forward pass while recording every tensor operation.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::TrainingMode`] unless the module is in
    /// evaluation mode, plus any error [`Self::forward`] can return, plus
    /// capture errors while extracting parameter data.
    pub fn trace(&self, input: Tensor<B, 4>) -> Result<(TraceGraph, Tensor<B, 3>)> {
        if self.training {
            return Err(ModelError::TrainingMode);
        }
        let mut trace = TraceGraph::new(TRACE_INPUT, input.dims().to_vec());
        let output = self.run(input, &mut Some(&mut trace))?;
        Ok((trace, output))
    }

    fn check_input(&self, dims: [usize; 4]) -> Result<()> {
        let [batch, channels, height, width] = dims;
        if batch == 0 || height == 0 || width == 0 {
            return Err(ModelError::shape_mismatch(
                "input",
                "positive batch and spatial extents",
                format!("{dims:?}"),
            ));
        }
        if channels != self.input_channels {
            return Err(ModelError::ChannelMismatch {
                expected: self.input_channels,
                actual: channels,
            });
        }
        for &stride in &self.head_strides {
            for size in [height, width] {
                if size % stride != 0 {
                    return Err(ModelError::StrideMismatch { size, stride });
                }
            }
        }
        Ok(())
    }

    fn run(
        &self,
        input: Tensor<B, 4>,
        trace: &mut Option<&mut TraceGraph>,
    ) -> Result<Tensor<B, 3>> {
        self.check_input(input.dims())?;

        let mut value = TRACE_INPUT.to_string();
        let mut x = input;
        for (i, layer) in self.stem.iter().enumerate() {
            x = self.apply_layer(layer, x, &format!("stem.{i}"), &mut value, trace)?;
        }

        let mut outputs = Vec::with_capacity(self.heads.len());
        let mut output_values = Vec::with_capacity(self.heads.len());
        for (h, head) in self.heads.iter().enumerate() {
            let mut hv = value.clone();
            let mut hx = x.clone();
            for (i, layer) in head.layers.iter().enumerate() {
                hx = self.apply_layer(layer, hx, &format!("head.{h}.{i}"), &mut hv, trace)?;
            }
            let (pred, pv) = self.predict(head, hx, &format!("head.{h}"), &hv, trace)?;
            outputs.push(pred);
            output_values.push(pv);
        }

        let merged = if outputs.len() == 1 {
            // Single head: nothing to concatenate.
            value = output_values[0].clone();
            outputs.swap_remove(0)
        } else {
            let cat = Tensor::cat(outputs, 1);
            value = "detect.cat.out".to_string();
            record(trace, TraceOp {
                name: "detect.cat".into(),
                kind: TraceOpKind::Concat { axis: 1 },
                inputs: output_values,
                output: value.clone(),
                params: Vec::new(),
                out_dims: cat.dims().to_vec(),
            });
            cat
        };

        if self.training {
            return Ok(merged);
        }

        let out = sigmoid(merged);
        record(trace, TraceOp {
            name: "detect.sigmoid".into(),
            kind: TraceOpKind::Sigmoid,
            inputs: vec![value],
            output: "detect.out".into(),
            params: Vec::new(),
            out_dims: out.dims().to_vec(),
        });
        Ok(out)
    }

    fn apply_layer(
        &self,
        layer: &Layer<B>,
        x: Tensor<B, 4>,
        path: &str,
        value: &mut String,
        trace: &mut Option<&mut TraceGraph>,
    ) -> Result<Tensor<B, 4>> {
        match layer {
            Layer::Conv(block) => self.apply_conv(block, x, path, value, trace),
            Layer::MaxPool { kernel, stride } => {
                let y = max_pool2d(x, [*kernel; 2], [*stride; 2], [0; 2], [1; 2]);
                let out = format!("{path}.out");
                record(trace, TraceOp {
                    name: path.to_string(),
                    kind: TraceOpKind::MaxPool {
                        kernel: *kernel,
                        stride: *stride,
                    },
                    inputs: vec![value.clone()],
                    output: out.clone(),
                    params: Vec::new(),
                    out_dims: y.dims().to_vec(),
                });
                *value = out;
                Ok(y)
            }
            Layer::Upsample { scale } => {
                let [b, c, h, w] = x.dims();
                let y = x
                    .reshape([b, c, h, 1, w, 1])
                    .repeat_dim(3, *scale)
                    .repeat_dim(5, *scale)
                    .reshape([b, c, h * scale, w * scale]);
                let out = format!("{path}.out");
                record(trace, TraceOp {
                    name: path.to_string(),
                    kind: TraceOpKind::Upsample { scale: *scale },
                    inputs: vec![value.clone()],
                    output: out.clone(),
                    params: Vec::new(),
                    out_dims: y.dims().to_vec(),
                });
                *value = out;
                Ok(y)
            }
        }
    }

    fn apply_conv(
        &self,
        block: &ConvBlock<B>,
        x: Tensor<B, 4>,
        path: &str,
        value: &mut String,
        trace: &mut Option<&mut TraceGraph>,
    ) -> Result<Tensor<B, 4>> {
        let mut y = conv2d(
            x,
            block.weight.clone(),
            block.bias.clone(),
            ConvOptions::new([block.stride; 2], [block.padding; 2], [1; 2], 1),
        );
        if trace.is_some() {
            let mut params = vec![capture(&format!("{path}.weight"), &block.weight)?];
            if let Some(bias) = &block.bias {
                params.push(capture(&format!("{path}.bias"), bias)?);
            }
            let out = format!("{path}.out");
            record(trace, TraceOp {
                name: path.to_string(),
                kind: TraceOpKind::Conv {
                    stride: block.stride,
                    padding: block.padding,
                    kernel: block.kernel,
                },
                inputs: vec![value.clone()],
                output: out.clone(),
                params,
                out_dims: y.dims().to_vec(),
            });
            *value = out;
        }

        if let Some(norm) = &block.norm {
            y = self.apply_norm(norm, y, path, value, trace)?;
        }

        match block.activation {
            Activation::Linear => {}
            Activation::Silu => {
                y = silu(y);
                let out = format!("{path}.act.out");
                record(trace, TraceOp {
                    name: format!("{path}.act"),
                    kind: TraceOpKind::Silu,
                    inputs: vec![value.clone()],
                    output: out.clone(),
                    params: Vec::new(),
                    out_dims: y.dims().to_vec(),
                });
                *value = out;
            }
            Activation::LeakyRelu { slope } => {
                y = leaky_relu(y, f64::from(slope));
                let out = format!("{path}.act.out");
                record(trace, TraceOp {
                    name: format!("{path}.act"),
                    kind: TraceOpKind::LeakyRelu { slope },
                    inputs: vec![value.clone()],
                    output: out.clone(),
                    params: Vec::new(),
                    out_dims: y.dims().to_vec(),
                });
                *value = out;
            }
        }
        Ok(y)
    }

    fn apply_norm(
        &self,
        norm: &Norm<B>,
        x: Tensor<B, 4>,
        path: &str,
        value: &mut String,
        trace: &mut Option<&mut TraceGraph>,
    ) -> Result<Tensor<B, 4>> {
        let c = norm.gamma.dims()[0];
        if self.training {
            // Batch statistics; never traced.
            let mean = x.clone().mean_dim(0).mean_dim(2).mean_dim(3);
            let centered = x - mean;
            let var = centered.clone().powf_scalar(2.0).mean_dim(0).mean_dim(2).mean_dim(3);
            let y = centered / var.add_scalar(BN_EPSILON).sqrt()
                * norm.gamma.clone().reshape([1, c, 1, 1])
                + norm.beta.clone().reshape([1, c, 1, 1]);
            return Ok(y);
        }

        let denom = norm.var.clone().add_scalar(BN_EPSILON).sqrt();
        let scale = norm.gamma.clone() / denom;
        let shift = norm.beta.clone() - norm.mean.clone() * scale.clone();
        let y = x * scale.reshape([1, c, 1, 1]) + shift.reshape([1, c, 1, 1]);

        if trace.is_some() {
            let params = vec![
                capture(&format!("{path}.bn.gamma"), &norm.gamma)?,
                capture(&format!("{path}.bn.beta"), &norm.beta)?,
                capture(&format!("{path}.bn.mean"), &norm.mean)?,
                capture(&format!("{path}.bn.var"), &norm.var)?,
            ];
            let out = format!("{path}.bn.out");
            record(trace, TraceOp {
                name: format!("{path}.bn"),
                kind: TraceOpKind::BatchNorm {
                    epsilon: BN_EPSILON,
                },
                inputs: vec![value.clone()],
                output: out.clone(),
                params,
                out_dims: y.dims().to_vec(),
            });
            *value = out;
        }
        Ok(y)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn predict(
        &self,
        head: &Head<B>,
        x: Tensor<B, 4>,
        path: &str,
        value: &str,
        trace: &mut Option<&mut TraceGraph>,
    ) -> Result<(Tensor<B, 3>, String)> {
        let y = conv2d(
            x,
            head.predict_weight.clone(),
            Some(head.predict_bias.clone()),
            ConvOptions::new([1; 2], [0; 2], [1; 2], 1),
        );
        let [b, _, h, w] = y.dims();
        let conv_out = format!("{path}.predict.out");
        if trace.is_some() {
            let params = vec![
                capture(&format!("{path}.predict.weight"), &head.predict_weight)?,
                capture(&format!("{path}.predict.bias"), &head.predict_bias)?,
            ];
            record(trace, TraceOp {
                name: format!("{path}.predict"),
                kind: TraceOpKind::Conv {
                    stride: 1,
                    padding: 0,
                    kernel: 1,
                },
                inputs: vec![value.to_string()],
                output: conv_out.clone(),
                params,
                out_dims: y.dims().to_vec(),
            });
        }

        let y5: Tensor<B, 5> = y.reshape([b, self.anchors, self.features, h, w]);
        let split_out = format!("{path}.split.out");
        record(trace, TraceOp {
            name: format!("{path}.split"),
            kind: TraceOpKind::Reshape {
                shape: vec![0, self.anchors as i64, self.features as i64, h as i64, w as i64],
            },
            inputs: vec![conv_out],
            output: split_out.clone(),
            params: Vec::new(),
            out_dims: y5.dims().to_vec(),
        });

        let yp = y5.permute([0, 1, 3, 4, 2]);
        let perm_out = format!("{path}.perm.out");
        record(trace, TraceOp {
            name: format!("{path}.perm"),
            kind: TraceOpKind::Transpose {
                perm: vec![0, 1, 3, 4, 2],
            },
            inputs: vec![split_out],
            output: perm_out.clone(),
            params: Vec::new(),
            out_dims: yp.dims().to_vec(),
        });

        let predictions = self.anchors * h * w;
        let y3: Tensor<B, 3> = yp.reshape([b, predictions, self.features]);
        let flat_out = format!("{path}.flat.out");
        record(trace, TraceOp {
            name: format!("{path}.flat"),
            kind: TraceOpKind::Reshape {
                shape: vec![0, predictions as i64, self.features as i64],
            },
            inputs: vec![perm_out],
            output: flat_out.clone(),
            params: Vec::new(),
            out_dims: y3.dims().to_vec(),
        });

        Ok((y3, flat_out))
    }
}

fn record(trace: &mut Option<&mut TraceGraph>, op: TraceOp) {
    if let Some(t) = trace.as_deref_mut() {
        t.record(op);
    }
}

fn build_layer<B: Backend>(
    layer: &LayerSpec,
    path: &str,
    state: &StateDict,
    channels: &mut usize,
    device: &B::Device,
) -> Result<Layer<B>> {
    match layer {
        LayerSpec::Conv(conv) => {
            let block = build_conv(conv, path, state, *channels, device)?;
            *channels = conv.out_channels;
            Ok(Layer::Conv(block))
        }
        LayerSpec::MaxPool { kernel, stride } => Ok(Layer::MaxPool {
            kernel: *kernel,
            stride: *stride,
        }),
        LayerSpec::Upsample { scale } => Ok(Layer::Upsample { scale: *scale }),
    }
}

fn build_conv<B: Backend>(
    conv: &ConvSpec,
    path: &str,
    state: &StateDict,
    in_channels: usize,
    device: &B::Device,
) -> Result<ConvBlock<B>> {
    let w_name = format!("{path}.weight");
    let weight = take_param(state, &w_name)?;
    weight.expect_dims(&w_name, &[conv.out_channels, in_channels, conv.kernel, conv.kernel])?;

    let bias = if conv.has_bias() {
        let b_name = format!("{path}.bias");
        let bias = take_param(state, &b_name)?;
        bias.expect_dims(&b_name, &[conv.out_channels])?;
        Some(to_tensor1(&bias, device)?)
    } else {
        None
    };

    let norm = if conv.batch_norm {
        let mut stats = Vec::with_capacity(4);
        for stat in ["gamma", "beta", "mean", "var"] {
            let name = format!("{path}.bn.{stat}");
            let tensor = take_param(state, &name)?;
            tensor.expect_dims(&name, &[conv.out_channels])?;
            stats.push(to_tensor1(&tensor, device)?);
        }
        let mut it = stats.into_iter();
        // Four elements pushed just above.
        match (it.next(), it.next(), it.next(), it.next()) {
            (Some(gamma), Some(beta), Some(mean), Some(var)) => Some(Norm {
                gamma,
                beta,
                mean,
                var,
            }),
            _ => None,
        }
    } else {
        None
    };

    Ok(ConvBlock {
        weight: to_tensor4(&weight, device)?,
        bias,
        norm,
        activation: conv.activation,
        kernel: conv.kernel,
        stride: conv.stride,
        padding: conv.padding,
    })
}

fn to_tensor4<B: Backend>(w: &WeightTensor, device: &B::Device) -> Result<Tensor<B, 4>> {
    let dims: [usize; 4] = w
        .dims
        .as_slice()
        .try_into()
        .map_err(|_| ModelError::shape_mismatch("weight", "rank 4", format!("{:?}", w.dims)))?;
    Ok(Tensor::from_data(TensorData::new(w.data.clone(), dims), device))
}

fn to_tensor1<B: Backend>(w: &WeightTensor, device: &B::Device) -> Result<Tensor<B, 1>> {
    let dims: [usize; 1] = w
        .dims
        .as_slice()
        .try_into()
        .map_err(|_| ModelError::shape_mismatch("weight", "rank 1", format!("{:?}", w.dims)))?;
    Ok(Tensor::from_data(TensorData::new(w.data.clone(), dims), device))
}

fn capture<B: Backend, const D: usize>(name: &str, tensor: &Tensor<B, D>) -> Result<TraceParam> {
    let data = tensor
        .to_data()
        .to_vec::<f32>()
        .map_err(|e| ModelError::TensorData(format!("{e:?}")))?;
    Ok(TraceParam {
        name: name.to_string(),
        dims: tensor.dims().to_vec(),
        data,
    })
}
