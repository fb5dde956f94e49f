//! The trace-based export engine.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use burn::prelude::Backend;
use burn::tensor::{Distribution, Tensor};
use tracing::{debug, info};

use graph_ir::{
    save_graph_file, AttrValue, DType, Dim, GraphModel, GraphNode, Initializer, OpKind,
    TensorSignature,
};
use model_ir::{DetectorModule, TraceGraph, TraceOp, TraceOpKind};

use crate::artifact::ExportArtifact;
use crate::config::ExportConfig;
use crate::error::{ConfigError, ExportError};

/// Producer string embedded in every artifact.
const PRODUCER: &str = concat!("graphport ", env!("CARGO_PKG_VERSION"));

/// Backend seed for the synthetic input, fixed so repeated exports see
/// the same traced values.
const SYNTHETIC_SEED: u64 = 0x5eed;

/// Drives one trace-based export: synthetic input, trace, lowering for
/// the target opset, optional folding, artifact write.
///
/// Stateless between runs; everything an export needs arrives in the
/// [`ExportConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportEngine;

impl ExportEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Exports `module` to `path` under `config`.
    ///
    /// The synthetic input is drawn from a normal distribution rather
    /// than zeros so value-dependent paths see realistic magnitudes.
    /// For a fixed module and config, two runs produce identical declared
    /// tensor signatures.
    ///
    /// # Errors
    ///
    /// - [`ExportError::Config`] for configuration problems, before any
    ///   tracing happens;
    /// - [`ExportError::Trace`] when the module's forward pass rejects
    ///   the synthetic input;
    /// - [`ExportError::UnsupportedOp`] when a traced operation has no
    ///   equivalent at the configured opset;
    /// - [`ExportError::Io`] when the artifact cannot be written.
    pub fn export<B: Backend>(
        &self,
        module: &DetectorModule<B>,
        config: &ExportConfig,
        path: &Path,
    ) -> Result<ExportArtifact, ExportError> {
        config.validate()?;
        if config.input_names.len() != 1 {
            return Err(ConfigError::InputNameCount(config.input_names.len()).into());
        }
        if config.output_names.len() != 1 {
            return Err(ConfigError::OutputNameCount(config.output_names.len()).into());
        }
        let shape: [usize; 4] = config
            .input_shape
            .as_slice()
            .try_into()
            .map_err(|_| ConfigError::InvalidRank(config.input_shape.len()))
            .map_err(ExportError::Config)?;

        B::seed(SYNTHETIC_SEED);
        let input: Tensor<B, 4> =
            Tensor::random(shape, Distribution::Normal(0.0, 1.0), &module.device());
        let (trace, _) = module.trace(input)?;
        debug!(ops = trace.len(), "forward pass traced");

        let mut graph = lower(&trace, config, module)?;
        if config.constant_folding {
            fold_graph(&mut graph);
        }

        save_graph_file(&graph, path).map_err(|e| ExportError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let size_bytes = std::fs::metadata(path)
            .map_err(|e| ExportError::Io {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .len();

        info!(
            path = %path.display(),
            size_bytes,
            nodes = graph.nodes.len(),
            "artifact written"
        );
        Ok(ExportArtifact {
            path: path.to_path_buf(),
            size_bytes,
            opset: graph.opset,
            inputs: graph.inputs,
            outputs: graph.outputs,
            node_count: graph.nodes.len(),
        })
    }
}

/// Lowers a recorded trace into a graph for the configured opset.
fn lower<B: Backend>(
    trace: &TraceGraph,
    config: &ExportConfig,
    module: &DetectorModule<B>,
) -> Result<GraphModel, ExportError> {
    let input_name = &config.input_names[0];
    let output_name = &config.output_names[0];
    let rename = |value: &str| -> String {
        if value == trace.input {
            input_name.clone()
        } else if value == trace.output {
            output_name.clone()
        } else {
            value.to_string()
        }
    };

    let mut graph = GraphModel::new(config.opset, PRODUCER);
    graph.metadata.insert("model.name".into(), module.name().to_string());
    if !module.class_names().is_empty() {
        graph
            .metadata
            .insert("model.classes".into(), module.class_names().join(","));
    }

    for op in &trace.ops {
        emit(&mut graph, op, &rename, config.opset)?;
    }

    graph.inputs.push(signature(
        input_name,
        &trace.input_dims,
        config.dynamic_axes_for(input_name),
    ));
    let output_axes = config.dynamic_axes_for(output_name);
    if let Some(axes) = output_axes {
        for &axis in axes {
            if axis >= trace.output_dims.len() {
                return Err(ConfigError::AxisOutOfRange {
                    tensor: output_name.clone(),
                    axis,
                    rank: trace.output_dims.len(),
                }
                .into());
            }
        }
    }
    graph
        .outputs
        .push(signature(output_name, &trace.output_dims, output_axes));
    Ok(graph)
}

/// Emits the graph node(s) for one traced operation.
#[allow(clippy::cast_possible_wrap)]
fn emit(
    graph: &mut GraphModel,
    op: &TraceOp,
    rename: &dyn Fn(&str) -> String,
    opset: u32,
) -> Result<(), ExportError> {
    let mut inputs: Vec<String> = op.inputs.iter().map(|v| rename(v)).collect();
    for param in &op.params {
        graph.initializers.push(Initializer::new(
            param.name.clone(),
            param.dims.iter().map(|&d| d as u64).collect(),
            param.data.clone(),
        ));
        inputs.push(param.name.clone());
    }
    let output = rename(&op.output);

    let node = match &op.kind {
        TraceOpKind::Conv {
            stride,
            padding,
            kernel,
        } => GraphNode::new(op.name.clone(), checked(OpKind::Conv, opset)?, inputs, vec![output])
            .with_attr("kernel_shape", ints(&[*kernel, *kernel]))
            .with_attr("strides", ints(&[*stride, *stride]))
            .with_attr("pads", ints(&[*padding, *padding, *padding, *padding]))
            .with_attr("dilations", ints(&[1, 1])),
        TraceOpKind::BatchNorm { epsilon } => GraphNode::new(
            op.name.clone(),
            checked(OpKind::BatchNormalization, opset)?,
            inputs,
            vec![output],
        )
        .with_attr("epsilon", AttrValue::Float(*epsilon)),
        TraceOpKind::Silu => {
            // No single-node equivalent; decompose into sigmoid * x.
            checked(OpKind::Sigmoid, opset)?;
            checked(OpKind::Mul, opset)?;
            let gate = format!("{}.sigmoid.out", op.name);
            graph.nodes.push(GraphNode::new(
                format!("{}.sigmoid", op.name),
                OpKind::Sigmoid,
                inputs.clone(),
                vec![gate.clone()],
            ));
            let mut mul_inputs = inputs;
            mul_inputs.push(gate);
            GraphNode::new(op.name.clone(), OpKind::Mul, mul_inputs, vec![output])
        }
        TraceOpKind::LeakyRelu { slope } => GraphNode::new(
            op.name.clone(),
            checked(OpKind::LeakyRelu, opset)?,
            inputs,
            vec![output],
        )
        .with_attr("alpha", AttrValue::Float(*slope)),
        TraceOpKind::Sigmoid => GraphNode::new(
            op.name.clone(),
            checked(OpKind::Sigmoid, opset)?,
            inputs,
            vec![output],
        ),
        TraceOpKind::MaxPool { kernel, stride } => GraphNode::new(
            op.name.clone(),
            checked(OpKind::MaxPool, opset)?,
            inputs,
            vec![output],
        )
        .with_attr("kernel_shape", ints(&[*kernel, *kernel]))
        .with_attr("strides", ints(&[*stride, *stride])),
        TraceOpKind::Upsample { scale } => {
            if *scale == 1 {
                // Degenerate resample; a fold pass can elide it.
                GraphNode::new(op.name.clone(), checked(OpKind::Identity, opset)?, inputs, vec![output])
            } else {
                #[allow(clippy::cast_precision_loss)]
                let factor = *scale as f32;
                GraphNode::new(
                    op.name.clone(),
                    checked(OpKind::Resize, opset)?,
                    inputs,
                    vec![output],
                )
                .with_attr("mode", AttrValue::Text("nearest".into()))
                .with_attr("scales", AttrValue::Floats(vec![1.0, 1.0, factor, factor]))
            }
        }
        TraceOpKind::Reshape { shape } => GraphNode::new(
            op.name.clone(),
            checked(OpKind::Reshape, opset)?,
            inputs,
            vec![output],
        )
        .with_attr("shape", AttrValue::Ints(shape.clone())),
        TraceOpKind::Transpose { perm } => GraphNode::new(
            op.name.clone(),
            checked(OpKind::Transpose, opset)?,
            inputs,
            vec![output],
        )
        .with_attr("perm", ints(perm)),
        TraceOpKind::Concat { axis } => GraphNode::new(
            op.name.clone(),
            checked(OpKind::Concat, opset)?,
            inputs,
            vec![output],
        )
        .with_attr("axis", AttrValue::Int(*axis as i64)),
    };
    graph.nodes.push(node);
    Ok(())
}

/// Rejects operations the configured opset does not admit.
fn checked(op: OpKind, opset: u32) -> Result<OpKind, ExportError> {
    let required = op.min_opset();
    if opset < required {
        return Err(ExportError::UnsupportedOp {
            op: op.name(),
            required,
            opset,
        });
    }
    Ok(op)
}

#[allow(clippy::cast_possible_wrap)]
fn ints(values: &[usize]) -> AttrValue {
    AttrValue::Ints(values.iter().map(|&v| v as i64).collect())
}

fn signature(name: &str, dims: &[usize], dynamic: Option<&BTreeSet<usize>>) -> TensorSignature {
    let dims = dims
        .iter()
        .enumerate()
        .map(|(axis, &extent)| {
            if dynamic.is_some_and(|axes| axes.contains(&axis)) {
                Dim::Symbolic(axis_symbol(axis))
            } else {
                Dim::Static(extent as u64)
            }
        })
        .collect();
    TensorSignature::new(name, DType::F32, dims)
}

fn axis_symbol(axis: usize) -> String {
    if axis == 0 {
        "batch".to_string()
    } else {
        format!("dim{axis}")
    }
}

/// Folds pass-through structure out of a graph: `Identity` nodes whose
/// output is not a declared graph output are elided and their consumers
/// rewired, then initializers no node references are dropped. Declared
/// signatures are never changed.
pub fn fold_graph(graph: &mut GraphModel) {
    let output_names: BTreeSet<String> = graph.outputs.iter().map(|s| s.name.clone()).collect();

    let mut alias: BTreeMap<String, String> = BTreeMap::new();
    graph.nodes.retain(|node| {
        let elidable = node.op == OpKind::Identity
            && node.inputs.len() == 1
            && node.outputs.len() == 1
            && !output_names.contains(&node.outputs[0]);
        if elidable {
            alias.insert(node.outputs[0].clone(), node.inputs[0].clone());
        }
        !elidable
    });

    if !alias.is_empty() {
        for node in &mut graph.nodes {
            for input in &mut node.inputs {
                *input = resolve_alias(&alias, input);
            }
        }
    }

    let referenced: BTreeSet<&str> = graph
        .nodes
        .iter()
        .flat_map(|n| n.inputs.iter())
        .map(String::as_str)
        .collect();
    graph.initializers.retain(|i| referenced.contains(i.name.as_str()));
}

fn resolve_alias(alias: &BTreeMap<String, String>, name: &str) -> String {
    let mut current = name;
    // Aliases form chains, never cycles; bound the walk anyway.
    for _ in 0..alias.len() {
        match alias.get(current) {
            Some(next) => current = next,
            None => break,
        }
    }
    current.to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use graph_ir::{load_graph_file, validate_graph};
    use model_ir::{Activation, ConvSpec, DetectorArchive, DetectorSpec, HeadSpec, LayerSpec};

    type B = NdArray;

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

    fn eval_module(spec: &DetectorSpec) -> DetectorModule<B> {
        let archive = DetectorArchive::new(spec.clone(), spec.init_weights());
        let mut module = DetectorModule::from_archive(&archive, &Default::default()).unwrap();
        module.set_training(false);
        module
    }

    fn tiny_config(size: usize) -> ExportConfig {
        ExportConfig::default().with_input_size(size)
    }

    #[test]
    fn export_writes_a_valid_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.irg");
        let module = eval_module(&tiny_spec());

        let artifact = ExportEngine::new()
            .export(&module, &tiny_config(16), &path)
            .unwrap();
        assert!(artifact.size_bytes > 0);
        assert_eq!(artifact.opset, 12);

        let graph = load_graph_file(&path).unwrap();
        let report = validate_graph(&graph, &["images".into()], &["output".into()]);
        assert!(report.passed(), "violations: {report}");
        assert_eq!(graph.metadata.get("model.name").map(String::as_str), Some("tiny"));
    }

    #[test]
    fn silu_decomposes_into_sigmoid_and_mul() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.irg");
        let module = eval_module(&tiny_spec());
        ExportEngine::new()
            .export(&module, &tiny_config(16), &path)
            .unwrap();

        let graph = load_graph_file(&path).unwrap();
        let sigmoids = graph.nodes.iter().filter(|n| n.op == OpKind::Sigmoid).count();
        let muls = graph.nodes.iter().filter(|n| n.op == OpKind::Mul).count();
        // Two SiLU blocks plus the final prediction sigmoid.
        assert_eq!(muls, 2);
        assert_eq!(sigmoids, 3);
    }

    #[test]
    fn dynamic_batch_axis_is_symbolic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.irg");
        let module = eval_module(&tiny_spec());
        let artifact = ExportEngine::new()
            .export(&module, &tiny_config(16), &path)
            .unwrap();

        assert_eq!(artifact.inputs[0].dims[0], Dim::Symbolic("batch".into()));
        assert_eq!(artifact.inputs[0].dims[1], Dim::Static(3));
        assert_eq!(artifact.outputs[0].dims[0], Dim::Symbolic("batch".into()));
        assert_eq!(artifact.outputs[0].dims[2], Dim::Static(6));
    }

    #[test]
    fn config_rank_is_checked_before_tracing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.irg");
        let module = eval_module(&tiny_spec());
        let config = ExportConfig::default().with_input_shape(vec![3, 16, 16]);

        let err = ExportEngine::new().export(&module, &config, &path).unwrap_err();
        assert!(matches!(
            err,
            ExportError::Config(ConfigError::InvalidRank(3))
        ));
        assert!(!path.exists(), "no artifact may be written on config errors");
    }

    #[test]
    fn trace_failure_is_distinct_from_config_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.irg");
        let module = eval_module(&tiny_spec());
        // Valid rank, but 10 is not divisible by the model stride 4.
        let config = tiny_config(10);

        let err = ExportEngine::new().export(&module, &config, &path).unwrap_err();
        assert!(matches!(err, ExportError::Trace(_)));
    }

    #[test]
    fn upsample_needs_opset_eleven() {
        let mut spec = tiny_spec();
        spec.stem.push(LayerSpec::Conv(ConvSpec::downsample(4)));
        spec.heads[0].layers = vec![LayerSpec::Upsample { scale: 2 }];
        let module = eval_module(&spec);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("up.irg");

        let err = ExportEngine::new()
            .export(&module, &tiny_config(16).with_opset(10), &path)
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::UnsupportedOp { op: "Resize", required: 11, opset: 10 }
        ));

        // The same module exports fine once the opset admits Resize.
        let artifact = ExportEngine::new()
            .export(&module, &tiny_config(16).with_opset(11), &path)
            .unwrap();
        assert!(artifact.node_count > 0);
    }

    #[test]
    fn leaky_relu_lowers_with_alpha() {
        let mut spec = tiny_spec();
        spec.stem = vec![LayerSpec::Conv(ConvSpec {
            activation: Activation::LeakyRelu { slope: 0.1 },
            ..ConvSpec::downsample(4)
        })];
        let module = eval_module(&spec);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lrelu.irg");
        ExportEngine::new().export(&module, &tiny_config(16), &path).unwrap();

        let graph = load_graph_file(&path).unwrap();
        let node = graph.nodes.iter().find(|n| n.op == OpKind::LeakyRelu).unwrap();
        assert_eq!(node.attr("alpha"), Some(&AttrValue::Float(0.1)));
    }

    #[test]
    fn export_is_signature_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let module = eval_module(&tiny_spec());
        let config = tiny_config(16);

        let first = ExportEngine::new()
            .export(&module, &config, &dir.path().join("a.irg"))
            .unwrap();
        let second = ExportEngine::new()
            .export(&module, &config, &dir.path().join("b.irg"))
            .unwrap();
        assert_eq!(first.inputs, second.inputs);
        assert_eq!(first.outputs, second.outputs);
        assert_eq!(first.node_count, second.node_count);
    }

    #[test]
    fn fold_elides_identity_and_orphans() {
        let mut graph = GraphModel::new(12, "test");
        graph.inputs.push(signature("images", &[1, 3], None));
        graph.outputs.push(signature("output", &[1, 3], None));
        graph.initializers.push(Initializer::new("scale", vec![3], vec![2.0; 3]));
        graph.initializers.push(Initializer::new("orphan", vec![1], vec![0.0]));
        graph.nodes.push(GraphNode::new(
            "pass",
            OpKind::Identity,
            vec!["images".into()],
            vec!["pass.out".into()],
        ));
        graph.nodes.push(GraphNode::new(
            "mul",
            OpKind::Mul,
            vec!["pass.out".into(), "scale".into()],
            vec!["output".into()],
        ));

        fold_graph(&mut graph);
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].inputs, vec!["images".to_string(), "scale".to_string()]);
        assert_eq!(graph.initializers.len(), 1);
        assert_eq!(graph.initializers[0].name, "scale");

        let report = validate_graph(&graph, &["images".into()], &["output".into()]);
        assert!(report.passed(), "violations: {report}");
    }

    #[test]
    fn fold_keeps_identity_feeding_graph_output() {
        let mut graph = GraphModel::new(12, "test");
        graph.inputs.push(signature("images", &[1, 3], None));
        graph.outputs.push(signature("output", &[1, 3], None));
        graph.nodes.push(GraphNode::new(
            "pass",
            OpKind::Identity,
            vec!["images".into()],
            vec!["output".into()],
        ));

        fold_graph(&mut graph);
        assert_eq!(graph.nodes.len(), 1, "output-producing node must survive");
    }

    #[test]
    fn scale_one_upsample_folds_away() {
        let mut spec = tiny_spec();
        spec.heads[0].layers.push(LayerSpec::Upsample { scale: 1 });
        let module = eval_module(&spec);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noop.irg");
        ExportEngine::new().export(&module, &tiny_config(16), &path).unwrap();

        let graph = load_graph_file(&path).unwrap();
        assert!(graph.nodes.iter().all(|n| n.op != OpKind::Identity));
    }
}
