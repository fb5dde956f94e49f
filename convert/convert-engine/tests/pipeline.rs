//! End-to-end conversion pipeline tests.
//!
//! Each test builds a checkpoint file in one of the supported
//! serialization conventions, runs the full convert sequence, and checks
//! the reported outcome. The large 640-input detector runs once; the
//! other scenarios use a small architecture to stay fast.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};

use burn::backend::NdArray;
use convert_engine::{ConfigError, ConvertError, Converter, ExportConfig, ExportError};
use graph_ir::Dim;
use model_ir::{ConvSpec, DetectorArchive, DetectorSpec, HeadSpec, LayerSpec, StateDict};
use model_resolve::{
    save_archive_file, ArchReconstructor, HubRegistry, NormalizeError, SourceKind,
    StrategyErrorKind,
};
use tempfile::TempDir;

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

fn tiny_archive() -> DetectorArchive {
    let spec = tiny_spec();
    DetectorArchive::new(spec.clone(), spec.init_weights())
}

fn tiny_config(size: usize) -> ExportConfig {
    ExportConfig::default().with_input_size(size)
}

fn write_json(dir: &TempDir, name: &str, value: &serde_json::Value) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, value.to_string()).unwrap();
    path
}

fn out_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

struct TinyReconstructor;

impl ArchReconstructor for TinyReconstructor {
    fn reconstruct(&self, state: &StateDict) -> model_ir::Result<DetectorArchive> {
        Ok(DetectorArchive::new(tiny_spec(), state.clone()))
    }
}

#[test]
fn direct_archive_converts_end_to_end_at_640() {
    let dir = tempfile::tempdir().unwrap();
    let registry = HubRegistry::builtin();
    let spec = registry.get("yolo-640").unwrap().clone();
    let archive = DetectorArchive::new(spec.clone(), spec.init_weights());

    let input = dir.path().join("detector.ckpt");
    save_archive_file(&archive, &input).unwrap();
    let output = out_path(&dir, "detector.irg");

    let report = Converter::<B>::new()
        .convert(&input, &output, &ExportConfig::default())
        .unwrap();

    assert_eq!(report.source, SourceKind::DirectModule);
    assert!(report.attempts.is_empty(), "first strategy should win");
    assert!(report.validation.passed());
    assert!(output.exists());
    assert!(report.artifact.size_bytes > 0);

    let input_sig = &report.artifact.inputs[0];
    assert_eq!(input_sig.name, "images");
    assert_eq!(
        input_sig.dims,
        vec![
            Dim::Symbolic("batch".into()),
            Dim::Static(3),
            Dim::Static(640),
            Dim::Static(640),
        ]
    );

    let output_sig = &report.artifact.outputs[0];
    assert_eq!(output_sig.name, "output");
    assert_eq!(
        output_sig.dims,
        vec![
            Dim::Symbolic("batch".into()),
            Dim::Static(25200),
            Dim::Static(85),
        ]
    );
}

#[test]
fn wrapped_model_dict_converts() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = serde_json::json!({
        "epoch": 42,
        "model": tiny_archive(),
        "optimizer": {"lr": 0.001},
    });
    let input = write_json(&dir, "wrapped.ckpt", &checkpoint);
    let output = out_path(&dir, "wrapped.irg");

    let report = Converter::<B>::new()
        .convert(&input, &output, &tiny_config(16))
        .unwrap();

    assert_eq!(report.source, SourceKind::DictWrapped);
    // The archive and hub strategies decline a plain dict first.
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(report.attempts[0].strategy, "detector-archive");
    assert_eq!(report.attempts[1].strategy, "hub-architecture");
}

#[test]
fn hub_bundle_converts_via_registry() {
    let dir = tempfile::tempdir().unwrap();
    let spec = tiny_spec();
    let mut registry = HubRegistry::builtin();
    registry.register(spec.clone());

    let bundle = serde_json::json!({
        "arch": "tiny",
        "weights": spec.init_weights(),
    });
    let input = write_json(&dir, "bundle.ckpt", &bundle);
    let output = out_path(&dir, "bundle.irg");

    let report = Converter::<B>::with_registry(registry)
        .convert(&input, &output, &tiny_config(16))
        .unwrap();

    assert_eq!(report.source, SourceKind::ExternalHubModel);
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].strategy, "detector-archive");
    assert_eq!(report.attempts[0].kind, StrategyErrorKind::Unrecognized);
}

#[test]
fn bare_state_dict_fails_with_architecture_required() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = serde_json::json!({"state_dict": tiny_spec().init_weights()});
    let input = write_json(&dir, "state.ckpt", &checkpoint);
    let output = out_path(&dir, "state.irg");

    let err = Converter::<B>::new()
        .convert(&input, &output, &tiny_config(16))
        .unwrap_err();

    assert!(matches!(
        err,
        ConvertError::Normalize(NormalizeError::ArchitectureRequired { .. })
    ));
    assert!(!output.exists(), "failed conversions must not leave artifacts");
}

#[test]
fn reconstructor_recovers_bare_state_dict() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = serde_json::json!({"state_dict": tiny_spec().init_weights()});
    let input = write_json(&dir, "state.ckpt", &checkpoint);
    let output = out_path(&dir, "state.irg");

    let report = Converter::<B>::new()
        .with_reconstructor(Box::new(TinyReconstructor))
        .convert(&input, &output, &tiny_config(16))
        .unwrap();

    assert_eq!(report.source, SourceKind::ArchitectureRequired);
    assert!(report.validation.passed());
}

#[test]
fn missing_input_short_circuits_before_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("nope.ckpt");
    let output = out_path(&dir, "nope.irg");

    let err = Converter::<B>::new()
        .convert(&input, &output, &tiny_config(16))
        .unwrap_err();

    let ConvertError::InputNotFound(path) = err else {
        panic!("wrong error variant: {err}");
    };
    assert_eq!(path, input);
}

#[test]
fn unresolvable_file_reports_every_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("garbage.ckpt");
    std::fs::write(&input, b"\x00\x01\x02 not a checkpoint").unwrap();
    let output = out_path(&dir, "garbage.irg");

    let err = Converter::<B>::new()
        .convert(&input, &output, &tiny_config(16))
        .unwrap_err();

    let ConvertError::Resolution(failure) = err else {
        panic!("wrong error variant: {err}");
    };
    let strategies: Vec<&str> = failure.attempts.iter().map(|a| a.strategy).collect();
    assert_eq!(strategies, vec!["detector-archive", "hub-architecture", "raw-dict"]);
}

#[test]
fn bad_input_rank_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("detector.ckpt");
    save_archive_file(&tiny_archive(), &input).unwrap();
    let output = out_path(&dir, "detector.irg");

    let config = ExportConfig::default().with_input_shape(vec![3, 16, 16]);
    let err = Converter::<B>::new()
        .convert(&input, &output, &config)
        .unwrap_err();

    assert!(matches!(
        err,
        ConvertError::Export(ExportError::Config(ConfigError::InvalidRank(3)))
    ));
}

#[test]
fn repeated_conversion_declares_identical_signatures() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("detector.ckpt");
    save_archive_file(&tiny_archive(), &input).unwrap();

    let converter = Converter::<B>::new();
    let config = tiny_config(16);
    let first = converter
        .convert(&input, &out_path(&dir, "a.irg"), &config)
        .unwrap();
    let second = converter
        .convert(&input, &out_path(&dir, "b.irg"), &config)
        .unwrap();

    assert_eq!(first.artifact.inputs, second.artifact.inputs);
    assert_eq!(first.artifact.outputs, second.artifact.outputs);
}

#[test]
fn distinct_output_paths_do_not_interfere() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("detector.ckpt");
    save_archive_file(&tiny_archive(), &input).unwrap();

    let converter = Converter::<B>::new();
    let config = tiny_config(16);
    let a = converter.convert(&input, &out_path(&dir, "a.irg"), &config).unwrap();
    let b = converter.convert(&input, &out_path(&dir, "b.irg"), &config).unwrap();
    assert!(Path::new(&a.artifact.path).exists());
    assert!(Path::new(&b.artifact.path).exists());
}
