//! The built-in resolution strategies, most specific first.

use std::path::Path;

use model_ir::{DetectorArchive, StateDict};
use tracing::debug;

use crate::error::FormatError;
use crate::format;
use crate::handle::CheckpointHandle;
use crate::hub::HubRegistry;
use crate::strategy::{ResolveStrategy, StrategyError};

/// Loads the modern binary detector archive (`CFA1` container).
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectorArchiveStrategy;

impl ResolveStrategy for DetectorArchiveStrategy {
    fn name(&self) -> &'static str {
        "detector-archive"
    }

    fn resolve(&self, path: &Path) -> Result<CheckpointHandle, StrategyError> {
        let archive = format::load_archive_file(path).map_err(|e| match e {
            FormatError::InvalidMagic(_) => {
                StrategyError::unrecognized("file does not start with the CFA1 archive magic")
            }
            FormatError::UnsupportedVersion(v) => {
                StrategyError::malformed(format!("archive container version {v} is unsupported"))
            }
            FormatError::Decode(reason) => StrategyError::malformed(reason),
            FormatError::Io(e) => StrategyError::io(e.to_string()),
            FormatError::Encode(reason) => StrategyError::malformed(reason),
        })?;
        debug!(name = %archive.spec.name, "loaded binary detector archive");
        Ok(CheckpointHandle::DirectModule { archive })
    }
}

/// Loads a hub bundle: a JSON object naming a registered architecture
/// (`arch`) plus its weights (`weights` or `state_dict`).
#[derive(Debug, Clone, Default)]
pub struct HubModelStrategy {
    registry: HubRegistry,
}

impl HubModelStrategy {
    /// Creates the strategy over an architecture registry.
    #[must_use]
    pub fn new(registry: HubRegistry) -> Self {
        Self { registry }
    }
}

impl ResolveStrategy for HubModelStrategy {
    fn name(&self) -> &'static str {
        "hub-architecture"
    }

    fn resolve(&self, path: &Path) -> Result<CheckpointHandle, StrategyError> {
        let object = read_json_object(path)?;

        let Some(arch_value) = object.get("arch") else {
            return Err(StrategyError::unrecognized(
                "JSON object has no `arch` entry; not a hub bundle",
            ));
        };
        let Some(arch) = arch_value.as_str() else {
            return Err(StrategyError::malformed("`arch` entry is not a string"));
        };

        let Some(spec) = self.registry.get(arch) else {
            return Err(StrategyError::unknown_architecture(format!(
                "architecture `{arch}` is not in the hub registry (known: {})",
                self.registry.names().join(", ")
            )));
        };

        let weights_value = object
            .get("weights")
            .or_else(|| object.get("state_dict"))
            .ok_or_else(|| {
                StrategyError::malformed("hub bundle carries neither `weights` nor `state_dict`")
            })?;
        let weights: StateDict = serde_json::from_value(weights_value.clone())
            .map_err(|e| StrategyError::malformed(format!("weights do not decode: {e}")))?;

        let mut archive = DetectorArchive::new(spec.clone(), weights)
            .with_metadata("hub.arch", arch);
        if let Some(names) = object.get("class_names") {
            archive.class_names = serde_json::from_value(names.clone())
                .map_err(|e| StrategyError::malformed(format!("class names do not decode: {e}")))?;
        }

        debug!(arch, "assembled hub bundle from registry architecture");
        Ok(CheckpointHandle::ExternalHubModel { archive })
    }
}

/// Loads any JSON object as a wrapped dictionary; the normalizer decides
/// whether the payload is usable. Runs last: it would otherwise claim
/// hub bundles.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDictStrategy;

impl ResolveStrategy for RawDictStrategy {
    fn name(&self) -> &'static str {
        "raw-dict"
    }

    fn resolve(&self, path: &Path) -> Result<CheckpointHandle, StrategyError> {
        let entries = read_json_object(path)?;
        debug!(keys = entries.len(), "decoded raw checkpoint dictionary");
        Ok(CheckpointHandle::DictWrapped { entries })
    }
}

fn read_json_object(
    path: &Path,
) -> Result<serde_json::Map<String, serde_json::Value>, StrategyError> {
    let text = std::fs::read_to_string(path).map_err(|e| StrategyError::io(e.to_string()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|_| StrategyError::unrecognized("file is not a JSON document"))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(StrategyError::unrecognized(format!(
            "top-level JSON value is {}, not an object",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
