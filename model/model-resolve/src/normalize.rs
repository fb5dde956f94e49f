//! Normalization: from a resolved handle to an evaluation-mode module.

use burn::prelude::Backend;
use tracing::debug;

use model_ir::{DetectorArchive, DetectorModule, StateDict};

use crate::error::NormalizeError;
use crate::handle::{CheckpointHandle, SourceKind};
use crate::hub::ArchReconstructor;

/// An invocable module in evaluation mode, tagged with the convention it
/// was resolved through. Owned exclusively by the pipeline run that
/// created it.
#[derive(Debug)]
pub struct NormalizedModule<B: Backend> {
    module: DetectorModule<B>,
    source: SourceKind,
}

impl<B: Backend> NormalizedModule<B> {
    /// The underlying module.
    #[must_use]
    pub fn module(&self) -> &DetectorModule<B> {
        &self.module
    }

    /// The convention this module was resolved through.
    #[must_use]
    pub const fn source(&self) -> SourceKind {
        self.source
    }

    /// `true` once the evaluation-mode switch has been applied. Always
    /// holds for modules produced by [`ModelNormalizer::normalize`].
    #[must_use]
    pub fn is_eval(&self) -> bool {
        !self.module.is_training()
    }
}

/// Unwraps resolved handles and applies the evaluation-mode switch.
///
/// Dict-wrapped handles are probed for a `model` entry first, then
/// `state_dict`. A bare state dictionary fails with
/// [`NormalizeError::ArchitectureRequired`] unless an
/// [`ArchReconstructor`] collaborator was supplied.
pub struct ModelNormalizer<B: Backend> {
    device: B::Device,
    reconstructor: Option<Box<dyn ArchReconstructor>>,
}

impl<B: Backend> ModelNormalizer<B> {
    /// Creates a normalizer building modules on `device`.
    #[must_use]
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            reconstructor: None,
        }
    }

    /// Attaches the optional architecture reconstructor.
    #[must_use]
    pub fn with_reconstructor(mut self, reconstructor: Box<dyn ArchReconstructor>) -> Self {
        self.reconstructor = Some(reconstructor);
        self
    }

    /// Normalizes a resolved handle into an evaluation-mode module.
    ///
    /// # Errors
    ///
    /// Returns an error when the wrapped payload cannot be decoded, when a
    /// bare state dictionary has no reconstructor, or when module
    /// construction fails.
    pub fn normalize(
        &self,
        handle: CheckpointHandle,
    ) -> Result<NormalizedModule<B>, NormalizeError> {
        match handle {
            CheckpointHandle::DirectModule { archive } => {
                self.build(&archive, SourceKind::DirectModule)
            }
            CheckpointHandle::ExternalHubModel { archive } => {
                self.build(&archive, SourceKind::ExternalHubModel)
            }
            CheckpointHandle::ArchitectureRequired { archive } => {
                self.build(&archive, SourceKind::ArchitectureRequired)
            }
            CheckpointHandle::DictWrapped { entries } => self.unwrap_dict(&entries),
        }
    }

    fn unwrap_dict(
        &self,
        entries: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<NormalizedModule<B>, NormalizeError> {
        if let Some(value) = entries.get("model") {
            let archive: DetectorArchive = serde_json::from_value(value.clone())
                .map_err(|e| NormalizeError::Decode {
                    entry: "model",
                    reason: e.to_string(),
                })?;
            debug!("unwrapped `model` entry from checkpoint dictionary");
            return self.build(&archive, SourceKind::DictWrapped);
        }

        if let Some(value) = entries.get("state_dict") {
            let state: StateDict = serde_json::from_value(value.clone())
                .map_err(|e| NormalizeError::Decode {
                    entry: "state_dict",
                    reason: e.to_string(),
                })?;
            let Some(reconstructor) = self.reconstructor.as_deref() else {
                return Err(NormalizeError::ArchitectureRequired {
                    params: state.len(),
                });
            };
            let archive = reconstructor
                .reconstruct(&state)
                .map_err(|e| NormalizeError::Reconstruct(e.to_string()))?;
            debug!(arch = %archive.spec.name, "reconstructed architecture for bare state dict");
            return self.build(&archive, SourceKind::ArchitectureRequired);
        }

        let keys: Vec<&str> = entries.keys().map(String::as_str).collect();
        Err(NormalizeError::UnrecognizedContainer {
            keys: keys.join(", "),
        })
    }

    fn build(
        &self,
        archive: &DetectorArchive,
        source: SourceKind,
    ) -> Result<NormalizedModule<B>, NormalizeError> {
        let mut module = DetectorModule::from_archive(archive, &self.device)?;
        // Idempotent; checkpoints are written in training mode.
        module.set_training(false);
        Ok(NormalizedModule { module, source })
    }
}
