//! The conversion orchestrator.

use std::path::Path;

use burn::prelude::Backend;
use tracing::{info, warn};

use graph_ir::{load_graph_file, validate_graph, ValidationReport, Violation};
use model_resolve::{
    ArchReconstructor, HubRegistry, ModelNormalizer, SourceKind, StrategyAttempt, StrategyChain,
};

use crate::artifact::ExportArtifact;
use crate::config::ExportConfig;
use crate::engine::ExportEngine;
use crate::error::ConvertError;

/// Everything a successful conversion reports back to the caller.
#[derive(Debug)]
pub struct ConversionReport {
    /// The written artifact and its declared signatures.
    pub artifact: ExportArtifact,
    /// The passing validation report.
    pub validation: ValidationReport,
    /// Which convention resolved the checkpoint.
    pub source: SourceKind,
    /// Failed strategy attempts that preceded the successful one.
    pub attempts: Vec<StrategyAttempt>,
}

/// Composes resolution, normalization, export, and validation.
///
/// Sequencing is strict: each stage must succeed before the next runs,
/// and any failure short-circuits with full context. A conversion only
/// reports success after the written artifact reloads and passes
/// structural validation; bytes on disk alone do not count.
///
/// One converter may serve many conversions; each call owns its own
/// handles, modules, and artifacts, so concurrent calls are safe as long
/// as they target distinct output paths.
pub struct Converter<B: Backend> {
    chain: StrategyChain,
    normalizer: ModelNormalizer<B>,
    engine: ExportEngine,
}

impl<B: Backend> Converter<B>
where
    B::Device: Default,
{
    /// Creates a converter with the standard strategy chain and the
    /// built-in hub registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(HubRegistry::builtin())
    }

    /// Creates a converter resolving hub bundles against `registry`.
    #[must_use]
    pub fn with_registry(registry: HubRegistry) -> Self {
        Self {
            chain: StrategyChain::standard(registry),
            normalizer: ModelNormalizer::new(B::Device::default()),
            engine: ExportEngine::new(),
        }
    }
}

impl<B: Backend> Converter<B>
where
    B::Device: Default,
{
    /// Replaces the strategy chain.
    #[must_use]
    pub fn with_chain(mut self, chain: StrategyChain) -> Self {
        self.chain = chain;
        self
    }

    /// Attaches an architecture reconstructor for state-dictionary-only
    /// checkpoints.
    #[must_use]
    pub fn with_reconstructor(mut self, reconstructor: Box<dyn ArchReconstructor>) -> Self {
        self.normalizer = ModelNormalizer::new(B::Device::default())
            .with_reconstructor(reconstructor);
        self
    }

    /// Converts the checkpoint at `input` into a graph artifact at
    /// `output`.
    ///
    /// # Errors
    ///
    /// Returns the failing stage's error: [`ConvertError::InputNotFound`]
    /// before anything else runs, then resolution, normalization, export,
    /// or validation failures, each carrying its full diagnostics.
    pub fn convert(
        &self,
        input: &Path,
        output: &Path,
        config: &ExportConfig,
    ) -> Result<ConversionReport, ConvertError> {
        if !input.exists() {
            return Err(ConvertError::InputNotFound(input.to_path_buf()));
        }

        let resolution = self.chain.resolve(input)?;
        let source = resolution.handle.source_kind();
        let attempts = resolution.attempts;

        let normalized = self.normalizer.normalize(resolution.handle)?;
        info!(
            source = %source,
            model = normalized.module().name(),
            params = normalized.module().param_count(),
            "checkpoint normalized"
        );

        let artifact = self.engine.export(normalized.module(), config, output)?;

        let graph = match load_graph_file(&artifact.path) {
            Ok(graph) => graph,
            Err(e) => {
                warn!(%e, "written artifact does not reload");
                return Err(ConvertError::Validation(ValidationReport::from_violation(
                    Violation::Unreadable(e.to_string()),
                )));
            }
        };
        let validation = validate_graph(&graph, &config.input_names, &config.output_names);
        if !validation.passed() {
            warn!(violations = validation.violations().len(), "artifact failed validation");
            return Err(ConvertError::Validation(validation));
        }

        info!(
            path = %artifact.path.display(),
            size_bytes = artifact.size_bytes,
            "conversion succeeded"
        );
        Ok(ConversionReport {
            artifact,
            validation,
            source,
            attempts,
        })
    }
}

impl<B: Backend> Default for Converter<B>
where
    B::Device: Default,
{
    fn default() -> Self {
        Self::new()
    }
}
