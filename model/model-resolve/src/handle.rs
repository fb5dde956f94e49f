//! Resolved checkpoint handles tagged by their serialization convention.

use model_ir::DetectorArchive;
use serde::{Deserialize, Serialize};

/// The serialization convention a checkpoint was resolved through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Binary detector archive; directly invocable.
    DirectModule,
    /// Raw dictionary wrapping the payload under a known key.
    DictWrapped,
    /// State dictionary made invocable through an externally supplied
    /// architecture definition.
    ArchitectureRequired,
    /// Architecture fetched from the hub registry by name.
    ExternalHubModel,
}

impl SourceKind {
    /// Human-readable kind name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DirectModule => "direct-module",
            Self::DictWrapped => "dict-wrapped",
            Self::ArchitectureRequired => "architecture-required",
            Self::ExternalHubModel => "external-hub-model",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The raw object obtained from disk by a resolution strategy.
///
/// Immutable once produced; everything the normalizer needs is captured
/// at resolution time.
#[derive(Debug, Clone)]
pub enum CheckpointHandle {
    /// A complete archive from the binary convention.
    DirectModule {
        /// Decoded archive.
        archive: DetectorArchive,
    },
    /// A decoded JSON object whose payload still needs unwrapping.
    DictWrapped {
        /// Top-level entries of the checkpoint dictionary.
        entries: serde_json::Map<String, serde_json::Value>,
    },
    /// An archive rebuilt from a bare state dictionary by an external
    /// architecture definition.
    ArchitectureRequired {
        /// Reconstructed archive.
        archive: DetectorArchive,
    },
    /// An archive assembled from a hub bundle.
    ExternalHubModel {
        /// Assembled archive.
        archive: DetectorArchive,
    },
}

impl CheckpointHandle {
    /// The convention tag of this handle.
    #[must_use]
    pub const fn source_kind(&self) -> SourceKind {
        match self {
            Self::DirectModule { .. } => SourceKind::DirectModule,
            Self::DictWrapped { .. } => SourceKind::DictWrapped,
            Self::ArchitectureRequired { .. } => SourceKind::ArchitectureRequired,
            Self::ExternalHubModel { .. } => SourceKind::ExternalHubModel,
        }
    }
}
