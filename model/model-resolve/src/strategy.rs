//! The strategy contract and per-attempt diagnostics.

use std::path::Path;

use thiserror::Error;

use crate::handle::CheckpointHandle;

/// Why a strategy declined or failed to load a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyErrorKind {
    /// The file is not in this strategy's convention at all.
    Unrecognized,
    /// The convention was recognized but the payload is broken.
    Malformed,
    /// The bundle names an architecture the registry does not know.
    UnknownArchitecture,
    /// The file could not be read.
    Io,
}

impl StrategyErrorKind {
    /// Kind name for diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unrecognized => "unrecognized",
            Self::Malformed => "malformed",
            Self::UnknownArchitecture => "unknown-architecture",
            Self::Io => "io",
        }
    }
}

impl std::fmt::Display for StrategyErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single strategy's failure, kind plus message.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct StrategyError {
    /// Failure category.
    pub kind: StrategyErrorKind,
    /// Specific reason.
    pub message: String,
}

impl StrategyError {
    /// The file is not in this strategy's convention.
    #[must_use]
    pub fn unrecognized(message: impl Into<String>) -> Self {
        Self {
            kind: StrategyErrorKind::Unrecognized,
            message: message.into(),
        }
    }

    /// The convention matched but the payload is broken.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: StrategyErrorKind::Malformed,
            message: message.into(),
        }
    }

    /// The named architecture is not registered.
    #[must_use]
    pub fn unknown_architecture(message: impl Into<String>) -> Self {
        Self {
            kind: StrategyErrorKind::UnknownArchitecture,
            message: message.into(),
        }
    }

    /// The file could not be read.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self {
            kind: StrategyErrorKind::Io,
            message: message.into(),
        }
    }
}

/// One recorded resolution attempt: which strategy, which failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyAttempt {
    /// Strategy name.
    pub strategy: &'static str,
    /// Failure category.
    pub kind: StrategyErrorKind,
    /// Specific reason.
    pub message: String,
}

impl std::fmt::Display for StrategyAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.strategy, self.kind, self.message)
    }
}

/// One way of turning an opaque checkpoint file into a handle.
///
/// Implementations must be side-effect-free on failure: no partial files,
/// no mutated state, so the chain can safely continue to the next
/// strategy and callers can safely retry.
pub trait ResolveStrategy {
    /// Stable strategy name used in attempt logs.
    fn name(&self) -> &'static str;

    /// Attempts to load the checkpoint at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`StrategyError`] describing why this convention does
    /// not apply or why its payload is unusable.
    fn resolve(&self, path: &Path) -> Result<CheckpointHandle, StrategyError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn strategy_error_display() {
        let err = StrategyError::unrecognized("no CFA1 magic");
        assert_eq!(err.to_string(), "unrecognized: no CFA1 magic");
    }

    #[test]
    fn attempt_display_names_strategy() {
        let attempt = StrategyAttempt {
            strategy: "detector-archive",
            kind: StrategyErrorKind::Malformed,
            message: "truncated payload".into(),
        };
        assert_eq!(
            attempt.to_string(),
            "detector-archive (malformed): truncated payload"
        );
    }
}
