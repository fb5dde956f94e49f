//! The ordered resolution chain.

use std::path::Path;

use tracing::{debug, info};

use crate::handle::CheckpointHandle;
use crate::hub::HubRegistry;
use crate::strategies::{DetectorArchiveStrategy, HubModelStrategy, RawDictStrategy};
use crate::strategy::{ResolveStrategy, StrategyAttempt};

/// All strategies failed; carries the complete ordered attempt log.
#[derive(Debug, Clone)]
pub struct ResolutionFailure {
    /// One entry per attempted strategy, in chain order.
    pub attempts: Vec<StrategyAttempt>,
}

impl std::fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "no resolution strategy could load the checkpoint ({} attempted):",
            self.attempts.len()
        )?;
        for attempt in &self.attempts {
            writeln!(f, "  - {attempt}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolutionFailure {}

/// A successful resolution: the handle plus the failures that preceded it.
#[derive(Debug)]
pub struct Resolution {
    /// The resolved checkpoint handle.
    pub handle: CheckpointHandle,
    /// Failed attempts from strategies earlier in the chain.
    pub attempts: Vec<StrategyAttempt>,
}

/// An ordered, fixed sequence of resolution strategies.
///
/// Strategies are tried in order; the first success wins and later
/// strategies are never invoked. Every failure is recorded with its
/// strategy name, kind, and message.
pub struct StrategyChain {
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl StrategyChain {
    /// Creates a chain from an explicit strategy sequence.
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn ResolveStrategy>>) -> Self {
        Self { strategies }
    }

    /// The standard chain, most specific first: binary detector archive,
    /// hub bundle against `registry`, then raw dictionary.
    #[must_use]
    pub fn standard(registry: HubRegistry) -> Self {
        Self::new(vec![
            Box::new(DetectorArchiveStrategy),
            Box::new(HubModelStrategy::new(registry)),
            Box::new(RawDictStrategy),
        ])
    }

    /// Strategy names in chain order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Tries each strategy in order against `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionFailure`] carrying every attempt when no
    /// strategy succeeds.
    pub fn resolve(&self, path: &Path) -> Result<Resolution, ResolutionFailure> {
        let mut attempts = Vec::new();
        for strategy in &self.strategies {
            match strategy.resolve(path) {
                Ok(handle) => {
                    info!(
                        strategy = strategy.name(),
                        kind = %handle.source_kind(),
                        "checkpoint resolved"
                    );
                    return Ok(Resolution { handle, attempts });
                }
                Err(err) => {
                    debug!(strategy = strategy.name(), %err, "strategy declined");
                    attempts.push(StrategyAttempt {
                        strategy: strategy.name(),
                        kind: err.kind,
                        message: err.message,
                    });
                }
            }
        }
        Err(ResolutionFailure { attempts })
    }
}
