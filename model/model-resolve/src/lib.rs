//! Checkpoint resolution for the conversion pipeline.
//!
//! A single checkpoint file may have been produced by one of several
//! incompatible serialization conventions: the modern binary detector
//! archive, a hub bundle naming a registered architecture, or a raw JSON
//! dictionary wrapping the real payload (or carrying only a state
//! dictionary). This crate probes the conventions in a fixed order via a
//! [`StrategyChain`], tags the result with its [`SourceKind`], and
//! normalizes the resolved handle into an evaluation-mode module.
//!
//! # Resolution Order
//!
//! Strategies run most-specific first: the binary archive probe, then the
//! hub bundle loader, then the generic dict loader. The order is part of
//! the contract; the generic loader would otherwise claim hub bundles and
//! surface worse diagnostics. Every failed attempt is recorded and
//! reported; no failure is silently dropped.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod chain;
mod error;
mod format;
mod handle;
mod hub;
mod normalize;
mod strategies;
mod strategy;

pub use chain::{Resolution, ResolutionFailure, StrategyChain};
pub use error::{FormatError, NormalizeError};
pub use format::{
    is_archive_file, load_archive_bytes, load_archive_file, save_archive_bytes, save_archive_file,
    ARCHIVE_MAGIC, ARCHIVE_VERSION,
};
pub use handle::{CheckpointHandle, SourceKind};
pub use hub::{ArchReconstructor, HubRegistry};
pub use normalize::{ModelNormalizer, NormalizedModule};
pub use strategies::{DetectorArchiveStrategy, HubModelStrategy, RawDictStrategy};
pub use strategy::{ResolveStrategy, StrategyAttempt, StrategyError, StrategyErrorKind};
