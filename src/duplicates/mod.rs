//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Bounded parallel fingerprinting with failure isolation
//! - Exact, perceptual and video similarity rules
//! - Original selection and the per-run consumed set
//! - The pass pipeline driven by [`DuplicateFinder`]

pub mod executor;
pub mod finder;
pub mod groups;
pub mod similarity;

pub use executor::{ExecutorError, ParallelExecutor};
pub use finder::{
    DuplicateFinder, FinderConfig, FinderError, ScanSummary, DEFAULT_SENSITIVITY,
    DEFAULT_VIDEO_COMPARE_LIMIT,
};
pub use groups::{
    group_by_key, select_original, ConsumedSet, DuplicateGroup, MatchKind, PassStats,
};
