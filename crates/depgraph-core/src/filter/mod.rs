//! Glob patterns and the output-only filter engine.

pub mod engine;
pub mod pattern;

pub use engine::{FilterEngine, FilterRules, FilterStats, Verdict};
pub use pattern::{ArtifactPattern, PatternError};
