//! Graph construction from the resolver tree.
//!
//! ## Submodules
//!
//! - [`builder`]: depth-bounded walk with per-path cycle protection and
//!   conflict marking.

pub mod builder;

pub use builder::{BuildStats, DepthLimit, GraphBuilder};
