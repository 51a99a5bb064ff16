//! Consumed boundary of the upstream dependency resolver.

pub mod tree;

pub use tree::{ConflictMarker, NodeIdx, RawNode, RawNodeSpec, ResolvedTree, TreeBuilder};
