//! Shared data model: coordinates, modules, dependency edges, the graph and
//! the project-structure overlay.

pub mod coordinate;
pub mod graph;
pub mod structure;

pub use coordinate::{Coordinate, Family, ParseEnumError, Scope};
pub use graph::{DEFAULT_PACKAGING, Dependency, DependencyGraph, DependencyKey, GraphError, Module};
pub use structure::{BuildUnit, Containment, ProjectStructure};
