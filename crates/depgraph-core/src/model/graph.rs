//! The versioned, conflict-aware dependency graph.
//!
//! A [`DependencyGraph`] owns one designated root [`Module`], a node set
//! unique by [`Coordinate`] and an ordered edge list. Every edge endpoint is
//! guaranteed to be a node: [`DependencyGraph::add_edge`] refuses edges whose
//! endpoints were never registered. Edges are unique by
//! [`Dependency::key`]; the first edge added under a key is kept.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use super::coordinate::{Coordinate, Family, Scope};

/// Default packaging kind when the resolver does not report one.
pub const DEFAULT_PACKAGING: &str = "jar";

/// A build artifact at one exact version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub coordinate: Coordinate,
    pub packaging: String,
    /// Export timestamp, microseconds since the Unix epoch.
    pub exported_at_us: i64,
    pub is_latest: bool,
}

impl Module {
    /// A module stamped with the current wall clock and flagged latest.
    pub fn new(coordinate: Coordinate, packaging: impl Into<String>) -> Self {
        Self::at(coordinate, packaging, chrono::Utc::now().timestamp_micros())
    }

    /// A latest-flagged module with an explicit export timestamp.
    pub fn at(coordinate: Coordinate, packaging: impl Into<String>, exported_at_us: i64) -> Self {
        Self {
            coordinate,
            packaging: packaging.into(),
            exported_at_us,
            is_latest: true,
        }
    }
}

/// A directed dependency edge between two modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub source: Coordinate,
    pub target: Coordinate,
    pub scope: Scope,
    pub optional: bool,
    /// Number of edges from the exported root to `target`.
    pub depth: u32,
    /// `false` when the target was requested but superseded by mediation.
    pub resolved: bool,
}

/// Overwrite identity of an edge: `(source, target, scope, depth)`.
pub type DependencyKey<'a> = (&'a Coordinate, &'a Coordinate, Scope, u32);

impl Dependency {
    #[must_use]
    pub const fn key(&self) -> DependencyKey<'_> {
        (&self.source, &self.target, self.scope, self.depth)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("edge {from} -> {to} references a node that is not in the graph")]
    UnknownEndpoint { from: Coordinate, to: Coordinate },
}

/// Root module, unique node set, edge list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: Vec<Module>,
    index: HashMap<Coordinate, usize>,
    edges: Vec<Dependency>,
    /// `(source node, target node, scope, depth)` of every edge.
    edge_keys: HashSet<(usize, usize, Scope, u32)>,
}

impl DependencyGraph {
    /// A graph containing only `root`.
    #[must_use]
    pub fn new(root: Module) -> Self {
        let mut index = HashMap::new();
        index.insert(root.coordinate.clone(), 0);
        Self {
            nodes: vec![root],
            index,
            edges: Vec::new(),
            edge_keys: HashSet::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Module {
        &self.nodes[0]
    }

    /// Register a node. Returns `false` if the coordinate was already present,
    /// in which case the existing module is kept unchanged.
    pub fn add_node(&mut self, module: Module) -> bool {
        if self.index.contains_key(&module.coordinate) {
            return false;
        }
        self.index.insert(module.coordinate.clone(), self.nodes.len());
        self.nodes.push(module);
        true
    }

    /// Append an edge whose endpoints are both registered nodes. Returns
    /// `false` if an edge with the same key is already present.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownEndpoint`] if either endpoint is missing.
    pub fn add_edge(&mut self, edge: Dependency) -> Result<bool, GraphError> {
        if !self.contains(&edge.source) || !self.contains(&edge.target) {
            return Err(GraphError::UnknownEndpoint {
                from: edge.source,
                to: edge.target,
            });
        }
        Ok(self.push_edge(edge))
    }

    /// Append an edge whose endpoints the caller has already registered.
    pub(crate) fn push_edge(&mut self, edge: Dependency) -> bool {
        let (Some(&source), Some(&target)) =
            (self.index.get(&edge.source), self.index.get(&edge.target))
        else {
            return false;
        };
        if !self.edge_keys.insert((source, target, edge.scope, edge.depth)) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    #[must_use]
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.index.contains_key(coordinate)
    }

    #[must_use]
    pub fn node(&self, coordinate: &Coordinate) -> Option<&Module> {
        self.index.get(coordinate).map(|&idx| &self.nodes[idx])
    }

    /// Nodes in first-seen order; the root comes first.
    #[must_use]
    pub fn nodes(&self) -> &[Module] {
        &self.nodes
    }

    #[must_use]
    pub fn edges(&self) -> &[Dependency] {
        &self.edges
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of edges whose target lost version mediation.
    #[must_use]
    pub fn conflict_count(&self) -> usize {
        self.edges.iter().filter(|edge| !edge.resolved).count()
    }

    /// Every coordinate in the node set.
    #[must_use]
    pub fn coordinates(&self) -> HashSet<Coordinate> {
        self.index.keys().cloned().collect()
    }

    /// Unique `(group, artifact)` families, sorted.
    #[must_use]
    pub fn families(&self) -> BTreeSet<Family> {
        self.nodes
            .iter()
            .map(|module| module.coordinate.family())
            .collect()
    }

    /// Outgoing edges of `coordinate`, in insertion order.
    pub fn outgoing<'a>(
        &'a self,
        coordinate: &'a Coordinate,
    ) -> impl Iterator<Item = &'a Dependency> + 'a {
        self.edges
            .iter()
            .filter(move |edge| &edge.source == coordinate)
    }
}
