//! Depth-bounded graph construction from the resolver tree.
//!
//! # Overview
//!
//! The builder walks the [`ResolvedTree`] depth-first and emits one
//! [`Dependency`] per traversal step, so the exported shape keeps tree edges
//! rather than a flattened closure. The same coordinate may appear at several
//! depths via different paths; each appearance yields its own edge.
//!
//! # Design
//!
//! - **Depth bound**: the root's direct children sit at walk level 0. A child
//!   at level `d` is emitted only when the limit admits `d`; its edge carries
//!   `depth = d + 1` (edges from the root).
//! - **Per-path visited set**: every stack frame owns a copy of the
//!   coordinates on its path. A coordinate already on the path is skipped
//!   without an edge. Siblings never see each other's visits.
//! - **Conflicts**: the resolver's conflict marker is the only signal. Marked
//!   nodes produce `resolved = false` edges and are still descended into.

use std::collections::HashSet;
use std::fmt;

use crate::error::ExportError;
use crate::model::{Coordinate, Dependency, DependencyGraph, Module};
use crate::resolve::{NodeIdx, ResolvedTree};

/// Transitive depth bound for graph construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthLimit {
    #[default]
    Unlimited,
    /// `0` = direct dependencies only, `N` = N transitive levels below them.
    Levels(u32),
}

impl DepthLimit {
    /// Interpret the configuration value: `-1` unlimited, `N >= 0` bounded.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Configuration`] for values below `-1` or beyond
    /// `u32::MAX`.
    pub fn from_raw(raw: i64) -> Result<Self, ExportError> {
        match raw {
            -1 => Ok(Self::Unlimited),
            n if n >= 0 => u32::try_from(n)
                .map(Self::Levels)
                .map_err(|_| ExportError::Configuration(format!("depth {n} is too large"))),
            n => Err(ExportError::Configuration(format!(
                "depth must be -1 (unlimited) or >= 0, got {n}"
            ))),
        }
    }

    /// Whether a node at walk level `level` is part of the graph.
    #[must_use]
    pub const fn admits(self, level: u32) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Levels(max) => level <= max,
        }
    }

    #[must_use]
    pub fn as_raw(self) -> i64 {
        match self {
            Self::Unlimited => -1,
            Self::Levels(max) => i64::from(max),
        }
    }
}

impl fmt::Display for DepthLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("unlimited"),
            Self::Levels(max) => write!(f, "{max}"),
        }
    }
}

/// Counters reported after a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub nodes: usize,
    pub edges: usize,
    pub conflicts: usize,
    /// Steps skipped because the coordinate was already on the current path.
    pub cycles_skipped: usize,
}

struct Frame<'a> {
    parent: &'a Coordinate,
    child: NodeIdx,
    level: u32,
    path: HashSet<&'a Coordinate>,
}

/// Turns a resolver tree into a [`DependencyGraph`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder {
    limit: DepthLimit,
}

impl GraphBuilder {
    #[must_use]
    pub const fn new(limit: DepthLimit) -> Self {
        Self { limit }
    }

    #[must_use]
    pub const fn limit(&self) -> DepthLimit {
        self.limit
    }

    /// Walk `tree` and return the graph with its statistics.
    #[must_use]
    pub fn build(&self, tree: &ResolvedTree) -> (DependencyGraph, BuildStats) {
        let exported_at_us = chrono::Utc::now().timestamp_micros();
        let root = tree.root();
        let mut graph = DependencyGraph::new(Module::at(
            root.coordinate.clone(),
            root.packaging.clone(),
            exported_at_us,
        ));
        let mut stats = BuildStats::default();

        let root_path: HashSet<&Coordinate> = std::iter::once(&root.coordinate).collect();
        let mut stack: Vec<Frame<'_>> = Vec::new();
        if self.limit.admits(0) {
            push_children(&mut stack, tree, tree.root_idx(), 0, &root_path);
        }

        while let Some(frame) = stack.pop() {
            let node = tree.node(frame.child);

            if frame.path.contains(&node.coordinate) {
                stats.cycles_skipped += 1;
                tracing::debug!(
                    from = %frame.parent,
                    to = %node.coordinate,
                    "skipping dependency already on the current path"
                );
                continue;
            }

            graph.add_node(Module::at(
                node.coordinate.clone(),
                node.packaging.clone(),
                exported_at_us,
            ));
            graph.push_edge(Dependency {
                source: frame.parent.clone(),
                target: node.coordinate.clone(),
                scope: node.scope,
                optional: node.optional,
                depth: frame.level + 1,
                resolved: !node.is_conflicted(),
            });

            let next_level = frame.level + 1;
            if !node.children().is_empty() && self.limit.admits(next_level) {
                let mut path = frame.path;
                path.insert(&node.coordinate);
                push_children(&mut stack, tree, frame.child, next_level, &path);
            }
        }

        stats.nodes = graph.node_count();
        stats.edges = graph.edge_count();
        stats.conflicts = graph.conflict_count();

        tracing::info!(
            root = %graph.root().coordinate,
            depth = %self.limit,
            nodes = stats.nodes,
            edges = stats.edges,
            conflicts = stats.conflicts,
            "built dependency graph"
        );

        (graph, stats)
    }
}

fn push_children<'a>(
    stack: &mut Vec<Frame<'a>>,
    tree: &'a ResolvedTree,
    parent: NodeIdx,
    level: u32,
    path: &HashSet<&'a Coordinate>,
) {
    let parent_node = tree.node(parent);
    // Reverse so the first child is popped first (pre-order).
    for &child in parent_node.children().iter().rev() {
        stack.push(Frame {
            parent: &parent_node.coordinate,
            child,
            level,
            path: path.clone(),
        });
    }
}
