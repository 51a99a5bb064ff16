//! Output-only filtering of a built graph.
//!
//! Filtering never re-walks the resolver tree, so conflict marking always
//! reflects the unfiltered graph. Each edge is judged on its target, in a
//! fixed order: exclude patterns, then include patterns, then scopes. The
//! root survives every rule set.

use std::collections::{BTreeSet, HashSet};

use super::pattern::ArtifactPattern;
use crate::model::{Coordinate, DependencyGraph, Scope};

/// Include/exclude/scope rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterRules {
    pub exclude: Vec<ArtifactPattern>,
    pub include: Vec<ArtifactPattern>,
    /// Empty = every scope allowed.
    pub scopes: BTreeSet<Scope>,
}

impl FilterRules {
    /// True when no rule can drop anything.
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.exclude.is_empty() && self.include.is_empty() && self.scopes.is_empty()
    }
}

/// Why an edge was dropped, or that it was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    ExcludedByPattern,
    NotIncluded,
    ScopeNotAllowed,
}

/// Per-reason counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub kept: usize,
    pub by_pattern: usize,
    pub by_include: usize,
    pub by_scope: usize,
}

impl FilterStats {
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.by_pattern + self.by_include + self.by_scope
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    rules: FilterRules,
}

impl FilterEngine {
    #[must_use]
    pub const fn new(rules: FilterRules) -> Self {
        Self { rules }
    }

    #[must_use]
    pub const fn rules(&self) -> &FilterRules {
        &self.rules
    }

    /// Judge one edge by its target coordinate and scope.
    #[must_use]
    pub fn verdict(&self, target: &Coordinate, scope: Scope) -> Verdict {
        let hit = |p: &ArtifactPattern| p.matches(&target.group, &target.artifact);

        if self.rules.exclude.iter().any(hit) {
            return Verdict::ExcludedByPattern;
        }
        if !self.rules.include.is_empty() && !self.rules.include.iter().any(hit) {
            return Verdict::NotIncluded;
        }
        if !self.rules.scopes.is_empty() && !self.rules.scopes.contains(&scope) {
            return Verdict::ScopeNotAllowed;
        }
        Verdict::Keep
    }

    /// Produce a new graph holding the root, the kept edges and their
    /// endpoints.
    #[must_use]
    pub fn apply(&self, graph: &DependencyGraph) -> (DependencyGraph, FilterStats) {
        let mut stats = FilterStats::default();
        let mut kept_edges = Vec::new();
        let mut kept_nodes: HashSet<&Coordinate> = HashSet::new();

        for edge in graph.edges() {
            match self.verdict(&edge.target, edge.scope) {
                Verdict::Keep => {
                    stats.kept += 1;
                    kept_nodes.insert(&edge.source);
                    kept_nodes.insert(&edge.target);
                    kept_edges.push(edge);
                }
                Verdict::ExcludedByPattern => stats.by_pattern += 1,
                Verdict::NotIncluded => stats.by_include += 1,
                Verdict::ScopeNotAllowed => stats.by_scope += 1,
            }
        }

        let mut filtered = DependencyGraph::new(graph.root().clone());
        // Preserve first-seen node order from the source graph.
        for module in graph.nodes() {
            if kept_nodes.contains(&module.coordinate) {
                filtered.add_node(module.clone());
            }
        }
        for edge in kept_edges {
            filtered.push_edge(edge.clone());
        }

        if stats.dropped() > 0 {
            tracing::info!(
                kept = stats.kept,
                by_pattern = stats.by_pattern,
                by_include = stats.by_include,
                by_scope = stats.by_scope,
                "filtered dependency edges"
            );
        }

        (filtered, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dependency, Module};

    fn c(group: &str, artifact: &str) -> Coordinate {
        Coordinate::new(group, artifact, "1.0")
    }

    fn patterns(raw: &[&str]) -> Vec<ArtifactPattern> {
        raw.iter()
            .map(|p| ArtifactPattern::parse(p).expect("pattern"))
            .collect()
    }

    fn graph(edges: &[(Coordinate, Coordinate, Scope)]) -> DependencyGraph {
        let mut graph = DependencyGraph::new(Module::new(c("org.app", "app"), "jar"));
        for (source, target, scope) in edges {
            graph.add_node(Module::new(source.clone(), "jar"));
            graph.add_node(Module::new(target.clone(), "jar"));
            graph
                .add_edge(Dependency {
                    source: source.clone(),
                    target: target.clone(),
                    scope: *scope,
                    optional: false,
                    depth: 1,
                    resolved: true,
                })
                .expect("edge");
        }
        graph
    }

    #[test]
    fn exclude_wins_over_include() {
        let root = c("org.app", "app");
        let g = graph(&[
            (root.clone(), c("org.a", "a-test"), Scope::Compile),
            (root.clone(), c("org.a", "core"), Scope::Compile),
        ]);
        let engine = FilterEngine::new(FilterRules {
            include: patterns(&["org.a:*"]),
            exclude: patterns(&["*:*-test"]),
            ..FilterRules::default()
        });

        let (filtered, stats) = engine.apply(&g);
        assert_eq!(filtered.edge_count(), 1);
        assert_eq!(filtered.edges()[0].target.artifact, "core");
        assert!(!filtered.contains(&c("org.a", "a-test")));
        assert_eq!(stats.by_pattern, 1);
        assert_eq!(stats.by_include, 0);
    }

    #[test]
    fn include_list_drops_unmatched_targets() {
        let root = c("org.app", "app");
        let g = graph(&[
            (root.clone(), c("org.a", "core"), Scope::Compile),
            (root.clone(), c("org.b", "core"), Scope::Compile),
        ]);
        let engine = FilterEngine::new(FilterRules {
            include: patterns(&["org.a:*"]),
            ..FilterRules::default()
        });
        let (filtered, stats) = engine.apply(&g);
        assert_eq!(filtered.edge_count(), 1);
        assert_eq!(stats.by_include, 1);
    }

    #[test]
    fn scope_allow_list() {
        let root = c("org.app", "app");
        let g = graph(&[
            (root.clone(), c("junit", "junit"), Scope::Test),
            (root.clone(), c("org.a", "core"), Scope::Runtime),
        ]);
        let engine = FilterEngine::new(FilterRules {
            scopes: [Scope::Compile, Scope::Runtime].into_iter().collect(),
            ..FilterRules::default()
        });
        let (filtered, stats) = engine.apply(&g);
        assert_eq!(filtered.edge_count(), 1);
        assert_eq!(filtered.edges()[0].scope, Scope::Runtime);
        assert_eq!(stats.by_scope, 1);
    }

    #[test]
    fn root_survives_when_everything_is_dropped() {
        let root = c("org.app", "app");
        let g = graph(&[(root.clone(), c("org.a", "core"), Scope::Compile)]);
        let engine = FilterEngine::new(FilterRules {
            exclude: patterns(&["*:*"]),
            ..FilterRules::default()
        });
        let (filtered, stats) = engine.apply(&g);
        assert_eq!(filtered.node_count(), 1);
        assert_eq!(filtered.root().coordinate, root);
        assert_eq!(stats.kept, 0);
    }

    #[test]
    fn endpoints_of_kept_edges_are_kept_even_if_detached() {
        let root = c("org.app", "app");
        let excluded = c("org.x", "excluded");
        let g = graph(&[
            (root.clone(), excluded.clone(), Scope::Compile),
            (excluded.clone(), c("org.y", "leaf"), Scope::Compile),
        ]);
        let engine = FilterEngine::new(FilterRules {
            exclude: patterns(&["org.x:*"]),
            ..FilterRules::default()
        });
        let (filtered, _) = engine.apply(&g);
        assert!(filtered.contains(&excluded));
        assert_eq!(filtered.edge_count(), 1);
        assert_eq!(filtered.node_count(), 3);
    }

    #[test]
    fn passthrough_preserves_graph() {
        let root = c("org.app", "app");
        let g = graph(&[(root, c("org.a", "core"), Scope::System)]);
        let engine = FilterEngine::default();
        assert!(engine.rules().is_passthrough());
        let (filtered, stats) = engine.apply(&g);
        assert_eq!(filtered, g);
        assert_eq!(stats.dropped(), 0);
    }
}
