//! One export run, end to end.
//!
//! ```text
//! tree ─► GraphBuilder ─► FilterEngine ─► sink.connect ─► schema check
//!                                            │
//!                                            ▼
//!                 export_graph ─► export_structure? ─► cleanup? ─► close
//! ```
//!
//! The sink is always closed, whatever happened before. Cleanup failures are
//! recorded in the report and never unwind the export.

use serde::Serialize;

use crate::cleanup::{CleanupReport, CleanupService};
use crate::config::ExportSettings;
use crate::error::ExportError;
use crate::filter::{FilterEngine, FilterStats};
use crate::graph::{BuildStats, GraphBuilder};
use crate::model::{DependencyGraph, ProjectStructure};
use crate::resolve::ResolvedTree;
use crate::sink::{ExportSink, ExportStats, SchemaStatus, open_sink};

/// Summary of a successful run.
#[derive(Debug, Serialize)]
pub struct ExportReport {
    pub root: String,
    pub backend: String,
    pub build: BuildSummary,
    pub filter: FilterSummary,
    pub schema: SchemaStatus,
    pub export: ExportStats,
    /// Units written, when the structure overlay was exported.
    pub structure_units: Option<usize>,
    pub cleanup: Option<CleanupSummary>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BuildSummary {
    pub nodes: usize,
    pub edges: usize,
    pub conflicts: usize,
    pub cycles_skipped: usize,
}

impl From<BuildStats> for BuildSummary {
    fn from(stats: BuildStats) -> Self {
        Self {
            nodes: stats.nodes,
            edges: stats.edges,
            conflicts: stats.conflicts,
            cycles_skipped: stats.cycles_skipped,
        }
    }
}

/// Edge counts after filtering; `dropped` is the sum of the three reasons.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FilterSummary {
    pub kept: usize,
    pub dropped: usize,
    /// Matched an exclude pattern.
    pub excluded: usize,
    /// Matched no include pattern.
    pub not_included: usize,
    pub out_of_scope: usize,
}

impl From<FilterStats> for FilterSummary {
    fn from(stats: FilterStats) -> Self {
        Self {
            kept: stats.kept,
            dropped: stats.dropped(),
            excluded: stats.by_pattern,
            not_included: stats.by_include,
            out_of_scope: stats.by_scope,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupSummary {
    pub families: usize,
    pub deleted: usize,
    /// `group:artifact` of every family whose cleanup failed.
    pub failed_families: Vec<String>,
}

impl From<&CleanupReport> for CleanupSummary {
    fn from(report: &CleanupReport) -> Self {
        Self {
            families: report.families,
            deleted: report.deleted,
            failed_families: report
                .failures
                .iter()
                .map(|failure| failure.family.to_string())
                .collect(),
        }
    }
}

/// Build and filter without touching a backend.
#[must_use]
pub fn build_filtered(
    settings: &ExportSettings,
    tree: &ResolvedTree,
) -> (DependencyGraph, BuildStats, FilterStats) {
    let (graph, build) = GraphBuilder::new(settings.depth).build(tree);
    let (graph, filter) = FilterEngine::new(settings.filter.clone()).apply(&graph);
    (graph, build, filter)
}

/// Drives one export run with validated settings.
#[derive(Debug, Clone)]
pub struct Exporter {
    settings: ExportSettings,
}

impl Exporter {
    #[must_use]
    pub const fn new(settings: ExportSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub const fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Run against the configured backend.
    ///
    /// # Errors
    ///
    /// Returns the first [`ExportError`] from building the sink, connecting,
    /// the schema check, the graph export or the structure export.
    pub fn run(
        &self,
        tree: &ResolvedTree,
        structure: Option<&ProjectStructure>,
    ) -> Result<ExportReport, ExportError> {
        let mut sink = open_sink(
            &self.settings.backend,
            self.settings.retry,
            self.settings.batch_size,
        )?;
        self.run_with_sink(sink.as_mut(), tree, structure)
    }

    /// Run against a caller-supplied sink. The sink is closed on return.
    ///
    /// # Errors
    ///
    /// See [`Exporter::run`].
    pub fn run_with_sink(
        &self,
        sink: &mut dyn ExportSink,
        tree: &ResolvedTree,
        structure: Option<&ProjectStructure>,
    ) -> Result<ExportReport, ExportError> {
        let (graph, build, filter) = build_filtered(&self.settings, tree);
        let result = self.export(sink, &graph, structure);
        sink.close();

        let (schema, export, structure_units, cleanup) = result?;
        Ok(ExportReport {
            root: graph.root().coordinate.to_string(),
            backend: sink.backend().to_string(),
            build: build.into(),
            filter: filter.into(),
            schema,
            export,
            structure_units,
            cleanup,
        })
    }

    fn export(
        &self,
        sink: &mut dyn ExportSink,
        graph: &DependencyGraph,
        structure: Option<&ProjectStructure>,
    ) -> Result<(SchemaStatus, ExportStats, Option<usize>, Option<CleanupSummary>), ExportError> {
        sink.connect()?;

        let schema = sink.check_schema_version()?;
        if schema.created {
            tracing::info!(version = %schema.version, "initialized backend schema version");
        } else if !schema.compatible {
            tracing::warn!(
                stored = %schema.version,
                expected = crate::sink::CURRENT_SCHEMA_VERSION,
                "backend schema version differs; continuing"
            );
        }

        let export = sink.export_graph(graph)?;

        let structure_units = match structure {
            Some(structure) if self.settings.export_structure => {
                Some(sink.export_structure(structure)?)
            }
            _ => None,
        };

        let cleanup = if self.settings.keep_only_latest {
            Some(CleanupSummary::from(&CleanupService::run(sink, graph)))
        } else {
            None
        };

        Ok((schema, export, structure_units, cleanup))
    }
}
