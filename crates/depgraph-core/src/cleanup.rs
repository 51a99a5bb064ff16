//! Pruning superseded versions of a family.
//!
//! For every family the newest stored version (by [`crate::version`]
//! ordering) is the latest. Every other version loses its latest flag and is
//! deleted unless something outside the exported set still depends on it.
//! Deleting a module cascades to its edges.

use std::collections::HashSet;

use crate::error::ExportError;
use crate::model::{Coordinate, DependencyGraph, Family};
use crate::sink::ExportSink;
use crate::version::sort_descending;

/// Transaction-scoped view of one backend's family data.
pub trait FamilyStore {
    type Error;

    /// Every stored version of `(group, artifact)`, in any order.
    fn versions(&mut self, group: &str, artifact: &str) -> Result<Vec<String>, Self::Error>;

    /// Sources of every edge pointing at `module`.
    fn referencing_sources(&mut self, module: &Coordinate) -> Result<Vec<Coordinate>, Self::Error>;

    fn mark_not_latest(&mut self, module: &Coordinate) -> Result<(), Self::Error>;

    /// Delete `module` together with its incident edges.
    fn delete_module(&mut self, module: &Coordinate) -> Result<(), Self::Error>;
}

/// Prune one family. Returns the number of deleted versions.
///
/// # Errors
///
/// Propagates the first store error; the caller's transaction is expected to
/// roll back then.
pub fn prune_family<S: FamilyStore>(
    store: &mut S,
    group: &str,
    artifact: &str,
    exported: &HashSet<Coordinate>,
) -> Result<usize, S::Error> {
    let mut versions = store.versions(group, artifact)?;
    if versions.len() < 2 {
        return Ok(0);
    }
    sort_descending(&mut versions);

    let mut deleted = 0;
    for version in versions.iter().skip(1) {
        let module = Coordinate::new(group, artifact, version.as_str());
        store.mark_not_latest(&module)?;

        let external = store
            .referencing_sources(&module)?
            .into_iter()
            .find(|source| !exported.contains(source));

        if let Some(source) = external {
            tracing::debug!(
                module = %module,
                referenced_by = %source,
                "keeping referenced old version"
            );
            continue;
        }

        store.delete_module(&module)?;
        deleted += 1;
    }

    if deleted > 0 {
        tracing::debug!(
            family = %format_args!("{group}:{artifact}"),
            latest = %versions[0],
            deleted,
            "pruned family"
        );
    }
    Ok(deleted)
}

/// A family whose cleanup failed.
#[derive(Debug)]
pub struct CleanupFailure {
    pub family: Family,
    pub error: ExportError,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Families visited.
    pub families: usize,
    /// Modules deleted across all families.
    pub deleted: usize,
    pub failures: Vec<CleanupFailure>,
}

/// Runs [`ExportSink::cleanup_old_versions`] for every family of a graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupService;

impl CleanupService {
    /// Visit every family of `graph` in sorted order. Per-family failures are
    /// logged and recorded; they never abort the run.
    pub fn run(sink: &mut dyn ExportSink, graph: &DependencyGraph) -> CleanupReport {
        let exported = graph.coordinates();
        let mut report = CleanupReport::default();

        for family in graph.families() {
            report.families += 1;
            match sink.cleanup_old_versions(&family.group, &family.artifact, &exported) {
                Ok(deleted) => report.deleted += deleted,
                Err(error) => {
                    tracing::warn!(
                        family = %family,
                        code = %error.code(),
                        error = %error,
                        "cleanup failed for family"
                    );
                    report.failures.push(CleanupFailure { family, error });
                }
            }
        }

        tracing::info!(
            families = report.families,
            deleted = report.deleted,
            failures = report.failures.len(),
            "cleanup finished"
        );
        report
    }
}
