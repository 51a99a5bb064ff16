//! Backend sinks.
//!
//! Two independent implementations share one contract:
//! - [`RelationalSink`] writes normalized tables
//! - [`PropertyGraphSink`] writes labeled nodes and typed relationships
//!
//! Every operation goes through the [`crate::retry::RetryExecutor`] owned by
//! the sink's session, and every write happens inside a single transaction.

pub mod property_graph;
pub mod relational;
pub mod schema;
pub mod session;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ExportError;
use crate::model::{Coordinate, DependencyGraph, ParseEnumError, ProjectStructure};
use crate::retry::RetryPolicy;

pub use property_graph::PropertyGraphSink;
pub use relational::RelationalSink;
pub use schema::CURRENT_SCHEMA_VERSION;

/// Default number of rows per multi-row write.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Which storage layout to write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Relational,
    Graph,
}

impl BackendKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::Graph => "graph",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relational" | "sql" => Ok(Self::Relational),
            "graph" | "property-graph" => Ok(Self::Graph),
            _ => Err(ParseEnumError {
                expected: "backend (relational|graph)",
                got: s.to_string(),
            }),
        }
    }
}

/// Where and how to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub path: PathBuf,
}

/// Outcome of the schema version check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaStatus {
    /// Version stored in the backend after the check.
    pub version: String,
    pub compatible: bool,
    /// True when the record was absent and has just been written.
    pub created: bool,
}

/// Counters for one graph export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub modules_written: usize,
    pub edges_written: usize,
    pub conflicts: usize,
    pub batches: usize,
    pub duration_ms: u64,
}

/// Persists dependency graphs into one backend.
///
/// Every method other than [`ExportSink::connect`], [`ExportSink::close`] and
/// [`ExportSink::backend`] returns [`ExportError::NotConnected`] when called
/// on a sink that is not connected.
pub trait ExportSink {
    fn backend(&self) -> BackendKind;

    /// Open the backend and bootstrap its layout.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Connection`] once the retry budget is spent.
    fn connect(&mut self) -> Result<(), ExportError>;

    /// Read the version record, creating it when absent.
    ///
    /// # Errors
    ///
    /// Returns an [`ExportError`] when the record cannot be read or written.
    fn check_schema_version(&mut self) -> Result<SchemaStatus, ExportError>;

    /// Write the graph with overwrite semantics, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns an [`ExportError`]; nothing from this call is persisted then.
    fn export_graph(&mut self, graph: &DependencyGraph) -> Result<ExportStats, ExportError>;

    /// Write the build-unit overlay. Returns the number of units written.
    ///
    /// # Errors
    ///
    /// Returns an [`ExportError`]; nothing from this call is persisted then.
    fn export_structure(&mut self, structure: &ProjectStructure) -> Result<usize, ExportError>;

    /// Stored versions of one family, newest first.
    ///
    /// # Errors
    ///
    /// Returns an [`ExportError`] when the query fails.
    fn family_versions(&mut self, group: &str, artifact: &str) -> Result<Vec<String>, ExportError>;

    /// Prune one family in its own transaction. Returns the number of
    /// deleted modules.
    ///
    /// # Errors
    ///
    /// Returns an [`ExportError`]; the family is left untouched then.
    fn cleanup_old_versions(
        &mut self,
        group: &str,
        artifact: &str,
        exported: &HashSet<Coordinate>,
    ) -> Result<usize, ExportError>;

    /// Release the connection. Idempotent.
    fn close(&mut self);
}

/// Build the sink for `config`. The returned sink is not yet connected.
///
/// # Errors
///
/// Returns [`ExportError::Configuration`] for an empty path or a zero batch
/// size.
pub fn open_sink(
    config: &BackendConfig,
    policy: RetryPolicy,
    batch_size: usize,
) -> Result<Box<dyn ExportSink>, ExportError> {
    if config.path.as_os_str().is_empty() {
        return Err(ExportError::Configuration("backend.path must not be empty".to_string()));
    }
    if batch_size == 0 {
        return Err(ExportError::Configuration("export.batch_size must be at least 1".to_string()));
    }

    tracing::debug!(
        backend = %config.kind,
        path = %config.path.display(),
        batch_size,
        "opening sink"
    );
    Ok(match config.kind {
        BackendKind::Relational => Box::new(RelationalSink::new(&config.path, policy, batch_size)),
        BackendKind::Graph => Box::new(PropertyGraphSink::new(&config.path, policy, batch_size)),
    })
}

/// SQL for one multi-row insert: `rows` groups of `width` placeholders.
fn values_clause(rows: usize, width: usize) -> String {
    let group = format!("({})", vec!["?"; width].join(", "));
    vec![group.as_str(); rows].join(", ")
}

fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
