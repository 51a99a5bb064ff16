//! Normalized-table sink.

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

use super::schema::{CURRENT_SCHEMA_VERSION, RELATIONAL_SCHEMA_SQL};
use super::session::Session;
use super::{BackendKind, ExportSink, ExportStats, SchemaStatus, elapsed_ms, values_clause};
use crate::cleanup::{FamilyStore, prune_family};
use crate::error::{ExportError, Stage};
use crate::model::{Coordinate, Dependency, DependencyGraph, ProjectStructure};
use crate::retry::RetryPolicy;
use crate::version::sort_descending;

const UPSERT_MODULE_SQL: &str = "
INSERT INTO modules (group_id, artifact_id, version, packaging, exported_at_us, is_latest)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT (group_id, artifact_id, version) DO UPDATE SET
    packaging = excluded.packaging,
    exported_at_us = excluded.exported_at_us,
    is_latest = excluded.is_latest
RETURNING id";

const UPSERT_BUILD_UNIT_SQL: &str = "
INSERT INTO build_units (group_id, artifact_id, version, packaging, is_root, exported_at_us)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT (group_id, artifact_id, version) DO UPDATE SET
    packaging = excluded.packaging,
    is_root = excluded.is_root,
    exported_at_us = excluded.exported_at_us
RETURNING id";

const EDGE_COLUMNS: usize = 7;

/// Writes modules and dependencies as rows.
#[derive(Debug)]
pub struct RelationalSink {
    session: Session,
    batch_size: usize,
}

impl RelationalSink {
    pub fn new(path: &Path, policy: RetryPolicy, batch_size: usize) -> Self {
        Self {
            session: Session::new(path, RELATIONAL_SCHEMA_SQL, policy),
            batch_size: batch_size.max(1),
        }
    }
}

impl ExportSink for RelationalSink {
    fn backend(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn connect(&mut self) -> Result<(), ExportError> {
        self.session.connect()
    }

    fn check_schema_version(&mut self) -> Result<SchemaStatus, ExportError> {
        self.session.run(Stage::Schema, |conn| {
            let tx = conn.transaction()?;
            let stored: Option<String> = tx
                .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| row.get(0))
                .optional()?;
            let status = match stored {
                Some(version) => SchemaStatus {
                    compatible: version == CURRENT_SCHEMA_VERSION,
                    version,
                    created: false,
                },
                None => {
                    tx.execute(
                        "INSERT INTO schema_version (id, version, applied_at_us) VALUES (1, ?1, ?2)",
                        params![CURRENT_SCHEMA_VERSION, chrono::Utc::now().timestamp_micros()],
                    )?;
                    SchemaStatus {
                        version: CURRENT_SCHEMA_VERSION.to_string(),
                        compatible: true,
                        created: true,
                    }
                }
            };
            tx.commit()?;
            Ok(status)
        })
    }

    fn export_graph(&mut self, graph: &DependencyGraph) -> Result<ExportStats, ExportError> {
        let start = Instant::now();
        let batch_size = self.batch_size;
        let mut stats = self
            .session
            .run(Stage::Export, |conn| write_graph(conn, graph, batch_size))?;
        stats.duration_ms = elapsed_ms(start);

        tracing::info!(
            backend = "relational",
            root = %graph.root().coordinate,
            modules = stats.modules_written,
            edges = stats.edges_written,
            conflicts = stats.conflicts,
            batches = stats.batches,
            duration_ms = stats.duration_ms,
            "exported dependency graph"
        );
        Ok(stats)
    }

    fn export_structure(&mut self, structure: &ProjectStructure) -> Result<usize, ExportError> {
        let written = self
            .session
            .run(Stage::Structure, |conn| write_structure(conn, structure))?;
        tracing::info!(
            backend = "relational",
            root = %structure.root().coordinate,
            units = written,
            links = structure.links().len(),
            "exported project structure"
        );
        Ok(written)
    }

    fn family_versions(&mut self, group: &str, artifact: &str) -> Result<Vec<String>, ExportError> {
        let mut versions = self.session.run(Stage::Query, |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT version FROM modules WHERE group_id = ?1 AND artifact_id = ?2",
            )?;
            let rows = stmt.query_map(params![group, artifact], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;
        sort_descending(&mut versions);
        Ok(versions)
    }

    fn cleanup_old_versions(
        &mut self,
        group: &str,
        artifact: &str,
        exported: &HashSet<Coordinate>,
    ) -> Result<usize, ExportError> {
        self.session.run(Stage::Cleanup, |conn| {
            let tx = conn.transaction()?;
            let deleted = prune_family(&mut TableStore { tx: &tx }, group, artifact, exported)?;
            tx.commit()?;
            Ok(deleted)
        })
    }

    fn close(&mut self) {
        self.session.close();
    }
}

fn write_graph(
    conn: &mut Connection,
    graph: &DependencyGraph,
    batch_size: usize,
) -> rusqlite::Result<ExportStats> {
    let tx = conn.transaction()?;
    let now = chrono::Utc::now().timestamp_micros();

    let mut ids: HashMap<&Coordinate, i64> = HashMap::with_capacity(graph.node_count());
    {
        let mut upsert = tx.prepare_cached(UPSERT_MODULE_SQL)?;
        for module in graph.nodes() {
            let c = &module.coordinate;
            let id: i64 = upsert.query_row(
                params![
                    c.group,
                    c.artifact,
                    c.version,
                    module.packaging,
                    module.exported_at_us,
                    module.is_latest
                ],
                |row| row.get(0),
            )?;
            ids.insert(c, id);
        }
    }

    let root_id = row_id(&ids, &graph.root().coordinate)?;
    let replaced = tx.execute("DELETE FROM dependencies WHERE source_id = ?1", [root_id])?;
    tracing::debug!(root = %graph.root().coordinate, replaced, "cleared root edges");

    let mut batches = 0;
    for (idx, chunk) in graph.edges().chunks(batch_size).enumerate() {
        let sql = format!(
            "INSERT INTO dependencies (source_id, target_id, scope, optional, depth, resolved, exported_at_us)
             VALUES {}
             ON CONFLICT (source_id, target_id, scope, depth) DO UPDATE SET
                 optional = excluded.optional,
                 resolved = excluded.resolved,
                 exported_at_us = excluded.exported_at_us",
            values_clause(chunk.len(), EDGE_COLUMNS)
        );
        let values = edge_values(chunk, &ids, now)?;
        let mut stmt = tx.prepare_cached(&sql)?;
        let rows = stmt.execute(params_from_iter(values))?;
        batches += 1;
        tracing::debug!(batch = idx + 1, rows, "wrote dependency batch");
    }

    tx.commit()?;
    Ok(ExportStats {
        modules_written: ids.len(),
        edges_written: graph.edge_count(),
        conflicts: graph.conflict_count(),
        batches,
        duration_ms: 0,
    })
}

fn edge_values(
    chunk: &[Dependency],
    ids: &HashMap<&Coordinate, i64>,
    now: i64,
) -> rusqlite::Result<Vec<Value>> {
    let mut values = Vec::with_capacity(chunk.len() * EDGE_COLUMNS);
    for edge in chunk {
        values.extend([
            Value::Integer(row_id(ids, &edge.source)?),
            Value::Integer(row_id(ids, &edge.target)?),
            Value::Text(edge.scope.as_str().to_string()),
            Value::Integer(i64::from(edge.optional)),
            Value::Integer(i64::from(edge.depth)),
            Value::Integer(i64::from(edge.resolved)),
            Value::Integer(now),
        ]);
    }
    Ok(values)
}

fn row_id(ids: &HashMap<&Coordinate, i64>, coordinate: &Coordinate) -> rusqlite::Result<i64> {
    ids.get(coordinate)
        .copied()
        .ok_or_else(|| rusqlite::Error::InvalidParameterName(format!("no row id for {coordinate}")))
}

fn write_structure(conn: &mut Connection, structure: &ProjectStructure) -> rusqlite::Result<usize> {
    let tx = conn.transaction()?;
    let now = chrono::Utc::now().timestamp_micros();

    let mut ids: HashMap<&Coordinate, i64> = HashMap::with_capacity(structure.units().len());
    {
        let mut upsert = tx.prepare_cached(UPSERT_BUILD_UNIT_SQL)?;
        let mut clear = tx.prepare_cached("DELETE FROM build_unit_links WHERE parent_id = ?1")?;
        for unit in structure.units() {
            let c = &unit.coordinate;
            let id: i64 = upsert.query_row(
                params![c.group, c.artifact, c.version, unit.packaging, unit.is_root, now],
                |row| row.get(0),
            )?;
            clear.execute([id])?;
            ids.insert(c, id);
        }
    }
    {
        let mut link = tx.prepare_cached(
            "INSERT OR IGNORE INTO build_unit_links (parent_id, child_id) VALUES (?1, ?2)",
        )?;
        for containment in structure.links() {
            link.execute([
                row_id(&ids, &containment.parent)?,
                row_id(&ids, &containment.child)?,
            ])?;
        }
    }

    tx.commit()?;
    Ok(ids.len())
}

/// [`FamilyStore`] over an open relational transaction.
struct TableStore<'a> {
    tx: &'a Transaction<'a>,
}

impl FamilyStore for TableStore<'_> {
    type Error = rusqlite::Error;

    fn versions(&mut self, group: &str, artifact: &str) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT version FROM modules WHERE group_id = ?1 AND artifact_id = ?2",
        )?;
        let rows = stmt.query_map(params![group, artifact], |row| row.get(0))?;
        rows.collect()
    }

    fn referencing_sources(&mut self, module: &Coordinate) -> rusqlite::Result<Vec<Coordinate>> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT DISTINCT s.group_id, s.artifact_id, s.version
             FROM dependencies d
             JOIN modules s ON s.id = d.source_id
             JOIN modules t ON t.id = d.target_id
             WHERE t.group_id = ?1 AND t.artifact_id = ?2 AND t.version = ?3",
        )?;
        let rows = stmt.query_map(
            params![module.group, module.artifact, module.version],
            |row| {
                Ok(Coordinate::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )?;
        rows.collect()
    }

    fn mark_not_latest(&mut self, module: &Coordinate) -> rusqlite::Result<()> {
        self.tx.execute(
            "UPDATE modules SET is_latest = 0 WHERE group_id = ?1 AND artifact_id = ?2 AND version = ?3",
            params![module.group, module.artifact, module.version],
        )?;
        Ok(())
    }

    fn delete_module(&mut self, module: &Coordinate) -> rusqlite::Result<()> {
        self.tx.execute(
            "DELETE FROM modules WHERE group_id = ?1 AND artifact_id = ?2 AND version = ?3",
            params![module.group, module.artifact, module.version],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Module, Scope};
    use std::time::Duration;
    use tempfile::TempDir;

    fn c(artifact: &str, version: &str) -> Coordinate {
        Coordinate::new("org.example", artifact, version)
    }

    fn connected(dir: &TempDir, batch_size: usize) -> RelationalSink {
        let mut sink = RelationalSink::new(
            &dir.path().join("rel.sqlite3"),
            RetryPolicy::new(1, Duration::ZERO),
            batch_size,
        );
        sink.connect().expect("connect");
        sink
    }

    fn star(root: &Coordinate, leaves: usize) -> DependencyGraph {
        let mut graph = DependencyGraph::new(Module::new(root.clone(), "jar"));
        for idx in 0..leaves {
            let leaf = c(&format!("leaf-{idx}"), "1.0");
            graph.add_node(Module::new(leaf.clone(), "jar"));
            graph
                .add_edge(Dependency {
                    source: root.clone(),
                    target: leaf,
                    scope: Scope::Compile,
                    optional: false,
                    depth: 1,
                    resolved: true,
                })
                .expect("edge");
        }
        graph
    }

    fn count(sink: &mut RelationalSink, table: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        sink.session
            .run(Stage::Query, |conn| conn.query_row(&sql, [], |row| row.get(0)))
            .expect("count")
    }

    #[test]
    fn batches_follow_batch_size() {
        let dir = TempDir::new().expect("tempdir");
        let mut sink = connected(&dir, 4);
        let stats = sink.export_graph(&star(&c("app", "1.0"), 10)).expect("export");
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.edges_written, 10);
        assert_eq!(stats.modules_written, 11);
        assert_eq!(count(&mut sink, "dependencies"), 10);
    }

    #[test]
    fn schema_record_is_created_once() {
        let dir = TempDir::new().expect("tempdir");
        let mut sink = connected(&dir, 500);
        let first = sink.check_schema_version().expect("first");
        assert!(first.created && first.compatible);
        let second = sink.check_schema_version().expect("second");
        assert!(!second.created);
        assert_eq!(second.version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn structure_replaces_links() {
        let dir = TempDir::new().expect("tempdir");
        let mut sink = connected(&dir, 500);
        let root = c("parent", "1.0");

        let mut structure = ProjectStructure::new(root.clone(), "pom");
        structure.add_child(&root, c("api", "1.0"), "jar").expect("child");
        structure.add_child(&root, c("impl", "1.0"), "jar").expect("child");
        assert_eq!(sink.export_structure(&structure).expect("first"), 3);
        assert_eq!(count(&mut sink, "build_unit_links"), 2);

        let mut trimmed = ProjectStructure::new(root.clone(), "pom");
        trimmed.add_child(&root, c("api", "1.0"), "jar").expect("child");
        sink.export_structure(&trimmed).expect("second");
        assert_eq!(count(&mut sink, "build_unit_links"), 1);
        assert_eq!(count(&mut sink, "modules"), 0);
    }

    #[test]
    fn operations_require_connect() {
        let dir = TempDir::new().expect("tempdir");
        let mut sink =
            RelationalSink::new(&dir.path().join("x.sqlite3"), RetryPolicy::default(), 500);
        assert!(matches!(sink.family_versions("g", "a"), Err(ExportError::NotConnected)));
        assert!(matches!(
            sink.export_graph(&star(&c("app", "1.0"), 1)),
            Err(ExportError::NotConnected)
        ));
    }
}
