//! Labeled property-graph sink.
//!
//! Modules become `Module` nodes keyed by their coordinate text, dependencies
//! become `DEPENDS_ON` relationships keyed by `<scope>/<depth>`, and the
//! project overlay uses `BuildUnit` nodes joined by `CONTAINS`. Properties
//! are JSON objects; re-upserting a node merges new properties into the
//! stored ones with `json_patch`.

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter};
use serde_json::{Map, json};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Instant;

use super::schema::{CURRENT_SCHEMA_VERSION, PROPERTY_GRAPH_SCHEMA_SQL};
use super::session::Session;
use super::{BackendKind, ExportSink, ExportStats, SchemaStatus, elapsed_ms, values_clause};
use crate::cleanup::{FamilyStore, prune_family};
use crate::error::{ExportError, Stage};
use crate::model::{BuildUnit, Coordinate, Dependency, DependencyGraph, Module, ProjectStructure};
use crate::retry::RetryPolicy;
use crate::version::sort_descending;

type PropertyMap = Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Module,
    BuildUnit,
    SchemaVersion,
}

impl Label {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Module => "Module",
            Self::BuildUnit => "BuildUnit",
            Self::SchemaVersion => "SchemaVersion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelType {
    DependsOn,
    Contains,
}

impl RelType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::DependsOn => "DEPENDS_ON",
            Self::Contains => "CONTAINS",
        }
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const SCHEMA_NODE_KEY: &str = "current";

const UPSERT_NODE_SQL: &str = "
INSERT INTO graph_nodes (label, node_key, properties)
VALUES (?1, ?2, ?3)
ON CONFLICT (label, node_key) DO UPDATE SET
    properties = json_patch(graph_nodes.properties, excluded.properties)
RETURNING node_id";

const REL_COLUMNS: usize = 5;

fn module_properties(module: &Module) -> PropertyMap {
    let c = &module.coordinate;
    let mut props = PropertyMap::new();
    props.insert("group".into(), json!(c.group));
    props.insert("artifact".into(), json!(c.artifact));
    props.insert("version".into(), json!(c.version));
    props.insert("packaging".into(), json!(module.packaging));
    props.insert("exported_at_us".into(), json!(module.exported_at_us));
    props.insert("is_latest".into(), json!(module.is_latest));
    props
}

fn unit_properties(unit: &BuildUnit, now: i64) -> PropertyMap {
    let c = &unit.coordinate;
    let mut props = PropertyMap::new();
    props.insert("group".into(), json!(c.group));
    props.insert("artifact".into(), json!(c.artifact));
    props.insert("version".into(), json!(c.version));
    props.insert("packaging".into(), json!(unit.packaging));
    props.insert("is_root".into(), json!(unit.is_root));
    props.insert("exported_at_us".into(), json!(now));
    props
}

fn dependency_properties(edge: &Dependency, now: i64) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert("scope".into(), json!(edge.scope.as_str()));
    props.insert("optional".into(), json!(edge.optional));
    props.insert("depth".into(), json!(edge.depth));
    props.insert("resolved".into(), json!(edge.resolved));
    props.insert("exported_at_us".into(), json!(now));
    props
}

fn rel_key(edge: &Dependency) -> String {
    format!("{}/{}", edge.scope, edge.depth)
}

/// Writes modules as `Module` nodes and dependencies as `DEPENDS_ON`.
#[derive(Debug)]
pub struct PropertyGraphSink {
    session: Session,
    batch_size: usize,
}

impl PropertyGraphSink {
    pub fn new(path: &Path, policy: RetryPolicy, batch_size: usize) -> Self {
        Self {
            session: Session::new(path, PROPERTY_GRAPH_SCHEMA_SQL, policy),
            batch_size: batch_size.max(1),
        }
    }
}

impl ExportSink for PropertyGraphSink {
    fn backend(&self) -> BackendKind {
        BackendKind::Graph
    }

    fn connect(&mut self) -> Result<(), ExportError> {
        self.session.connect()
    }

    fn check_schema_version(&mut self) -> Result<SchemaStatus, ExportError> {
        self.session.run(Stage::Schema, |conn| {
            let tx = conn.transaction()?;
            let stored: Option<String> = tx
                .query_row(
                    "SELECT json_extract(properties, '$.version') FROM graph_nodes
                     WHERE label = ?1 AND node_key = ?2",
                    params![Label::SchemaVersion.as_str(), SCHEMA_NODE_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            let status = if let Some(version) = stored {
                SchemaStatus {
                    compatible: version == CURRENT_SCHEMA_VERSION,
                    version,
                    created: false,
                }
            } else {
                let props = json!({
                    "version": CURRENT_SCHEMA_VERSION,
                    "applied_at_us": chrono::Utc::now().timestamp_micros(),
                });
                upsert_node(&tx, Label::SchemaVersion, SCHEMA_NODE_KEY, &props.to_string())?;
                SchemaStatus {
                    version: CURRENT_SCHEMA_VERSION.to_string(),
                    compatible: true,
                    created: true,
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
            backend = "graph",
            root = %graph.root().coordinate,
            nodes = stats.modules_written,
            relationships = stats.edges_written,
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
            backend = "graph",
            root = %structure.root().coordinate,
            units = written,
            links = structure.links().len(),
            "exported project structure"
        );
        Ok(written)
    }

    fn family_versions(&mut self, group: &str, artifact: &str) -> Result<Vec<String>, ExportError> {
        let mut versions = self
            .session
            .run(Stage::Query, |conn| select_family_versions(conn, group, artifact))?;
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
            let deleted = prune_family(&mut GraphStore { tx: &tx }, group, artifact, exported)?;
            tx.commit()?;
            Ok(deleted)
        })
    }

    fn close(&mut self) {
        self.session.close();
    }
}

fn upsert_node(
    tx: &Transaction<'_>,
    label: Label,
    key: &str,
    properties: &str,
) -> rusqlite::Result<i64> {
    let mut stmt = tx.prepare_cached(UPSERT_NODE_SQL)?;
    stmt.query_row(params![label.as_str(), key, properties], |row| row.get(0))
}

fn node_id(ids: &HashMap<&Coordinate, i64>, coordinate: &Coordinate) -> rusqlite::Result<i64> {
    ids.get(coordinate).copied().ok_or_else(|| {
        rusqlite::Error::InvalidParameterName(format!("no node id for {coordinate}"))
    })
}

fn write_graph(
    conn: &mut Connection,
    graph: &DependencyGraph,
    batch_size: usize,
) -> rusqlite::Result<ExportStats> {
    let tx = conn.transaction()?;
    let now = chrono::Utc::now().timestamp_micros();

    let mut ids: HashMap<&Coordinate, i64> = HashMap::with_capacity(graph.node_count());
    for module in graph.nodes() {
        let props = serde_json::Value::Object(module_properties(module)).to_string();
        let id = upsert_node(&tx, Label::Module, &module.coordinate.key(), &props)?;
        ids.insert(&module.coordinate, id);
    }

    let root_id = node_id(&ids, &graph.root().coordinate)?;
    let replaced = tx.execute(
        "DELETE FROM graph_relationships WHERE rel_type = ?1 AND start_node = ?2",
        params![RelType::DependsOn.as_str(), root_id],
    )?;
    tracing::debug!(root = %graph.root().coordinate, replaced, "cleared root relationships");

    let mut batches = 0;
    for (idx, chunk) in graph.edges().chunks(batch_size).enumerate() {
        let sql = format!(
            "INSERT INTO graph_relationships (rel_type, start_node, end_node, rel_key, properties)
             VALUES {}
             ON CONFLICT (rel_type, start_node, end_node, rel_key) DO UPDATE SET
                 properties = excluded.properties",
            values_clause(chunk.len(), REL_COLUMNS)
        );
        let mut values = Vec::with_capacity(chunk.len() * REL_COLUMNS);
        for edge in chunk {
            values.extend([
                Value::Text(RelType::DependsOn.as_str().to_string()),
                Value::Integer(node_id(&ids, &edge.source)?),
                Value::Integer(node_id(&ids, &edge.target)?),
                Value::Text(rel_key(edge)),
                Value::Text(
                    serde_json::Value::Object(dependency_properties(edge, now)).to_string(),
                ),
            ]);
        }
        let mut stmt = tx.prepare_cached(&sql)?;
        let rows = stmt.execute(params_from_iter(values))?;
        batches += 1;
        tracing::debug!(
            batch = idx + 1,
            rows,
            rel_type = %RelType::DependsOn,
            "wrote relationship batch"
        );
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

fn write_structure(conn: &mut Connection, structure: &ProjectStructure) -> rusqlite::Result<usize> {
    let tx = conn.transaction()?;
    let now = chrono::Utc::now().timestamp_micros();

    let mut ids: HashMap<&Coordinate, i64> = HashMap::with_capacity(structure.units().len());
    for unit in structure.units() {
        let props = serde_json::Value::Object(unit_properties(unit, now)).to_string();
        let id = upsert_node(&tx, Label::BuildUnit, &unit.coordinate.key(), &props)?;
        tx.execute(
            "DELETE FROM graph_relationships WHERE rel_type = ?1 AND start_node = ?2",
            params![RelType::Contains.as_str(), id],
        )?;
        ids.insert(&unit.coordinate, id);
    }

    {
        let mut link = tx.prepare_cached(
            "INSERT OR IGNORE INTO graph_relationships (rel_type, start_node, end_node, rel_key)
             VALUES (?1, ?2, ?3, '')",
        )?;
        for containment in structure.links() {
            link.execute(params![
                RelType::Contains.as_str(),
                node_id(&ids, &containment.parent)?,
                node_id(&ids, &containment.child)?,
            ])?;
        }
    }

    tx.commit()?;
    Ok(ids.len())
}

fn select_family_versions(
    conn: &Connection,
    group: &str,
    artifact: &str,
) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT json_extract(properties, '$.version') FROM graph_nodes
         WHERE label = ?1
           AND json_extract(properties, '$.group') = ?2
           AND json_extract(properties, '$.artifact') = ?3",
    )?;
    let rows = stmt.query_map(params![Label::Module.as_str(), group, artifact], |row| row.get(0))?;
    rows.collect()
}

/// [`FamilyStore`] over an open property-graph transaction.
struct GraphStore<'a> {
    tx: &'a Transaction<'a>,
}

impl FamilyStore for GraphStore<'_> {
    type Error = rusqlite::Error;

    fn versions(&mut self, group: &str, artifact: &str) -> rusqlite::Result<Vec<String>> {
        select_family_versions(self.tx, group, artifact)
    }

    fn referencing_sources(&mut self, module: &Coordinate) -> rusqlite::Result<Vec<Coordinate>> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT DISTINCT
                 json_extract(s.properties, '$.group'),
                 json_extract(s.properties, '$.artifact'),
                 json_extract(s.properties, '$.version')
             FROM graph_relationships r
             JOIN graph_nodes s ON s.node_id = r.start_node
             JOIN graph_nodes t ON t.node_id = r.end_node
             WHERE r.rel_type = ?1 AND t.label = ?2 AND t.node_key = ?3",
        )?;
        let rows = stmt.query_map(
            params![RelType::DependsOn.as_str(), Label::Module.as_str(), module.key()],
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
            "UPDATE graph_nodes SET properties = json_set(properties, '$.is_latest', json('false'))
             WHERE label = ?1 AND node_key = ?2",
            params![Label::Module.as_str(), module.key()],
        )?;
        Ok(())
    }

    fn delete_module(&mut self, module: &Coordinate) -> rusqlite::Result<()> {
        self.tx.execute(
            "DELETE FROM graph_nodes WHERE label = ?1 AND node_key = ?2",
            params![Label::Module.as_str(), module.key()],
        )?;
        Ok(())
    }
}
