//! DDL for both backend layouts.
//!
//! Both layouts bootstrap with `CREATE ... IF NOT EXISTS`, so connecting to
//! an already-initialized file is a no-op. The version record is never seeded
//! here: its absence is how [`super::ExportSink::check_schema_version`] tells
//! a fresh database from an existing one.
//!
//! Relational layout:
//! - `modules` holds one row per coordinate
//! - `dependencies` holds edges, unique on `(source, target, scope, depth)`
//! - `build_units` / `build_unit_links` hold the project-structure overlay
//! - `schema_version` is a single row pinned to `id = 1`
//!
//! Property-graph layout:
//! - `graph_nodes` are labeled nodes keyed by `(label, node_key)` with JSON
//!   properties
//! - `graph_relationships` are typed, directed relationships keyed by
//!   `(rel_type, start_node, end_node, rel_key)`

/// Schema version written by this release.
pub const CURRENT_SCHEMA_VERSION: &str = "1.0";

pub const RELATIONAL_SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS modules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id TEXT NOT NULL CHECK (length(group_id) > 0),
    artifact_id TEXT NOT NULL CHECK (length(artifact_id) > 0),
    version TEXT NOT NULL CHECK (length(version) > 0),
    packaging TEXT NOT NULL DEFAULT 'jar',
    exported_at_us INTEGER NOT NULL,
    is_latest INTEGER NOT NULL DEFAULT 1 CHECK (is_latest IN (0, 1)),
    UNIQUE (group_id, artifact_id, version)
);

CREATE TABLE IF NOT EXISTS dependencies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
    target_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
    scope TEXT NOT NULL CHECK (scope IN ('compile', 'runtime', 'test', 'provided', 'system')),
    optional INTEGER NOT NULL DEFAULT 0 CHECK (optional IN (0, 1)),
    depth INTEGER NOT NULL CHECK (depth >= 1),
    resolved INTEGER NOT NULL DEFAULT 1 CHECK (resolved IN (0, 1)),
    exported_at_us INTEGER NOT NULL,
    UNIQUE (source_id, target_id, scope, depth)
);

CREATE INDEX IF NOT EXISTS idx_dependencies_target ON dependencies(target_id);

CREATE TABLE IF NOT EXISTS build_units (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id TEXT NOT NULL,
    artifact_id TEXT NOT NULL,
    version TEXT NOT NULL,
    packaging TEXT NOT NULL DEFAULT 'jar',
    is_root INTEGER NOT NULL DEFAULT 0 CHECK (is_root IN (0, 1)),
    exported_at_us INTEGER NOT NULL,
    UNIQUE (group_id, artifact_id, version)
);

CREATE TABLE IF NOT EXISTS build_unit_links (
    parent_id INTEGER NOT NULL REFERENCES build_units(id) ON DELETE CASCADE,
    child_id INTEGER NOT NULL REFERENCES build_units(id) ON DELETE CASCADE,
    PRIMARY KEY (parent_id, child_id),
    CHECK (parent_id <> child_id)
);

CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version TEXT NOT NULL,
    applied_at_us INTEGER NOT NULL
);
";

pub const PROPERTY_GRAPH_SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS graph_nodes (
    node_id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL CHECK (label IN ('Module', 'BuildUnit', 'SchemaVersion')),
    node_key TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}' CHECK (json_valid(properties)),
    UNIQUE (label, node_key)
);

CREATE INDEX IF NOT EXISTS idx_graph_nodes_family ON graph_nodes(
    label,
    json_extract(properties, '$.group'),
    json_extract(properties, '$.artifact')
);

CREATE TABLE IF NOT EXISTS graph_relationships (
    rel_id INTEGER PRIMARY KEY AUTOINCREMENT,
    rel_type TEXT NOT NULL CHECK (rel_type IN ('DEPENDS_ON', 'CONTAINS')),
    start_node INTEGER NOT NULL REFERENCES graph_nodes(node_id) ON DELETE CASCADE,
    end_node INTEGER NOT NULL REFERENCES graph_nodes(node_id) ON DELETE CASCADE,
    rel_key TEXT NOT NULL DEFAULT '',
    properties TEXT NOT NULL DEFAULT '{}' CHECK (json_valid(properties)),
    UNIQUE (rel_type, start_node, end_node, rel_key)
);

CREATE INDEX IF NOT EXISTS idx_graph_relationships_end ON graph_relationships(end_node, rel_type);
";
