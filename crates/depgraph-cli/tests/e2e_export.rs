//! E2E CLI tests covering:
//! - `depgraph export` against both backends, re-export overwrite, structure overlay
//! - configuration errors and the continue-on-error policy
//! - `depgraph tree` edge listing and DOT rendering
//! - `depgraph versions` ordering
//!
//! Each test runs the `depgraph` binary as a subprocess in an isolated temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

/// Build a Command targeting the depgraph binary, rooted in `dir`.
fn depgraph_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("depgraph"));
    cmd.current_dir(dir);
    cmd.env("DEPGRAPH_LOG", "error");
    cmd.env("XDG_CONFIG_HOME", dir.join(".config"));
    cmd.env_remove("FORMAT");
    cmd
}

const TREE_V1: &str = r#"{
    "groupId": "org.app", "artifactId": "app", "version": "1.0", "type": "jar",
    "children": [
        {"groupId": "org.lib", "artifactId": "core", "version": "2.0", "scope": "compile", "children": [
            {"groupId": "org.lib", "artifactId": "util", "version": "1.1", "scope": "compile"}
        ]},
        {"groupId": "org.test", "artifactId": "junit-test", "version": "5.0", "scope": "test"},
        {"groupId": "org.log", "artifactId": "api", "version": "1.9", "scope": "runtime",
         "omittedForConflictWith": "1.10"}
    ]
}"#;

const TREE_V2: &str = r#"{
    "groupId": "org.app", "artifactId": "app", "version": "1.0",
    "children": [
        {"groupId": "org.log", "artifactId": "api", "version": "1.10", "scope": "runtime"}
    ]
}"#;

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write fixture");
    path
}

fn export_json(dir: &Path, extra: &[&str]) -> Value {
    let output = depgraph_cmd(dir)
        .args(["export", "--json"])
        .args(extra)
        .output()
        .expect("export should not crash");
    assert!(
        output.status.success(),
        "export failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("export --json should produce valid JSON")
}

fn relational_edge_count(db: &Path) -> i64 {
    let conn = rusqlite::Connection::open(db).expect("open db");
    conn.query_row("SELECT COUNT(*) FROM dependencies", [], |row| row.get(0))
        .expect("count edges")
}

// ---------------------------------------------------------------------------
// export
// ---------------------------------------------------------------------------

#[test]
fn export_relational_reports_and_persists_edges() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "deps.json", TREE_V1);

    let report = export_json(dir.path(), &["--tree", "deps.json", "--db", "deps.db"]);

    assert_eq!(report["root"], "org.app:app:1.0");
    assert_eq!(report["backend"], "relational");
    assert_eq!(report["export"]["edges_written"], 4);
    assert_eq!(report["export"]["conflicts"], 1);
    assert_eq!(report["schema"]["created"], true);
    assert_eq!(relational_edge_count(&dir.path().join("deps.db")), 4);
}

#[test]
fn export_filters_apply_before_writing() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "deps.json", TREE_V1);

    let report = export_json(
        dir.path(),
        &[
            "--tree",
            "deps.json",
            "--db",
            "deps.db",
            "--exclude",
            "*:*-test",
            "--depth",
            "0",
        ],
    );

    // util sits below the depth bound, junit-test is excluded.
    assert_eq!(report["export"]["edges_written"], 2);
    assert_eq!(report["filter"]["dropped"], 1);
    assert_eq!(relational_edge_count(&dir.path().join("deps.db")), 2);
}

#[test]
fn reexport_replaces_root_edges() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "v1.json", TREE_V1);
    write_file(dir.path(), "v2.json", TREE_V2);

    export_json(dir.path(), &["--tree", "v1.json", "--db", "deps.db"]);
    export_json(dir.path(), &["--tree", "v2.json", "--db", "deps.db"]);

    let conn = rusqlite::Connection::open(dir.path().join("deps.db")).expect("open db");
    let root_targets: Vec<String> = conn
        .prepare(
            "SELECT t.artifact_id || ':' || t.version FROM dependencies d
             JOIN modules s ON s.id = d.source_id
             JOIN modules t ON t.id = d.target_id
             WHERE s.artifact_id = 'app'",
        )
        .expect("prepare")
        .query_map([], |row| row.get(0))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("collect");
    assert_eq!(root_targets, vec!["api:1.10"]);
}

#[test]
fn export_graph_backend_with_structure() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "deps.json", TREE_V1);
    write_file(
        dir.path(),
        "structure.json",
        r#"{"root": {"groupId": "org.app", "artifactId": "app", "version": "1.0", "type": "pom",
            "modules": [{"groupId": "org.app", "artifactId": "app-web", "version": "1.0"}]}}"#,
    );

    let report = export_json(
        dir.path(),
        &[
            "--tree",
            "deps.json",
            "--structure",
            "structure.json",
            "--backend",
            "graph",
            "--db",
            "graph.db",
        ],
    );

    assert_eq!(report["backend"], "graph");
    assert_eq!(report["structure_units"], 2);

    let conn = rusqlite::Connection::open(dir.path().join("graph.db")).expect("open db");
    let relationships: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM graph_relationships WHERE rel_type = 'DEPENDS_ON'",
            [],
            |row| row.get(0),
        )
        .expect("count");
    assert_eq!(relationships, 4);
}

#[test]
fn config_file_in_working_directory_is_used() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "deps.json", TREE_V1);
    write_file(
        dir.path(),
        "depgraph.toml",
        "[backend]\npath = \"from-config.db\"\n\n[graph]\nscopes = [\"compile\"]\n",
    );

    let report = export_json(dir.path(), &["--tree", "deps.json"]);

    assert_eq!(report["export"]["edges_written"], 2);
    assert!(dir.path().join("from-config.db").exists());
}

#[test]
fn invalid_depth_fails_even_with_continue_on_error() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "deps.json", TREE_V1);

    depgraph_cmd(dir.path())
        .args([
            "export",
            "--tree",
            "deps.json",
            "--db",
            "deps.db",
            "--depth",
            "-2",
            "--continue-on-error",
            "--json",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1001"));

    assert!(!dir.path().join("deps.db").exists());
}

#[test]
fn bad_pattern_is_a_configuration_error() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "deps.json", TREE_V1);

    depgraph_cmd(dir.path())
        .args(["export", "--tree", "deps.json", "--db", "deps.db", "--include", "no-colon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn missing_tree_file_fails() {
    let dir = TempDir::new().expect("tempdir");

    depgraph_cmd(dir.path())
        .args(["export", "--tree", "absent.json", "--db", "deps.db"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.json"));
}

/// Install a trigger that rejects every new edge, after a first export has
/// created the schema.
fn freeze_edges(db: &Path) {
    let conn = rusqlite::Connection::open(db).expect("open db");
    conn.execute_batch(
        "CREATE TRIGGER freeze_edges BEFORE INSERT ON dependencies
         BEGIN SELECT RAISE(ABORT, 'edges are frozen'); END;",
    )
    .expect("install trigger");
}

#[test]
fn rejected_write_fails_by_default() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "v1.json", TREE_V1);
    write_file(dir.path(), "v2.json", TREE_V2);
    export_json(dir.path(), &["--tree", "v1.json", "--db", "deps.db"]);
    freeze_edges(&dir.path().join("deps.db"));

    depgraph_cmd(dir.path())
        .args(["export", "--tree", "v2.json", "--db", "deps.db", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E3002"));

    // The rolled back run leaves the first export intact.
    assert_eq!(relational_edge_count(&dir.path().join("deps.db")), 4);
}

#[test]
fn rejected_write_is_tolerated_with_continue_on_error() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "v1.json", TREE_V1);
    write_file(dir.path(), "v2.json", TREE_V2);
    export_json(dir.path(), &["--tree", "v1.json", "--db", "deps.db"]);
    freeze_edges(&dir.path().join("deps.db"));

    let outcome = export_json(
        dir.path(),
        &["--tree", "v2.json", "--db", "deps.db", "--continue-on-error"],
    );

    assert_eq!(outcome["exported"], false);
    assert_eq!(outcome["error"]["code"], "E3002");
    assert_eq!(outcome["error"]["stage"], "export");
    assert_eq!(relational_edge_count(&dir.path().join("deps.db")), 4);
}

#[test]
fn keep_only_latest_prunes_superseded_versions() {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        dir.path(),
        "old.json",
        r#"{"groupId": "org.app", "artifactId": "app", "version": "1.0"}"#,
    );
    write_file(
        dir.path(),
        "new.json",
        r#"{"groupId": "org.app", "artifactId": "app", "version": "1.1"}"#,
    );

    export_json(dir.path(), &["--tree", "old.json", "--db", "deps.db"]);
    let report = export_json(
        dir.path(),
        &["--tree", "new.json", "--db", "deps.db", "--keep-only-latest"],
    );
    assert_eq!(report["cleanup"]["deleted"], 1);

    let output = depgraph_cmd(dir.path())
        .args(["versions", "org.app", "app", "--db", "deps.db", "--format", "text"])
        .output()
        .expect("versions should not crash");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "1.1\n");
}

// ---------------------------------------------------------------------------
// tree
// ---------------------------------------------------------------------------

#[test]
fn tree_lists_edges_in_text_mode() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "deps.json", TREE_V1);

    depgraph_cmd(dir.path())
        .args(["tree", "--tree", "deps.json", "--format", "text", "--exclude", "*:*-test"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "org.lib:core:2.0  org.lib:util:1.1  compile/2",
        ))
        .stdout(predicate::str::contains("org.log:api:1.9  runtime/1 conflict"))
        .stdout(predicate::str::contains("junit-test").not());
}

#[test]
fn tree_renders_dot() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "deps.json", TREE_V1);

    depgraph_cmd(dir.path())
        .args(["tree", "--tree", "deps.json", "--dot"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph {"))
        .stdout(predicate::str::contains("org.lib:util:1.1"));
}

#[test]
fn tree_json_has_edges_and_stats() {
    let dir = TempDir::new().expect("tempdir");
    write_file(dir.path(), "deps.json", TREE_V1);

    let output = depgraph_cmd(dir.path())
        .args(["tree", "--tree", "deps.json", "--json", "--depth", "0"])
        .output()
        .expect("tree should not crash");
    assert!(output.status.success());
    let view: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(view["depth"], "0");
    assert_eq!(view["edges"].as_array().map(Vec::len), Some(3));
    assert_eq!(view["build"]["conflicts"], 1);
}

// ---------------------------------------------------------------------------
// versions
// ---------------------------------------------------------------------------

#[test]
fn versions_are_listed_newest_first() {
    let dir = TempDir::new().expect("tempdir");
    for version in ["1.9", "1.10", "1.0"] {
        let name = format!("app-{version}.json");
        write_file(
            dir.path(),
            &name,
            &format!(r#"{{"groupId": "org.app", "artifactId": "app", "version": "{version}"}}"#),
        );
        export_json(dir.path(), &["--tree", &name, "--db", "deps.db"]);
    }

    let output = depgraph_cmd(dir.path())
        .args(["versions", "org.app", "app", "--db", "deps.db", "--json"])
        .output()
        .expect("versions should not crash");
    assert!(output.status.success());
    let family: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(family["versions"], serde_json::json!(["1.10", "1.9", "1.0"]));
}

#[test]
fn versions_against_missing_database_fails_without_creating_it() {
    let dir = TempDir::new().expect("tempdir");

    depgraph_cmd(dir.path())
        .args(["versions", "org.app", "app", "--db", "nowhere.db"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1001"))
        .stderr(predicate::str::contains("nowhere.db"));

    assert!(!dir.path().join("nowhere.db").exists());
}
