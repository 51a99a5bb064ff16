pub mod export;
pub mod tree;
pub mod versions;

use anyhow::Context;
use clap::Args;
use depgraph_core::config::{ExportConfig, resolve_config};
use depgraph_core::resolve::ResolvedTree;
use depgraph_core::sink::BackendKind;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Where the configuration and backend come from.
#[derive(Args, Debug, Default)]
pub struct BackendArgs {
    /// Config file (default: ./depgraph.toml, then the user config directory).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Backend kind: relational or graph.
    #[arg(long, value_name = "KIND")]
    pub backend: Option<BackendKind>,

    /// Database file, relative to the working directory.
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,
}

/// Depth bound and filter rules.
#[derive(Args, Debug, Default)]
pub struct GraphArgs {
    /// Transitive depth: -1 unlimited, 0 direct dependencies only.
    #[arg(long, allow_negative_numbers = true, value_name = "N")]
    pub depth: Option<i64>,

    /// Keep only edges in this scope (repeatable).
    #[arg(long = "scope", value_name = "SCOPE")]
    pub scopes: Vec<String>,

    /// Keep only targets matching group:artifact (repeatable, * and ? wildcards).
    #[arg(long = "include", value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Drop targets matching group:artifact (repeatable, wins over --include).
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,
}

impl BackendArgs {
    /// Load the config file and apply backend overrides. Relative database
    /// paths are anchored at `project_root`.
    pub fn load(&self, project_root: &Path) -> anyhow::Result<ExportConfig> {
        let (mut config, source) = resolve_config(self.config.as_deref(), project_root)?;
        if let Some(source) = source {
            tracing::debug!(path = %source.display(), "configuration file in use");
        }

        if let Some(kind) = self.backend {
            config.backend.kind = kind;
        }
        if let Some(db) = &self.db {
            config.backend.path.clone_from(db);
        }
        if config.backend.path.is_relative() && !config.backend.path.as_os_str().is_empty() {
            config.backend.path = project_root.join(&config.backend.path);
        }
        Ok(config)
    }
}

impl GraphArgs {
    /// Flag values win; list flags replace the configured list when given.
    pub fn apply(&self, config: &mut ExportConfig) {
        if let Some(depth) = self.depth {
            config.graph.depth = depth;
        }
        if !self.scopes.is_empty() {
            config.graph.scopes.clone_from(&self.scopes);
        }
        if !self.include.is_empty() {
            config.graph.include.clone_from(&self.include);
        }
        if !self.exclude.is_empty() {
            config.graph.exclude.clone_from(&self.exclude);
        }
    }
}

/// Read a resolver tree JSON file.
pub fn read_tree(path: &Path) -> anyhow::Result<ResolvedTree> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    ResolvedTree::from_json_reader(BufReader::new(file))
        .with_context(|| format!("Failed to load resolver tree from {}", path.display()))
}
