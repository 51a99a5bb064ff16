use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::ExportError;
use crate::filter::{ArtifactPattern, FilterRules};
use crate::graph::DepthLimit;
use crate::model::Scope;
use crate::retry::RetryPolicy;
use crate::sink::{BackendConfig, BackendKind, DEFAULT_BATCH_SIZE};

/// File looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "depgraph.toml";

/// Largest accepted batch; keeps a multi-row insert under SQLite's bound
/// parameter limit.
pub const MAX_BATCH_SIZE: usize = 4_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub graph: GraphSection,
    #[serde(default)]
    pub export: ExportSection,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSection {
    #[serde(default)]
    pub kind: BackendKind,
    #[serde(default = "default_backend_path")]
    pub path: PathBuf,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            path: default_backend_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSection {
    /// `-1` unlimited, `0` direct dependencies only, `N` levels below them.
    #[serde(default = "default_depth")]
    pub depth: i64,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            scopes: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSection {
    #[serde(default)]
    pub keep_only_latest: bool,
    #[serde(default = "default_true")]
    pub fail_on_error: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub export_structure: bool,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            keep_only_latest: false,
            fail_on_error: default_true(),
            batch_size: default_batch_size(),
            export_structure: default_true(),
        }
    }
}

fn default_backend_path() -> PathBuf {
    PathBuf::from("target/depgraph.sqlite3")
}

const fn default_depth() -> i64 {
    -1
}

const fn default_true() -> bool {
    true
}

const fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// Validated, ready-to-use settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    pub backend: BackendConfig,
    pub depth: DepthLimit,
    pub filter: FilterRules,
    pub keep_only_latest: bool,
    pub fail_on_error: bool,
    pub batch_size: usize,
    pub export_structure: bool,
    pub retry: RetryPolicy,
}

impl ExportConfig {
    /// Compile patterns, parse scopes and check every bound.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Configuration`] naming the first offending
    /// value.
    pub fn validate(&self) -> Result<ExportSettings, ExportError> {
        let depth = DepthLimit::from_raw(self.graph.depth)?;

        if self.backend.path.as_os_str().is_empty() {
            return Err(ExportError::Configuration("backend.path must not be empty".to_string()));
        }
        if self.export.batch_size == 0 || self.export.batch_size > MAX_BATCH_SIZE {
            return Err(ExportError::Configuration(format!(
                "export.batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.export.batch_size
            )));
        }
        self.retry.validate()?;

        let scopes = self
            .graph
            .scopes
            .iter()
            .map(|raw| {
                raw.parse::<Scope>()
                    .map_err(|err| ExportError::Configuration(format!("graph.scopes: {err}")))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(ExportSettings {
            backend: BackendConfig {
                kind: self.backend.kind,
                path: self.backend.path.clone(),
            },
            depth,
            filter: FilterRules {
                exclude: compile_patterns("graph.exclude", &self.graph.exclude)?,
                include: compile_patterns("graph.include", &self.graph.include)?,
                scopes,
            },
            keep_only_latest: self.export.keep_only_latest,
            fail_on_error: self.export.fail_on_error,
            batch_size: self.export.batch_size,
            export_structure: self.export.export_structure,
            retry: self.retry,
        })
    }
}

fn compile_patterns(field: &str, raw: &[String]) -> Result<Vec<ArtifactPattern>, ExportError> {
    raw.iter()
        .map(|pattern| {
            ArtifactPattern::parse(pattern)
                .map_err(|err| ExportError::Configuration(format!("{field}: {err}")))
        })
        .collect()
}

/// Parse one config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML.
pub fn load_config_file(path: &Path) -> Result<ExportConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ExportConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Resolve configuration: an explicit file wins, then `depgraph.toml` in
/// `working_dir`, then `<config dir>/depgraph/config.toml`. Without any
/// file the defaults apply. Returns the file that was used, if any.
///
/// # Errors
///
/// Returns an error if an explicit file is missing or any chosen file fails
/// to parse.
pub fn resolve_config(
    explicit: Option<&Path>,
    working_dir: &Path,
) -> Result<(ExportConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        return load_config_file(path).map(|config| (config, Some(path.to_path_buf())));
    }

    let mut candidates = vec![working_dir.join(PROJECT_CONFIG_FILE)];
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("depgraph/config.toml"));
    }

    for path in candidates {
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading configuration");
            return load_config_file(&path).map(|config| (config, Some(path)));
        }
    }
    Ok((ExportConfig::default(), None))
}
