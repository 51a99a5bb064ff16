//! `depgraph versions`: stored versions of one family, newest first.
//!
//! Read-only: an absent database is a configuration error rather than a
//! fresh, empty store.

use crate::cmd::BackendArgs;
use crate::output::{OutputMode, Panel, emit, fail};
use clap::Args;
use depgraph_core::ExportError;
use depgraph_core::config::ExportSettings;
use depgraph_core::sink::open_sink;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Args, Debug)]
pub struct VersionsArgs {
    /// Group id, e.g. org.slf4j.
    pub group: String,

    /// Artifact id, e.g. slf4j-api.
    pub artifact: String,

    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(Debug, Serialize)]
struct FamilyVersions {
    group: String,
    artifact: String,
    backend: String,
    versions: Vec<String>,
}

pub fn run_versions(
    args: &VersionsArgs,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let config = args.backend.load(project_root)?;
    let versions = config
        .validate()
        .and_then(|settings| query_versions(&settings, &args.group, &args.artifact))
        .map_err(|err| fail(output, &err))?;

    let family = FamilyVersions {
        group: args.group.clone(),
        artifact: args.artifact.clone(),
        backend: config.backend.kind.to_string(),
        versions,
    };
    emit(output, &family, render_text, render_pretty)
}

fn render_text(family: &FamilyVersions, w: &mut dyn Write) -> std::io::Result<()> {
    for version in &family.versions {
        writeln!(w, "{version}")?;
    }
    Ok(())
}

fn render_pretty(family: &FamilyVersions, w: &mut dyn Write) -> std::io::Result<()> {
    let title = format!("{}:{} ({})", family.group, family.artifact, family.backend);
    let mut panel = Panel::open(w, title)?;
    let Some((latest, older)) = family.versions.split_first() else {
        panel.note("-", "no stored versions")?;
        return Ok(());
    };
    panel.row("latest", latest)?;
    for version in older {
        panel.note(" ", version)?;
    }
    Ok(())
}

fn query_versions(
    settings: &ExportSettings,
    group: &str,
    artifact: &str,
) -> Result<Vec<String>, ExportError> {
    let path = &settings.backend.path;
    if !path.exists() {
        return Err(ExportError::Configuration(format!(
            "database {} does not exist",
            path.display()
        )));
    }

    let mut sink = open_sink(&settings.backend, settings.retry, settings.batch_size)?;
    let result = sink
        .connect()
        .and_then(|()| sink.family_versions(group, artifact));
    sink.close();
    result
}
