//! `depgraph export`: build, filter and persist one resolver tree.
//!
//! Configuration problems and unreadable input files always fail the
//! command. Backend failures fail it too unless continue-on-error is active
//! (`--continue-on-error` or `export.fail_on_error = false`), in which case
//! they are reported and the command exits successfully.

use crate::cmd::{BackendArgs, GraphArgs, read_tree};
use crate::output::{Failure, Line, OutputMode, Panel, describe_filter, emit, fail};
use anyhow::Context;
use clap::Args;
use depgraph_core::model::ProjectStructure;
use depgraph_core::{ExportReport, Exporter};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Resolver tree JSON file.
    #[arg(long, value_name = "FILE")]
    pub tree: PathBuf,

    /// Project structure JSON file (build units and their modules).
    #[arg(long, value_name = "FILE")]
    pub structure: Option<PathBuf>,

    #[command(flatten)]
    pub backend: BackendArgs,

    #[command(flatten)]
    pub graph: GraphArgs,

    /// Delete stored versions that are neither exported now nor referenced.
    #[arg(long)]
    pub keep_only_latest: bool,

    /// Report backend failures as warnings instead of failing.
    #[arg(long)]
    pub continue_on_error: bool,
}

/// Emitted instead of a report when a failure was tolerated.
#[derive(Debug, Serialize)]
struct SkippedExport {
    exported: bool,
    error: Failure,
}

pub fn run_export(
    args: &ExportArgs,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let mut config = args.backend.load(project_root)?;
    args.graph.apply(&mut config);
    if args.keep_only_latest {
        config.export.keep_only_latest = true;
    }
    if args.continue_on_error {
        config.export.fail_on_error = false;
    }

    let settings = match config.validate() {
        Ok(settings) => settings,
        Err(err) => return Err(fail(output, &err)),
    };

    let tree = read_tree(&args.tree)?;
    let structure = args
        .structure
        .as_deref()
        .map(read_structure)
        .transpose()?;

    let exporter = Exporter::new(settings);
    match exporter.run(&tree, structure.as_ref()) {
        Ok(report) => {
            tracing::info!(
                root = %report.root,
                backend = %report.backend,
                edges = report.export.edges_written,
                "export finished"
            );
            emit(output, &report, render_report_text, render_report_pretty)
        }
        Err(err) if err.is_fatal() || exporter.settings().fail_on_error => {
            Err(fail(output, &err))
        }
        Err(err) => {
            tracing::warn!(code = %err.code(), error = %err, "export failed; continuing");
            let skipped = SkippedExport {
                exported: false,
                error: Failure::from(&err),
            };
            emit(output, &skipped, render_skipped_text, render_skipped_pretty)
        }
    }
}

fn read_structure(path: &Path) -> anyhow::Result<ProjectStructure> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    ProjectStructure::from_json_str(&json)
        .with_context(|| format!("Failed to load project structure from {}", path.display()))
}

fn render_report_text(report: &ExportReport, w: &mut dyn Write) -> std::io::Result<()> {
    Line::new("exported")
        .field("root", &report.root)
        .field("backend", &report.backend)
        .field("modules", report.export.modules_written)
        .field("edges", report.export.edges_written)
        .field("conflicts", report.export.conflicts)
        .field("batches", report.export.batches)
        .field("dropped", report.filter.dropped)
        .write(w)?;
    if let Some(units) = report.structure_units {
        Line::new("structure").field("units", units).write(w)?;
    }
    if let Some(cleanup) = &report.cleanup {
        Line::new("cleanup")
            .field("families", cleanup.families)
            .field("deleted", cleanup.deleted)
            .field("failed", cleanup.failed_families.len())
            .write(w)?;
    }
    Ok(())
}

fn render_report_pretty(report: &ExportReport, w: &mut dyn Write) -> std::io::Result<()> {
    let mut panel = Panel::open(w, format_args!("Exported {}", report.root))?;
    panel.row("backend", &report.backend)?;
    if report.schema.compatible {
        panel.row("schema", &report.schema.version)?;
    } else {
        panel.row("schema", format_args!("{} (incompatible)", report.schema.version))?;
    }
    panel
        .row("modules", report.export.modules_written)?
        .row("edges", report.export.edges_written)?
        .row("conflicts", report.export.conflicts)?
        .row("batches", report.export.batches)?
        .row("filtered", describe_filter(&report.filter))?;
    if report.build.cycles_skipped > 0 {
        panel.row("cycles", format_args!("{} skipped", report.build.cycles_skipped))?;
    }
    panel.row("duration", format_args!("{} ms", report.export.duration_ms))?;
    if let Some(units) = report.structure_units {
        panel.row("build units", units)?;
    }
    if let Some(cleanup) = &report.cleanup {
        panel.row(
            "cleanup",
            format_args!("{} deleted across {} families", cleanup.deleted, cleanup.families),
        )?;
        for family in &cleanup.failed_families {
            panel.note("!", format_args!("cleanup failed for {family}"))?;
        }
    }
    Ok(())
}

fn render_skipped_text(skipped: &SkippedExport, w: &mut dyn Write) -> std::io::Result<()> {
    let mut line = Line::new("skipped").field("code", skipped.error.code);
    if let Some(stage) = skipped.error.stage {
        line = line.field("stage", stage);
    }
    line.write(w)?;
    writeln!(w, "{}", skipped.error.message)
}

fn render_skipped_pretty(skipped: &SkippedExport, w: &mut dyn Write) -> std::io::Result<()> {
    let mut panel = Panel::open(w, "Export skipped (continue-on-error)")?;
    panel
        .row("code", skipped.error.code)?
        .row("error", &skipped.error.message)?;
    if let Some(hint) = skipped.error.hint {
        panel.note("hint:", hint)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use depgraph_core::pipeline::{BuildSummary, CleanupSummary, FilterSummary};
    use depgraph_core::sink::{ExportStats, SchemaStatus};

    fn report() -> ExportReport {
        ExportReport {
            root: "org.app:app:1.0".to_string(),
            backend: "relational".to_string(),
            build: BuildSummary {
                nodes: 4,
                edges: 4,
                conflicts: 1,
                cycles_skipped: 0,
            },
            filter: FilterSummary {
                kept: 3,
                dropped: 1,
                excluded: 1,
                ..FilterSummary::default()
            },
            schema: SchemaStatus {
                version: "1".to_string(),
                compatible: true,
                created: false,
            },
            export: ExportStats {
                modules_written: 4,
                edges_written: 3,
                conflicts: 1,
                batches: 1,
                duration_ms: 7,
            },
            structure_units: None,
            cleanup: Some(CleanupSummary {
                families: 3,
                deleted: 1,
                failed_families: vec!["org.log:api".to_string()],
            }),
        }
    }

    fn render(f: fn(&ExportReport, &mut dyn Write) -> std::io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&report(), &mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn text_report_has_one_line_per_stage() {
        let text = render(render_report_text);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("exported  root=org.app:app:1.0  backend=relational"));
        assert!(lines[0].ends_with("dropped=1"));
        assert_eq!(lines[1], "cleanup  families=3  deleted=1  failed=1");
    }

    #[test]
    fn pretty_report_explains_filtering_and_cleanup_failures() {
        let text = render(render_report_pretty);
        assert!(text.contains("filtered     3 kept, 1 dropped (1 excluded)"));
        assert!(text.contains("  ! cleanup failed for org.log:api"));
        assert!(!text.contains("cycles"));
    }
}
