//! `depgraph tree`: build and filter a resolver tree without a backend.

use crate::cmd::{GraphArgs, read_tree};
use crate::output::{OutputMode, Panel, describe_filter, emit, fail};
use clap::Args;
use depgraph_core::config::resolve_config;
use depgraph_core::model::{Dependency, DependencyGraph};
use depgraph_core::pipeline::{BuildSummary, FilterSummary, build_filtered};
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Resolver tree JSON file.
    #[arg(long, value_name = "FILE")]
    pub tree: PathBuf,

    /// Config file supplying graph defaults.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub graph: GraphArgs,

    /// Print Graphviz DOT instead of an edge list.
    #[arg(long)]
    pub dot: bool,
}

#[derive(Debug, Serialize)]
struct TreeView {
    root: String,
    depth: String,
    build: BuildSummary,
    filter: FilterSummary,
    edges: Vec<Dependency>,
}

pub fn run_tree(args: &TreeArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let (mut config, _) = resolve_config(args.config.as_deref(), project_root)?;
    args.graph.apply(&mut config);
    let settings = match config.validate() {
        Ok(settings) => settings,
        Err(err) => return Err(fail(output, &err)),
    };

    let tree = read_tree(&args.tree)?;
    let (graph, build, filter) = build_filtered(&settings, &tree);
    tracing::debug!(nodes = graph.node_count(), edges = graph.edge_count(), "graph built");

    if args.dot {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        write!(out, "{}", render_dot(&graph))?;
        return Ok(());
    }

    let view = TreeView {
        root: graph.root().coordinate.to_string(),
        depth: settings.depth.to_string(),
        build: build.into(),
        filter: filter.into(),
        edges: graph.edges().to_vec(),
    };
    emit(output, &view, render_text, render_pretty)
}

fn edge_label(edge: &Dependency) -> String {
    let mut label = format!("{}/{}", edge.scope, edge.depth);
    if edge.optional {
        label.push_str(" optional");
    }
    if !edge.resolved {
        label.push_str(" conflict");
    }
    label
}

/// DOT rendering; node labels are coordinates, edge labels `scope/depth`.
fn render_dot(graph: &DependencyGraph) -> String {
    let mut dot: DiGraph<String, String> = DiGraph::new();
    let index: HashMap<_, NodeIndex> = graph
        .nodes()
        .iter()
        .map(|module| (&module.coordinate, dot.add_node(module.coordinate.to_string())))
        .collect();

    for edge in graph.edges() {
        if let (Some(&from), Some(&to)) = (index.get(&edge.source), index.get(&edge.target)) {
            dot.add_edge(from, to, edge_label(edge));
        }
    }
    format!("{}", Dot::new(&dot))
}

fn render_text(view: &TreeView, w: &mut dyn Write) -> std::io::Result<()> {
    for edge in &view.edges {
        writeln!(w, "{}  {}  {}", edge.source, edge.target, edge_label(edge))?;
    }
    Ok(())
}

fn render_pretty(view: &TreeView, w: &mut dyn Write) -> std::io::Result<()> {
    Panel::open(&mut *w, &view.root)?
        .row("depth", &view.depth)?
        .row("edges", describe_filter(&view.filter))?
        .row("conflicts", view.build.conflicts)?;
    writeln!(w)?;

    let mut last_source = None;
    for edge in &view.edges {
        if last_source != Some(&edge.source) {
            writeln!(w, "{}", edge.source)?;
            last_source = Some(&edge.source);
        }
        let marker = if edge.resolved { "+-" } else { "x-" };
        writeln!(w, "  {marker} {} ({})", edge.target, edge_label(edge))?;
    }
    Ok(())
}
