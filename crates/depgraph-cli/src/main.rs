#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "depgraph: export resolved dependency trees into graph stores",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format: pretty, text or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output (alias for --format json).
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        OutputMode::detect(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Export a resolver tree into the configured backend",
        long_about = "Build the dependency graph from a resolver tree, apply depth and filter rules, \
                      and replace the root's stored edges in one transaction.",
        after_help = "EXAMPLES:\n    # Export into the default relational store\n    depgraph export --tree target/deps.json\n\n    # Property-graph backend, direct dependencies only\n    depgraph export --tree deps.json --backend graph --depth 0\n\n    # Drop test artifacts and prune old versions\n    depgraph export --tree deps.json --exclude '*:*-test' --keep-only-latest"
    )]
    Export(cmd::export::ExportArgs),

    #[command(
        about = "Print the filtered dependency graph without a backend",
        long_about = "Build and filter a resolver tree and print its edges, or Graphviz DOT with --dot.",
        after_help = "EXAMPLES:\n    # List edges\n    depgraph tree --tree deps.json\n\n    # Render with Graphviz\n    depgraph tree --tree deps.json --dot | dot -Tsvg > deps.svg"
    )]
    Tree(cmd::tree::TreeArgs),

    #[command(
        about = "List stored versions of a group:artifact family",
        long_about = "List every stored version of one family, newest first.",
        after_help = "EXAMPLES:\n    # Versions in the default store\n    depgraph versions org.slf4j slf4j-api\n\n    # Machine-readable output\n    depgraph versions org.slf4j slf4j-api --json"
    )]
    Versions(cmd::versions::VersionsArgs),
}

/// Logs go to stderr so stdout stays parseable.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("DEPGRAPH_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "depgraph=debug,info"
        } else {
            "depgraph=info,warn"
        })
    });

    let format = env::var("DEPGRAPH_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = env::current_dir()?;
    let output = cli.output_mode();

    match cli.command {
        Commands::Export(ref args) => cmd::export::run_export(args, output, &project_root),
        Commands::Tree(ref args) => cmd::tree::run_tree(args, output, &project_root),
        Commands::Versions(ref args) => cmd::versions::run_versions(args, output, &project_root),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_after_subcommand() {
        let cli = Cli::parse_from(["depgraph", "tree", "--tree", "deps.json", "--json"]);
        assert!(cli.json);
        assert!(cli.output_mode().is_json());
    }

    #[test]
    fn format_flag_parses_value_enum() {
        let cli = Cli::parse_from(["depgraph", "--format", "text", "tree", "--tree", "deps.json"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
    }

    #[test]
    fn export_parses_repeatable_filters_and_negative_depth() {
        let cli = Cli::parse_from([
            "depgraph",
            "export",
            "--tree",
            "deps.json",
            "--depth",
            "-1",
            "--exclude",
            "*:*-test",
            "--exclude",
            "org.old:*",
            "--scope",
            "compile",
            "--backend",
            "graph",
            "--keep-only-latest",
        ]);
        let Commands::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.graph.depth, Some(-1));
        assert_eq!(args.graph.exclude, vec!["*:*-test", "org.old:*"]);
        assert_eq!(args.graph.scopes, vec!["compile"]);
        assert_eq!(args.backend.backend, Some(depgraph_core::sink::BackendKind::Graph));
        assert!(args.keep_only_latest);
        assert!(!args.continue_on_error);
    }

    #[test]
    fn unknown_backend_is_rejected_by_parser() {
        let result =
            Cli::try_parse_from(["depgraph", "versions", "org.a", "a", "--backend", "neo"]);
        assert!(result.is_err());
    }

    #[test]
    fn versions_takes_group_and_artifact() {
        let cli =
            Cli::parse_from(["depgraph", "versions", "org.slf4j", "slf4j-api", "--db", "x.db"]);
        let Commands::Versions(args) = cli.command else {
            panic!("expected versions");
        };
        assert_eq!((args.group.as_str(), args.artifact.as_str()), ("org.slf4j", "slf4j-api"));
        assert_eq!(args.backend.db.as_deref(), Some(std::path::Path::new("x.db")));
    }
}
