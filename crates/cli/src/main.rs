//! `dagflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: validate a workflow graph JSON file.
//! - `topology`: print the execution levels and critical path.
//! - `check-edge`: tell whether adding an edge would create a cycle.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use engine::{ValidationLevel, ValidationOptions, WorkflowGraph};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dagflow", about = "Workflow graph validation and inspection", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow graph JSON file.
    Validate {
        /// Path to the workflow graph JSON file.
        path: PathBuf,
        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Print the topological levels and critical path of an acyclic graph.
    Topology {
        path: PathBuf,
    },
    /// Check whether adding `source -> target` would close a cycle.
    CheckEdge {
        path: PathBuf,
        source: String,
        target: String,
    },
}

#[derive(Args, Debug)]
struct LimitArgs {
    /// Report unreachable and dangling nodes as errors.
    #[arg(long)]
    strict: bool,
    /// JSON file with validation options; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, env = "DAGFLOW_MAX_NODES")]
    max_nodes: Option<usize>,
    #[arg(long, env = "DAGFLOW_MAX_EDGES")]
    max_edges: Option<usize>,
    #[arg(long, env = "DAGFLOW_VALIDATION_TIMEOUT_MS")]
    timeout_ms: Option<u64>,
    /// Variable names a run will provide; enables the variable check.
    #[arg(long, value_delimiter = ',')]
    variables: Vec<String>,
}

impl LimitArgs {
    fn options(&self) -> Result<ValidationOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read config {}", path.display()))?;
                serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))?
            }
            None => ValidationOptions::default(),
        };

        if self.strict {
            options.level = ValidationLevel::Strict;
        }
        if let Some(max_nodes) = self.max_nodes {
            options.max_nodes = max_nodes;
        }
        if let Some(max_edges) = self.max_edges {
            options.max_edges = max_edges;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            options.timeout = std::time::Duration::from_millis(timeout_ms);
        }
        if !self.variables.is_empty() {
            options = options.with_declared_variables(self.variables.iter().cloned());
        }
        Ok(options)
    }
}

fn load_graph(path: &Path) -> Result<WorkflowGraph> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let graph: WorkflowGraph =
        serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))?;
    debug!(nodes = graph.nodes.len(), edges = graph.edges.len(), "graph loaded");
    Ok(graph)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path, limits } => {
            let graph = load_graph(&path)?;
            let options = limits.options()?;
            let result = engine::validate(&graph, &options).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_valid {
                std::process::exit(1);
            }
            info!("{} is valid", path.display());
        }
        Command::Topology { path } => {
            let graph = load_graph(&path)?;
            let topology = engine::get_topology(&graph)?;
            println!("{}", serde_json::to_string_pretty(&topology)?);
        }
        Command::CheckEdge { path, source, target } => {
            let graph = load_graph(&path)?;
            let verdict = engine::would_create_cycle(&graph, &source, &target);
            let report = json!({ "source": source, "target": target, "would_create_cycle": verdict });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "dagflow",
            "validate",
            "graph.json",
            "--strict",
            "--max-nodes",
            "10",
            "--variables",
            "user,order",
        ])
        .unwrap();

        let Command::Validate { limits, .. } = cli.command else {
            panic!("expected the validate sub-command");
        };
        let options = limits.options().unwrap();
        assert_eq!(options.level, ValidationLevel::Strict);
        assert_eq!(options.max_nodes, 10);
        assert_eq!(options.max_edges, ValidationOptions::default().max_edges);
        let declared = options.declared_variables.unwrap();
        assert!(declared.contains("user") && declared.contains("order"));
    }

    #[test]
    fn check_edge_takes_two_ids() {
        let cli = Cli::try_parse_from(["dagflow", "check-edge", "g.json", "a", "b"]).unwrap();
        assert!(matches!(cli.command, Command::CheckEdge { ref source, ref target, .. } if source == "a" && target == "b"));
    }
}
