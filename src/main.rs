//! Lattice CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "lattice")]
#[command(about = "Multi-language dependency and symbol graph analyzer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Emit machine-readable JSON instead of human summaries
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze files into the graph store
    Analyze {
        /// Repository-relative files; the whole repository when empty
        paths: Vec<String>,
    },
    /// Run a graph query (JSON form) against the store
    Query {
        /// Query document, inline or `@file.json`
        query: String,
    },
    /// Search unknown symbols and show ranked equivalence candidates
    Symbols {
        /// Fuzzy name query
        name: String,
        /// Restrict to one source file
        #[arg(long)]
        file: Option<String>,
        /// Maximum unknowns listed
        #[arg(long, default_value = "10")]
        limit: u32,
    },
    /// Transitive or hierarchical inference from one node
    Infer {
        /// Identifier of the start node
        from: String,
        /// Edge type to traverse
        #[arg(long, default_value = "depends_on")]
        edge_type: String,
        /// Maximum path length
        #[arg(long, default_value = "10")]
        depth: u32,
        /// Walk the containment hierarchy instead of transitive edges
        #[arg(long)]
        hierarchical: bool,
    },
    /// Graph store and registry statistics
    Stats,
    /// Store maintenance
    Maintain {
        /// Copy the database to this path
        #[arg(long)]
        backup: Option<PathBuf>,
        /// Truncate the WAL
        #[arg(long)]
        checkpoint: bool,
        /// Run the optimizer and reclaim free pages
        #[arg(long)]
        optimize: bool,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("lattice={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Lattice v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Analyze { paths } => commands::analyze(cli.root, paths, cli.json).await,
        Commands::Query { query } => commands::query(cli.root, query),
        Commands::Symbols { name, file, limit } => {
            commands::symbols(cli.root, name, file, limit, cli.json)
        }
        Commands::Infer {
            from,
            edge_type,
            depth,
            hierarchical,
        } => commands::infer(cli.root, from, edge_type, depth, hierarchical, cli.json),
        Commands::Stats => commands::stats(cli.root, cli.json),
        Commands::Maintain {
            backup,
            checkpoint,
            optimize,
        } => commands::maintain(cli.root, backup, checkpoint, optimize),
        Commands::Version => {
            println!("Lattice v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
