mod commands;
mod project;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gas")]
#[command(about = "Dependency-aware infrastructure deploys", long_about = None)]
struct Cli {
    /// Path to gas.config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Maximum number of resources provisioned at once
    #[arg(long, global = true)]
    max_concurrency: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy resource changes
    #[command(visible_alias = "deploy")]
    Up,
    /// Show what a deploy would change
    Plan,
    /// Show the resource dependency graph
    Graph,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if matches!(cli.command, Commands::Version) {
        println!("gasoline {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let project = project::Project::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Up => commands::up::handle(&project, cli.max_concurrency).await,
        Commands::Plan => commands::plan::handle(&project).await,
        Commands::Graph => commands::graph::handle(&project).await,
        Commands::Version => Ok(()),
    }
}
