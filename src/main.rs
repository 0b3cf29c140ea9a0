//! # vdir CLI
//!
//! ```bash
//! vdir --config ./config/vdir.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vdir init` | Create the SQLite database and schema |
//! | `vdir run` | Cluster the corpus and replace the stored tree |
//! | `vdir tree` | Print the stored category tree |
//! | `vdir serve` | Start the viewer HTTP API |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `vdir=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vdir::{config, migrate, pipeline, server, tree_cmd};

/// Cluster embedded documents into a named category hierarchy.
#[derive(Parser)]
#[command(
    name = "vdir",
    about = "AI virtual directory: clusters embedded documents into a named category tree",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vdir.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Cluster the corpus, name the hierarchy and replace the stored tree.
    Run {
        /// Read this JSONL file instead of the configured corpus source.
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Print the planned tree without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the stored category tree.
    Tree {
        /// Emit JSON instead of an indented listing.
        #[arg(long)]
        json: bool,
    },

    /// Start the read-only viewer HTTP API.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vdir=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Run { corpus, dry_run } => {
            pipeline::run_pipeline(&cfg, corpus.as_deref(), dry_run).await?;
        }
        Commands::Tree { json } => {
            tree_cmd::run_tree(&cfg, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
