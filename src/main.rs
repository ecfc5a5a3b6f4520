use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eightbit_backend::config::Config;
use eightbit_backend::store::SessionStore;
use eightbit_backend::{server, sweeper};

/// Backend for an educational 8-bit computer simulator
#[derive(Parser, Debug)]
#[command(name = "eightbit_backend", version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API server (default)
    Serve,
    /// Run one retention sweep and exit
    Sweep,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => server::run_server(config).await?,
        Command::Sweep => {
            let store = SessionStore::open(&config.database_path)?;
            let deleted = sweeper::sweep_once(&store, config.retention.threshold())?;
            info!(
                deleted,
                threshold_days = config.retention.threshold_days,
                "sweep complete"
            );
        }
    }

    Ok(())
}
