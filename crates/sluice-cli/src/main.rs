mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sluice",
    version,
    about = "Replicate warehouse query results into an operational PostgreSQL store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a replication plan
    Run {
        /// Path to plan YAML file
        plan: PathBuf,
        /// Emit the full run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Validate plan configuration and connectivity
    Check {
        /// Path to plan YAML file
        plan: PathBuf,
    },
}

/// `RUST_LOG` wins when set; otherwise the `--log-level` flag applies
/// to sluice with the postgres driver's chatter capped at warn.
fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},tokio_postgres=warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    match cli.command {
        Commands::Run { plan, json } => commands::run::execute(&plan, json).await,
        Commands::Check { plan } => commands::check::execute(&plan).await,
    }
}
