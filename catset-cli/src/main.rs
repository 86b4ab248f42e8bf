//! catset CLI. Generates category datasets locally or from queued messages.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// catset: category tree + matched records → train/validate/test dataset
#[derive(Parser, Debug)]
#[command(name = "catset", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (looked up for .catset/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides configuration)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Log JSON lines to stderr
    #[arg(long)]
    json: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Generate one dataset version with the configured split
    Run(RunArgs),
    /// Process a batch of queued messages, one dataset version per message
    Queue {
        /// Event file in {"Records":[{"messageId","body"}]} form, or `-` for stdin
        input: PathBuf,
        /// Read one JSON split payload per line instead of an event
        #[arg(long)]
        lines: bool,
    },
    /// Create the category and dataset tables in the database
    Init,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Dataset version to (re)generate
    #[arg(short = 'd', long)]
    dataset_version: Option<String>,
    /// Keep the stored record order
    #[arg(long)]
    no_shuffle: bool,
    /// Shuffle seed, for replayable runs
    #[arg(long)]
    seed: Option<u64>,
    /// Train percentage
    #[arg(long)]
    train: Option<u8>,
    /// Validate percentage
    #[arg(long)]
    validate: Option<u8>,
    /// Test percentage
    #[arg(long)]
    test: Option<u8>,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default .catset/config.toml into the workspace
    Init,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = catset_core::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(database) = &cli.database {
        config.database.path = database.clone();
    }
    if cli.json {
        config.logging.json = true;
    }

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let stderr_layer = if config.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter())
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(env_filter())
            .boxed()
    };

    // Optional JSON file layer, rolled daily
    let (file_layer, _guard) = match &config.logging.log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;
            let file_appender = tracing_appender::rolling::daily(log_dir, "catset.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    commands::handle_command(cli.command, config, &workspace).await
}
