//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::RunArgs;
use anyhow::Context;
use catset_core::config::{CatsetConfig, DatabaseConfig, SplitConfig};
use catset_core::pipeline::DatasetPipeline;
use catset_core::store::SqliteCategoryStore;
use catset_core::trigger::{QueueEvent, QueueHandler};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    config: CatsetConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => handle_run(args, &config).await,
        Commands::Queue { input, lines } => handle_queue(&input, lines, &config).await,
        Commands::Init => handle_init(&config.database),
        Commands::Config { action } => handle_config(action, &config, workspace),
    }
}

fn open_store(database: &DatabaseConfig) -> anyhow::Result<SqliteCategoryStore> {
    tracing::info!(path = %database.path.display(), "Connecting to database");
    let store = SqliteCategoryStore::open(
        &database.path,
        Duration::from_secs(database.busy_timeout_secs),
    )
    .with_context(|| format!("failed to open database {}", database.path.display()))?;
    tracing::info!("Connected to database");
    Ok(store)
}

/// Layer command-line overrides on top of the configured split.
fn apply_run_args(mut split: SplitConfig, args: RunArgs) -> SplitConfig {
    if let Some(version) = args.dataset_version {
        split.version = version;
    }
    if args.no_shuffle {
        split.shuffle = false;
    }
    if args.seed.is_some() {
        split.seed = args.seed;
    }
    if let Some(train) = args.train {
        split.train_ratio = train;
    }
    if let Some(validate) = args.validate {
        split.validate_ratio = validate;
    }
    if let Some(test) = args.test {
        split.test_ratio = test;
    }
    split
}

async fn handle_run(args: RunArgs, config: &CatsetConfig) -> anyhow::Result<()> {
    let split = apply_run_args(config.dataset.clone(), args);
    let store = Arc::new(open_store(&config.database)?);

    let summary = DatasetPipeline::new(store, split)
        .generate_dataset()
        .await
        .context("failed to generate dataset")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn read_input(input: &Path) -> anyhow::Result<String> {
    if input == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))
    }
}

async fn handle_queue(input: &Path, lines: bool, config: &CatsetConfig) -> anyhow::Result<()> {
    let text = read_input(input)?;
    let event = if lines {
        QueueEvent::from_json_lines(&text)
    } else {
        QueueEvent::from_json(&text).context("failed to decode queue event")?
    };
    if event.is_empty() {
        tracing::warn!("Queue event has no messages");
        return Ok(());
    }

    let store = Arc::new(open_store(&config.database)?);
    let summaries = QueueHandler::new(store)
        .handle_event(&event)
        .await
        .context("failed to process queue event")?;

    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}

fn handle_init(database: &DatabaseConfig) -> anyhow::Result<()> {
    let store = open_store(database)?;
    println!("Initialized dataset tables in {}", store.location());
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    config: &CatsetConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".catset");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&CatsetConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
    }
}
