use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_sync::{
    config::Config,
    data_mapping::service::mapping_from_entries,
    generator::FeedGenerator,
    models::MappingEntry,
    scheduler::SchedulerService,
    sources::{JsonFileSource, ProductSource},
};

#[derive(Parser)]
#[command(name = "feed-sync")]
#[command(version)]
#[command(about = "Incremental, resumable product feed generator")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "feed-sync.toml")]
    config: String,

    /// Product catalog file (overrides config file)
    #[arg(short, long, value_name = "FILE")]
    products: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Advance the feed pass once
    Generate,
    /// Print generation state and the public feed URL
    Status,
    /// List the field patterns of the first catalog product
    Fields,
    /// Show or replace the column mapping
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },
    /// Trigger generation on the configured cron schedule
    Watch,
}

#[derive(Subcommand)]
enum MappingAction {
    Show,
    /// Replace the mapping with COLUMN=PATTERN entries
    Set {
        #[arg(required = true, value_name = "COLUMN=PATTERN")]
        entries: Vec<String>,
    },
}

fn parse_entry(entry: &str) -> Result<MappingEntry> {
    let (column, pattern) = entry
        .split_once('=')
        .with_context(|| format!("mapping entry '{}' is not COLUMN=PATTERN", entry))?;
    Ok(MappingEntry::new(column.trim(), pattern.trim()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("feed_sync={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(products) = cli.products {
        config.source.products_file = products.into();
    }

    let source: Arc<dyn ProductSource> = Arc::new(JsonFileSource::from_config(&config.source));
    let generator = Arc::new(FeedGenerator::new(&config, source));

    match cli.command {
        Command::Generate => {
            let outcome = generator.trigger_generation().await?;
            print_json(&outcome)?;
        }
        Command::Status => {
            print_json(&generator.status().await?)?;
        }
        Command::Fields => {
            let patterns = generator
                .sample_product()
                .await?
                .map(|sample| sample.field_patterns())
                .unwrap_or_else(BTreeSet::new);
            for pattern in patterns {
                println!("{}", pattern);
            }
        }
        Command::Mapping { action } => match action {
            MappingAction::Show => {
                let mapping = generator.mappings().load().await?;
                for entry in mapping.entries() {
                    println!("{}={}", entry.column, entry.pattern);
                }
            }
            MappingAction::Set { entries } => {
                let entries = entries
                    .iter()
                    .map(|entry| parse_entry(entry))
                    .collect::<Result<Vec<_>>>()?;
                let mapping = mapping_from_entries(entries)?;
                let validation = generator.update_mapping(&mapping).await?;
                print_json(&validation)?;
            }
        },
        Command::Watch => {
            info!("Starting feed-sync v{} in watch mode", env!("CARGO_PKG_VERSION"));
            let scheduler = SchedulerService::new(generator, &config.schedule.cron)?;
            scheduler
                .start(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
    }

    Ok(())
}
