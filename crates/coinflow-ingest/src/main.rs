//! Coinflow Ingest - market data ETL trigger and inspection tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coinflow_common::logging::{init_logging, LogConfig, LogLevel};
use coinflow_ingest::checkpoint::CheckpointStore;
use coinflow_ingest::config::IngestConfig;
use coinflow_ingest::queries::{self, RecordQuery};
use coinflow_ingest::{db, EtlPipeline, SourceKind};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "coinflow-ingest")]
#[command(author, version, about = "Cryptocurrency market data ETL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ETL pipeline
    Run {
        /// Only ingest these sources (repeatable); defaults to all
        #[arg(short, long = "source")]
        sources: Vec<SourceKind>,
    },

    /// Print pipeline statistics
    Stats {
        /// Print the condensed summary instead
        #[arg(long)]
        summary: bool,
    },

    /// List loaded records
    Records {
        #[arg(long)]
        source: Option<String>,

        #[arg(long)]
        crypto_id: Option<String>,

        #[arg(long)]
        limit: Option<i64>,

        #[arg(long)]
        offset: Option<i64>,

        /// created_at, price_usd, market_cap_usd, volume_24h_usd, change_24h_percent or crypto_id
        #[arg(long)]
        sort_by: Option<String>,

        /// asc or desc
        #[arg(long)]
        order: Option<String>,
    },

    /// Show the most recent record for one cryptocurrency
    Latest {
        crypto_id: String,

        #[arg(long)]
        source: Option<String>,
    },

    /// List per-source checkpoints
    Checkpoints,

    /// Check database connectivity and the last run
    Health,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("coinflow-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _log_guard = init_logging(&log_config)?;

    let config = IngestConfig::load().context("Failed to load configuration")?;
    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    match cli.command {
        Command::Run { sources } => {
            let mut pipeline = EtlPipeline::new(pool, &config.sources)?;
            let selected = (!sources.is_empty()).then_some(sources.as_slice());

            info!("Starting ETL run");
            let ok = pipeline.run(selected).await;
            print_json(pipeline.last_stats())?;

            if !ok {
                anyhow::bail!("ETL run failed; see etl_runs for details");
            }
            info!("ETL run complete");
        },
        Command::Stats { summary } => {
            if summary {
                print_json(&queries::summary(&pool).await?)?;
            } else {
                print_json(&queries::pipeline_stats(&pool).await?)?;
            }
        },
        Command::Records {
            source,
            crypto_id,
            limit,
            offset,
            sort_by,
            order,
        } => {
            let query = RecordQuery {
                source,
                crypto_id,
                sort_by,
                order,
                limit,
                offset,
            };
            print_json(&queries::list_records(&pool, &query).await?)?;
        },
        Command::Latest { crypto_id, source } => {
            print_json(&queries::latest_record(&pool, &crypto_id, source.as_deref()).await?)?;
        },
        Command::Checkpoints => {
            print_json(&CheckpointStore::list(&pool).await?)?;
        },
        Command::Health => {
            let report = queries::health(&pool).await;
            print_json(&report)?;
            if !report.is_healthy() {
                anyhow::bail!("Database is unhealthy");
            }
        },
    }

    Ok(())
}
