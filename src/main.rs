use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod aggregate;
mod chat_log;
mod classify;
mod clean;
mod config;
mod db;
mod duration;
mod error;
mod ingest;
mod logging;
mod merge;
mod models;
mod parser;
mod store;

use aggregate::{DailyTotals, TeamSummary};
use config::AppConfig;
use ingest::{FileOutcome, UploadSummary};
use models::{AgentRecord, RecordFilter};
use store::{MemoryStore, ReportStore};

#[derive(Parser)]
#[command(name = "agent-ingest")]
#[command(about = "Call-center agent report ingestion and range summaries", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults to ./agent-ingest.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Parse, merge and store exported report and chat log files
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Merge in memory and print the result without touching the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Aggregate stored records per agent over a date range or batch
    Summary {
        #[arg(long, requires = "to", conflicts_with = "batch")]
        from: Option<NaiveDate>,
        #[arg(long, requires = "from", conflicts_with = "batch")]
        to: Option<NaiveDate>,
        #[arg(long)]
        batch: Option<Uuid>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Also show per-date totals in ascending date order
        #[arg(long)]
        by_day: bool,
        #[arg(long)]
        json: bool,
    },
    /// List stored batches, newest first
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Serialize)]
struct SummaryOutput<'a> {
    team: &'a TeamSummary,
    agents: &'a [AgentRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    days: Option<&'a [DailyTotals]>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    logging::init_logging(&config.logging);

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Ingest { files, dry_run } => {
            if dry_run {
                let store = MemoryStore::new();
                let summary = ingest::ingest_paths(&store, &files, &config.ingest).await;
                print_upload(&summary);
                let records = store.fetch_records(&RecordFilter::default()).await?;
                for stored in &records {
                    print_record(&stored.record);
                }
                if !summary.loaded_anything() {
                    bail!("no data could be loaded from {} file(s)", summary.total_files);
                }
            } else {
                let pool = connect(&config).await?;
                let store = db::PgStore::new(pool, config.ingest.chat_log_batch_size);
                let summary = ingest::ingest_paths(&store, &files, &config.ingest).await;
                print_upload(&summary);
                if !summary.loaded_anything() {
                    bail!("no data could be loaded from {} file(s)", summary.total_files);
                }
            }
        }
        Commands::Summary {
            from,
            to,
            batch,
            limit,
            by_day,
            json,
        } => {
            let pool = connect(&config).await?;
            let store = db::PgStore::new(pool, config.ingest.chat_log_batch_size);

            let filter = match (from.zip(to), batch) {
                (Some(range), _) => RecordFilter {
                    date_range: Some(range),
                    batch_id: None,
                },
                (None, Some(batch_id)) => RecordFilter {
                    date_range: None,
                    batch_id: Some(batch_id),
                },
                (None, None) => match store.fetch_latest_batch().await? {
                    Some(batch_id) => RecordFilter {
                        date_range: None,
                        batch_id: Some(batch_id),
                    },
                    None => {
                        println!("No reports stored yet.");
                        return Ok(());
                    }
                },
            };
            if let Some((start, end)) = filter.date_range {
                if start > end {
                    bail!("--from {start} is after --to {end}");
                }
            }

            let policy = config.ingest.name_policy;
            let stored = store.fetch_records(&filter).await?;
            let unique: Vec<AgentRecord> = aggregate::dedupe_latest(stored, policy)
                .into_iter()
                .map(|stored| stored.record)
                .collect();
            let visible = aggregate::retain_visible(unique, &config.display.hidden_agents);
            let agents = aggregate::aggregate_by_agent(&visible, policy);
            let team = aggregate::team_summary(&agents);
            let shown = &agents[..agents.len().min(limit)];
            let days = if by_day {
                aggregate::daily_trend(&visible)
            } else {
                Vec::new()
            };

            if json {
                let output = SummaryOutput {
                    team: &team,
                    agents: shown,
                    days: by_day.then_some(days.as_slice()),
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
                return Ok(());
            }

            if agents.is_empty() {
                println!("No agent records found for this selection.");
                return Ok(());
            }
            println!(
                "{} agents, {} chats, avg chat time {}, avg score {:.2} from {} ratings",
                team.agents,
                team.chats,
                duration::format_seconds(team.avg_chat_seconds),
                team.avg_score,
                team.rating_times
            );
            println!("Top agents by chat volume:");
            for agent in shown {
                print_record(agent);
            }
            if by_day {
                println!("By day:");
                for day in &days {
                    print_day(day);
                }
            }
        }
        Commands::History { limit } => {
            let pool = connect(&config).await?;
            let store = db::PgStore::new(pool, config.ingest.chat_log_batch_size);
            let batches = store.fetch_batches().await?;
            if batches.is_empty() {
                println!("No reports stored yet.");
                return Ok(());
            }
            for batch in batches.iter().take(limit) {
                println!("- {} on {} ({} agents)", batch.batch_id, batch.date, batch.agents);
            }
        }
    }

    Ok(())
}

async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(config.database_url()?)
        .await
        .context("failed to connect to Postgres")
}

fn print_upload(summary: &UploadSummary) {
    println!(
        "{} report group(s) and {} chat log row(s) loaded from {} file(s).",
        summary.succeeded_groups, summary.chat_log_rows, summary.total_files
    );
    if summary.failed_groups > 0 {
        println!("{} report group(s) could not be stored.", summary.failed_groups);
    }
    for file in &summary.files {
        match &file.outcome {
            FileOutcome::Report { kind, date } => {
                println!("- {}: {} report for {}", file.name, kind, date)
            }
            FileOutcome::ChatLog { rows } => println!("- {}: {} chat log rows", file.name, rows),
            FileOutcome::Skipped { reason } => println!("- {}: skipped ({})", file.name, reason),
        }
    }
    for diagnostic in &summary.diagnostics {
        println!("! {diagnostic}");
    }
}

fn print_record(record: &AgentRecord) {
    println!(
        "- {} [{}] {} chats, avg {}, total {}, score {:.2} from {} ratings",
        record.agent_name,
        record.date,
        record.chats,
        record.avg_chat_time(),
        record.total_chat_time(),
        record.avg_score,
        record.rating_times
    );
}

fn print_day(day: &DailyTotals) {
    println!(
        "- {}: {} agents, {} chats, avg {}, score {:.2} from {} ratings",
        day.date,
        day.agents,
        day.chats,
        duration::format_seconds(day.avg_chat_seconds),
        day.avg_score,
        day.rating_times
    );
}
