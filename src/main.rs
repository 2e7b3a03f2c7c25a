use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod builder;
mod config;
mod db;
mod models;
mod percentile;
mod ranking;
mod report;
mod store;

use crate::builder::ReferenceBuilder;
use crate::config::DbConfig;
use crate::db::PgRangeStore;
use crate::models::{AthleteInput, PercentileRange};
use crate::ranking::ComparisonEngine;
use crate::store::{MemoryStore, RangeStore};

#[derive(Parser)]
#[command(name = "athlete-benchmarks")]
#[command(about = "Rank athlete force-plate results against professional benchmarks", long_about = None)]
struct Cli {
    #[command(flatten)]
    db: DbConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a professional sample set
    Seed,
    /// Import professional samples from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Recompute percentile ranges from stored professional samples
    BuildRanges {
        #[arg(long)]
        test_type: Option<String>,
    },
    /// List stored percentile ranges or export them as JSON
    Ranges {
        #[arg(long)]
        test_type: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Rank a single metric value
    Rank {
        #[arg(long)]
        test_type: String,
        #[arg(long)]
        metric: String,
        #[arg(long)]
        value: f64,
        /// Exported range file to use instead of the database
        #[arg(long)]
        ranges: Option<PathBuf>,
    },
    /// Compare an athlete's tests and write a report
    Compare {
        #[arg(long)]
        input: PathBuf,
        /// Exported range file to use instead of the database
        #[arg(long)]
        ranges: Option<PathBuf>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Write the profile as JSON instead of markdown
        #[arg(long)]
        json: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_range_file(path: &Path) -> anyhow::Result<MemoryStore> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let ranges: Vec<PercentileRange> = serde_json::from_str(&contents)
        .with_context(|| format!("invalid range file {}", path.display()))?;
    Ok(MemoryStore::from_ranges(ranges))
}

async fn open_store(db: &DbConfig, ranges: Option<&Path>) -> anyhow::Result<Box<dyn RangeStore>> {
    match ranges {
        Some(path) => Ok(Box::new(load_range_file(path)?)),
        None => Ok(Box::new(PgRangeStore::new(db.connect().await?))),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = cli.db.connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = cli.db.connect().await?;
            let inserted = db::seed(&pool).await?;
            println!("Seed data inserted ({inserted} new samples).");
        }
        Commands::Import { csv } => {
            let pool = cli.db.connect().await?;
            let summary = db::import_csv(&pool, &csv).await?;
            println!(
                "Inserted {} samples from {} ({} duplicates, {} rejected).",
                summary.inserted,
                csv.display(),
                summary.duplicates,
                summary.rejected
            );
        }
        Commands::BuildRanges { test_type } => {
            let pool = cli.db.connect().await?;
            let samples = db::fetch_samples(&pool, test_type.as_deref()).await?;
            if samples.is_empty() {
                println!("No professional samples found.");
                return Ok(());
            }

            let store = PgRangeStore::new(pool);
            let summary = ReferenceBuilder::new(&store).build(&samples).await;
            println!(
                "Ranges built: {} succeeded, {} failed, {} skipped.",
                summary.succeeded, summary.failed, summary.skipped
            );
        }
        Commands::Ranges { test_type, out } => {
            let pool = cli.db.connect().await?;
            let ranges = PgRangeStore::new(pool)
                .list_ranges(test_type.as_deref())
                .await?;

            if let Some(path) = out {
                std::fs::write(&path, serde_json::to_string_pretty(&ranges)?)?;
                println!("Exported {} ranges to {}.", ranges.len(), path.display());
            } else if ranges.is_empty() {
                println!("No ranges stored.");
            } else {
                for range in &ranges {
                    println!(
                        "- {}/{}: p25 {:.2}, p50 {:.2}, p75 {:.2} (min {:.2}, max {:.2}, n={})",
                        range.test_type,
                        range.metric_name,
                        range.p25,
                        range.p50,
                        range.p75,
                        range.min,
                        range.max,
                        range.sample_size
                    );
                }
            }
        }
        Commands::Rank {
            test_type,
            metric,
            value,
            ranges,
        } => {
            let store = open_store(&cli.db, ranges.as_deref()).await?;
            let range = match store.get_range(&test_type, &metric).await {
                Ok(range) => range,
                Err(err) => {
                    warn!(%test_type, %metric, error = %err, "range lookup failed");
                    None
                }
            };
            let ranking = ranking::rank(&metric, Some(value), range.as_ref());
            match ranking.percentile {
                Some(p) => println!("{metric}: {value} -> percentile {p:.0} ({})", ranking.label),
                None => println!("{metric}: {value} -> {}", ranking.label),
            }
        }
        Commands::Compare {
            input,
            ranges,
            out,
            json,
        } => {
            let contents = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let athlete: AthleteInput = serde_json::from_str(&contents)
                .with_context(|| format!("invalid athlete input {}", input.display()))?;

            let store = open_store(&cli.db, ranges.as_deref()).await?;
            let profile = ComparisonEngine::new(store.as_ref())
                .compare_profile(&athlete.tests)
                .await;

            let rendered = if json {
                serde_json::to_string_pretty(&profile)?
            } else {
                report::build_report(
                    &athlete.athlete,
                    chrono::Utc::now().date_naive(),
                    &profile,
                )
            };
            std::fs::write(&out, rendered)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
