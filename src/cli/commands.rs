//! CLI commands implementation.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::config::{load_settings, Settings};
use crate::extraction::ExtractionClient;
use crate::models::{AnalysisStatus, Platform};
use crate::platforms::ScrapeProviderClient;
use crate::repository::UsageRepository;
use crate::scoring::ScoringService;
use crate::server;
use crate::services::{
    BatchOrchestrator, ExtractionWorker, IngestOutcome, IngestionService, NotificationMeta,
    OrchestratorEvent, ScrapeNotification,
};

#[derive(Parser)]
#[command(name = "palate")]
#[command(about = "Restaurant review intelligence and sentiment benchmarking pipeline")]
#[command(version)]
pub struct Cli {
    /// Data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Run the webhook and API server
    Serve,

    /// Manually replay a scrape-completion notification
    Ingest {
        /// Provider run id
        #[arg(long)]
        run_id: String,
        /// Dataset handle to fetch items from
        #[arg(long)]
        dataset: String,
        /// Restaurant id the reviews belong to
        #[arg(long)]
        restaurant: String,
        /// Source platform (google, opentable, tripadvisor)
        #[arg(long)]
        platform: String,
        /// Tenant id for the notification metadata
        #[arg(long, default_value = "default")]
        tenant: String,
    },

    /// Claim and process one batch of pending reviews
    Process {
        /// Batch size to claim
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Run the batch orchestrator until the pending pool drains
    Run,

    /// Reset failed reviews back to pending
    Retry {
        /// Only reviews of this restaurant
        #[arg(long)]
        restaurant: Option<String>,
    },

    /// Release reviews stuck in processing back to pending
    Sweep,

    /// Show pipeline status
    Status,

    /// Print a Flavor Index scorecard for a restaurant and period
    Snapshot {
        /// Restaurant id
        restaurant: String,
        /// Period start (YYYY-MM-DD, inclusive)
        #[arg(long)]
        start: NaiveDate,
        /// Period end (YYYY-MM-DD, inclusive)
        #[arg(long)]
        end: NaiveDate,
    },

    /// Rank a set of restaurants by Flavor Index over a period
    Compare {
        /// Restaurant ids
        restaurants: Vec<String>,
        /// Period start (YYYY-MM-DD, inclusive)
        #[arg(long)]
        start: NaiveDate,
        /// Period end (YYYY-MM-DD, inclusive)
        #[arg(long)]
        end: NaiveDate,
    },
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Init => init(&settings).await,
        Commands::Serve => serve(&settings).await,
        Commands::Ingest {
            run_id,
            dataset,
            restaurant,
            platform,
            tenant,
        } => ingest(&settings, run_id, dataset, restaurant, platform, tenant).await,
        Commands::Process { limit } => process(&settings, limit).await,
        Commands::Run => orchestrate(&settings).await,
        Commands::Retry { restaurant } => retry(&settings, restaurant.as_deref()).await,
        Commands::Sweep => sweep(&settings).await,
        Commands::Status => status(&settings).await,
        Commands::Snapshot {
            restaurant,
            start,
            end,
        } => snapshot(&settings, &restaurant, start, end).await,
        Commands::Compare {
            restaurants,
            start,
            end,
        } => compare(&settings, restaurants, start, end).await,
    }
}

/// Open the database, creating the schema if needed.
async fn open_db(settings: &Settings) -> anyhow::Result<crate::repository::DbContext> {
    let ctx = settings.db_context();
    ctx.init_schema().await?;
    Ok(ctx)
}

async fn init(settings: &Settings) -> anyhow::Result<()> {
    std::fs::create_dir_all(&settings.data_dir)?;
    open_db(settings).await?;
    println!(
        "{} database at {}",
        style("Initialized").green().bold(),
        settings.database_url()
    );
    Ok(())
}

async fn serve(settings: &Settings) -> anyhow::Result<()> {
    settings.db_context().init_schema().await?;
    if settings.webhook_secret.is_none() {
        eprintln!(
            "{} no webhook secret configured; ingestion webhooks will be rejected",
            style("warning:").yellow().bold()
        );
    }
    server::run_server(settings).await
}

async fn ingest(
    settings: &Settings,
    run_id: String,
    dataset: String,
    restaurant: String,
    platform: String,
    tenant: String,
) -> anyhow::Result<()> {
    let platform = Platform::from_str(&platform)
        .ok_or_else(|| anyhow::anyhow!("unknown platform '{}'", platform))?;

    let ctx = open_db(settings).await?;
    let provider = Arc::new(ScrapeProviderClient::new(settings.provider.clone())?);
    let service = IngestionService::new(ctx.reviews(), ctx.scrape_runs(), provider);

    let notification = ScrapeNotification {
        event: "manual-replay".to_string(),
        run_id,
        dataset_handle: dataset,
        status: "SUCCEEDED".to_string(),
        meta: NotificationMeta {
            restaurant_id: restaurant,
            platform,
            tenant_id: tenant,
        },
    };

    match service.ingest(&notification).await? {
        IngestOutcome::Completed(counts) => {
            println!(
                "{} inserted {}, updated {}, duplicate {}, errors {}",
                style("Ingested:").green().bold(),
                counts.inserted,
                counts.updated,
                counts.duplicate,
                counts.errors
            );
        }
        IngestOutcome::Skipped { reason } => {
            println!("{} {}", style("Skipped:").yellow().bold(), reason);
        }
    }
    Ok(())
}

async fn build_worker(
    settings: &Settings,
) -> anyhow::Result<(Arc<ExtractionWorker>, crate::repository::DbContext)> {
    let ctx = open_db(settings).await?;
    let extractor = Arc::new(ExtractionClient::new(settings.extractor.clone())?);
    let worker = Arc::new(ExtractionWorker::new(ctx.reviews(), ctx.usage(), extractor));
    Ok((worker, ctx))
}

async fn process(settings: &Settings, limit: usize) -> anyhow::Result<()> {
    let (worker, _ctx) = build_worker(settings).await?;
    let outcome = worker.claim_and_process(limit, None).await?;
    println!(
        "{} {} claimed, {} completed, {} failed",
        style("Processed:").green().bold(),
        outcome.total,
        outcome.succeeded,
        outcome.failed
    );
    for result in outcome.results.iter().filter(|r| r.error.is_some()) {
        println!(
            "  {} {}: {}",
            style("failed").red(),
            result.review_id,
            result.error.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn orchestrate(settings: &Settings) -> anyhow::Result<()> {
    let (worker, ctx) = build_worker(settings).await?;
    let reviews = ctx.reviews();
    let pending = reviews.pending_count().await?;
    if pending == 0 {
        println!("{}", style("Nothing pending.").dim());
        return Ok(());
    }

    let pb = ProgressBar::new(pending);
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let orchestrator =
        BatchOrchestrator::new(worker, reviews, settings.pipeline.clone());
    let (tx, mut rx) = mpsc::channel(64);
    let handle = tokio::spawn(async move { orchestrator.run(Some(tx)).await });

    while let Some(event) = rx.recv().await {
        match event {
            OrchestratorEvent::RoundFinished {
                round,
                succeeded,
                failed,
                ..
            } => {
                pb.inc((succeeded + failed) as u64);
                pb.set_message(format!("round {}", round));
            }
            OrchestratorEvent::SweepReleased { count } => {
                pb.set_message(format!("released {} stuck", count));
            }
            OrchestratorEvent::BreakerTripped { consecutive } => {
                pb.set_message(format!("breaker tripped after {} bad rounds", consecutive));
            }
            _ => {}
        }
    }

    let summary = handle.await??;
    pb.finish_and_clear();

    if summary.halted_by_breaker {
        println!(
            "{} halted by circuit breaker after {} rounds ({} completed, {} failed). \
             The extraction service appears to be down; fix it and re-run.",
            style("Stopped:").red().bold(),
            summary.rounds,
            summary.succeeded,
            summary.failed
        );
    } else {
        println!(
            "{} {} rounds, {} completed, {} failed",
            style("Done:").green().bold(),
            summary.rounds,
            summary.succeeded,
            summary.failed
        );
    }
    Ok(())
}

async fn retry(settings: &Settings, restaurant: Option<&str>) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let reset = ctx.reviews().reset_to_pending(restaurant).await?;
    println!(
        "{} {} reviews back to pending",
        style("Reset").green().bold(),
        reset
    );
    Ok(())
}

async fn sweep(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let released = ctx
        .reviews()
        .release_stuck(settings.pipeline.stuck_after())
        .await?;
    println!(
        "{} {} stuck reviews",
        style("Released").green().bold(),
        released
    );
    Ok(())
}

async fn status(settings: &Settings) -> anyhow::Result<()> {
    let ctx = open_db(settings).await?;
    let counts = ctx.reviews().status_counts().await?;
    let month = UsageRepository::current_month();
    let calls = ctx.usage().calls_for_month(&month).await?;

    println!("{}", style("Pipeline status").bold());
    for status in [
        AnalysisStatus::Pending,
        AnalysisStatus::Processing,
        AnalysisStatus::Completed,
        AnalysisStatus::Failed,
    ] {
        let count = counts.get(&status).copied().unwrap_or(0);
        let label = format!("{:>12}", status.as_str());
        let label = match status {
            AnalysisStatus::Failed if count > 0 => style(label).red(),
            AnalysisStatus::Pending if count > 0 => style(label).yellow(),
            _ => style(label).dim(),
        };
        println!("{}  {}", label, count);
    }
    println!("{:>12}  {} calls in {}", style("ai usage").dim(), calls, month);
    Ok(())
}

async fn snapshot(
    settings: &Settings,
    restaurant: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<()> {
    anyhow::ensure!(start <= end, "period end before start");
    let ctx = open_db(settings).await?;
    let scoring = ScoringService::new(ctx.reviews(), ctx.analyses());
    let snap = scoring.compute_snapshot(restaurant, start, end).await?;

    println!(
        "{} {} [{} - {}]",
        style("Flavor Index for").bold(),
        restaurant,
        start,
        end
    );
    let delta = match snap.delta {
        Some(delta) if delta >= 0.0 => format!(" ({})", style(format!("+{:.2}", delta)).green()),
        Some(delta) => format!(" ({})", style(format!("{:.2}", delta)).red()),
        None => String::new(),
    };
    println!(
        "  score {} {}{}",
        style(format!("{:.2}", snap.score)).bold(),
        style(snap.zone.as_str()).cyan(),
        delta
    );
    println!(
        "  {} reviews, avg rating {:.2}, stars 1-5: {:?}",
        snap.total_reviews, snap.avg_rating, snap.star_distribution
    );

    for stat in &snap.category_stats {
        let mean = stat
            .mean_sentiment
            .map(|m| format!("{:+.2}", m))
            .unwrap_or_else(|| "  --".to_string());
        println!(
            "  {:>8}: {}  ({} mentions, {:.0}% of volume)",
            stat.category, mean, stat.mentions, stat.share_percent
        );
    }

    if !snap.staff_leaderboard.is_empty() {
        println!("  {}", style("Staff").bold());
        for entry in snap.staff_leaderboard.iter().take(5) {
            println!(
                "    {} ({}) - {} mentions, {:.0}% positive",
                entry.name,
                entry.role.as_deref().unwrap_or("?"),
                entry.mentions,
                entry.positive_percent
            );
        }
    }

    if !snap.item_mentions.is_empty() {
        println!("  {}", style("Items").bold());
        for entry in snap.item_mentions.iter().take(5) {
            println!(
                "    {} - {} mentions, {:.0}% positive, intensity {:.1}",
                entry.name, entry.mentions, entry.positive_percent, entry.avg_intensity
            );
        }
    }
    Ok(())
}

async fn compare(
    settings: &Settings,
    restaurants: Vec<String>,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<()> {
    anyhow::ensure!(!restaurants.is_empty(), "no restaurants given");
    anyhow::ensure!(start <= end, "period end before start");

    let ctx = open_db(settings).await?;
    let scoring = ScoringService::new(ctx.reviews(), ctx.analyses());
    let mut ranked = scoring
        .competitor_snapshots(&restaurants, start, end)
        .await?;
    ranked.sort_by_key(|r| r.rank);

    println!(
        "{} [{} - {}]",
        style("Flavor Index ranking").bold(),
        start,
        end
    );
    for entry in &ranked {
        println!(
            "  #{:<2} {}  {:.2} ({}) over {} reviews",
            entry.rank,
            entry.snapshot.restaurant_id,
            entry.snapshot.score,
            entry.snapshot.zone,
            entry.snapshot.total_reviews
        );
    }
    Ok(())
}
