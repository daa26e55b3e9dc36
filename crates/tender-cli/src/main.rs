use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tender_storage::PgTenderRepository;
use tender_sync::{maybe_build_scheduler, AppConfig, Platform, ScrapeRequest};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "tender-cli")]
#[command(about = "Moroccan public tender scraping and analysis platform")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Tender API (plus the daily scrape when TENDER_SCHEDULER_ENABLED is set).
    Serve,
    /// OCR service for scanned PDFs.
    OcrServe,
    /// One scrape in the foreground; defaults to yesterday.
    Scrape {
        /// YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
        /// YYYY-MM-DD, defaults to --date
        #[arg(long)]
        end_date: Option<String>,
    },
    /// Deep analysis of one listed tender.
    Analyze { id: Uuid },
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = AppConfig::from_env();
            let platform = Platform::from_config(config).await?;
            let scheduler =
                maybe_build_scheduler(&platform.config, platform.controller.clone()).await?;
            if let Some(sched) = &scheduler {
                sched.start().await.context("starting scheduler")?;
            }
            tender_web::serve(&platform).await?;
        }
        Commands::OcrServe => {
            tender_ocr::serve(tender_ocr::OcrServiceConfig::from_env()).await?;
        }
        Commands::Scrape { date, end_date } => {
            let platform = Platform::from_config(AppConfig::from_env()).await?;
            let job = platform
                .controller
                .run_now(ScrapeRequest {
                    target_date: date,
                    end_date,
                })
                .await?;
            println!(
                "scrape {}: job_id={} dates={}..{} found={} downloaded={} failed={} extracted={} elapsed={:.1}s",
                job.status.as_str(),
                job.id,
                job.target_date,
                job.end_date,
                job.total_found,
                job.downloaded,
                job.failed,
                job.extracted,
                job.elapsed_seconds
            );
        }
        Commands::Analyze { id } => {
            let platform = Platform::from_config(AppConfig::from_env()).await?;
            let tender = platform.analysis.analyze(id).await?;
            println!("{}", serde_json::to_string_pretty(&tender)?);
        }
        Commands::Migrate => {
            let url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
            let repository = PgTenderRepository::connect(&url)
                .await
                .context("connecting to postgres")?;
            repository.migrate().await.context("running migrations")?;
            info!("migrations applied");
        }
    }

    Ok(())
}
