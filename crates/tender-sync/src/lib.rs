//! Scrape orchestration, archive ingestion and on-demand tender analysis.

mod analysis;
mod config;
mod controller;
mod ingest;
mod platform;
mod scheduler;

use tender_core::TenderStatus;
use tender_extract::ExtractError;
use tender_portal::PortalError;
use tender_storage::RepositoryError;
use thiserror::Error;
use uuid::Uuid;

pub use analysis::AnalysisService;
pub use config::AppConfig;
pub use controller::{ScrapeRequest, ScraperController};
pub use ingest::{IngestOutcome, IngestService, PORTAL_ID};
pub use platform::Platform;
pub use scheduler::maybe_build_scheduler;

pub const CRATE_NAME: &str = "tender-sync";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Tender not found")]
    TenderNotFound(Uuid),
    #[error("Tender is still {0}; wait for listing to finish")]
    NotReady(TenderStatus),
    #[error("No documents available for analysis")]
    NoDocuments,
    #[error("Question must not be empty")]
    EmptyQuestion,
    #[error("Deep analysis failed: {0}")]
    AnalysisFailed(String),
    #[error("AI query failed: {0}")]
    AskFailed(String),
    #[error("Scraper is already running")]
    AlreadyRunning,
    #[error("invalid date `{0}`, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("end date {end} is before start date {start}")]
    InvalidRange { start: String, end: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Portal(#[from] PortalError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
pub(crate) mod testing;
