//! Procurement portal access: search for published tenders and download
//! their document archives.

mod config;
pub mod html;
mod marchespublics;

use async_trait::async_trait;
use chrono::NaiveDate;
use tender_storage::FetchError;
use thiserror::Error;

pub use config::PortalConfig;
pub use marchespublics::{
    identity_request, page_size_request, portal_date, search_request, MarchesPublicsPortal,
};

pub const CRATE_NAME: &str = "tender-portal";

#[derive(Debug, Error)]
pub enum PortalError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("element `{0}` not found on page")]
    MissingElement(String),
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("invalid selector {0}")]
    Selector(String),
    #[error("download from {url} is not a zip archive ({bytes} bytes)")]
    NotAnArchive { url: String, bytes: usize },
    #[error(transparent)]
    Setup(#[from] anyhow::Error),
}

/// One tender's document archive, held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArchive {
    pub url: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait TenderPortal: Send + Sync {
    /// Detail-page URLs of tenders published between `start` and `end`
    /// inclusive.
    async fn collect_tender_links(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<String>, PortalError>;

    async fn download_archive(&self, url: &str) -> Result<DownloadedArchive, PortalError>;
}
