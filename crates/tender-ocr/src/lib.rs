//! Standalone OCR service for scanned tender PDFs and images.

mod config;
mod engine;
mod server;

use async_trait::async_trait;
use thiserror::Error;

pub use config::OcrServiceConfig;
pub use engine::{tesseract_lang, TesseractEngine};
pub use server::{app, join_pages, serve, OcrState};

pub const CRATE_NAME: &str = "tender-ocr";

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("required tool `{0}` is not installed")]
    ToolMissing(&'static str),
    #[error("{tool} failed: {stderr}")]
    ToolFailed { tool: &'static str, stderr: String },
    #[error("Could not extract first page")]
    NoPages,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Text recognition backend. Languages are service codes (`fr`, `en`, `ar`).
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn is_ready(&self) -> bool;

    async fn recognize_image(&self, bytes: &[u8], lang: &str) -> Result<String, OcrError>;

    /// One entry per rendered page, in page order.
    async fn recognize_pdf(
        &self,
        bytes: &[u8],
        lang: &str,
        first_page_only: bool,
    ) -> Result<Vec<String>, OcrError>;
}
