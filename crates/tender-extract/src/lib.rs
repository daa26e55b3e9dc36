//! Archive unpacking, per-format text extraction and document classification.

mod archive;
mod classify;
mod extractor;
mod format;
mod ocr;
mod readers;

use thiserror::Error;

pub use archive::{unpack_archive, ArchiveEntry};
pub use classify::classify;
pub use extractor::{
    ArchiveExtraction, DocumentExtractor, ExtractedDocument, FirstPageScan, SkippedEntry,
    SCANNED_TEXT_THRESHOLD,
};
pub use format::DocumentFormat;
pub use ocr::{OcrBackend, OcrClient, OcrOutput, OcrScope};

pub const CRATE_NAME: &str = "tender-extract";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("pdf: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("docx: {0}")]
    Docx(String),
    #[error("spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("doc: {0}")]
    Doc(String),
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("ocr service: {0}")]
    Ocr(String),
    #[error("ocr request failed: {0}")]
    OcrRequest(#[from] reqwest::Error),
}

impl From<quick_xml::Error> for ExtractError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Docx(err.to_string())
    }
}
