//! Core domain model and provenance types for the tender platform.

mod api;
mod job;
mod metadata;
mod query;
mod tender;

pub use api::{ApiResponse, AskAnswer, Citation, OcrResponse, PaginatedResponse};
pub use job::{JobStatus, LogEntry, LogLevel, ScraperJob, ScraperStatus};
pub use metadata::{
    format_amount, parse_amount, AvisMetadata, Keywords, MonetaryValue, SourceDocument,
    SubmissionDeadline, TenderItem, TenderLot, TrackedValue, UniversalMetadata,
};
pub use query::{TenderQuery, TenderStats, DEFAULT_PER_PAGE, MAX_PER_PAGE};
pub use tender::{
    DocumentSummary, DocumentType, ExtractionMethod, LifecycleError, Tender, TenderDetail,
    TenderDocument, TenderStatus,
};

pub const CRATE_NAME: &str = "tender-core";
