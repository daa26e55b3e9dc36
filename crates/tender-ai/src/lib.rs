//! LLM-backed metadata extraction, question answering and document
//! classification for tenders.

mod analyzer;
mod chat;
mod config;
mod context;
mod prompts;
mod reply;

use tender_storage::FetchError;
use thiserror::Error;

pub use analyzer::{LlmAnalyzer, TenderAnalyzer, MIN_AVIS_CHARS};
pub use chat::{ChatCompletion, ChatMessage, ChatRequest, OpenAiChat};
pub use config::AiConfig;
pub use context::{ask_context, classification_excerpt, deep_analysis_context, truncate_chars};
pub use reply::{normalize_scalars, parse_citations, parse_document_type, strip_json_fences};

pub const CRATE_NAME: &str = "tender-ai";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI API key is not configured")]
    NotConfigured,
    #[error("text too short for extraction ({chars} characters)")]
    TextTooShort { chars: usize },
    #[error("no document text available")]
    NoDocuments,
    #[error("AI request failed: {0}")]
    Request(#[from] FetchError),
    #[error("AI reply had no content")]
    EmptyReply,
    #[error("AI reply is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
