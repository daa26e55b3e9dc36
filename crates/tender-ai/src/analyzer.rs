use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tender_core::{AskAnswer, AvisMetadata, DocumentType, TenderDocument, UniversalMetadata};
use tracing::{info, warn};

use crate::chat::{ChatCompletion, ChatRequest};
use crate::context::{
    ask_context, classification_excerpt, deep_analysis_context, truncate_chars, AVIS_MAX_CHARS,
};
use crate::prompts;
use crate::reply::{normalize_scalars, parse_citations, parse_document_type, strip_json_fences};
use crate::AiError;

/// Notices shorter than this (trimmed) are not worth a model call.
pub const MIN_AVIS_CHARS: usize = 50;
const EXTRACTION_MAX_TOKENS: u32 = 4096;
const ASK_MAX_TOKENS: u32 = 2048;
const CLASSIFY_MAX_TOKENS: u32 = 10;

#[async_trait]
pub trait TenderAnalyzer: Send + Sync {
    /// Phase 1 over the notice text.
    async fn extract_avis_metadata(
        &self,
        avis_text: &str,
        source_date: Option<&str>,
    ) -> Result<AvisMetadata, AiError>;

    /// Phase 2 over every document of the tender.
    async fn extract_universal_metadata(
        &self,
        documents: &[TenderDocument],
    ) -> Result<UniversalMetadata, AiError>;

    async fn ask(&self, question: &str, documents: &[TenderDocument])
        -> Result<AskAnswer, AiError>;

    async fn classify_document(
        &self,
        text: &str,
        filename: &str,
        is_scanned: bool,
    ) -> Result<DocumentType, AiError>;
}

/// `TenderAnalyzer` over any chat-completion backend.
#[derive(Debug, Clone)]
pub struct LlmAnalyzer<C> {
    chat: C,
}

impl<C: ChatCompletion> LlmAnalyzer<C> {
    pub fn new(chat: C) -> Self {
        Self { chat }
    }

    async fn complete_json<T: DeserializeOwned>(&self, request: ChatRequest) -> Result<T, AiError> {
        let reply = self.chat.complete(&request).await?;
        let raw: serde_json::Value = serde_json::from_str(strip_json_fences(&reply)).map_err(|err| {
            warn!(error = %err, reply = truncate_chars(&reply, 500), "unparseable JSON reply");
            err
        })?;
        Ok(serde_json::from_value(normalize_scalars(raw))?)
    }
}

#[async_trait]
impl<C: ChatCompletion> TenderAnalyzer for LlmAnalyzer<C> {
    async fn extract_avis_metadata(
        &self,
        avis_text: &str,
        source_date: Option<&str>,
    ) -> Result<AvisMetadata, AiError> {
        let chars = avis_text.trim().chars().count();
        if chars < MIN_AVIS_CHARS {
            return Err(AiError::TextTooShort { chars });
        }
        info!(chars, "extracting avis metadata");
        let user = format!(
            "Extract metadata from this avis document:\n\n{}",
            truncate_chars(avis_text, AVIS_MAX_CHARS)
        );
        let mut metadata: AvisMetadata = self
            .complete_json(ChatRequest::new(
                prompts::AVIS_EXTRACTION,
                user,
                EXTRACTION_MAX_TOKENS,
            ))
            .await?;
        if let Some(date) = source_date {
            metadata.stamp_source_date(date);
        }
        Ok(metadata)
    }

    async fn extract_universal_metadata(
        &self,
        documents: &[TenderDocument],
    ) -> Result<UniversalMetadata, AiError> {
        let context = deep_analysis_context(documents).ok_or(AiError::NoDocuments)?;
        info!(
            documents = documents.len(),
            chars = context.chars().count(),
            "extracting universal metadata"
        );
        let user = format!("Extract universal metadata from these tender documents:\n\n{context}");
        let mut metadata: UniversalMetadata = self
            .complete_json(ChatRequest::new(
                prompts::UNIVERSAL_EXTRACTION,
                user,
                EXTRACTION_MAX_TOKENS,
            ))
            .await?;
        let computed = metadata.fill_computed_fields();
        info!(lots = metadata.lots.len(), computed, "universal metadata extracted");
        Ok(metadata)
    }

    async fn ask(
        &self,
        question: &str,
        documents: &[TenderDocument],
    ) -> Result<AskAnswer, AiError> {
        let user = format!(
            "TENDER DOCUMENTS:\n\n{}\n\n---\n\nUSER QUESTION:\n{}",
            ask_context(documents),
            question.trim()
        );
        let answer = self
            .chat
            .complete(&ChatRequest::new(prompts::ASK, user, ASK_MAX_TOKENS))
            .await?;
        let citations = parse_citations(&answer);
        Ok(AskAnswer { answer, citations })
    }

    async fn classify_document(
        &self,
        text: &str,
        filename: &str,
        is_scanned: bool,
    ) -> Result<DocumentType, AiError> {
        let user = format!(
            "Filename: {filename}\n\nDocument first page content:\n{}\n\nClassification:",
            classification_excerpt(text, is_scanned)
        );
        let reply = self
            .chat
            .complete(&ChatRequest::new(prompts::CLASSIFY, user, CLASSIFY_MAX_TOKENS))
            .await?;
        let document_type = parse_document_type(&reply);
        info!(file = filename, %document_type, "document classified by model");
        Ok(document_type)
    }
}
