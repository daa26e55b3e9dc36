use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::metadata::{AvisMetadata, SourceDocument, UniversalMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenderStatus {
    Pending,
    Listed,
    Analyzed,
    Error,
}

impl TenderStatus {
    pub const ALL: [TenderStatus; 4] = [Self::Pending, Self::Listed, Self::Analyzed, Self::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Listed => "LISTED",
            Self::Analyzed => "ANALYZED",
            Self::Error => "ERROR",
        }
    }

    /// Lifecycle edges: PENDING → LISTED on phase 1, LISTED/ANALYZED/ERROR →
    /// ANALYZED on (re-)analysis, anything → ERROR.
    pub fn can_transition_to(self, next: TenderStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Listed)
                | (Self::Listed | Self::Analyzed | Self::Error, Self::Analyzed)
                | (_, Self::Error)
        )
    }

    pub fn can_start_analysis(self) -> bool {
        self.can_transition_to(Self::Analyzed)
    }
}

impl fmt::Display for TenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenderStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "LISTED" => Ok(Self::Listed),
            "ANALYZED" => Ok(Self::Analyzed),
            "ERROR" => Ok(Self::Error),
            other => Err(LifecycleError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition { from: TenderStatus, to: TenderStatus },
    #[error("unknown tender status `{0}`")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Avis,
    Rc,
    Cps,
    Annexe,
    Unknown,
}

impl DocumentType {
    /// Classification order: the first match wins.
    pub const CLASSIFICATION_ORDER: [DocumentType; 4] =
        [Self::Avis, Self::Rc, Self::Cps, Self::Annexe];

    /// Authority order for deep analysis: the latest annexe overrides
    /// everything, the AVIS has the lowest authority.
    pub const ANALYSIS_PRIORITY: [DocumentType; 4] =
        [Self::Annexe, Self::Cps, Self::Rc, Self::Avis];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Avis => "AVIS",
            Self::Rc => "RC",
            Self::Cps => "CPS",
            Self::Annexe => "ANNEXE",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "AVIS" => Self::Avis,
            "RC" => Self::Rc,
            "CPS" => Self::Cps,
            "ANNEXE" => Self::Annexe,
            _ => Self::Unknown,
        }
    }

    pub fn source_document(&self) -> Option<SourceDocument> {
        match self {
            Self::Avis => Some(SourceDocument::Avis),
            Self::Rc => Some(SourceDocument::Rc),
            Self::Cps => Some(SourceDocument::Cps),
            Self::Annexe => Some(SourceDocument::Annexe),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractionMethod {
    Digital,
    Ocr,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Digital => "DIGITAL",
            Self::Ocr => "OCR",
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("OCR") {
            Self::Ocr
        } else {
            Self::Digital
        }
    }
}

/// Canonical tender record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tender {
    pub id: Uuid,
    pub external_reference: Option<String>,
    pub source_url: String,
    pub status: TenderStatus,
    pub scraped_at: DateTime<Utc>,
    pub download_date: Option<String>,
    pub avis_metadata: Option<AvisMetadata>,
    pub universal_metadata: Option<UniversalMetadata>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tender {
    /// A freshly scraped tender: only scrape-level fields are populated.
    pub fn new_scraped(source_url: impl Into<String>, download_date: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_reference: None,
            source_url: source_url.into(),
            status: TenderStatus::Pending,
            scraped_at: now,
            download_date,
            avis_metadata: None,
            universal_metadata: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: TenderStatus) -> Result<(), LifecycleError> {
        if !self.status.can_transition_to(next) {
            return Err(LifecycleError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Phase 1 result: PENDING → LISTED.
    pub fn attach_avis_metadata(&mut self, metadata: AvisMetadata) -> Result<(), LifecycleError> {
        self.transition(TenderStatus::Listed)?;
        if let Some(reference) = metadata.reference_tender.value.as_deref() {
            let reference = reference.trim();
            if !reference.is_empty() {
                self.external_reference = Some(reference.to_string());
            }
        }
        self.avis_metadata = Some(metadata);
        self.error_message = None;
        Ok(())
    }

    /// Phase 2 result: LISTED/ANALYZED/ERROR → ANALYZED.
    pub fn attach_universal_metadata(
        &mut self,
        metadata: UniversalMetadata,
    ) -> Result<(), LifecycleError> {
        self.transition(TenderStatus::Analyzed)?;
        self.universal_metadata = Some(metadata);
        self.error_message = None;
        Ok(())
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = TenderStatus::Error;
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
    }

    pub fn subject(&self) -> Option<&str> {
        self.avis_metadata.as_ref()?.subject.value.as_deref()
    }

    pub fn issuing_institution(&self) -> Option<&str> {
        self.avis_metadata
            .as_ref()?
            .issuing_institution
            .value
            .as_deref()
    }
}

/// Text extracted from one archive entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenderDocument {
    pub id: Uuid,
    pub tender_id: Uuid,
    pub document_type: DocumentType,
    pub filename: String,
    pub raw_text: String,
    pub page_count: Option<u32>,
    pub extraction_method: ExtractionMethod,
    pub file_size_bytes: u64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

impl TenderDocument {
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id,
            document_type: self.document_type,
            filename: self.filename.clone(),
            page_count: self.page_count,
            extraction_method: self.extraction_method,
            file_size_bytes: self.file_size_bytes,
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Document as listed on the detail view; raw text stays server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub document_type: DocumentType,
    pub filename: String,
    pub page_count: Option<u32>,
    pub extraction_method: ExtractionMethod,
    pub file_size_bytes: u64,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenderDetail {
    #[serde(flatten)]
    pub tender: Tender,
    pub documents: Vec<DocumentSummary>,
}
