use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tender_ai::{AiError, TenderAnalyzer};
use tender_core::{
    AskAnswer, AvisMetadata, Citation, DocumentType, SourceDocument, TenderDocument,
    TrackedValue, UniversalMetadata,
};
use tender_portal::{DownloadedArchive, PortalError, TenderPortal};
use zip::write::SimpleFileOptions;

pub(crate) fn zip_of(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub(crate) fn avis_zip() -> Vec<u8> {
    zip_of(&[
        (
            "AVIS_AO_12-2026.txt",
            "Avis d'appel d'offres ouvert n° 12/2026. La Commune de Tanger lance un appel \
             d'offres pour l'acquisition de fournitures de bureau.",
        ),
        (
            "RC_12-2026.txt",
            "Règlement de consultation. Article 1: objet du règlement.",
        ),
    ])
}

#[derive(Debug, Clone)]
pub(crate) struct StubAnalyzer {
    pub classify_as: DocumentType,
    pub fail_extraction: bool,
    pub fail_deep: bool,
}

impl Default for StubAnalyzer {
    fn default() -> Self {
        Self {
            classify_as: DocumentType::Unknown,
            fail_extraction: false,
            fail_deep: false,
        }
    }
}

#[async_trait]
impl TenderAnalyzer for StubAnalyzer {
    async fn extract_avis_metadata(
        &self,
        _avis_text: &str,
        source_date: Option<&str>,
    ) -> Result<AvisMetadata, AiError> {
        if self.fail_extraction {
            return Err(AiError::EmptyReply);
        }
        let mut metadata = AvisMetadata {
            reference_tender: TrackedValue::new("12/2026".to_string(), SourceDocument::Avis),
            subject: TrackedValue::new(
                "Acquisition de fournitures de bureau".to_string(),
                SourceDocument::Avis,
            ),
            ..AvisMetadata::default()
        };
        if let Some(date) = source_date {
            metadata.stamp_source_date(date);
        }
        Ok(metadata)
    }

    async fn extract_universal_metadata(
        &self,
        documents: &[TenderDocument],
    ) -> Result<UniversalMetadata, AiError> {
        if documents.is_empty() {
            return Err(AiError::NoDocuments);
        }
        if self.fail_deep {
            return Err(AiError::EmptyReply);
        }
        Ok(UniversalMetadata {
            reference_tender: TrackedValue::new("12/2026".to_string(), SourceDocument::Rc),
            ..UniversalMetadata::default()
        })
    }

    async fn ask(
        &self,
        question: &str,
        _documents: &[TenderDocument],
    ) -> Result<AskAnswer, AiError> {
        Ok(AskAnswer {
            answer: format!("Réponse: {question} [Document: RC, Article 1]"),
            citations: vec![Citation {
                document: "RC".to_string(),
                section: Some("Article 1".to_string()),
            }],
        })
    }

    async fn classify_document(
        &self,
        _text: &str,
        _filename: &str,
        _is_scanned: bool,
    ) -> Result<DocumentType, AiError> {
        Ok(self.classify_as)
    }
}

/// Serves a fixed link list; every link downloads `archive`, except those
/// listed in `failing`.
pub(crate) struct StubPortal {
    pub links: Vec<String>,
    pub failing: Vec<String>,
    pub archive: Vec<u8>,
    pub delay: Duration,
    pub downloads: AtomicUsize,
    pub searched: Mutex<Vec<(NaiveDate, NaiveDate)>>,
}

impl StubPortal {
    pub(crate) fn new(links: &[&str]) -> Self {
        Self {
            links: links.iter().map(|l| l.to_string()).collect(),
            failing: Vec::new(),
            archive: avis_zip(),
            delay: Duration::ZERO,
            downloads: AtomicUsize::new(0),
            searched: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TenderPortal for StubPortal {
    async fn collect_tender_links(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<String>, PortalError> {
        self.searched.lock().unwrap().push((start, end));
        Ok(self.links.clone())
    }

    async fn download_archive(&self, url: &str) -> Result<DownloadedArchive, PortalError> {
        tokio::time::sleep(self.delay).await;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|f| f == url) {
            return Err(PortalError::MissingElement("ctl0_CONTENU_PAGE_linkDownloadDce".into()));
        }
        Ok(DownloadedArchive {
            url: url.to_string(),
            bytes: self.archive.clone(),
        })
    }
}
