use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tender_ai::TenderAnalyzer;
use tender_core::{DocumentType, Tender, TenderStatus};
use tender_extract::{ArchiveExtraction, DocumentExtractor};
use tender_storage::{ArchiveStore, TenderRepository};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::SyncError;

/// Directory name archives from the public procurement portal are filed under.
pub const PORTAL_ID: &str = "marchespublics";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub tender_id: Uuid,
    pub status: TenderStatus,
    pub documents: usize,
    pub skipped: usize,
    pub error_message: Option<String>,
}

/// Turns one downloaded archive into a persisted tender: documents extracted
/// and stored, then phase-one metadata read from the notice.
pub struct IngestService {
    repository: Arc<dyn TenderRepository>,
    archives: ArchiveStore,
    extractor: DocumentExtractor,
    analyzer: Arc<dyn TenderAnalyzer>,
}

impl IngestService {
    pub fn new(
        repository: Arc<dyn TenderRepository>,
        archives: ArchiveStore,
        extractor: DocumentExtractor,
        analyzer: Arc<dyn TenderAnalyzer>,
    ) -> Self {
        Self {
            repository,
            archives,
            extractor,
            analyzer,
        }
    }

    pub async fn ingest_archive(
        &self,
        source_url: &str,
        download_date: NaiveDate,
        bytes: &[u8],
    ) -> Result<IngestOutcome, SyncError> {
        let date = download_date.format("%Y-%m-%d").to_string();
        let mut tender = Tender::new_scraped(source_url, Some(date.clone()));
        self.repository.insert_tender(&tender).await?;

        let span = info_span!("ingest", tender_id = %tender.id, source_url);
        async {
            match self.archives.store_archive(Utc::now(), PORTAL_ID, bytes).await {
                Ok(stored) => info!(
                    path = %stored.relative_path.display(),
                    deduplicated = stored.deduplicated,
                    "archive stored"
                ),
                Err(err) => warn!(error = %err, "archive could not be stored"),
            }

            let (documents, skipped) = match self.extractor.process_archive(bytes).await {
                Ok(mut extraction) => {
                    self.classify_unknown(&mut extraction).await;
                    let counts = (extraction.documents.len(), extraction.skipped.len());
                    self.persist_and_list(&mut tender, extraction, &date).await?;
                    counts
                }
                Err(err) => {
                    tender.mark_error(format!("Archive extraction failed: {err}"));
                    (0, 0)
                }
            };

            self.repository.update_tender(&tender).await?;
            info!(status = %tender.status, documents, skipped, "tender ingested");
            Ok::<_, SyncError>(IngestOutcome {
                tender_id: tender.id,
                status: tender.status,
                documents,
                skipped,
                error_message: tender.error_message.clone(),
            })
        }
        .instrument(span)
        .await
    }

    /// Model fallback for documents the rules could not place.
    async fn classify_unknown(&self, extraction: &mut ArchiveExtraction) {
        for doc in extraction
            .documents
            .iter_mut()
            .filter(|d| d.document_type == DocumentType::Unknown)
        {
            let text = if doc.first_page_text.trim().is_empty() {
                &doc.text
            } else {
                &doc.first_page_text
            };
            match self
                .analyzer
                .classify_document(text, &doc.filename, doc.is_scanned)
                .await
            {
                Ok(document_type) => doc.document_type = document_type,
                Err(err) => warn!(file = %doc.filename, error = %err, "model classification failed"),
            }
        }
    }

    async fn persist_and_list(
        &self,
        tender: &mut Tender,
        extraction: ArchiveExtraction,
        date: &str,
    ) -> Result<(), SyncError> {
        let avis_text = extraction.avis().map(|d| d.text.clone());
        for doc in extraction.documents {
            self.repository
                .insert_document(&doc.into_document(tender.id))
                .await?;
        }

        let Some(avis_text) = avis_text else {
            tender.mark_error("No Avis document found");
            return Ok(());
        };
        match self
            .analyzer
            .extract_avis_metadata(&avis_text, Some(date))
            .await
        {
            Ok(metadata) => {
                if let Err(err) = tender.attach_avis_metadata(metadata) {
                    tender.mark_error(err.to_string());
                }
            }
            Err(err) => tender.mark_error(format!("AI extraction failed: {err}")),
        }
        Ok(())
    }
}
