use std::sync::Arc;

use tender_ai::TenderAnalyzer;
use tender_core::{AskAnswer, Tender, TenderDetail, TenderDocument};
use tender_storage::TenderRepository;
use tracing::{info, warn};
use uuid::Uuid;

use crate::SyncError;

/// User-triggered work on a listed tender: deep analysis and questions.
pub struct AnalysisService {
    repository: Arc<dyn TenderRepository>,
    analyzer: Arc<dyn TenderAnalyzer>,
}

impl AnalysisService {
    pub fn new(repository: Arc<dyn TenderRepository>, analyzer: Arc<dyn TenderAnalyzer>) -> Self {
        Self {
            repository,
            analyzer,
        }
    }

    async fn load(&self, id: Uuid) -> Result<(Tender, Vec<TenderDocument>), SyncError> {
        let tender = self
            .repository
            .get_tender(id)
            .await?
            .ok_or(SyncError::TenderNotFound(id))?;
        let documents = self.repository.documents_for(id).await?;
        Ok((tender, documents))
    }

    pub async fn detail(&self, id: Uuid) -> Result<TenderDetail, SyncError> {
        let (tender, documents) = self.load(id).await?;
        Ok(TenderDetail {
            tender,
            documents: documents.iter().map(TenderDocument::summary).collect(),
        })
    }

    /// Phase 2. A model failure leaves the tender in ERROR with the reason.
    pub async fn analyze(&self, id: Uuid) -> Result<Tender, SyncError> {
        let (mut tender, documents) = self.load(id).await?;
        if !tender.status.can_start_analysis() {
            return Err(SyncError::NotReady(tender.status));
        }
        if documents.is_empty() {
            return Err(SyncError::NoDocuments);
        }

        info!(tender_id = %id, documents = documents.len(), "deep analysis started");
        let outcome = match self.analyzer.extract_universal_metadata(&documents).await {
            Ok(metadata) => tender
                .attach_universal_metadata(metadata)
                .map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };
        match outcome {
            Ok(()) => {
                self.repository.update_tender(&tender).await?;
                info!(tender_id = %id, "deep analysis finished");
                Ok(tender)
            }
            Err(reason) => {
                warn!(tender_id = %id, error = %reason, "deep analysis failed");
                tender.mark_error(format!("Deep analysis failed: {reason}"));
                self.repository.update_tender(&tender).await?;
                Err(SyncError::AnalysisFailed(reason))
            }
        }
    }

    /// Phase 3.
    pub async fn ask(&self, id: Uuid, question: &str) -> Result<AskAnswer, SyncError> {
        let (_, documents) = self.load(id).await?;
        let question = question.trim();
        if question.is_empty() {
            return Err(SyncError::EmptyQuestion);
        }
        if documents.is_empty() {
            return Err(SyncError::NoDocuments);
        }
        self.analyzer
            .ask(question, &documents)
            .await
            .map_err(|err| SyncError::AskFailed(err.to_string()))
    }
}
