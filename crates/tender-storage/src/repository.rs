use std::collections::HashMap;

use async_trait::async_trait;
use tender_core::{
    PaginatedResponse, ScraperJob, Tender, TenderDocument, TenderQuery, TenderStats,
};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("tender {0} not found")]
    TenderNotFound(Uuid),
    #[error("scraper job {0} not found")]
    JobNotFound(Uuid),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Persistence seam for tenders, their documents and scraper jobs.
#[async_trait]
pub trait TenderRepository: Send + Sync {
    async fn insert_tender(&self, tender: &Tender) -> Result<(), RepositoryError>;

    /// Fails with `TenderNotFound` when the row does not exist.
    async fn update_tender(&self, tender: &Tender) -> Result<(), RepositoryError>;

    async fn get_tender(&self, id: Uuid) -> Result<Option<Tender>, RepositoryError>;

    /// Newest first.
    async fn list_tenders(
        &self,
        query: &TenderQuery,
    ) -> Result<PaginatedResponse<Tender>, RepositoryError>;

    async fn tender_stats(&self) -> Result<TenderStats, RepositoryError>;

    async fn insert_document(&self, document: &TenderDocument) -> Result<(), RepositoryError>;

    async fn documents_for(&self, tender_id: Uuid) -> Result<Vec<TenderDocument>, RepositoryError>;

    async fn insert_job(&self, job: &ScraperJob) -> Result<(), RepositoryError>;

    async fn update_job(&self, job: &ScraperJob) -> Result<(), RepositoryError>;

    async fn last_finished_job(&self) -> Result<Option<ScraperJob>, RepositoryError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    tenders: HashMap<Uuid, Tender>,
    documents: Vec<TenderDocument>,
    jobs: HashMap<Uuid, ScraperJob>,
}

/// Process-local repository used when no database is configured, and by tests.
#[derive(Debug, Default)]
pub struct MemoryTenderRepository {
    state: RwLock<MemoryState>,
}

impl MemoryTenderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenderRepository for MemoryTenderRepository {
    async fn insert_tender(&self, tender: &Tender) -> Result<(), RepositoryError> {
        self.state
            .write()
            .await
            .tenders
            .insert(tender.id, tender.clone());
        Ok(())
    }

    async fn update_tender(&self, tender: &Tender) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        match state.tenders.get_mut(&tender.id) {
            Some(slot) => {
                *slot = tender.clone();
                Ok(())
            }
            None => Err(RepositoryError::TenderNotFound(tender.id)),
        }
    }

    async fn get_tender(&self, id: Uuid) -> Result<Option<Tender>, RepositoryError> {
        Ok(self.state.read().await.tenders.get(&id).cloned())
    }

    async fn list_tenders(
        &self,
        query: &TenderQuery,
    ) -> Result<PaginatedResponse<Tender>, RepositoryError> {
        let state = self.state.read().await;
        let mut matching = state
            .tenders
            .values()
            .filter(|t| query.matches(t))
            .collect::<Vec<_>>();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(query.offset())
            .take(query.per_page())
            .cloned()
            .collect();
        Ok(PaginatedResponse::new(
            items,
            total,
            query.page(),
            query.per_page(),
        ))
    }

    async fn tender_stats(&self) -> Result<TenderStats, RepositoryError> {
        Ok(TenderStats::tally(self.state.read().await.tenders.values()))
    }

    async fn insert_document(&self, document: &TenderDocument) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if !state.tenders.contains_key(&document.tender_id) {
            return Err(RepositoryError::TenderNotFound(document.tender_id));
        }
        state.documents.push(document.clone());
        Ok(())
    }

    async fn documents_for(&self, tender_id: Uuid) -> Result<Vec<TenderDocument>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .documents
            .iter()
            .filter(|d| d.tender_id == tender_id)
            .cloned()
            .collect())
    }

    async fn insert_job(&self, job: &ScraperJob) -> Result<(), RepositoryError> {
        self.state.write().await.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &ScraperJob) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        match state.jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(RepositoryError::JobNotFound(job.id)),
        }
    }

    async fn last_finished_job(&self) -> Result<Option<ScraperJob>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .jobs
            .values()
            .filter(|j| j.status.is_finished() && j.completed_at.is_some())
            .max_by_key(|j| j.completed_at)
            .cloned())
    }
}
