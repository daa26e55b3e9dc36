use std::sync::Arc;

use anyhow::{Context, Result};
use tender_ai::{LlmAnalyzer, OpenAiChat, TenderAnalyzer};
use tender_extract::{DocumentExtractor, OcrClient};
use tender_portal::{MarchesPublicsPortal, TenderPortal};
use tender_storage::{ArchiveStore, MemoryTenderRepository, PgTenderRepository, TenderRepository};
use tracing::{info, warn};

use crate::{AnalysisService, AppConfig, IngestService, ScraperController};

/// The wired application services shared by the API server and the CLI.
#[derive(Clone)]
pub struct Platform {
    pub config: AppConfig,
    pub repository: Arc<dyn TenderRepository>,
    pub analysis: Arc<AnalysisService>,
    pub controller: ScraperController,
}

impl Platform {
    /// Postgres when `DATABASE_URL` is set (migrations applied), in-memory
    /// otherwise; OCR only when `OCR_SERVICE_URL` is set.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let repository: Arc<dyn TenderRepository> = match &config.database_url {
            Some(url) => {
                let pg = PgTenderRepository::connect(url)
                    .await
                    .context("connecting to postgres")?;
                pg.migrate().await.context("running migrations")?;
                info!("using postgres repository");
                Arc::new(pg)
            }
            None => {
                warn!("DATABASE_URL not set; tenders are kept in memory");
                Arc::new(MemoryTenderRepository::new())
            }
        };

        let extractor = match &config.ocr_service_url {
            Some(url) => {
                let client = OcrClient::new(url.clone(), config.ocr_timeout)
                    .context("building OCR client")?;
                if client.is_healthy().await {
                    info!(%url, "OCR service reachable");
                } else {
                    warn!(%url, "OCR service not reachable; scanned PDFs will fall back to digital text");
                }
                DocumentExtractor::with_ocr(Arc::new(client))
            }
            None => {
                warn!("OCR_SERVICE_URL not set; scanned PDFs keep their digital text");
                DocumentExtractor::new()
            }
        };

        if config.ai.api_key.is_none() {
            warn!("DEEPSEEK_API_KEY not set; AI extraction and analysis will fail");
        }
        let chat = OpenAiChat::new(config.ai.clone()).context("building AI client")?;
        let analyzer: Arc<dyn TenderAnalyzer> = Arc::new(LlmAnalyzer::new(chat));
        let portal: Arc<dyn TenderPortal> = Arc::new(
            MarchesPublicsPortal::new(config.portal.clone()).context("building portal client")?,
        );

        Ok(Self::assemble(config, repository, portal, analyzer, extractor))
    }

    pub fn assemble(
        config: AppConfig,
        repository: Arc<dyn TenderRepository>,
        portal: Arc<dyn TenderPortal>,
        analyzer: Arc<dyn TenderAnalyzer>,
        extractor: DocumentExtractor,
    ) -> Self {
        let ingest = Arc::new(IngestService::new(
            repository.clone(),
            ArchiveStore::new(config.artifacts_dir.clone()),
            extractor,
            analyzer.clone(),
        ));
        let analysis = Arc::new(AnalysisService::new(repository.clone(), analyzer));
        let controller = ScraperController::new(
            portal,
            ingest,
            repository.clone(),
            config.max_concurrent,
        );
        Self {
            config,
            repository,
            analysis,
            controller,
        }
    }
}
