use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDate};
use serde::Deserialize;
use tender_core::{JobStatus, LogEntry, LogLevel, ScraperJob, ScraperStatus, TenderStatus};
use tender_portal::{portal_date, DownloadedArchive, TenderPortal};
use tender_storage::TenderRepository;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::{IngestService, SyncError};

const STATUS_LOG_LINES: usize = 50;
const LOG_CAPACITY: usize = 500;

/// Body of a scrape trigger. Dates are `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScrapeRequest {
    pub target_date: Option<String>,
    pub end_date: Option<String>,
}

impl ScrapeRequest {
    /// Start defaults to the day before `today`, end to the start.
    pub fn dates(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), SyncError> {
        let start = match non_blank(self.target_date.as_deref()) {
            Some(raw) => parse_date(raw)?,
            None => today.pred_opt().unwrap_or(today),
        };
        let end = match non_blank(self.end_date.as_deref()) {
            Some(raw) => parse_date(raw)?,
            None => start,
        };
        if end < start {
            return Err(SyncError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok((start, end))
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(raw: &str) -> Result<NaiveDate, SyncError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| SyncError::InvalidDate(raw.to_string()))
}

struct ActiveRun {
    job: ScraperJob,
    logs: VecDeque<LogEntry>,
    started: Instant,
}

impl ActiveRun {
    fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::now(level, message);
        match level {
            LogLevel::Error => error!(job_id = %self.job.id, "{}", entry.message),
            LogLevel::Warning => warn!(job_id = %self.job.id, "{}", entry.message),
            LogLevel::Info | LogLevel::Success => info!(job_id = %self.job.id, "{}", entry.message),
        }
        if self.logs.len() >= LOG_CAPACITY {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);
    }

    fn elapsed_seconds(&self) -> f64 {
        (self.started.elapsed().as_secs_f64() * 10.0).round() / 10.0
    }
}

struct Inner {
    portal: Arc<dyn TenderPortal>,
    ingest: Arc<IngestService>,
    repository: Arc<dyn TenderRepository>,
    max_concurrent: usize,
    active: Mutex<Option<ActiveRun>>,
    stop_requested: AtomicBool,
}

/// Runs at most one scrape at a time: collect links, download archives
/// concurrently, then ingest them. Progress is kept in memory for the status
/// endpoint and persisted as a `ScraperJob` on every phase change.
#[derive(Clone)]
pub struct ScraperController {
    inner: Arc<Inner>,
}

impl ScraperController {
    pub fn new(
        portal: Arc<dyn TenderPortal>,
        ingest: Arc<IngestService>,
        repository: Arc<dyn TenderRepository>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                portal,
                ingest,
                repository,
                max_concurrent: max_concurrent.max(1),
                active: Mutex::new(None),
                stop_requested: AtomicBool::new(false),
            }),
        }
    }

    /// Starts a background run and returns its job record.
    pub async fn start(&self, request: ScrapeRequest) -> Result<ScraperJob, SyncError> {
        let (job, start, end) = self.begin(&request).await?;
        let controller = self.clone();
        tokio::spawn(async move {
            controller.run(start, end).await;
        });
        Ok(job)
    }

    /// Runs a scrape in the calling task and returns the finished job.
    pub async fn run_now(&self, request: ScrapeRequest) -> Result<ScraperJob, SyncError> {
        let (job, start, end) = self.begin(&request).await?;
        Ok(self.run(start, end).await.unwrap_or(job))
    }

    pub async fn is_running(&self) -> bool {
        self.inner.active.lock().await.is_some()
    }

    /// Requests a cooperative stop; downloads not yet started are skipped.
    pub async fn stop(&self) -> bool {
        let mut active = self.inner.active.lock().await;
        match active.as_mut() {
            Some(run) => {
                self.inner.stop_requested.store(true, Ordering::SeqCst);
                run.log(LogLevel::Warning, "Stop requested...");
                true
            }
            None => false,
        }
    }

    pub async fn status(&self) -> Result<ScraperStatus, SyncError> {
        let last_run = self
            .inner
            .repository
            .last_finished_job()
            .await?
            .and_then(|job| job.completed_at);
        let active = self.inner.active.lock().await;
        let Some(run) = active.as_ref() else {
            return Ok(ScraperStatus::idle(last_run));
        };
        let skip = run.logs.len().saturating_sub(STATUS_LOG_LINES);
        Ok(ScraperStatus {
            is_running: true,
            job_id: Some(run.job.id),
            current_phase: run.job.current_phase.clone(),
            total_tenders: run.job.total_found,
            downloaded: run.job.downloaded,
            failed: run.job.failed,
            extracted: run.job.extracted,
            elapsed_seconds: run.elapsed_seconds(),
            last_run,
            logs: run.logs.iter().skip(skip).cloned().collect(),
        })
    }

    async fn begin(
        &self,
        request: &ScrapeRequest,
    ) -> Result<(ScraperJob, NaiveDate, NaiveDate), SyncError> {
        let (start, end) = request.dates(Local::now().date_naive())?;
        let mut active = self.inner.active.lock().await;
        if active.is_some() {
            return Err(SyncError::AlreadyRunning);
        }
        let job = ScraperJob::start(start.to_string(), end.to_string());
        self.inner.repository.insert_job(&job).await?;
        self.inner.stop_requested.store(false, Ordering::SeqCst);

        let mut run = ActiveRun {
            job: job.clone(),
            logs: VecDeque::with_capacity(LOG_CAPACITY),
            started: Instant::now(),
        };
        run.log(LogLevel::Info, "Starting scraper");
        run.log(LogLevel::Info, format!("Date range: {start} → {end}"));
        *active = Some(run);
        Ok((job, start, end))
    }

    async fn run(&self, start: NaiveDate, end: NaiveDate) -> Option<ScraperJob> {
        let outcome = self.execute(start, end).await;
        let stopped = self.stop_requested();

        // Taken out so the lock is not held while the final job is persisted.
        let taken = self.inner.active.lock().await.take();
        let mut run = taken?;
        run.job.elapsed_seconds = run.elapsed_seconds();
        run.job.current_phase = "Completed".to_string();

        let (status, error_log) = match outcome {
            Err(err) => {
                run.log(LogLevel::Error, format!("Scraper failed: {err}"));
                (JobStatus::Failed, Some(err.to_string()))
            }
            Ok(()) if stopped => (JobStatus::Stopped, None),
            Ok(()) => (JobStatus::Completed, None),
        };
        let job = &run.job;
        let summary = [
            (
                LogLevel::Success,
                format!("Downloaded: {}/{}", job.downloaded, job.total_found),
            ),
            (
                if job.failed > 0 {
                    LogLevel::Error
                } else {
                    LogLevel::Success
                },
                format!("Failed: {}", job.failed),
            ),
            (LogLevel::Info, format!("Extracted: {}", job.extracted)),
            (LogLevel::Info, format!("Time: {:.1}s", job.elapsed_seconds)),
        ];
        for (level, message) in summary {
            run.log(level, message);
        }

        run.job.finish(status, error_log);
        if let Err(err) = self.inner.repository.update_job(&run.job).await {
            error!(job_id = %run.job.id, error = %err, "failed to persist finished job");
        }
        Some(run.job)
    }

    async fn execute(&self, start: NaiveDate, end: NaiveDate) -> Result<(), SyncError> {
        self.set_phase("Collecting tender links").await;
        self.log(
            LogLevel::Info,
            format!(
                "Date de mise en ligne: {} → {}",
                portal_date(start),
                portal_date(end)
            ),
        )
        .await;
        let links = self.inner.portal.collect_tender_links(start, end).await?;
        let total = links.len();
        self.update(|job| job.total_found = total as u32).await;
        if links.is_empty() {
            self.log(LogLevel::Warning, "No tenders found").await;
            return Ok(());
        }
        self.log(LogLevel::Success, format!("Found {total} tender links"))
            .await;
        if self.stop_requested() {
            return Ok(());
        }

        self.set_phase(&format!("Downloading {total} tenders")).await;
        self.log(
            LogLevel::Info,
            format!("Using {} concurrent workers", self.inner.max_concurrent),
        )
        .await;
        let archives = self.download_all(links).await;

        self.set_phase("Processing documents").await;
        for (index, archive) in archives {
            if self.stop_requested() {
                self.log(LogLevel::Warning, "Stopped before processing remaining archives")
                    .await;
                break;
            }
            match self
                .inner
                .ingest
                .ingest_archive(&archive.url, start, &archive.bytes)
                .await
            {
                Ok(outcome) => {
                    self.update(|job| job.extracted += 1).await;
                    let (level, detail) = match (&outcome.status, &outcome.error_message) {
                        (TenderStatus::Listed, _) => (LogLevel::Success, String::new()),
                        (_, Some(message)) => (LogLevel::Warning, format!(": {message}")),
                        (_, None) => (LogLevel::Warning, String::new()),
                    };
                    self.log(
                        level,
                        format!(
                            "Tender #{index}: {} with {} documents{detail}",
                            outcome.status, outcome.documents
                        ),
                    )
                    .await;
                }
                Err(err) => {
                    self.log(LogLevel::Error, format!("Tender #{index}: processing failed: {err}"))
                        .await;
                }
            }
        }
        Ok(())
    }

    /// Downloads under the worker semaphore; results come back in link order.
    async fn download_all(&self, links: Vec<String>) -> Vec<(usize, DownloadedArchive)> {
        let semaphore = Arc::new(Semaphore::new(self.inner.max_concurrent));
        let mut tasks = JoinSet::new();
        for (offset, url) in links.into_iter().enumerate() {
            let index = offset + 1;
            let semaphore = semaphore.clone();
            let controller = self.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return (index, None);
                };
                if controller.stop_requested() {
                    return (index, None);
                }
                match controller.inner.portal.download_archive(&url).await {
                    Ok(archive) => {
                        controller.update(|job| job.downloaded += 1).await;
                        controller
                            .log(
                                LogLevel::Success,
                                format!(
                                    "Downloaded: tender #{index} ({} KB)",
                                    archive.bytes.len() / 1024
                                ),
                            )
                            .await;
                        (index, Some(archive))
                    }
                    Err(err) => {
                        controller.update(|job| job.failed += 1).await;
                        controller
                            .log(LogLevel::Error, format!("Failed tender #{index}: {err}"))
                            .await;
                        (index, None)
                    }
                }
            });
        }

        let mut archives = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Some(archive))) => archives.push((index, archive)),
                Ok((_, None)) => {}
                Err(err) => warn!(error = %err, "download task aborted"),
            }
        }
        archives.sort_by_key(|(index, _)| *index);
        archives
    }

    fn stop_requested(&self) -> bool {
        self.inner.stop_requested.load(Ordering::SeqCst)
    }

    async fn update(&self, change: impl FnOnce(&mut ScraperJob)) {
        if let Some(run) = self.inner.active.lock().await.as_mut() {
            change(&mut run.job);
        }
    }

    async fn log(&self, level: LogLevel, message: impl Into<String>) {
        if let Some(run) = self.inner.active.lock().await.as_mut() {
            run.log(level, message);
        }
    }

    /// Records the phase and persists a snapshot of the job.
    async fn set_phase(&self, phase: &str) {
        let snapshot = {
            let mut active = self.inner.active.lock().await;
            let Some(run) = active.as_mut() else {
                return;
            };
            run.job.current_phase = phase.to_string();
            run.job.elapsed_seconds = run.elapsed_seconds();
            run.log(LogLevel::Info, phase);
            run.job.clone()
        };
        if let Err(err) = self.inner.repository.update_job(&snapshot).await {
            warn!(job_id = %snapshot.id, error = %err, "failed to persist job progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubAnalyzer, StubPortal};
    use async_trait::async_trait;
    use std::time::Duration;
    use tender_core::{PaginatedResponse, Tender, TenderDocument, TenderQuery, TenderStats};
    use tender_extract::DocumentExtractor;
    use tender_storage::{ArchiveStore, MemoryTenderRepository, RepositoryError};
    use tokio::sync::Notify;
    use uuid::Uuid;

    fn controller_over(
        portal: Arc<StubPortal>,
        max_concurrent: usize,
        dir: &tempfile::TempDir,
        repository: Arc<dyn TenderRepository>,
    ) -> ScraperController {
        let ingest = Arc::new(IngestService::new(
            repository.clone(),
            ArchiveStore::new(dir.path()),
            DocumentExtractor::new(),
            Arc::new(StubAnalyzer::default()),
        ));
        ScraperController::new(portal, ingest, repository, max_concurrent)
    }

    fn controller(
        portal: StubPortal,
        max_concurrent: usize,
        dir: &tempfile::TempDir,
    ) -> (ScraperController, Arc<MemoryTenderRepository>, Arc<StubPortal>) {
        let repository = Arc::new(MemoryTenderRepository::new());
        let portal = Arc::new(portal);
        let controller = controller_over(portal.clone(), max_concurrent, dir, repository.clone());
        (controller, repository, portal)
    }

    /// Holds back persistence of finished jobs until released.
    struct GatedJobRepository {
        inner: MemoryTenderRepository,
        finishing: Notify,
        release: Semaphore,
    }

    #[async_trait]
    impl TenderRepository for GatedJobRepository {
        async fn insert_tender(&self, tender: &Tender) -> Result<(), RepositoryError> {
            self.inner.insert_tender(tender).await
        }

        async fn update_tender(&self, tender: &Tender) -> Result<(), RepositoryError> {
            self.inner.update_tender(tender).await
        }

        async fn get_tender(&self, id: Uuid) -> Result<Option<Tender>, RepositoryError> {
            self.inner.get_tender(id).await
        }

        async fn list_tenders(
            &self,
            query: &TenderQuery,
        ) -> Result<PaginatedResponse<Tender>, RepositoryError> {
            self.inner.list_tenders(query).await
        }

        async fn tender_stats(&self) -> Result<TenderStats, RepositoryError> {
            self.inner.tender_stats().await
        }

        async fn insert_document(&self, document: &TenderDocument) -> Result<(), RepositoryError> {
            self.inner.insert_document(document).await
        }

        async fn documents_for(
            &self,
            tender_id: Uuid,
        ) -> Result<Vec<TenderDocument>, RepositoryError> {
            self.inner.documents_for(tender_id).await
        }

        async fn insert_job(&self, job: &ScraperJob) -> Result<(), RepositoryError> {
            self.inner.insert_job(job).await
        }

        async fn update_job(&self, job: &ScraperJob) -> Result<(), RepositoryError> {
            if job.status != JobStatus::Running {
                self.finishing.notify_one();
                let _permit = self.release.acquire().await;
            }
            self.inner.update_job(job).await
        }

        async fn last_finished_job(&self) -> Result<Option<ScraperJob>, RepositoryError> {
            self.inner.last_finished_job().await
        }
    }

    async fn wait_idle(controller: &ScraperController) {
        for _ in 0..250 {
            if !controller.is_running().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("scraper did not finish");
    }

    fn request(date: &str) -> ScrapeRequest {
        ScrapeRequest {
            target_date: Some(date.to_string()),
            end_date: None,
        }
    }

    #[test]
    fn run_log_keeps_the_most_recent_entries() {
        let mut run = ActiveRun {
            job: ScraperJob::start("2026-10-14".to_string(), "2026-10-14".to_string()),
            logs: VecDeque::new(),
            started: Instant::now(),
        };
        for line in 0..LOG_CAPACITY + 10 {
            run.log(LogLevel::Info, format!("line {line}"));
        }
        assert_eq!(run.logs.len(), LOG_CAPACITY);
        assert_eq!(run.logs.front().unwrap().message, "line 10");
        assert_eq!(
            run.logs.back().unwrap().message,
            format!("line {}", LOG_CAPACITY + 9)
        );
    }

    #[test]
    fn dates_default_to_yesterday() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        assert_eq!(
            ScrapeRequest::default().dates(today).unwrap(),
            (yesterday, yesterday)
        );
        let ranged = ScrapeRequest {
            target_date: Some("2026-10-01".into()),
            end_date: Some("2026-10-03".into()),
        };
        assert_eq!(
            ranged.dates(today).unwrap().1,
            NaiveDate::from_ymd_opt(2026, 10, 3).unwrap()
        );
        assert!(matches!(
            request("14/10/2026").dates(today),
            Err(SyncError::InvalidDate(_))
        ));
        let backwards = ScrapeRequest {
            target_date: Some("2026-10-03".into()),
            end_date: Some("2026-10-01".into()),
        };
        assert!(matches!(
            backwards.dates(today),
            Err(SyncError::InvalidRange { .. })
        ));
    }

    #[tokio::test]
    async fn full_run_downloads_and_ingests() {
        let dir = tempfile::tempdir().unwrap();
        let mut portal = StubPortal::new(&[
            "https://portal.test/t/1",
            "https://portal.test/t/2",
            "https://portal.test/t/3",
        ]);
        portal.failing = vec!["https://portal.test/t/2".to_string()];
        let (controller, repository, portal) = controller(portal, 2, &dir);

        let job = controller.run_now(request("2026-10-14")).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.current_phase, "Completed");
        assert_eq!((job.total_found, job.downloaded, job.failed, job.extracted), (3, 2, 1, 2));
        assert!(job.completed_at.is_some());

        let date = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
        assert_eq!(portal.searched.lock().unwrap().as_slice(), &[(date, date)]);
        let listed = repository.list_tenders(&TenderQuery::default()).await.unwrap();
        assert_eq!(listed.total, 2);
        assert!(listed
            .items
            .iter()
            .all(|t| t.status == TenderStatus::Listed));

        let persisted = repository.last_finished_job().await.unwrap().unwrap();
        assert_eq!(persisted.id, job.id);
        let status = controller.status().await.unwrap();
        assert!(!status.is_running);
        assert_eq!(status.current_phase, "Idle");
        assert_eq!(status.last_run, persisted.completed_at);
    }

    #[tokio::test]
    async fn empty_search_completes_without_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _, portal) = controller(StubPortal::new(&[]), 5, &dir);
        let job = controller.run_now(request("2026-10-14")).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_found, 0);
        assert_eq!(portal.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn only_one_run_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut portal = StubPortal::new(&["https://portal.test/t/1"]);
        portal.delay = Duration::from_millis(200);
        let (controller, _, _) = controller(portal, 1, &dir);

        let job = controller.start(request("2026-10-14")).await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(matches!(
            controller.start(request("2026-10-14")).await,
            Err(SyncError::AlreadyRunning)
        ));

        let status = controller.status().await.unwrap();
        assert!(status.is_running);
        assert_eq!(status.job_id, Some(job.id));
        assert!(status.logs.iter().any(|l| l.message == "Starting scraper"));

        wait_idle(&controller).await;
        assert!(controller.start(request("2026-10-14")).await.is_ok());
        wait_idle(&controller).await;
    }

    #[tokio::test]
    async fn stop_skips_pending_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let links: Vec<String> = (1..=10).map(|i| format!("https://portal.test/t/{i}")).collect();
        let refs: Vec<&str> = links.iter().map(String::as_str).collect();
        let mut portal = StubPortal::new(&refs);
        portal.delay = Duration::from_millis(100);
        let (controller, repository, portal) = controller(portal, 1, &dir);

        controller.start(request("2026-10-14")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(controller.stop().await);
        wait_idle(&controller).await;

        assert!(portal.downloads.load(Ordering::SeqCst) < 10);
        let job = repository.last_finished_job().await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Stopped);
        assert!(!controller.stop().await);
    }

    #[tokio::test]
    async fn status_answers_while_finished_job_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Arc::new(GatedJobRepository {
            inner: MemoryTenderRepository::new(),
            finishing: Notify::new(),
            release: Semaphore::new(0),
        });
        let controller = controller_over(
            Arc::new(StubPortal::new(&[])),
            1,
            &dir,
            repository.clone(),
        );

        let job = controller.start(request("2026-10-14")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), repository.finishing.notified())
            .await
            .expect("run never reached job persistence");

        let status = tokio::time::timeout(Duration::from_secs(1), controller.status())
            .await
            .expect("status blocked behind job persistence")
            .unwrap();
        assert!(!status.is_running);
        assert!(!controller.stop().await);

        repository.release.add_permits(1);
        for _ in 0..100 {
            if repository.last_finished_job().await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let persisted = repository.last_finished_job().await.unwrap().unwrap();
        assert_eq!(persisted.id, job.id);
        assert_eq!(persisted.status, JobStatus::Completed);
    }
}
