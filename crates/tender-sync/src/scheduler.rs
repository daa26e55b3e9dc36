use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::{AppConfig, ScrapeRequest, ScraperController};

/// Daily scrape of the previous day, when `TENDER_SCHEDULER_ENABLED` is set.
/// The caller starts the returned scheduler.
pub async fn maybe_build_scheduler(
    config: &AppConfig,
    controller: ScraperController,
) -> Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let cron = config.scraper_cron.clone();
    let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
        let controller = controller.clone();
        Box::pin(async move {
            match controller.start(ScrapeRequest::default()).await {
                Ok(job) => info!(job_id = %job.id, "scheduled scrape started"),
                Err(err) => warn!(error = %err, "scheduled scrape not started"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    info!(%cron, "daily scrape scheduled");
    Ok(Some(sched))
}
