use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use tender_core::{
    AvisMetadata, DocumentType, ExtractionMethod, JobStatus, PaginatedResponse, ScraperJob,
    Tender, TenderDocument, TenderQuery, TenderStats, TenderStatus, UniversalMetadata,
};
use tracing::info;
use uuid::Uuid;

use crate::repository::{RepositoryError, TenderRepository};

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

const TENDER_COLUMNS: &str = "id, external_reference, source_url, status, scraped_at, \
     download_date, avis_metadata, universal_metadata, error_message, created_at, updated_at";

const JOB_COLUMNS: &str = "id, target_date, end_date, status, current_phase, total_found, \
     downloaded, failed, extracted, elapsed_seconds, error_log, started_at, completed_at";

#[derive(Debug, Clone)]
pub struct PgTenderRepository {
    pool: PgPool,
}

impl PgTenderRepository {
    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        MIGRATOR.run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, query: &'a TenderQuery) {
    builder.push(" WHERE TRUE");
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(from) = query.date_from.as_deref() {
        builder.push(" AND download_date >= ").push_bind(from);
    }
    if let Some(to) = query.date_to.as_deref() {
        builder.push(" AND download_date <= ").push_bind(to);
    }
    if let Some(term) = query.search_term() {
        let pattern = format!("%{term}%");
        builder
            .push(" AND (external_reference ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR avis_metadata->'subject'->>'value' ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR avis_metadata->'issuing_institution'->>'value' ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn parse_status(raw: &str) -> Result<TenderStatus, RepositoryError> {
    raw.parse()
        .map_err(|err| RepositoryError::Corrupt(format!("tenders.status: {err}")))
}

fn tender_from_row(row: &PgRow) -> Result<Tender, RepositoryError> {
    let status: String = row.try_get("status")?;
    let avis: Option<Json<AvisMetadata>> = row.try_get("avis_metadata")?;
    let universal: Option<Json<UniversalMetadata>> = row.try_get("universal_metadata")?;
    Ok(Tender {
        id: row.try_get("id")?,
        external_reference: row.try_get("external_reference")?,
        source_url: row.try_get("source_url")?,
        status: parse_status(&status)?,
        scraped_at: row.try_get("scraped_at")?,
        download_date: row.try_get("download_date")?,
        avis_metadata: avis.map(|Json(m)| m),
        universal_metadata: universal.map(|Json(m)| m),
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn document_from_row(row: &PgRow) -> Result<TenderDocument, RepositoryError> {
    let document_type: String = row.try_get("document_type")?;
    let extraction_method: String = row.try_get("extraction_method")?;
    let page_count: Option<i32> = row.try_get("page_count")?;
    let file_size_bytes: i64 = row.try_get("file_size_bytes")?;
    Ok(TenderDocument {
        id: row.try_get("id")?,
        tender_id: row.try_get("tender_id")?,
        document_type: DocumentType::parse(&document_type),
        filename: row.try_get("filename")?,
        raw_text: row.try_get("raw_text")?,
        page_count: page_count.map(|p| p.max(0) as u32),
        extraction_method: ExtractionMethod::parse(&extraction_method),
        file_size_bytes: file_size_bytes.max(0) as u64,
        mime_type: row.try_get("mime_type")?,
        created_at: row.try_get("created_at")?,
    })
}

fn job_from_row(row: &PgRow) -> Result<ScraperJob, RepositoryError> {
    let status: String = row.try_get("status")?;
    let count = |col: &str| -> Result<u32, RepositoryError> {
        let v: i32 = row.try_get(col)?;
        Ok(v.max(0) as u32)
    };
    Ok(ScraperJob {
        id: row.try_get("id")?,
        target_date: row.try_get("target_date")?,
        end_date: row.try_get("end_date")?,
        status: JobStatus::parse(&status),
        current_phase: row.try_get("current_phase")?,
        total_found: count("total_found")?,
        downloaded: count("downloaded")?,
        failed: count("failed")?,
        extracted: count("extracted")?,
        elapsed_seconds: row.try_get("elapsed_seconds")?,
        error_log: row.try_get("error_log")?,
        started_at: row.try_get::<DateTime<Utc>, _>("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

#[async_trait]
impl TenderRepository for PgTenderRepository {
    async fn insert_tender(&self, tender: &Tender) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO tenders (
                id, external_reference, source_url, status, scraped_at, download_date,
                avis_metadata, universal_metadata, error_message, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(tender.id)
        .bind(&tender.external_reference)
        .bind(&tender.source_url)
        .bind(tender.status.as_str())
        .bind(tender.scraped_at)
        .bind(&tender.download_date)
        .bind(tender.avis_metadata.as_ref().map(Json))
        .bind(tender.universal_metadata.as_ref().map(Json))
        .bind(&tender.error_message)
        .bind(tender.created_at)
        .bind(tender.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_tender(&self, tender: &Tender) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE tenders
               SET external_reference = $2,
                   status = $3,
                   avis_metadata = $4,
                   universal_metadata = $5,
                   error_message = $6,
                   updated_at = $7
             WHERE id = $1
            "#,
        )
        .bind(tender.id)
        .bind(&tender.external_reference)
        .bind(tender.status.as_str())
        .bind(tender.avis_metadata.as_ref().map(Json))
        .bind(tender.universal_metadata.as_ref().map(Json))
        .bind(&tender.error_message)
        .bind(tender.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::TenderNotFound(tender.id));
        }
        Ok(())
    }

    async fn get_tender(&self, id: Uuid) -> Result<Option<Tender>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TENDER_COLUMNS} FROM tenders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(tender_from_row).transpose()
    }

    async fn list_tenders(
        &self,
        query: &TenderQuery,
    ) -> Result<PaginatedResponse<Tender>, RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM tenders");
        push_filters(&mut count, query);
        let total: i64 = count.build().fetch_one(&self.pool).await?.try_get("total")?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {TENDER_COLUMNS} FROM tenders"));
        push_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(i64::try_from(query.per_page()).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));
        let rows = select.build().fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(tender_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PaginatedResponse::new(
            items,
            total.max(0) as usize,
            query.page(),
            query.per_page(),
        ))
    }

    async fn tender_stats(&self) -> Result<TenderStats, RepositoryError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM tenders GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut stats = TenderStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            stats.record(parse_status(&status)?, n.max(0) as usize);
        }
        Ok(stats)
    }

    async fn insert_document(&self, document: &TenderDocument) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO tender_documents (
                id, tender_id, document_type, filename, raw_text, page_count,
                extraction_method, file_size_bytes, mime_type, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(document.id)
        .bind(document.tender_id)
        .bind(document.document_type.as_str())
        .bind(&document.filename)
        .bind(&document.raw_text)
        .bind(document.page_count.map(|p| p as i32))
        .bind(document.extraction_method.as_str())
        .bind(document.file_size_bytes as i64)
        .bind(&document.mime_type)
        .bind(document.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn documents_for(&self, tender_id: Uuid) -> Result<Vec<TenderDocument>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, tender_id, document_type, filename, raw_text, page_count,
                   extraction_method, file_size_bytes, mime_type, created_at
              FROM tender_documents
             WHERE tender_id = $1
             ORDER BY created_at, filename
            "#,
        )
        .bind(tender_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn insert_job(&self, job: &ScraperJob) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO scraper_jobs ({JOB_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(job.id)
        .bind(&job.target_date)
        .bind(&job.end_date)
        .bind(job.status.as_str())
        .bind(&job.current_phase)
        .bind(job.total_found as i32)
        .bind(job.downloaded as i32)
        .bind(job.failed as i32)
        .bind(job.extracted as i32)
        .bind(job.elapsed_seconds)
        .bind(&job.error_log)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_job(&self, job: &ScraperJob) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE scraper_jobs
               SET status = $2,
                   current_phase = $3,
                   total_found = $4,
                   downloaded = $5,
                   failed = $6,
                   extracted = $7,
                   elapsed_seconds = $8,
                   error_log = $9,
                   completed_at = $10
             WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(&job.current_phase)
        .bind(job.total_found as i32)
        .bind(job.downloaded as i32)
        .bind(job.failed as i32)
        .bind(job.extracted as i32)
        .bind(job.elapsed_seconds)
        .bind(&job.error_log)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::JobNotFound(job.id));
        }
        Ok(())
    }

    async fn last_finished_job(&self) -> Result<Option<ScraperJob>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scraper_jobs \
             WHERE status <> 'RUNNING' AND completed_at IS NOT NULL \
             ORDER BY completed_at DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(job_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_for(query: &TenderQuery) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT id FROM tenders");
        push_filters(&mut builder, query);
        builder.sql().to_string()
    }

    #[test]
    fn unfiltered_query_has_no_predicates() {
        assert_eq!(
            sql_for(&TenderQuery::default()),
            "SELECT id FROM tenders WHERE TRUE"
        );
    }

    #[test]
    fn filters_bind_every_user_value() {
        let sql = sql_for(&TenderQuery {
            q: Some("bureau".into()),
            status: Some(TenderStatus::Listed),
            date_from: Some("2026-03-01".into()),
            date_to: Some("2026-03-31".into()),
            ..TenderQuery::default()
        });
        assert!(sql.contains("status = $1"));
        assert!(sql.contains("download_date >= $2"));
        assert!(sql.contains("download_date <= $3"));
        assert!(sql.contains("avis_metadata->'subject'->>'value' ILIKE $5"));
        assert!(!sql.contains("bureau"));
    }

    #[test]
    fn blank_search_adds_no_predicate() {
        let sql = sql_for(&TenderQuery {
            q: Some("  ".into()),
            ..TenderQuery::default()
        });
        assert!(!sql.contains("ILIKE"));
    }
}
