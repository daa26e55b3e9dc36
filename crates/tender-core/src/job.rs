use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "STOPPED" => Self::Stopped,
            _ => Self::Running,
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Persisted record of one scrape run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScraperJob {
    pub id: Uuid,
    pub target_date: String,
    pub end_date: String,
    pub status: JobStatus,
    pub current_phase: String,
    pub total_found: u32,
    pub downloaded: u32,
    pub failed: u32,
    pub extracted: u32,
    pub elapsed_seconds: f64,
    pub error_log: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScraperJob {
    pub fn start(target_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_date: target_date.into(),
            end_date: end_date.into(),
            status: JobStatus::Running,
            current_phase: "Initializing".to_string(),
            total_found: 0,
            downloaded: 0,
            failed: 0,
            extracted: 0,
            elapsed_seconds: 0.0,
            error_log: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn finish(&mut self, status: JobStatus, error_log: Option<String>) {
        self.status = status;
        self.error_log = error_log;
        self.completed_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn now(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            level,
            message: message.into(),
        }
    }
}

/// Scraper control panel snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScraperStatus {
    pub is_running: bool,
    pub job_id: Option<Uuid>,
    pub current_phase: String,
    pub total_tenders: u32,
    pub downloaded: u32,
    pub failed: u32,
    pub extracted: u32,
    pub elapsed_seconds: f64,
    pub last_run: Option<DateTime<Utc>>,
    pub logs: Vec<LogEntry>,
}

impl ScraperStatus {
    pub fn idle(last_run: Option<DateTime<Utc>>) -> Self {
        Self {
            is_running: false,
            job_id: None,
            current_phase: "Idle".to_string(),
            total_tenders: 0,
            downloaded: 0,
            failed: 0,
            extracted: 0,
            elapsed_seconds: 0.0,
            last_run,
            logs: Vec::new(),
        }
    }
}
