use std::path::PathBuf;
use std::time::Duration;

use tender_ai::AiConfig;
use tender_portal::PortalConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// In-memory repository when unset.
    pub database_url: Option<String>,
    pub artifacts_dir: PathBuf,
    pub web_port: u16,
    pub ocr_service_url: Option<String>,
    pub ocr_port: u16,
    pub ocr_timeout: Duration,
    pub max_concurrent: usize,
    pub scheduler_enabled: bool,
    pub scraper_cron: String,
    pub portal: PortalConfig,
    pub ai: AiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            artifacts_dir: PathBuf::from("./artifacts"),
            web_port: 8000,
            ocr_service_url: None,
            ocr_port: 8765,
            ocr_timeout: Duration::from_secs(300),
            max_concurrent: 5,
            scheduler_enabled: false,
            scraper_cron: "0 6 * * *".to_string(),
            portal: PortalConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            artifacts_dir: std::env::var("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifacts_dir),
            web_port: env_parse("TENDER_WEB_PORT").unwrap_or(defaults.web_port),
            ocr_service_url: std::env::var("OCR_SERVICE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            ocr_port: env_parse("OCR_PORT").unwrap_or(defaults.ocr_port),
            ocr_timeout: defaults.ocr_timeout,
            max_concurrent: env_parse::<usize>("SCRAPER_MAX_CONCURRENT")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent),
            scheduler_enabled: std::env::var("TENDER_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            scraper_cron: std::env::var("SCRAPER_CRON").unwrap_or(defaults.scraper_cron),
            portal: PortalConfig::from_env(),
            ai: AiConfig::from_env(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
