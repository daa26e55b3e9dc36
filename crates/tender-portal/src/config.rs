use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub homepage: String,
    /// Used when the homepage has no "Consultations en cours" link.
    pub search_url: String,
    pub link_prefix: String,
    pub category: String,
    pub form_nom: String,
    pub form_prenom: String,
    pub form_email: String,
    pub page_timeout: Duration,
    pub download_timeout: Duration,
    pub user_agent: String,
    /// Minimum spacing between portal requests after an initial burst of 8;
    /// zero disables pacing.
    pub request_interval: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            homepage: "https://www.marchespublics.gov.ma/index.php?page=entreprise.EntrepriseHome"
                .to_string(),
            search_url:
                "https://www.marchespublics.gov.ma/index.php?page=entreprise.EntrepriseAdvancedSearch&searchAnnCons"
                    .to_string(),
            link_prefix:
                "https://www.marchespublics.gov.ma/index.php?page=entreprise.EntrepriseDetailConsultation"
                    .to_string(),
            category: "2".to_string(),
            form_nom: "Tender".to_string(),
            form_prenom: "Platform".to_string(),
            form_email: "tenders@example.com".to_string(),
            page_timeout: Duration::from_millis(60_000),
            download_timeout: Duration::from_millis(120_000),
            user_agent: "Mozilla/5.0 (compatible; tender-platform/0.1)".to_string(),
            request_interval: Duration::from_millis(250),
        }
    }
}

impl PortalConfig {
    /// Timeouts are read in milliseconds.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            homepage: std::env::var("TARGET_HOMEPAGE").unwrap_or(defaults.homepage),
            search_url: std::env::var("TARGET_SEARCH_URL").unwrap_or(defaults.search_url),
            link_prefix: std::env::var("TARGET_LINK_PREFIX").unwrap_or(defaults.link_prefix),
            category: std::env::var("CATEGORY_FILTER").unwrap_or(defaults.category),
            form_nom: std::env::var("FORM_NOM").unwrap_or(defaults.form_nom),
            form_prenom: std::env::var("FORM_PRENOM").unwrap_or(defaults.form_prenom),
            form_email: std::env::var("FORM_EMAIL").unwrap_or(defaults.form_email),
            page_timeout: env_millis("SCRAPER_TIMEOUT_PAGE").unwrap_or(defaults.page_timeout),
            download_timeout: env_millis("SCRAPER_TIMEOUT_DOWNLOAD")
                .unwrap_or(defaults.download_timeout),
            user_agent: std::env::var("TENDER_USER_AGENT").unwrap_or(defaults.user_agent),
            request_interval: env_millis("SCRAPER_REQUEST_INTERVAL")
                .unwrap_or(defaults.request_interval),
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}
