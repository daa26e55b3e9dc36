#[derive(Debug, Clone)]
pub struct OcrServiceConfig {
    pub port: u16,
    pub default_lang: String,
    pub dpi: u32,
    pub max_upload_bytes: usize,
}

impl Default for OcrServiceConfig {
    fn default() -> Self {
        Self {
            port: 8765,
            default_lang: "fr".to_string(),
            dpi: 200,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

impl OcrServiceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: std::env::var("OCR_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            default_lang: std::env::var("OCR_DEFAULT_LANG").unwrap_or(defaults.default_lang),
            dpi: std::env::var("OCR_DPI")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.dpi),
            max_upload_bytes: std::env::var("OCR_MAX_UPLOAD_MB")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.max_upload_bytes),
        }
    }
}
