use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tender_core::OcrResponse;
use tracing::{info, info_span, Instrument};

use crate::ExtractError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrScope {
    FirstPage,
    AllPages,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    pub pages: u32,
}

/// Recognizes text in scanned PDFs.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    async fn recognize_pdf(
        &self,
        filename: &str,
        bytes: &[u8],
        scope: OcrScope,
    ) -> Result<OcrOutput, ExtractError>;
}

/// Multipart client for the `tender-ocr` service.
#[derive(Debug, Clone)]
pub struct OcrClient {
    base_url: String,
    lang: String,
    client: reqwest::Client,
}

impl OcrClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            lang: "fr".to_string(),
            client,
        })
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn is_healthy(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn endpoint(&self, scope: OcrScope) -> String {
        match scope {
            OcrScope::FirstPage => format!("{}/ocr/pdf/first-page", self.base_url),
            OcrScope::AllPages => format!("{}/ocr/pdf", self.base_url),
        }
    }
}

#[async_trait]
impl OcrBackend for OcrClient {
    async fn recognize_pdf(
        &self,
        filename: &str,
        bytes: &[u8],
        scope: OcrScope,
    ) -> Result<OcrOutput, ExtractError> {
        let part = Part::bytes(bytes.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/pdf")?;
        let form = Form::new().part("file", part).text("lang", self.lang.clone());
        let url = self.endpoint(scope);

        let span = info_span!("ocr_request", %url, filename, ?scope);
        async {
            let body: OcrResponse = self
                .client
                .post(&url)
                .multipart(form)
                .send()
                .await?
                .json()
                .await?;
            if !body.success {
                return Err(ExtractError::Ocr(
                    body.error.unwrap_or_else(|| "unknown OCR failure".to_string()),
                ));
            }
            let output = OcrOutput {
                text: body.text.unwrap_or_default(),
                pages: body.pages.unwrap_or(0),
            };
            info!(
                pages = output.pages,
                seconds = body.processing_time.unwrap_or_default(),
                "ocr finished"
            );
            Ok::<_, ExtractError>(output)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_follow_scope() {
        let client = OcrClient::new("http://localhost:8765/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8765");
        assert_eq!(
            client.endpoint(OcrScope::AllPages),
            "http://localhost:8765/ocr/pdf"
        );
        assert_eq!(
            client.endpoint(OcrScope::FirstPage),
            "http://localhost:8765/ocr/pdf/first-page"
        );
    }
}
