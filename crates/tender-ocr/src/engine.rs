use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{OcrEngine, OcrError};

/// Maps service language codes to Tesseract traineddata names; `fr+ar`
/// combinations are mapped piecewise and unknown codes pass through.
pub fn tesseract_lang(lang: &str) -> String {
    lang.split('+')
        .map(|code| match code.trim().to_ascii_lowercase().as_str() {
            "" | "fr" | "french" => "fra".to_string(),
            "en" | "english" => "eng".to_string(),
            "ar" | "arabic" => "ara".to_string(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("+")
}

/// `pdftoppm` renders pages, `tesseract` reads them.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    tesseract: String,
    pdftoppm: String,
    dpi: u32,
}

impl TesseractEngine {
    pub fn new(dpi: u32) -> Self {
        Self {
            tesseract: "tesseract".to_string(),
            pdftoppm: "pdftoppm".to_string(),
            dpi,
        }
    }

    async fn run(tool: &'static str, command: &mut Command) -> Result<Vec<u8>, OcrError> {
        let output = command.output().await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                OcrError::ToolMissing(tool)
            } else {
                OcrError::Io(err)
            }
        })?;
        if !output.status.success() {
            return Err(OcrError::ToolFailed {
                tool,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn read_file(&self, path: &Path, lang: &str) -> Result<String, OcrError> {
        let stdout = Self::run(
            "tesseract",
            Command::new(&self.tesseract)
                .arg(path)
                .arg("stdout")
                .arg("-l")
                .arg(tesseract_lang(lang)),
        )
        .await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    async fn render_pages(
        &self,
        pdf: &Path,
        dir: &Path,
        first_page_only: bool,
    ) -> Result<Vec<PathBuf>, OcrError> {
        let mut command = Command::new(&self.pdftoppm);
        command.arg("-r").arg(self.dpi.to_string()).arg("-png");
        if first_page_only {
            command.args(["-f", "1", "-l", "1"]);
        }
        command.arg(pdf).arg(dir.join("page"));
        Self::run("pdftoppm", &mut command).await?;

        let mut pages = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_page = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("page") && n.ends_with(".png"));
            if is_page {
                pages.push(path);
            }
        }
        // pdftoppm zero-pads page numbers, so names sort in page order.
        pages.sort();
        Ok(pages)
    }
}

fn on_path(program: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn is_ready(&self) -> bool {
        on_path(&self.tesseract) && on_path(&self.pdftoppm)
    }

    async fn recognize_image(&self, bytes: &[u8], lang: &str) -> Result<String, OcrError> {
        let dir = tempfile::Builder::new().prefix("tender_ocr_").tempdir()?;
        let input = dir.path().join("input.img");
        tokio::fs::write(&input, bytes).await?;
        self.read_file(&input, lang).await
    }

    async fn recognize_pdf(
        &self,
        bytes: &[u8],
        lang: &str,
        first_page_only: bool,
    ) -> Result<Vec<String>, OcrError> {
        let dir = tempfile::Builder::new().prefix("tender_ocr_").tempdir()?;
        let input = dir.path().join("input.pdf");
        tokio::fs::write(&input, bytes).await?;

        let pages = self.render_pages(&input, dir.path(), first_page_only).await?;
        if pages.is_empty() {
            return Err(OcrError::NoPages);
        }
        info!(pages = pages.len(), dpi = self.dpi, "pdf rendered");

        let mut texts = Vec::with_capacity(pages.len());
        for page in &pages {
            let text = self.read_file(page, lang).await?;
            debug!(page = %page.display(), chars = text.len(), "page recognized");
            texts.push(text);
        }
        Ok(texts)
    }
}
