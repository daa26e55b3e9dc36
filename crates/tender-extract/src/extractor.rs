use std::sync::Arc;

use chrono::Utc;
use tender_core::{DocumentType, ExtractionMethod, TenderDocument};
use tracing::{info, warn};
use uuid::Uuid;

use crate::archive::{unpack_archive, ArchiveEntry};
use crate::classify::classify;
use crate::format::DocumentFormat;
use crate::ocr::{OcrBackend, OcrScope};
use crate::readers;
use crate::ExtractError;

/// PDFs whose first page yields fewer digital characters are treated as scans.
pub const SCANNED_TEXT_THRESHOLD: usize = 100;

/// Result of the quick first-page pass used for classification.
#[derive(Debug, Clone, PartialEq)]
pub struct FirstPageScan {
    pub format: DocumentFormat,
    pub text: String,
    pub is_scanned: bool,
    pub document_type: DocumentType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    pub filename: String,
    pub document_type: DocumentType,
    pub first_page_text: String,
    pub text: String,
    pub is_scanned: bool,
    pub page_count: Option<u32>,
    pub extraction_method: ExtractionMethod,
    pub file_size_bytes: u64,
    pub mime_type: String,
}

impl ExtractedDocument {
    pub fn into_document(self, tender_id: Uuid) -> TenderDocument {
        TenderDocument {
            id: Uuid::new_v4(),
            tender_id,
            document_type: self.document_type,
            filename: self.filename,
            raw_text: self.text,
            page_count: self.page_count,
            extraction_method: self.extraction_method,
            file_size_bytes: self.file_size_bytes,
            mime_type: self.mime_type,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveExtraction {
    pub documents: Vec<ExtractedDocument>,
    pub skipped: Vec<SkippedEntry>,
}

impl ArchiveExtraction {
    /// First document classified as the notice, in archive order.
    pub fn avis(&self) -> Option<&ExtractedDocument> {
        self.documents
            .iter()
            .find(|d| d.document_type == DocumentType::Avis)
    }
}

/// Classifies and extracts every document in a tender archive.
#[derive(Clone, Default)]
pub struct DocumentExtractor {
    ocr: Option<Arc<dyn OcrBackend>>,
}

impl DocumentExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ocr(ocr: Arc<dyn OcrBackend>) -> Self {
        Self { ocr: Some(ocr) }
    }

    pub async fn scan_first_page(&self, entry: &ArchiveEntry) -> Result<FirstPageScan, ExtractError> {
        let format = DocumentFormat::from_filename(&entry.name);
        let (text, is_scanned) = match format {
            DocumentFormat::Pdf => self.pdf_first_page(entry).await,
            DocumentFormat::Docx => (readers::read_docx(&entry.bytes)?.first_page(), false),
            DocumentFormat::Doc => {
                let text = readers::read_doc(&entry.bytes).await?;
                (
                    text.chars().take(readers::DOCX_FIRST_PAGE_CHARS).collect(),
                    false,
                )
            }
            DocumentFormat::Xlsx | DocumentFormat::Xls => {
                (readers::read_spreadsheet(&entry.bytes)?.first_page(), false)
            }
            DocumentFormat::Txt => (readers::txt_first_page(&entry.bytes), false),
            DocumentFormat::Unsupported => {
                return Err(ExtractError::Unsupported(entry.base_name().to_string()))
            }
        };
        let document_type = classify(&entry.name, &text);
        Ok(FirstPageScan {
            format,
            text,
            is_scanned,
            document_type,
        })
    }

    async fn pdf_first_page(&self, entry: &ArchiveEntry) -> (String, bool) {
        let digital = match readers::read_pdf(&entry.bytes) {
            Ok(pdf) => pdf.first_page().to_string(),
            Err(err) => {
                warn!(file = %entry.name, error = %err, "pdf unreadable, treating as scanned");
                String::new()
            }
        };
        if digital.trim().chars().count() >= SCANNED_TEXT_THRESHOLD {
            return (digital, false);
        }
        if !digital.trim().is_empty() {
            return (digital, true);
        }
        let Some(ocr) = &self.ocr else {
            return (digital, true);
        };
        match ocr
            .recognize_pdf(entry.base_name(), &entry.bytes, OcrScope::FirstPage)
            .await
        {
            Ok(output) => (output.text, true),
            Err(err) => {
                warn!(file = %entry.name, error = %err, "first-page OCR failed");
                (String::new(), true)
            }
        }
    }

    pub async fn extract(
        &self,
        entry: &ArchiveEntry,
        scan: FirstPageScan,
    ) -> Result<ExtractedDocument, ExtractError> {
        let (text, page_count, method) = match scan.format {
            DocumentFormat::Pdf if scan.is_scanned => self.pdf_ocr(entry).await?,
            DocumentFormat::Pdf => {
                let pdf = readers::read_pdf(&entry.bytes)?;
                (pdf.joined(), Some(pdf.page_count()), ExtractionMethod::Digital)
            }
            DocumentFormat::Docx => (
                readers::read_docx(&entry.bytes)?.full(),
                None,
                ExtractionMethod::Digital,
            ),
            DocumentFormat::Doc => (
                readers::read_doc(&entry.bytes).await?,
                None,
                ExtractionMethod::Digital,
            ),
            DocumentFormat::Xlsx | DocumentFormat::Xls => (
                readers::read_spreadsheet(&entry.bytes)?.full(),
                None,
                ExtractionMethod::Digital,
            ),
            DocumentFormat::Txt => (
                readers::read_txt(&entry.bytes),
                None,
                ExtractionMethod::Digital,
            ),
            DocumentFormat::Unsupported => {
                return Err(ExtractError::Unsupported(entry.base_name().to_string()))
            }
        };
        Ok(ExtractedDocument {
            filename: entry.base_name().to_string(),
            document_type: scan.document_type,
            first_page_text: scan.text,
            text,
            is_scanned: scan.is_scanned,
            page_count,
            extraction_method: method,
            file_size_bytes: entry.bytes.len() as u64,
            mime_type: scan.format.mime_type().to_string(),
        })
    }

    /// Scanned PDF: OCR service when configured, whatever digital text
    /// exists otherwise.
    async fn pdf_ocr(
        &self,
        entry: &ArchiveEntry,
    ) -> Result<(String, Option<u32>, ExtractionMethod), ExtractError> {
        if let Some(ocr) = &self.ocr {
            match ocr
                .recognize_pdf(entry.base_name(), &entry.bytes, OcrScope::AllPages)
                .await
            {
                Ok(output) => return Ok((output.text, Some(output.pages), ExtractionMethod::Ocr)),
                Err(err) => warn!(file = %entry.name, error = %err, "full OCR failed"),
            }
        } else {
            warn!(file = %entry.name, "scanned pdf but no OCR service configured");
        }
        let pdf = readers::read_pdf(&entry.bytes)?;
        Ok((pdf.joined(), Some(pdf.page_count()), ExtractionMethod::Digital))
    }

    /// Unpacks the archive, scans and fully extracts every supported entry.
    /// Per-entry failures are reported in `skipped`.
    pub async fn process_archive(&self, bytes: &[u8]) -> Result<ArchiveExtraction, ExtractError> {
        let entries = unpack_archive(bytes)?;
        let mut out = ArchiveExtraction::default();
        for entry in &entries {
            let outcome = match self.scan_first_page(entry).await {
                Ok(scan) => self.extract(entry, scan).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(doc) => {
                    info!(
                        file = %doc.filename,
                        document_type = %doc.document_type,
                        scanned = doc.is_scanned,
                        chars = doc.text.chars().count(),
                        "document extracted"
                    );
                    out.documents.push(doc);
                }
                Err(err) => {
                    warn!(file = %entry.name, error = %err, "document skipped");
                    out.skipped.push(SkippedEntry {
                        filename: entry.base_name().to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::build_zip;
    use crate::ocr::OcrOutput;
    use crate::readers::tests::{build_docx, build_pdf, para};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubOcr {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrBackend for StubOcr {
        async fn recognize_pdf(
            &self,
            _filename: &str,
            _bytes: &[u8],
            scope: OcrScope,
        ) -> Result<OcrOutput, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = match scope {
                OcrScope::FirstPage => "AVIS DE CONSULTATION OUVERTE".to_string(),
                OcrScope::AllPages => {
                    "--- Page 1 ---\nAVIS DE CONSULTATION OUVERTE\n\n--- Page 2 ---\nSuite".to_string()
                }
            };
            Ok(OcrOutput { text, pages: 2 })
        }
    }

    fn long_text(prefix: &str) -> String {
        format!("{prefix} {}", "fourniture de materiel informatique ".repeat(5))
    }

    #[tokio::test]
    async fn digital_pdf_is_not_scanned() {
        let body = long_text("Avis de consultation ouverte");
        let entry = ArchiveEntry {
            name: "doc.pdf".into(),
            bytes: build_pdf(&[&body]),
        };
        let extractor = DocumentExtractor::new();
        let scan = extractor.scan_first_page(&entry).await.unwrap();
        assert!(!scan.is_scanned);
        assert_eq!(scan.document_type, DocumentType::Avis);

        let doc = extractor.extract(&entry, scan).await.unwrap();
        assert_eq!(doc.extraction_method, ExtractionMethod::Digital);
        assert_eq!(doc.page_count, Some(1));
        assert_eq!(doc.mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn scanned_pdf_goes_through_ocr() {
        let ocr = Arc::new(StubOcr {
            calls: AtomicUsize::new(0),
        });
        let extractor = DocumentExtractor::with_ocr(ocr.clone());
        let entry = ArchiveEntry {
            name: "scan001.pdf".into(),
            bytes: build_pdf(&["", ""]),
        };
        let scan = extractor.scan_first_page(&entry).await.unwrap();
        assert!(scan.is_scanned);
        assert_eq!(scan.document_type, DocumentType::Avis);

        let doc = extractor.extract(&entry, scan).await.unwrap();
        assert_eq!(doc.extraction_method, ExtractionMethod::Ocr);
        assert!(doc.text.starts_with("--- Page 1 ---"));
        assert_eq!(doc.page_count, Some(2));
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn scanned_pdf_without_ocr_keeps_digital_text() {
        let extractor = DocumentExtractor::new();
        let entry = ArchiveEntry {
            name: "avis.pdf".into(),
            bytes: build_pdf(&["court"]),
        };
        let scan = extractor.scan_first_page(&entry).await.unwrap();
        assert!(scan.is_scanned);
        let doc = extractor.extract(&entry, scan).await.unwrap();
        assert_eq!(doc.extraction_method, ExtractionMethod::Digital);
        assert_eq!(doc.document_type, DocumentType::Avis);
    }

    #[tokio::test]
    async fn archive_extraction_reports_skipped_entries() {
        let cps = build_docx(&para("Cahier des prescriptions spéciales"));
        let zip = build_zip(&[
            ("dossier/avis.txt", "Avis d'appel d'offres n° 5/2026".as_bytes()),
            ("dossier/piece.docx", cps.as_slice()),
            ("dossier/plan.dwg", b"binary"),
        ]);
        let result = DocumentExtractor::new().process_archive(&zip).await.unwrap();

        assert_eq!(result.documents.len(), 2);
        assert_eq!(result.avis().unwrap().filename, "avis.txt");
        assert_eq!(result.documents[1].document_type, DocumentType::Cps);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].filename, "plan.dwg");

        let tender_id = Uuid::new_v4();
        let stored = result.documents[0].clone().into_document(tender_id);
        assert_eq!(stored.tender_id, tender_id);
        assert_eq!(stored.mime_type, "text/plain");
    }
}
