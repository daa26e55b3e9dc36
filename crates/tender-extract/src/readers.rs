//! Per-format text readers. Everything here is synchronous and in-memory
//! except the `antiword` call.

use std::io::{Cursor, Read, Write};
use std::time::Duration;

use calamine::{open_workbook_auto_from_rs, Reader};
use quick_xml::events::Event;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::ExtractError;

pub(crate) const DOCX_FIRST_PAGE_CHARS: usize = 1000;
pub(crate) const SHEET_FIRST_PAGE_ROWS: usize = 20;
pub(crate) const TXT_FIRST_PAGE_BYTES: usize = 2000;
const ANTIWORD_TIMEOUT: Duration = Duration::from_secs(60);
const DOC_MIN_FALLBACK_CHARS: usize = 100;

pub(crate) struct PdfText {
    pub pages: Vec<String>,
}

impl PdfText {
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn first_page(&self) -> &str {
        self.pages.first().map(String::as_str).unwrap_or("")
    }

    pub fn joined(&self) -> String {
        self.pages.join("\n\n")
    }
}

/// Digital text of every page; unreadable pages come back empty.
pub(crate) fn read_pdf(bytes: &[u8]) -> Result<PdfText, ExtractError> {
    let doc = lopdf::Document::load_mem(bytes)?;
    let pages = doc
        .get_pages()
        .keys()
        .map(|&number| match doc.extract_text(&[number]) {
            Ok(text) => text,
            Err(err) => {
                debug!(page = number, error = %err, "pdf page has no extractable text");
                String::new()
            }
        })
        .collect();
    Ok(PdfText { pages })
}

#[derive(Debug, Default)]
pub(crate) struct DocxText {
    pub paragraphs: Vec<String>,
    pub table_rows: Vec<String>,
}

impl DocxText {
    /// Body paragraphs, then table rows with `|`-separated cells.
    pub fn full(&self) -> String {
        self.paragraphs
            .iter()
            .chain(self.table_rows.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Leading paragraphs up to the first one that crosses the budget.
    pub fn first_page(&self) -> String {
        let mut out = Vec::new();
        let mut chars = 0;
        for paragraph in &self.paragraphs {
            out.push(paragraph.as_str());
            chars += paragraph.chars().count();
            if chars > DOCX_FIRST_PAGE_CHARS {
                break;
            }
        }
        out.join("\n")
    }
}

pub(crate) fn read_docx(bytes: &[u8]) -> Result<DocxText, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("missing word/document.xml".into()))?
        .read_to_string(&mut xml)?;
    parse_document_xml(&xml)
}

fn parse_document_xml(xml: &str) -> Result<DocxText, ExtractError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut out = DocxText::default();
    let mut table_depth = 0usize;
    let mut paragraph = String::new();
    let mut cell = String::new();
    let mut row: Vec<String> = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"tbl" => table_depth += 1,
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" | b"cr" => paragraph.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => paragraph.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = std::mem::take(&mut paragraph);
                    if table_depth == 0 {
                        out.paragraphs.push(text);
                    } else {
                        if !cell.is_empty() {
                            cell.push('\n');
                        }
                        cell.push_str(&text);
                    }
                }
                b"tc" if table_depth == 1 => row.push(std::mem::take(&mut cell)),
                b"tr" if table_depth == 1 => {
                    out.table_rows.push(std::mem::take(&mut row).join(" | "));
                }
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

pub(crate) struct SheetText {
    pub sheets: Vec<(String, Vec<String>)>,
}

impl SheetText {
    /// Every sheet under a `=== Sheet: name ===` header.
    pub fn full(&self) -> String {
        let mut lines = Vec::new();
        for (name, rows) in &self.sheets {
            lines.push(format!("=== Sheet: {name} ==="));
            lines.extend(rows.iter().cloned());
        }
        lines.join("\n")
    }

    pub fn first_page(&self) -> String {
        self.sheets
            .first()
            .map(|(_, rows)| {
                rows.iter()
                    .take(SHEET_FIRST_PAGE_ROWS)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }
}

/// Non-empty rows of every sheet, cells joined with ` | `.
pub(crate) fn read_spreadsheet(bytes: &[u8]) -> Result<SheetText, ExtractError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        let rows = range
            .rows()
            .map(|cells| cells.iter().map(|c| c.to_string()).collect::<Vec<_>>())
            .filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
            .map(|cells| cells.join(" | "))
            .collect();
        sheets.push((name, rows));
    }
    Ok(SheetText { sheets })
}

pub(crate) fn read_txt(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

pub(crate) fn txt_first_page(bytes: &[u8]) -> String {
    read_txt(&bytes[..bytes.len().min(TXT_FIRST_PAGE_BYTES)])
}

/// Legacy Word binary: `antiword` when installed, printable runs otherwise.
pub(crate) async fn read_doc(bytes: &[u8]) -> Result<String, ExtractError> {
    match antiword(bytes).await {
        Ok(text) if !text.trim().is_empty() => return Ok(text),
        Ok(_) => debug!("antiword produced no text"),
        Err(err) => warn!(error = %err, "antiword unavailable, scanning printable runs"),
    }
    let text = printable_runs(bytes);
    if text.chars().count() > DOC_MIN_FALLBACK_CHARS {
        Ok(text)
    } else {
        Err(ExtractError::Doc(
            "no readable text (install antiword for better support)".into(),
        ))
    }
}

async fn antiword(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut file = tempfile::Builder::new().suffix(".doc").tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;

    let output = tokio::time::timeout(
        ANTIWORD_TIMEOUT,
        Command::new("antiword").arg(file.path()).output(),
    )
    .await
    .map_err(|_| ExtractError::Doc("antiword timed out".into()))??;

    if !output.status.success() {
        return Err(ExtractError::Doc(format!(
            "antiword exited with {}",
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn is_doc_text_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c.is_whitespace()
        || ('\u{c0}'..='\u{ff}').contains(&c)
        || ".,;:-()".contains(c)
}

/// Runs of at least four text-like Latin-1 characters, whitespace collapsed.
fn printable_runs(bytes: &[u8]) -> String {
    let decoded = bytes.iter().map(|&b| b as char).collect::<String>();
    let mut runs = Vec::new();
    let mut current = String::new();
    for c in decoded.chars() {
        if is_doc_text_char(c) {
            current.push(c);
        } else {
            if current.chars().count() >= 4 {
                runs.push(std::mem::take(&mut current));
            }
            current.clear();
        }
    }
    if current.chars().count() >= 4 {
        runs.push(current);
    }
    runs.join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
