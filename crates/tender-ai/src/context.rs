use tender_core::{DocumentType, TenderDocument};

pub(crate) const AVIS_MAX_CHARS: usize = 15_000;
pub(crate) const DEEP_PER_DOCUMENT_CHARS: usize = 8_000;
pub(crate) const DEEP_TOTAL_CHARS: usize = 30_000;
pub(crate) const ASK_PER_DOCUMENT_CHARS: usize = 5_000;
pub(crate) const ASK_TOTAL_CHARS: usize = 25_000;
const CLASSIFY_SCANNED_WORDS: usize = 500;
const CLASSIFY_DIGITAL_CHARS: usize = 2_000;

/// Prefix of at most `max` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Deep-analysis context: documents in authority order (ANNEXE, CPS, RC,
/// AVIS), each truncated, the whole capped. `None` when no document has text.
pub fn deep_analysis_context(documents: &[TenderDocument]) -> Option<String> {
    let mut parts = Vec::new();
    for doc_type in DocumentType::ANALYSIS_PRIORITY {
        for doc in documents
            .iter()
            .filter(|d| d.document_type == doc_type && !d.raw_text.trim().is_empty())
        {
            parts.push(format!(
                "=== {}: {} ===\n{}",
                doc_type,
                doc.filename,
                truncate_chars(&doc.raw_text, DEEP_PER_DOCUMENT_CHARS)
            ));
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(truncate_chars(&parts.join("\n\n"), DEEP_TOTAL_CHARS).to_string())
}

/// Question-answering context: every document with text, archive order.
pub fn ask_context(documents: &[TenderDocument]) -> String {
    let joined = documents
        .iter()
        .filter(|d| !d.raw_text.trim().is_empty())
        .map(|d| {
            format!(
                "=== Document: {} ({}) ===\n{}",
                d.document_type,
                d.filename,
                truncate_chars(&d.raw_text, ASK_PER_DOCUMENT_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_chars(&joined, ASK_TOTAL_CHARS).to_string()
}

/// OCR output is noisy and long, so scans are cut by words rather than
/// characters.
pub fn classification_excerpt(text: &str, is_scanned: bool) -> String {
    if is_scanned {
        text.split_whitespace()
            .take(CLASSIFY_SCANNED_WORDS)
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        truncate_chars(text, CLASSIFY_DIGITAL_CHARS).to_string()
    }
}
