use serde_json::Value;
use tender_core::{Citation, DocumentType};

/// Strips a Markdown code fence (```json or bare ```) around a JSON reply.
pub fn strip_json_fences(reply: &str) -> &str {
    let inner = if let Some((_, rest)) = reply.split_once("```json") {
        rest
    } else if let Some((_, rest)) = reply.split_once("```") {
        rest
    } else {
        return reply.trim();
    };
    match inner.split_once("```") {
        Some((body, _)) => body.trim(),
        None => inner.trim(),
    }
}

/// Models emit amounts and counts as numbers or booleans where the schema
/// wants strings; nulls, arrays and objects are kept.
pub fn normalize_scalars(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_scalars).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_scalars(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Every `[Document: NAME]` or `[Document: NAME, SECTION]` marker, in order.
pub fn parse_citations(answer: &str) -> Vec<Citation> {
    const MARKER: &str = "[Document:";
    let mut citations = Vec::new();
    let mut rest = answer;
    while let Some(start) = rest.find(MARKER) {
        let after = &rest[start + MARKER.len()..];
        let Some(end) = after.find(']') else {
            break;
        };
        let inner = &after[..end];
        rest = &after[end + 1..];

        let (document, section) = match inner.split_once(',') {
            Some((doc, section)) => (doc.trim(), Some(section.trim())),
            None => (inner.trim(), None),
        };
        if document.is_empty() {
            continue;
        }
        citations.push(Citation {
            document: document.to_string(),
            section: section.filter(|s| !s.is_empty()).map(str::to_string),
        });
    }
    citations
}

/// Maps a one-word classification reply; anything else is `Unknown`.
pub fn parse_document_type(reply: &str) -> DocumentType {
    let word = reply
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_ascii_uppercase();
    DocumentType::parse(&word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_json_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fences("Voici:\n```\n{}\n```\nfin"), "{}");
        assert_eq!(strip_json_fences("  {\"b\":2} "), "{\"b\":2}");
        assert_eq!(strip_json_fences("```json\n{\"c\":3}"), "{\"c\":3}");
    }

    #[test]
    fn scalars_become_strings_recursively() {
        let value = normalize_scalars(json!({
            "lots": [{"lot_number": 1, "caution_provisoire": {"value": 5000.5}}],
            "flag": true,
            "missing": null,
        }));
        assert_eq!(value["lots"][0]["lot_number"], "1");
        assert_eq!(value["lots"][0]["caution_provisoire"]["value"], "5000.5");
        assert_eq!(value["flag"], "true");
        assert!(value["missing"].is_null());
    }

    #[test]
    fn citations_are_parsed_with_optional_section() {
        let answer = "La caution est de 3% [Document: CPS, Article 12] \
                      et le dépôt se fait en ligne [Document: AVIS]. [Document: ] [Document: RC";
        let citations = parse_citations(answer);
        assert_eq!(
            citations,
            vec![
                Citation {
                    document: "CPS".into(),
                    section: Some("Article 12".into())
                },
                Citation {
                    document: "AVIS".into(),
                    section: None
                },
            ]
        );
    }

    #[test]
    fn classification_reply_is_lenient() {
        assert_eq!(parse_document_type(" cps.\n"), DocumentType::Cps);
        assert_eq!(parse_document_type("**AVIS**"), DocumentType::Avis);
        assert_eq!(parse_document_type("Je ne sais pas"), DocumentType::Unknown);
    }
}
