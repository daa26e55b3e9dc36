use tender_core::DocumentType;

use crate::archive::base_name;

const AVIS_KEYWORDS: &[&str] = &[
    "avis de consultation",
    "avis d'appel d'offres",
    "avis d'appel",
    "avis appel offres",
    "avis ao",
];

const RC_KEYWORDS: &[&str] = &[
    "règlement de consultation",
    "reglement de consultation",
    "règlement de la consultation",
    "reglement de la consultation",
];

const CPS_KEYWORDS: &[&str] = &[
    "cahier des prescriptions spéciales",
    "cahier des prescriptions speciales",
    "cahier des clauses",
];

const ANNEXE_KEYWORDS: &[&str] = &["annexe", "additif", "avenant"];

/// Tokens that mark a file as something other than the notice even when its
/// name also says "avis".
const AVIS_EXCLUSIONS: &[&str] = &["rc", "cps", "ccaf", "rcdp", "rcdg"];

/// Lowercased stem split on every non-alphanumeric character, so `_`, `-`
/// and spaces all separate tokens (`Avis_RC` is `avis` + `rc`).
fn filename_tokens(filename: &str) -> Vec<String> {
    let base = base_name(filename).to_lowercase();
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => base,
    };
    stem.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn filename_type(filename: &str) -> Option<DocumentType> {
    let tokens = filename_tokens(filename);
    let has = |candidates: &[&str]| tokens.iter().any(|t| candidates.contains(&t.as_str()));

    let says_avis = has(&["avis", "avisfr", "avisar"]);
    if says_avis && !has(AVIS_EXCLUSIONS) {
        return Some(DocumentType::Avis);
    }
    if has(&["rc", "rcdp", "rcdg"]) {
        return Some(DocumentType::Rc);
    }
    if has(&["cps", "ccaf", "cctp"]) {
        return Some(DocumentType::Cps);
    }
    if has(&["annexe"]) {
        return Some(DocumentType::Annexe);
    }
    None
}

fn keyword_type(text: &str) -> Option<DocumentType> {
    let lower = text.to_lowercase();
    let table = [
        (DocumentType::Avis, AVIS_KEYWORDS),
        (DocumentType::Rc, RC_KEYWORDS),
        (DocumentType::Cps, CPS_KEYWORDS),
        (DocumentType::Annexe, ANNEXE_KEYWORDS),
    ];
    table
        .into_iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(doc_type, _)| doc_type)
}

/// Rule-based classification, AVIS > RC > CPS > ANNEXE: filename tokens win
/// over first-page keywords. `Unknown` leaves the decision to the caller.
pub fn classify(filename: &str, first_page_text: &str) -> DocumentType {
    filename_type(filename)
        .or_else(|| keyword_type(first_page_text))
        .unwrap_or(DocumentType::Unknown)
}
