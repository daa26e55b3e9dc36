//! Phased metadata schemas and the provenance wrapper they are built from.

use serde::{Deserialize, Deserializer, Serialize};

/// Where an extracted value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceDocument {
    Avis,
    Rc,
    Cps,
    Annexe,
    Website,
}

impl SourceDocument {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Avis => "AVIS",
            Self::Rc => "RC",
            Self::Cps => "CPS",
            Self::Annexe => "ANNEXE",
            Self::Website => "WEBSITE",
        }
    }

    /// Lenient parse used for model output; unknown labels yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "AVIS" => Some(Self::Avis),
            "RC" => Some(Self::Rc),
            "CPS" => Some(Self::Cps),
            "ANNEXE" => Some(Self::Annexe),
            "WEBSITE" => Some(Self::Website),
            _ => None,
        }
    }
}

/// Extracted value paired with its provenance.
///
/// `value` may be null while a source is recorded: the document was read but
/// did not state the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedValue<T> {
    pub value: Option<T>,
    pub source_document: Option<SourceDocument>,
    pub source_date: Option<String>,
}

impl<T> Default for TrackedValue<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> TrackedValue<T> {
    pub fn empty() -> Self {
        Self {
            value: None,
            source_document: None,
            source_date: None,
        }
    }

    pub fn new(value: T, source_document: SourceDocument) -> Self {
        Self {
            value: Some(value),
            source_document: Some(source_document),
            source_date: None,
        }
    }

    pub fn with_source_date(mut self, source_date: impl Into<String>) -> Self {
        self.source_date = Some(source_date.into());
        self
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

// Accepts `{value, source_document, source_date}`, a bare value, or null.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for TrackedValue<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr<T> {
            Tracked {
                value: Option<T>,
                #[serde(default)]
                source_document: Option<String>,
                #[serde(default)]
                source_date: Option<String>,
            },
            Bare(Option<T>),
        }

        Ok(match Repr::<T>::deserialize(deserializer)? {
            Repr::Tracked {
                value,
                source_document,
                source_date,
            } => Self {
                value,
                source_document: source_document.as_deref().and_then(SourceDocument::parse),
                source_date,
            },
            Repr::Bare(value) => Self {
                value,
                source_document: None,
                source_date: None,
            },
        })
    }
}

/// Tracked amount that also carries the currency the document states.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MonetaryValue {
    pub value: Option<String>,
    pub currency: Option<String>,
    pub source_document: Option<SourceDocument>,
    pub source_date: Option<String>,
}

impl<'de> Deserialize<'de> for MonetaryValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Tracked {
                value: Option<String>,
                #[serde(default)]
                currency: Option<String>,
                #[serde(default)]
                source_document: Option<String>,
                #[serde(default)]
                source_date: Option<String>,
            },
            Bare(Option<String>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Tracked {
                value,
                currency,
                source_document,
                source_date,
            } => Self {
                value,
                currency,
                source_document: source_document.as_deref().and_then(SourceDocument::parse),
                source_date,
            },
            Repr::Bare(value) => Self {
                value,
                ..Self::default()
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionDeadline {
    pub date: TrackedValue<String>,
    pub time: TrackedValue<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Keywords {
    #[serde(deserialize_with = "null_as_default")]
    pub keywords_fr: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub keywords_eng: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub keywords_ar: Vec<String>,
}

impl Keywords {
    pub fn iter_all(&self) -> impl Iterator<Item = &str> {
        self.keywords_fr
            .iter()
            .chain(&self.keywords_eng)
            .chain(&self.keywords_ar)
            .map(String::as_str)
    }
}

/// Line item of a lot; only produced by deep analysis.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenderItem {
    pub item_name: TrackedValue<String>,
    pub quantity: TrackedValue<String>,
    pub technical_description_full: TrackedValue<String>,
}

/// A lot. The phase-2 fields stay `None` until deep analysis has run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenderLot {
    pub lot_number: TrackedValue<String>,
    pub lot_subject: TrackedValue<String>,
    pub lot_estimated_value: TrackedValue<String>,
    pub caution_provisoire: TrackedValue<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caution_definitive_percentage: Option<TrackedValue<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_caution_definitive_value: Option<TrackedValue<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_date: Option<TrackedValue<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<TenderItem>>,
}

impl TenderLot {
    /// Computes the definitive bond from the lot value and the stated
    /// percentage. Does nothing unless both parse and no value is set yet.
    pub fn fill_caution_definitive(&mut self) -> bool {
        if self
            .estimated_caution_definitive_value
            .as_ref()
            .is_some_and(TrackedValue::is_present)
        {
            return false;
        }
        let Some(base) = self.lot_estimated_value.get().and_then(|v| parse_amount(v)) else {
            return false;
        };
        let Some(percentage) = &self.caution_definitive_percentage else {
            return false;
        };
        let Some(rate) = percentage.get().and_then(|v| parse_amount(v)) else {
            return false;
        };

        self.estimated_caution_definitive_value = Some(TrackedValue {
            value: Some(format_amount(base * rate / 100.0)),
            source_document: percentage.source_document,
            source_date: percentage.source_date.clone(),
        });
        true
    }

    pub fn is_deep_analyzed(&self) -> bool {
        self.items.is_some()
    }
}

/// Phase-1 metadata extracted from the AVIS alone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AvisMetadata {
    pub reference_tender: TrackedValue<String>,
    pub tender_type: TrackedValue<String>,
    pub issuing_institution: TrackedValue<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub submission_deadline: SubmissionDeadline,
    pub folder_opening_location: TrackedValue<String>,
    pub subject: TrackedValue<String>,
    pub total_estimated_value: MonetaryValue,
    #[serde(deserialize_with = "null_as_default")]
    pub lots: Vec<TenderLot>,
    #[serde(deserialize_with = "null_as_default")]
    pub keywords: Keywords,
}

impl AvisMetadata {
    /// Records the publication date on the top-level tracked fields.
    pub fn stamp_source_date(&mut self, source_date: &str) {
        for field in [
            &mut self.reference_tender,
            &mut self.tender_type,
            &mut self.issuing_institution,
            &mut self.folder_opening_location,
            &mut self.subject,
        ] {
            if field.is_present() {
                field.source_date = Some(source_date.to_string());
            }
        }
        if self.total_estimated_value.value.is_some() {
            self.total_estimated_value.source_date = Some(source_date.to_string());
        }
    }
}

/// Phase-2 metadata: the AVIS fields re-read across every document, plus the
/// institution address and per-lot item detail.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UniversalMetadata {
    pub reference_tender: TrackedValue<String>,
    pub tender_type: TrackedValue<String>,
    pub issuing_institution: TrackedValue<String>,
    pub institution_address: TrackedValue<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub submission_deadline: SubmissionDeadline,
    pub folder_opening_location: TrackedValue<String>,
    pub subject: TrackedValue<String>,
    pub total_estimated_value: MonetaryValue,
    #[serde(deserialize_with = "null_as_default")]
    pub lots: Vec<TenderLot>,
}

impl UniversalMetadata {
    /// Returns how many lots received a computed definitive bond.
    pub fn fill_computed_fields(&mut self) -> usize {
        self.lots
            .iter_mut()
            .map(TenderLot::fill_caution_definitive)
            .filter(|filled| *filled)
            .count()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parses the first number in a French- or English-formatted amount such as
/// `1 200 000,00 MAD`, `1.200.000,50` or `3 %`.
pub fn parse_amount(text: &str) -> Option<f64> {
    let mut run = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            run.push(ch);
        } else if run.is_empty() {
            continue;
        } else if matches!(ch, '.' | ',') {
            run.push(ch);
        } else if matches!(ch, ' ' | '\u{a0}' | '\u{202f}') {
            continue;
        } else {
            break;
        }
    }
    let run = run.trim_end_matches(['.', ',']);
    if run.is_empty() {
        return None;
    }

    let normalized = match (run.rfind(','), run.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => run.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => run.replace(',', ""),
        (Some(comma), None) => {
            if run.matches(',').count() == 1 && run.len() - comma - 1 != 3 {
                run.replace(',', ".")
            } else {
                run.replace(',', "")
            }
        }
        (None, Some(dot)) => {
            if run.matches('.').count() == 1 && run.len() - dot - 1 != 3 {
                run.to_string()
            } else {
                run.replace('.', "")
            }
        }
        (None, None) => run.to_string(),
    };
    normalized.parse().ok()
}

pub fn format_amount(value: f64) -> String {
    format!("{value:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tracked_value_accepts_tracked_bare_and_null_forms() {
        let tracked: TrackedValue<String> = serde_json::from_value(json!({
            "value": "AO-12/2026",
            "source_document": "AVIS",
            "source_date": "2026-03-01"
        }))
        .unwrap();
        assert_eq!(tracked.get().map(String::as_str), Some("AO-12/2026"));
        assert_eq!(tracked.source_document, Some(SourceDocument::Avis));

        let bare: TrackedValue<String> = serde_json::from_value(json!("AOON")).unwrap();
        assert_eq!(bare.value.as_deref(), Some("AOON"));
        assert_eq!(bare.source_document, None);

        let null: TrackedValue<String> = serde_json::from_value(json!(null)).unwrap();
        assert!(!null.is_present());
    }

    #[test]
    fn tracked_value_keeps_source_without_value() {
        let tracked: TrackedValue<String> = serde_json::from_value(json!({
            "value": null,
            "source_document": "cps"
        }))
        .unwrap();
        assert!(!tracked.is_present());
        assert_eq!(tracked.source_document, Some(SourceDocument::Cps));
    }

    #[test]
    fn avis_metadata_tolerates_missing_and_null_sections() {
        let meta: AvisMetadata = serde_json::from_value(json!({
            "subject": {"value": "Fourniture de matériel informatique", "source_document": "AVIS"},
            "submission_deadline": null,
            "lots": null,
            "total_estimated_value": {"value": "250 000,00", "currency": "MAD"}
        }))
        .unwrap();
        assert_eq!(
            meta.subject.value.as_deref(),
            Some("Fourniture de matériel informatique")
        );
        assert!(meta.lots.is_empty());
        assert!(!meta.submission_deadline.date.is_present());
        assert_eq!(meta.total_estimated_value.currency.as_deref(), Some("MAD"));
        assert!(meta.keywords.keywords_fr.is_empty());
    }

    #[test]
    fn stamping_source_date_touches_top_level_fields() {
        let mut meta = AvisMetadata {
            subject: TrackedValue::new("Travaux".to_string(), SourceDocument::Avis),
            total_estimated_value: MonetaryValue {
                value: Some("100 000,00".to_string()),
                ..MonetaryValue::default()
            },
            ..AvisMetadata::default()
        };
        meta.stamp_source_date("2026-02-10");
        assert_eq!(meta.subject.source_date.as_deref(), Some("2026-02-10"));
        assert_eq!(
            meta.total_estimated_value.source_date.as_deref(),
            Some("2026-02-10")
        );
        assert_eq!(meta.submission_deadline.date.source_date, None);
    }

    #[test]
    fn stamping_source_date_skips_null_fields() {
        let mut meta: AvisMetadata = serde_json::from_value(json!({
            "reference_tender": {"value": "12/2026", "source_document": "AVIS"},
            "tender_type": {"value": null, "source_document": "AVIS"},
            "total_estimated_value": {"value": null, "currency": "MAD"}
        }))
        .unwrap();
        meta.stamp_source_date("2026-02-10");
        assert_eq!(meta.reference_tender.source_date.as_deref(), Some("2026-02-10"));
        assert_eq!(meta.tender_type.source_date, None);
        assert_eq!(meta.issuing_institution.source_date, None);
        assert_eq!(meta.total_estimated_value.source_date, None);

        let value = serde_json::to_value(&meta).unwrap();
        assert!(value["tender_type"]["source_date"].is_null());
    }

    #[test]
    fn phase_two_lot_fields_are_omitted_until_present() {
        let lot = TenderLot::default();
        let value = serde_json::to_value(&lot).unwrap();
        assert!(value.get("items").is_none());
        assert!(value.get("caution_definitive_percentage").is_none());
        assert!(value.get("lot_number").is_some());
    }

    #[test]
    fn amounts_parse_in_common_formats() {
        assert_eq!(parse_amount("1 200 000,00 MAD"), Some(1_200_000.0));
        assert_eq!(parse_amount("1.200.000,50"), Some(1_200_000.5));
        assert_eq!(parse_amount("1,200,000.50"), Some(1_200_000.5));
        assert_eq!(parse_amount("3 %"), Some(3.0));
        assert_eq!(parse_amount("1,5%"), Some(1.5));
        assert_eq!(parse_amount("10.000 DH"), Some(10_000.0));
        assert_eq!(parse_amount("néant"), None);
    }

    #[test]
    fn caution_definitive_requires_both_inputs() {
        let mut lot = TenderLot {
            lot_estimated_value: TrackedValue::new("1 200 000,00 MAD".into(), SourceDocument::Cps),
            ..TenderLot::default()
        };
        assert!(!lot.fill_caution_definitive());
        assert!(lot.estimated_caution_definitive_value.is_none());

        lot.caution_definitive_percentage = Some(TrackedValue::new("3%".into(), SourceDocument::Rc));
        assert!(lot.fill_caution_definitive());
        let computed = lot.estimated_caution_definitive_value.clone().unwrap();
        assert_eq!(computed.value.as_deref(), Some("36000.00"));
        assert_eq!(computed.source_document, Some(SourceDocument::Rc));

        assert!(!lot.fill_caution_definitive());
    }

    #[test]
    fn caution_definitive_is_not_overwritten() {
        let mut lot = TenderLot {
            lot_estimated_value: TrackedValue::new("100000".into(), SourceDocument::Cps),
            caution_definitive_percentage: Some(TrackedValue::new("3".into(), SourceDocument::Cps)),
            estimated_caution_definitive_value: Some(TrackedValue::new(
                "2500.00".into(),
                SourceDocument::Cps,
            )),
            ..TenderLot::default()
        };
        assert!(!lot.fill_caution_definitive());
        assert_eq!(
            lot.estimated_caution_definitive_value.unwrap().value.as_deref(),
            Some("2500.00")
        );
    }
}
