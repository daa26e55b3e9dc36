use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::tender::{Tender, TenderStatus};

pub const DEFAULT_PER_PAGE: usize = 50;
pub const MAX_PER_PAGE: usize = 200;

/// List-view filter. Dates are `YYYY-MM-DD` and bound `download_date`
/// inclusively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderQuery {
    pub q: Option<String>,
    #[serde(default, deserialize_with = "status_filter")]
    pub status: Option<TenderStatus>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

/// Accepts any casing (`listed`, `Listed`); a blank value means no filter.
fn status_filter<'de, D>(deserializer: D) -> Result<Option<TenderStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => TenderStatus::from_str(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

impl TenderQuery {
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> usize {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    /// Rows to skip. Saturates at `i64::MAX` so any page number binds as a
    /// SQL `OFFSET`; pages past the end are simply empty.
    pub fn offset(&self) -> usize {
        (self.page() - 1)
            .saturating_mul(self.per_page())
            .min(i64::MAX as usize)
    }

    /// Search term, trimmed; blank terms are ignored.
    pub fn search_term(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    pub fn matches(&self, tender: &Tender) -> bool {
        if let Some(status) = self.status {
            if tender.status != status {
                return false;
            }
        }
        if let Some(from) = self.date_from.as_deref() {
            match tender.download_date.as_deref() {
                Some(date) if date >= from => {}
                _ => return false,
            }
        }
        if let Some(to) = self.date_to.as_deref() {
            match tender.download_date.as_deref() {
                Some(date) if date <= to => {}
                _ => return false,
            }
        }
        if let Some(term) = self.search_term() {
            let needle = term.to_lowercase();
            let haystacks = [
                tender.external_reference.as_deref(),
                tender.subject(),
                tender.issuing_institution(),
            ];
            if !haystacks
                .iter()
                .flatten()
                .any(|h| h.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        true
    }
}

/// Per-status counts for the list view header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderStats {
    pub total: usize,
    pub pending: usize,
    pub listed: usize,
    pub analyzed: usize,
    pub error: usize,
}

impl TenderStats {
    pub fn record(&mut self, status: TenderStatus, count: usize) {
        self.total += count;
        match status {
            TenderStatus::Pending => self.pending += count,
            TenderStatus::Listed => self.listed += count,
            TenderStatus::Analyzed => self.analyzed += count,
            TenderStatus::Error => self.error += count,
        }
    }

    pub fn tally<'a>(tenders: impl IntoIterator<Item = &'a Tender>) -> Self {
        let mut stats = Self::default();
        for tender in tenders {
            stats.record(tender.status, 1);
        }
        stats
    }
}
