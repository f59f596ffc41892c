// Registry and RSVP records
//
// GiftItem.contributed is the running sum of contributions[*].amount and never
// exceeds total for ledger-mediated writes.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// GIFT REGISTRY
// ============================================================================

/// One pledge toward a registry item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub contributor_name: String,
    pub amount: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Contribution {
    /// New contribution stamped with the current time
    pub fn new(contributor_name: impl Into<String>, amount: f64) -> Self {
        Self {
            contributor_name: contributor_name.into(),
            amount,
            timestamp: Utc::now(),
        }
    }

    pub fn at(contributor_name: impl Into<String>, amount: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            contributor_name: contributor_name.into(),
            amount,
            timestamp,
        }
    }
}

/// A gift the couple requests, with its funding target and received contributions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftItem {
    pub id: String,
    pub name: String,
    pub link: String,
    pub total: f64,
    #[serde(default)]
    pub contributed: f64,
    #[serde(default)]
    pub contributions: Vec<Contribution>,
}

impl GiftItem {
    /// Unfunded item with no contributions
    pub fn new(id: impl Into<String>, name: impl Into<String>, link: impl Into<String>, total: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            link: link.into(),
            total,
            contributed: 0.0,
            contributions: Vec::new(),
        }
    }

    /// Append a contribution and bump the running total
    pub fn push_contribution(&mut self, contribution: Contribution) {
        self.contributed += contribution.amount;
        self.contributions.push(contribution);
    }

    pub fn is_fully_funded(&self) -> bool {
        self.contributed >= self.total
    }

    /// Sum of the stored contribution amounts
    #[cfg(test)]
    pub(crate) fn contributions_sum(&self) -> f64 {
        self.contributions.iter().map(|c| c.amount).sum()
    }
}

/// Body of POST /registry/contribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionCreate {
    pub item_id: String,
    pub contributor_name: String,
    pub amount: f64,
}

/// Aggregate counts reported by a bulk reload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkLoadSummary {
    pub items_count: usize,
    pub total_contributions: usize,
}

// ============================================================================
// RSVP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rsvp {
    pub id: String,
    pub name: String,
    pub pax: i64,
    pub wishes: String,
    pub timestamp: DateTime<Utc>,
}

/// Body of POST /rsvp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsvpCreate {
    pub name: String,
    pub pax: i64,
    pub wishes: String,
}

impl From<RsvpCreate> for Rsvp {
    fn from(input: RsvpCreate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: input.name,
            pax: input.pax,
            wishes: input.wishes,
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Registry id for a display name: lowercased, spaces replaced by hyphens
///
/// "Electric Grinder" -> "electric-grinder"
pub fn derive_item_id(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

/// Storage form of a timestamp (RFC 3339, `Z` suffix)
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse an ISO-8601 timestamp
///
/// Accepts RFC 3339 with `Z` or a numeric offset, and naive date-times or
/// bare dates which are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
