// CSV schemas for registry uploads and admin exports
//
// Two upload layouts:
//   full registry:  Item_name, Link, Total, Contributor, Amount, Timestamp
//   item list:      Item, Link, Total
//
// Headers are matched case-insensitively and every field is trimmed (the
// admin template separates columns with ", "). A missing column rejects the
// whole file. Bad numbers fall back to 0 and bad timestamps to None, so one
// sloppy cell never sinks the batch.

use crate::error::{LedgerError, LedgerResult};
use crate::models::{format_timestamp, parse_timestamp, GiftItem, Rsvp};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

pub const REGISTRY_COLUMNS: [&str; 6] = ["Item_name", "Link", "Total", "Contributor", "Amount", "Timestamp"];
pub const REGISTRY_LIST_COLUMNS: [&str; 3] = ["Item", "Link", "Total"];

/// Contributor value marking a row that only declares its item
const DECLARATION_MARKER: &str = "0";

// ============================================================================
// TYPED ROWS
// ============================================================================

/// One row of the full registry upload
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryRow {
    pub item_name: String,
    pub link: String,
    pub total: f64,
    pub contributor: String,
    pub amount: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RegistryRow {
    /// Row declares the item only and carries no contribution
    pub fn is_declaration(&self) -> bool {
        self.contributor.is_empty() || self.contributor == DECLARATION_MARKER
    }
}

/// One row of the items-only upload
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryListRow {
    pub item: String,
    pub link: String,
    pub total: f64,
}

// Raw records as they come off the wire; converted leniently below

#[derive(Debug, Deserialize)]
struct RegistryRecord {
    #[serde(rename = "Item_name", default)]
    item_name: String,
    #[serde(rename = "Link", default)]
    link: String,
    #[serde(rename = "Total", default)]
    total: String,
    #[serde(rename = "Contributor", default)]
    contributor: String,
    #[serde(rename = "Amount", default)]
    amount: String,
    #[serde(rename = "Timestamp", default)]
    timestamp: String,
}

impl From<RegistryRecord> for RegistryRow {
    fn from(record: RegistryRecord) -> Self {
        Self {
            item_name: record.item_name,
            link: record.link,
            total: parse_number(&record.total),
            contributor: record.contributor,
            amount: parse_number(&record.amount),
            timestamp: parse_timestamp(&record.timestamp),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegistryListRecord {
    #[serde(rename = "Item", default)]
    item: String,
    #[serde(rename = "Link", default)]
    link: String,
    #[serde(rename = "Total", default)]
    total: String,
}

impl From<RegistryListRecord> for RegistryListRow {
    fn from(record: RegistryListRecord) -> Self {
        Self {
            item: record.item,
            link: record.link,
            total: parse_number(&record.total),
        }
    }
}

/// Lenient decimal: anything unparsable or non-finite reads as 0
pub fn parse_number(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

// ============================================================================
// READERS
// ============================================================================

/// Build a reader whose headers are rewritten to the canonical column names
fn open_reader<R: Read>(reader: R, required: &[&str]) -> LedgerResult<csv::Reader<R>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let canonical: csv::StringRecord = rdr
        .headers()?
        .iter()
        .map(|header| {
            let header = header.trim_start_matches('\u{feff}').trim();
            required
                .iter()
                .find(|column| column.eq_ignore_ascii_case(header))
                .map(|column| column.to_string())
                .unwrap_or_else(|| header.to_string())
        })
        .collect();

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|column| !canonical.iter().any(|header| header == *column))
        .collect();

    if !missing.is_empty() {
        return Err(LedgerError::MalformedInput(format!(
            "missing required column(s): {}",
            missing.join(", ")
        )));
    }

    rdr.set_headers(canonical);
    Ok(rdr)
}

/// Deserialize every record, padding short ones with empty cells
///
/// Positionally missing cells would otherwise fail the record even with
/// `#[serde(default)]`; extra trailing cells are dropped.
fn deserialize_padded<R: Read, T: DeserializeOwned>(rdr: &mut csv::Reader<R>) -> LedgerResult<Vec<T>> {
    let headers = rdr.headers()?.clone();

    let mut records = Vec::new();
    for result in rdr.records() {
        let mut record = result?;
        record.truncate(headers.len());
        while record.len() < headers.len() {
            record.push_field("");
        }
        records.push(record.deserialize(Some(&headers))?);
    }

    Ok(records)
}

/// Parse a full registry upload
pub fn read_registry_rows<R: Read>(reader: R) -> LedgerResult<Vec<RegistryRow>> {
    let mut rdr = open_reader(reader, &REGISTRY_COLUMNS)?;

    let rows: Vec<RegistryRow> = deserialize_padded::<_, RegistryRecord>(&mut rdr)?
        .into_iter()
        .map(RegistryRow::from)
        .collect();

    tracing::debug!(rows = rows.len(), "parsed registry csv");
    Ok(rows)
}

/// Parse an items-only upload
pub fn read_registry_list_rows<R: Read>(reader: R) -> LedgerResult<Vec<RegistryListRow>> {
    let mut rdr = open_reader(reader, &REGISTRY_LIST_COLUMNS)?;

    let rows: Vec<RegistryListRow> = deserialize_padded::<_, RegistryListRecord>(&mut rdr)?
        .into_iter()
        .map(RegistryListRow::from)
        .collect();

    tracing::debug!(rows = rows.len(), "parsed registry list csv");
    Ok(rows)
}

// ============================================================================
// WRITERS
// ============================================================================

#[derive(Serialize)]
struct ContributionExport<'a> {
    #[serde(rename = "Item_Name")]
    item_name: &'a str,
    #[serde(rename = "Contributor_Name")]
    contributor_name: &'a str,
    #[serde(rename = "Amount")]
    amount: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
}

#[derive(Serialize)]
struct RsvpExport<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Pax")]
    pax: i64,
    #[serde(rename = "Wishes")]
    wishes: &'a str,
    #[serde(rename = "Timestamp")]
    timestamp: String,
}

#[derive(Serialize)]
struct RegistryExport<'a> {
    #[serde(rename = "Item_name")]
    item_name: &'a str,
    #[serde(rename = "Link")]
    link: &'a str,
    #[serde(rename = "Total")]
    total: f64,
    #[serde(rename = "Contributor")]
    contributor: &'a str,
    #[serde(rename = "Amount")]
    amount: f64,
    #[serde(rename = "Timestamp")]
    timestamp: String,
}

/// One line per contribution across all items
pub fn write_contributions_csv<W: Write>(items: &[GiftItem], writer: W) -> LedgerResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    for item in items {
        for contribution in &item.contributions {
            wtr.serialize(ContributionExport {
                item_name: &item.name,
                contributor_name: &contribution.contributor_name,
                amount: format!("{:.2}", contribution.amount),
                timestamp: format_timestamp(&contribution.timestamp),
            })?;
        }
    }

    if items.iter().all(|item| item.contributions.is_empty()) {
        wtr.write_record(["Item_Name", "Contributor_Name", "Amount", "Timestamp"])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_rsvps_csv<W: Write>(rsvps: &[Rsvp], writer: W) -> LedgerResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    for rsvp in rsvps {
        wtr.serialize(RsvpExport {
            name: &rsvp.name,
            pax: rsvp.pax,
            wishes: &rsvp.wishes,
            timestamp: format_timestamp(&rsvp.timestamp),
        })?;
    }

    if rsvps.is_empty() {
        wtr.write_record(["Name", "Pax", "Wishes", "Timestamp"])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Snapshot of the registry in the full upload layout
///
/// Each item gets a declaration row followed by one row per contribution,
/// so the output can be uploaded again as-is.
pub fn write_registry_csv<W: Write>(items: &[GiftItem], writer: W) -> LedgerResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    for item in items {
        wtr.serialize(RegistryExport {
            item_name: &item.name,
            link: &item.link,
            total: item.total,
            contributor: DECLARATION_MARKER,
            amount: 0.0,
            timestamp: String::new(),
        })?;

        for contribution in &item.contributions {
            wtr.serialize(RegistryExport {
                item_name: &item.name,
                link: &item.link,
                total: item.total,
                contributor: &contribution.contributor_name,
                amount: contribution.amount,
                timestamp: format_timestamp(&contribution.timestamp),
            })?;
        }
    }

    if items.is_empty() {
        wtr.write_record(REGISTRY_COLUMNS)?;
    }

    wtr.flush()?;
    Ok(())
}
