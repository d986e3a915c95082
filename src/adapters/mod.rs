//! Export file adapters
//!
//! This module turns raw export files into canonical per-day rows. Each export
//! kind has an adapter that normalizes one raw record at a time; files are
//! decoded with the fallback chain in [`crate::decode`] and their rows are
//! streamed to a sink, so a file never has to be materialized as rows.

mod garmin;

pub use garmin::{GarminDailyAggregateAdapter, GarminHealthStatusAdapter, GarminSleepAdapter};

use crate::decode::decode_records;
use crate::error::MoodError;
use crate::types::{CanonicalRow, ExportKind};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Trait for export record adapters
pub trait ExportAdapter {
    /// Export kind this adapter understands
    fn kind(&self) -> ExportKind;

    /// Normalize one raw record. `None` means the record was dropped.
    fn normalize_record(&self, raw: &Value) -> Option<Vec<CanonicalRow>>;
}

/// Adapter for an export kind, if the kind is ingestible
pub fn adapter_for(kind: ExportKind) -> Option<&'static dyn ExportAdapter> {
    match kind {
        ExportKind::Sleep => Some(&GarminSleepAdapter),
        ExportKind::HealthStatus => Some(&GarminHealthStatusAdapter),
        ExportKind::DailyAggregate => Some(&GarminDailyAggregateAdapter),
        ExportKind::Unknown => None,
    }
}

/// Lazily normalize decoded records into canonical rows, skipping dropped records
pub fn normalize_rows<'a>(
    adapter: &'a dyn ExportAdapter,
    records: &'a [Value],
) -> impl Iterator<Item = CanonicalRow> + 'a {
    records
        .iter()
        .filter_map(move |raw| adapter.normalize_record(raw))
        .flatten()
}

/// Summary of an ingested export file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub name: String,
    pub kind: ExportKind,
    /// Raw records decoded from the file
    pub records: usize,
    /// Canonical rows produced
    pub rows: usize,
    /// Records dropped (missing date, zero sleep, unreadable shape)
    pub dropped: usize,
    /// Calendar dates that received at least one day-anchoring row
    pub dates: BTreeSet<NaiveDate>,
}

/// An export file that contributed nothing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

/// Outcome of ingesting one export file
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Ingested(FileReport),
    Skipped(SkippedFile),
}

/// Decode and normalize one export file, handing each row to `sink`.
///
/// Undecodable files and files of unknown kind are reported as skipped and
/// never produce an error; only a failing sink does.
pub fn ingest_file<F>(name: &str, bytes: &[u8], mut sink: F) -> Result<FileOutcome, MoodError>
where
    F: FnMut(CanonicalRow) -> Result<(), MoodError>,
{
    let kind = ExportKind::from_file_name(name);
    let Some(adapter) = adapter_for(kind) else {
        debug!(file = %name, "ignoring file of unknown export kind");
        return Ok(FileOutcome::Skipped(SkippedFile {
            name: name.to_string(),
            reason: "unknown export kind".to_string(),
        }));
    };

    let Some(decoded) = decode_records(bytes) else {
        warn!(file = %name, "skipping file: no parseable non-empty JSON array");
        return Ok(FileOutcome::Skipped(SkippedFile {
            name: name.to_string(),
            reason: "no parseable non-empty JSON array".to_string(),
        }));
    };
    if decoded.strategy != "utf8" {
        debug!(file = %name, strategy = decoded.strategy, "decoded with fallback strategy");
    }

    let mut report = FileReport {
        name: name.to_string(),
        kind,
        records: decoded.records.len(),
        rows: 0,
        dropped: 0,
        dates: BTreeSet::new(),
    };

    for raw in &decoded.records {
        let Some(rows) = adapter.normalize_record(raw) else {
            report.dropped += 1;
            continue;
        };
        for row in rows {
            if row.family().anchors_day() {
                report.dates.insert(row.date());
            }
            report.rows += 1;
            sink(row)?;
        }
    }

    if report.dropped > 0 {
        debug!(file = %name, dropped = report.dropped, "dropped records");
    }

    Ok(FileOutcome::Ingested(report))
}
