//! Pipeline orchestration
//!
//! This module provides the upload entry point for Synheart Mood.
//! It chains ledger admission → normalization → feature derivation →
//! inference as one unit of work per upload batch.

use crate::adapters::{ingest_file, FileOutcome, SkippedFile};
use crate::error::MoodError;
use crate::features::{compute_features, FeatureConfig};
use crate::inference::infer_mood;
use crate::ledger::{content_hash, UploadLedger};
use crate::store::SignalStore;
use crate::types::{ExportKind, Prediction, UserId};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// One submitted file blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, keeping only its file name
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MoodError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, std::fs::read(path)?))
    }
}

/// Result of one upload batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadSummary {
    /// Distinct calendar dates that received rows from admitted files
    pub days_ingested: usize,
    /// Predictions written by the recompute pass
    pub days_predicted: usize,
    /// Names of files admitted by the ledger
    pub admitted: Vec<String>,
    /// Names of files refused as already processed
    pub duplicates: Vec<String>,
    /// Admitted files that contributed no rows
    pub skipped: Vec<SkippedFile>,
}

/// Split a batch into ingestible export files.
///
/// Zip archives are expanded to their member files (directories dropped,
/// names reduced to basenames). Files of unknown export kind are ignored.
pub fn expand_upload(files: Vec<UploadFile>) -> Result<Vec<UploadFile>, MoodError> {
    let mut expanded = Vec::new();
    for file in files {
        let lower = file.name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            expanded.extend(extract_zip(&file.bytes)?);
        } else if lower.ends_with(".json") {
            expanded.push(file);
        } else {
            return Err(MoodError::UnsupportedUpload(format!(
                "{}: expected a .json or .zip file",
                file.name
            )));
        }
    }

    expanded.retain(|f| {
        let known = ExportKind::from_file_name(&f.name) != ExportKind::Unknown;
        if !known {
            debug!(file = %f.name, "ignoring non-export file");
        }
        known
    });
    Ok(expanded)
}

fn extract_zip(data: &[u8]) -> Result<Vec<UploadFile>, MoodError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    let mut files = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if !entry.is_file() {
            continue;
        }
        let Some(name) = Path::new(entry.name())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
        else {
            continue;
        };
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        files.push(UploadFile { name, bytes });
    }

    Ok(files)
}

/// Stateful processor bound to one store.
///
/// All operations take the user explicitly.
pub struct MoodPipeline<S: SignalStore> {
    store: S,
    features: FeatureConfig,
    retry_failed_uploads: bool,
}

impl<S: SignalStore> MoodPipeline<S> {
    /// Create a pipeline with default feature settings
    pub fn new(store: S) -> Self {
        Self::with_config(store, FeatureConfig::default())
    }

    pub fn with_config(store: S, features: FeatureConfig) -> Self {
        Self {
            store,
            features,
            retry_failed_uploads: false,
        }
    }

    /// Allow resubmitting files whose earlier processing failed
    pub fn retry_failed_uploads(mut self, enabled: bool) -> Self {
        self.retry_failed_uploads = enabled;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn feature_config(&self) -> &FeatureConfig {
        &self.features
    }

    /// Process one upload batch.
    ///
    /// Files already seen by content hash are reported as duplicates and never
    /// reprocessed. If any stage fails after admission, every admitted hash is
    /// marked failed and [`MoodError::Pipeline`] is returned.
    pub fn process_upload(
        &self,
        user: &UserId,
        files: Vec<UploadFile>,
    ) -> Result<UploadSummary, MoodError> {
        let files = expand_upload(files)?;
        let ledger =
            UploadLedger::new(&self.store, user).retry_failed(self.retry_failed_uploads);

        let mut summary = UploadSummary::default();
        let mut admitted = Vec::new();
        for file in files {
            let hash = content_hash(&file.bytes);
            if ledger.admit(&file.name, &hash)? {
                summary.admitted.push(file.name.clone());
                admitted.push((hash, file));
            } else {
                debug!(user = %user, file = %file.name, "duplicate upload");
                summary.duplicates.push(file.name);
            }
        }

        if admitted.is_empty() {
            info!(user = %user, duplicates = summary.duplicates.len(), "no new files to process");
            return Ok(summary);
        }
        info!(user = %user, files = admitted.len(), "processing upload batch");

        let hashes: Vec<&str> = admitted.iter().map(|(hash, _)| hash.as_str()).collect();
        let outcome = self
            .ingest_and_infer(user, &admitted, &mut summary)
            .and_then(|()| ledger.complete_all(hashes.iter().copied(), Ok(())));

        match outcome {
            Ok(()) => {
                info!(
                    user = %user,
                    days_ingested = summary.days_ingested,
                    days_predicted = summary.days_predicted,
                    "upload batch complete"
                );
                Ok(summary)
            }
            Err(err) => {
                let message = err.to_string();
                error!(user = %user, error = %message, "upload batch failed");
                // Rows already finalized keep their status; anything still processing fails
                if let Err(ledger_err) =
                    ledger.fail_unfinished(hashes.iter().copied(), message.as_str())
                {
                    error!(user = %user, error = %ledger_err, "failed to mark uploads failed");
                }
                Err(MoodError::Pipeline { message })
            }
        }
    }

    fn ingest_and_infer(
        &self,
        user: &UserId,
        admitted: &[(String, UploadFile)],
        summary: &mut UploadSummary,
    ) -> Result<(), MoodError> {
        let mut ingested = BTreeSet::new();
        for (_, file) in admitted {
            let outcome = ingest_file(&file.name, &file.bytes, |row| {
                self.store.upsert_signal(user, row)
            })?;
            match outcome {
                FileOutcome::Ingested(report) => {
                    debug!(file = %report.name, rows = report.rows, "file ingested");
                    ingested.extend(report.dates);
                }
                FileOutcome::Skipped(skipped) => summary.skipped.push(skipped),
            }
        }
        summary.days_ingested = ingested.len();

        let (Some(first), Some(last)) = (ingested.first(), ingested.last()) else {
            warn!(user = %user, "upload produced no canonical rows");
            return Ok(());
        };

        // Later days use the new data in their baselines
        let horizon = self.features.window_end(*last);
        let dates: Vec<NaiveDate> = self
            .store
            .signal_dates(user)?
            .into_iter()
            .filter(|d| d >= first && *d <= horizon)
            .collect();
        summary.days_predicted = self.recompute_dates(user, &dates)?;
        Ok(())
    }

    fn recompute_dates(&self, user: &UserId, dates: &[NaiveDate]) -> Result<usize, MoodError> {
        for date in dates {
            let row = compute_features(&self.store, user, *date, &self.features)?;
            let prediction = Prediction::from_estimate(*date, infer_mood(&row));
            self.store.upsert_prediction(user, &prediction)?;
        }
        Ok(dates.len())
    }

    /// Recompute features and predictions for every stored signal date.
    ///
    /// Returns the number of predictions written.
    pub fn recompute_user(&self, user: &UserId) -> Result<usize, MoodError> {
        let dates = self.store.signal_dates(user)?;
        let written = self.recompute_dates(user, &dates)?;
        info!(user = %user, days = written, "recomputed user");
        Ok(written)
    }

    /// Re-infer predictions from stored feature rows; dates without one are skipped.
    pub fn run_inference(&self, user: &UserId, dates: &[NaiveDate]) -> Result<usize, MoodError> {
        let mut written = 0;
        for date in dates {
            let Some(row) = self.store.features(user, *date)? else {
                debug!(user = %user, date = %date, "no feature row to infer from");
                continue;
            };
            let prediction = Prediction::from_estimate(*date, infer_mood(&row));
            self.store.upsert_prediction(user, &prediction)?;
            written += 1;
        }
        Ok(written)
    }
}
