//! Upload ledger
//!
//! At-most-once processing per (user, content hash). Admission is a single
//! conditional insert in the store; finalization moves exactly one
//! `processing` row to `success` or `failed`.

use crate::error::MoodError;
use crate::store::SignalStore;
use crate::types::{UploadRecord, UploadStatus, UserId};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Lowercase hex SHA-256 of a file's bytes
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Ledger view scoped to one user
pub struct UploadLedger<'a, S: SignalStore + ?Sized> {
    store: &'a S,
    user: &'a UserId,
    retry_failed: bool,
}

impl<'a, S: SignalStore + ?Sized> UploadLedger<'a, S> {
    pub fn new(store: &'a S, user: &'a UserId) -> Self {
        Self {
            store,
            user,
            retry_failed: false,
        }
    }

    /// Let hashes whose earlier processing failed be admitted again
    pub fn retry_failed(mut self, enabled: bool) -> Self {
        self.retry_failed = enabled;
        self
    }

    /// True only if this call admitted the hash for processing
    pub fn admit(&self, filename: &str, content_hash: &str) -> Result<bool, MoodError> {
        if self.store.admit_upload(self.user, filename, content_hash)? {
            return Ok(true);
        }
        if self.retry_failed && self.store.reopen_failed_upload(self.user, filename, content_hash)? {
            debug!(user = %self.user, hash = content_hash, "reopened failed upload");
            return Ok(true);
        }
        Ok(false)
    }

    pub fn complete(
        &self,
        content_hash: &str,
        ok: bool,
        error: Option<&str>,
    ) -> Result<(), MoodError> {
        let status = if ok {
            UploadStatus::Success
        } else {
            UploadStatus::Failed
        };
        self.store
            .complete_upload(self.user, content_hash, status, error)
    }

    /// Finalize every hash of a batch with one outcome.
    ///
    /// Every hash is attempted; the first error is returned after the last one.
    pub fn complete_all<'h>(
        &self,
        hashes: impl IntoIterator<Item = &'h str>,
        outcome: Result<(), &str>,
    ) -> Result<(), MoodError> {
        let mut first_error = None;
        for hash in hashes {
            let result = match outcome {
                Ok(()) => self.complete(hash, true, None),
                Err(message) => self.complete(hash, false, Some(message)),
            };
            if let Err(err) = result {
                warn!(user = %self.user, hash, error = %err, "failed to finalize upload");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Mark every hash still `processing` as failed.
    ///
    /// Hashes already finalized are left alone, so this is safe to run after a
    /// partially applied [`complete_all`](Self::complete_all).
    pub fn fail_unfinished<'h>(
        &self,
        hashes: impl IntoIterator<Item = &'h str>,
        message: &str,
    ) -> Result<(), MoodError> {
        let mut first_error = None;
        for hash in hashes {
            let result = self.status(hash).and_then(|record| match record {
                Some(r) if r.status == UploadStatus::Processing => {
                    self.complete(hash, false, Some(message))
                }
                _ => Ok(()),
            });
            if let Err(err) = result {
                warn!(user = %self.user, hash, error = %err, "failed to mark upload failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn status(&self, content_hash: &str) -> Result<Option<UploadRecord>, MoodError> {
        self.store.upload(self.user, content_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
    }

    #[test]
    fn test_admit_then_complete() {
        let store = MemoryStore::new();
        let user = UserId::new("u1");
        let ledger = UploadLedger::new(&store, &user);
        let hash = content_hash(b"[1]");

        assert!(ledger.admit("a.json", &hash).unwrap());
        assert!(!ledger.admit("a.json", &hash).unwrap());
        ledger.complete(&hash, true, None).unwrap();
        assert!(ledger.complete(&hash, true, None).is_err());
        assert_eq!(
            ledger.status(&hash).unwrap().map(|r| r.status),
            Some(UploadStatus::Success)
        );
    }

    #[test]
    fn test_failed_upload_stays_refused_without_retry() {
        let store = MemoryStore::new();
        let user = UserId::new("u1");
        let ledger = UploadLedger::new(&store, &user);

        assert!(ledger.admit("a.json", "h").unwrap());
        ledger.complete_all(["h"], Err("storage unavailable")).unwrap();
        assert!(!ledger.admit("a.json", "h").unwrap());

        let retrying = UploadLedger::new(&store, &user).retry_failed(true);
        assert!(retrying.admit("a.json", "h").unwrap());
        // Only one caller wins the reopen
        assert!(!retrying.admit("a.json", "h").unwrap());
    }

    #[test]
    fn test_complete_all_attempts_every_hash() {
        let store = MemoryStore::new();
        let user = UserId::new("u1");
        let ledger = UploadLedger::new(&store, &user);
        assert!(ledger.admit("a.json", "a").unwrap());
        assert!(ledger.admit("c.json", "c").unwrap());

        // "b" was never admitted, so its transition fails in the middle of the batch
        let result = ledger.complete_all(["a", "b", "c"], Ok(()));
        assert!(matches!(result, Err(MoodError::Ledger(_))));
        for hash in ["a", "c"] {
            assert_eq!(
                ledger.status(hash).unwrap().map(|r| r.status),
                Some(UploadStatus::Success)
            );
        }
    }

    #[test]
    fn test_fail_unfinished_skips_finalized() {
        let store = MemoryStore::new();
        let user = UserId::new("u1");
        let ledger = UploadLedger::new(&store, &user);
        assert!(ledger.admit("a.json", "a").unwrap());
        assert!(ledger.admit("b.json", "b").unwrap());
        ledger.complete("a", true, None).unwrap();

        ledger.fail_unfinished(["a", "b", "missing"], "ledger write failed").unwrap();

        let a = ledger.status("a").unwrap().unwrap();
        let b = ledger.status("b").unwrap().unwrap();
        assert_eq!(a.status, UploadStatus::Success);
        assert_eq!(b.status, UploadStatus::Failed);
        assert_eq!(b.error.as_deref(), Some("ledger write failed"));
    }
}
