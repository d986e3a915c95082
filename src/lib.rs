//! Synheart Mood - Baseline-relative mood estimation from wearable exports
//!
//! Mood turns raw health export files into a daily mood estimate through a
//! deterministic pipeline: ledger admission → export normalization →
//! merge-by-coalesce storage → baseline feature derivation → rule-based
//! inference.
//!
//! ## Modules
//!
//! - **Ingestion**: decode export files and normalize records into canonical rows
//! - **Features**: derive per-day features against a trailing personal baseline
//! - **Inference**: map features to a bounded mood score with confidence and explanations
//! - **Pipeline**: run an upload batch as one unit of work behind the upload ledger

pub mod adapters;
pub mod config;
pub mod decode;
pub mod error;
pub mod features;
pub mod inference;
pub mod ledger;
pub mod merge;
pub mod pipeline;
pub mod query;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::MoodError;
pub use features::{compute_features, FeatureConfig, FeatureDeriver};
pub use inference::{infer_mood, MODEL_VERSION};
pub use pipeline::{MoodPipeline, UploadFile, UploadSummary};
pub use store::{MemoryStore, SignalStore, SqliteStore};
pub use types::UserId;

/// Crate version
pub const MOOD_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "synheart-mood";
