#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Record store collaborator for the council diversity engine.
//!
//! The engine never talks to a database directly. Every read and write goes
//! through the [`DiversityStore`] trait, which is passed explicitly to each
//! operation. Two implementations ship with this crate:
//!
//! - [`memory::MemoryStore`] keeps everything in process maps.
//! - [`diversity_db::DuckDbStore`] persists to a `DuckDB` file under
//!   `data/`.
//!
//! Both also implement [`RecordSink`], which loads councilor records and age
//! histograms deposited by the external scraping pipeline.

pub mod diversity_db;
pub mod import;
pub mod memory;
pub mod paths;

use std::collections::BTreeSet;

use council_diversity_models::{
    CouncilorRecord, Factor, HistogramDocument, HistogramRecord, HistogramScope, LocalityId,
    Observation, Rank, Year,
};

pub use diversity_db::DuckDbStore;
pub use memory::MemoryStore;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `DuckDB` query error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON input.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An update-only write targeted a record that does not exist.
    #[error("Record not found: {what}")]
    NotFound {
        /// Identity of the missing record.
        what: String,
    },

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Reads and writes the records the diversity engine works over.
///
/// Writes are independent upserts or updates keyed by a unique identity;
/// there are no cross-record transactions.
pub trait DiversityStore {
    /// Distinct localities that have councilor records, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    fn fetch_localities(&self) -> Result<Vec<LocalityId>, StoreError>;

    /// Current councilors' values for `factor` in `locality`. Records with
    /// no value for the factor are omitted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    fn fetch_observations(
        &self,
        locality: LocalityId,
        factor: Factor,
    ) -> Result<Vec<Observation>, StoreError>;

    /// Creates or replaces the score for `(locality, factor)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn upsert_score(
        &self,
        locality: LocalityId,
        factor: Factor,
        score: f64,
    ) -> Result<(), StoreError>;

    /// Removes the score and rank for `(locality, factor)`. A missing record
    /// is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn clear_score(&self, locality: LocalityId, factor: Factor) -> Result<(), StoreError>;

    /// Every stored `(locality, score)` for `factor`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    fn fetch_all_scores(&self, factor: Factor) -> Result<Vec<(LocalityId, f64)>, StoreError>;

    /// Sets the rank on an existing `(locality, factor)` record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such record exists, or another
    /// [`StoreError`] if the write fails.
    fn write_rank(&self, locality: LocalityId, factor: Factor, rank: Rank)
    -> Result<(), StoreError>;

    /// Every histogram year for `locality` within `scope`, ordered by year.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    fn fetch_histogram_records(
        &self,
        scope: &HistogramScope,
        locality: LocalityId,
    ) -> Result<Vec<HistogramRecord>, StoreError>;

    /// Sets the score on an existing histogram record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such record exists, or another
    /// [`StoreError`] if the write fails.
    fn write_histogram_score(
        &self,
        scope: &HistogramScope,
        locality: LocalityId,
        year: Year,
        score: f64,
    ) -> Result<(), StoreError>;

    /// Removes the score and rank from a histogram record. A missing record
    /// is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn clear_histogram_score(
        &self,
        scope: &HistogramScope,
        locality: LocalityId,
        year: Year,
    ) -> Result<(), StoreError>;

    /// Distinct localities with at least one histogram in `scope`,
    /// ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    fn fetch_histogram_localities(
        &self,
        scope: &HistogramScope,
    ) -> Result<Vec<LocalityId>, StoreError>;

    /// Distinct years present within `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    fn fetch_distinct_years(&self, scope: &HistogramScope) -> Result<BTreeSet<Year>, StoreError>;

    /// Every scored `(locality, score)` within `scope` for `year`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    fn fetch_histogram_scores_for_year(
        &self,
        scope: &HistogramScope,
        year: Year,
    ) -> Result<Vec<(LocalityId, f64)>, StoreError>;

    /// Sets the rank on an existing histogram record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such record exists, or another
    /// [`StoreError`] if the write fails.
    fn write_histogram_rank(
        &self,
        scope: &HistogramScope,
        locality: LocalityId,
        year: Year,
        rank: Rank,
    ) -> Result<(), StoreError>;
}

/// Accepts records deposited by the external data source.
///
/// Each import is all or nothing: when it fails, the store keeps the
/// records it held before the call.
pub trait RecordSink {
    /// Replaces the councilors of every locality present in `records`.
    ///
    /// Returns the number of councilor records written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any write fails.
    fn import_councilors(&self, records: &[CouncilorRecord]) -> Result<u64, StoreError>;

    /// Creates or replaces histogram records. Replacing a histogram clears
    /// its score and rank.
    ///
    /// Returns the number of histogram records written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conversion`] if a bucket count exceeds
    /// [`MAX_BUCKET_COUNT`] or a lower bound is not finite, or another
    /// [`StoreError`] if any write fails.
    fn import_histograms(&self, documents: &[HistogramDocument]) -> Result<u64, StoreError>;
}

/// Largest councilor count a single histogram bucket may carry.
pub const MAX_BUCKET_COUNT: u64 = 1_000_000_000;

/// Checks every bucket of `documents` before anything is written.
fn validate_histograms(documents: &[HistogramDocument]) -> Result<(), StoreError> {
    for doc in documents {
        for bucket in &doc.data {
            if bucket.count > MAX_BUCKET_COUNT {
                return Err(StoreError::Conversion {
                    message: format!(
                        "bucket count {} exceeds {MAX_BUCKET_COUNT} in {}",
                        bucket.count,
                        histogram_key(&doc.scope(), doc.locality_id, doc.year)
                    ),
                });
            }
            if !bucket.lower_bound.is_finite() {
                return Err(StoreError::Conversion {
                    message: format!(
                        "bucket lower bound {} is not finite in {}",
                        bucket.lower_bound,
                        histogram_key(&doc.scope(), doc.locality_id, doc.year)
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Formats the identity of a snapshot index record for error messages.
fn index_key(locality: LocalityId, factor: Factor) -> String {
    format!("diversity index for locality {locality}, factor {factor}")
}

/// Formats the identity of a histogram record for error messages.
fn histogram_key(scope: &HistogramScope, locality: LocalityId, year: Year) -> String {
    format!("age histogram {scope} for locality {locality}, year {year}")
}
