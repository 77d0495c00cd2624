//! Loading of records deposited by the external scraping pipeline.
//!
//! Councilor records and age histograms arrive as JSON arrays using the
//! upstream field names (`localId`, `jdName`, `minAge`, ...). Councilor
//! imports replace each mentioned locality wholesale; histogram imports
//! upsert by `(councilorType, method, level, localId, year)`.

use std::collections::BTreeSet;
use std::path::Path;

use council_diversity_models::{CouncilorRecord, HistogramDocument, LocalityId};
use duckdb::params;
use serde::de::DeserializeOwned;

use crate::{DuckDbStore, RecordSink, StoreError, validate_histograms};

/// Reads a JSON array of documents from `path`.
///
/// # Errors
///
/// Returns [`StoreError`] if the file cannot be read or is not a JSON array
/// of `T`.
pub fn read_json_documents<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let contents = std::fs::read_to_string(path)?;
    let documents: Vec<T> = serde_json::from_str(&contents)?;
    log::debug!("Read {} documents from {}", documents.len(), path.display());
    Ok(documents)
}

impl RecordSink for DuckDbStore {
    fn import_councilors(&self, records: &[CouncilorRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let localities: BTreeSet<LocalityId> = records.iter().map(|r| r.locality_id).collect();

        self.in_transaction(|conn| {
            for locality in &localities {
                conn.execute(
                    "DELETE FROM councilors WHERE local_id = ?",
                    params![i64::from(*locality)],
                )?;
            }

            let mut stmt = conn.prepare(
                "INSERT INTO councilors (local_id, name, age, gender, party)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            for record in records {
                stmt.execute(params![
                    i64::from(record.locality_id),
                    record.name.as_deref(),
                    record.age,
                    record.gender.as_deref(),
                    record.party.as_deref(),
                ])?;
            }
            Ok(())
        })?;

        log::info!(
            "Imported {} councilors across {} localities",
            records.len(),
            localities.len()
        );

        Ok(records.len() as u64)
    }

    fn import_histograms(&self, documents: &[HistogramDocument]) -> Result<u64, StoreError> {
        if documents.is_empty() {
            return Ok(0);
        }

        validate_histograms(documents)?;

        self.in_transaction(|conn| {
            let mut upsert = conn.prepare(
                "INSERT INTO age_hist
                    (councilor_type, method, bucket_level, local_id, election_year)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT (councilor_type, method, bucket_level, local_id, election_year)
                 DO UPDATE SET diversity_index = NULL, diversity_rank = NULL",
            )?;
            let mut clear_buckets = conn.prepare(
                "DELETE FROM age_hist_buckets
                 WHERE councilor_type = ? AND method = ? AND bucket_level = ? AND local_id = ?
                   AND election_year = ?",
            )?;
            let mut insert_bucket = conn.prepare(
                "INSERT INTO age_hist_buckets
                    (councilor_type, method, bucket_level, local_id, election_year,
                     min_age, bucket_count)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;

            for doc in documents {
                let councilor_type = doc.councilor_type.as_ref();
                let level = i64::from(doc.level);
                let locality = i64::from(doc.locality_id);
                let year = i64::from(doc.year);

                upsert.execute(params![councilor_type, doc.method, level, locality, year])?;
                clear_buckets.execute(params![councilor_type, doc.method, level, locality, year])?;

                for bucket in &doc.data {
                    let count = i64::try_from(bucket.count).map_err(|e| StoreError::Conversion {
                        message: format!("bucket count {} out of range: {e}", bucket.count),
                    })?;
                    insert_bucket.execute(params![
                        councilor_type,
                        doc.method,
                        level,
                        locality,
                        year,
                        bucket.lower_bound,
                        count,
                    ])?;
                }
            }
            Ok(())
        })?;

        log::info!("Imported {} age histogram records", documents.len());

        Ok(documents.len() as u64)
    }
}
