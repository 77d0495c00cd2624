//! `DuckDB`-backed diversity store.
//!
//! One `DuckDB` file (`data/diversity.duckdb` by default) holds the raw
//! councilor records deposited by the scrapers, the snapshot diversity
//! index per locality and factor, and the historical age histograms with
//! their scores and ranks.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use council_diversity_models::{
    DiversityIndexRecord, Factor, HistogramBucket, HistogramRecord, HistogramScope, LocalityId,
    Observation, Rank, Year,
};
use duckdb::{Connection, params};

use crate::{DiversityStore, StoreError, histogram_key, index_key};

/// A [`DiversityStore`] persisted in `DuckDB`.
pub struct DuckDbStore {
    conn: Connection,
}

impl DuckDbStore {
    /// Opens (or creates) the store at `path` and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the connection or schema creation fails.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("SET threads = 4; SET memory_limit = '512MB';")?;

        Self::with_connection(conn)
    }

    /// Opens the store at the default path (see
    /// [`crate::paths::diversity_db_path`]).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the connection or schema creation fails.
    pub fn open_default() -> Result<Self, StoreError> {
        let path = crate::paths::diversity_db_path();
        log::debug!("Opening diversity store at {}", path.display());
        Self::open(&path)
    }

    /// Opens a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// The underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs `body` inside one transaction, rolling back if it fails.
    pub(crate) fn in_transaction<T>(
        &self,
        body: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        match body(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    log::error!("Rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    /// Every snapshot record for `factor`, ordered by rank then locality.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn index_records(&self, factor: Factor) -> Result<Vec<DiversityIndexRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT local_id, score, diversity_rank FROM diversity_index
             WHERE factor = ?
             ORDER BY diversity_rank NULLS LAST, local_id",
        )?;
        let mut rows = stmt.query(params![factor.as_ref()])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(DiversityIndexRecord {
                locality_id: to_locality(row.get(0)?)?,
                factor,
                score: row.get(1)?,
                rank: row.get::<_, Option<i64>>(2)?.map(to_rank).transpose()?,
            });
        }

        Ok(records)
    }
}

fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS councilors (
            local_id BIGINT NOT NULL,
            name TEXT,
            age DOUBLE,
            gender TEXT,
            party TEXT
        );

        CREATE TABLE IF NOT EXISTS diversity_index (
            local_id BIGINT NOT NULL,
            factor TEXT NOT NULL,
            score DOUBLE NOT NULL,
            diversity_rank BIGINT,
            PRIMARY KEY (local_id, factor)
        );

        CREATE TABLE IF NOT EXISTS age_hist (
            councilor_type TEXT NOT NULL,
            method TEXT NOT NULL,
            bucket_level BIGINT NOT NULL,
            local_id BIGINT NOT NULL,
            election_year BIGINT NOT NULL,
            diversity_index DOUBLE,
            diversity_rank BIGINT,
            PRIMARY KEY (councilor_type, method, bucket_level, local_id, election_year)
        );

        CREATE TABLE IF NOT EXISTS age_hist_buckets (
            councilor_type TEXT NOT NULL,
            method TEXT NOT NULL,
            bucket_level BIGINT NOT NULL,
            local_id BIGINT NOT NULL,
            election_year BIGINT NOT NULL,
            min_age DOUBLE NOT NULL,
            bucket_count BIGINT NOT NULL
        );",
    )?;

    Ok(())
}

/// Column of the `councilors` table holding `factor`.
const fn factor_column(factor: Factor) -> &'static str {
    match factor {
        Factor::Age => "age",
        Factor::Gender => "gender",
        Factor::Party => "party",
    }
}

fn to_locality(value: i64) -> Result<LocalityId, StoreError> {
    LocalityId::try_from(value).map_err(|e| StoreError::Conversion {
        message: format!("locality id {value} out of range: {e}"),
    })
}

fn to_year(value: i64) -> Result<Year, StoreError> {
    Year::try_from(value).map_err(|e| StoreError::Conversion {
        message: format!("year {value} out of range: {e}"),
    })
}

fn to_rank(value: i64) -> Result<Rank, StoreError> {
    Rank::try_from(value).map_err(|e| StoreError::Conversion {
        message: format!("rank {value} out of range: {e}"),
    })
}

fn to_count(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|e| StoreError::Conversion {
        message: format!("bucket count {value} out of range: {e}"),
    })
}

impl DiversityStore for DuckDbStore {
    fn fetch_localities(&self) -> Result<Vec<LocalityId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT local_id FROM councilors ORDER BY local_id")?;
        let mut rows = stmt.query([])?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(to_locality(row.get(0)?)?);
        }

        Ok(ids)
    }

    fn fetch_observations(
        &self,
        locality: LocalityId,
        factor: Factor,
    ) -> Result<Vec<Observation>, StoreError> {
        let column = factor_column(factor);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {column} FROM councilors WHERE local_id = ? AND {column} IS NOT NULL"
        ))?;
        let mut rows = stmt.query(params![i64::from(locality)])?;

        let mut observations = Vec::new();
        while let Some(row) = rows.next()? {
            let observation = match factor {
                Factor::Age => Observation::Numeric(row.get(0)?),
                Factor::Gender | Factor::Party => Observation::Categorical(row.get(0)?),
            };
            observations.push(observation);
        }

        Ok(observations)
    }

    fn upsert_score(
        &self,
        locality: LocalityId,
        factor: Factor,
        score: f64,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO diversity_index (local_id, factor, score) VALUES (?, ?, ?)
             ON CONFLICT (local_id, factor) DO UPDATE SET score = EXCLUDED.score",
            params![i64::from(locality), factor.as_ref(), score],
        )?;
        Ok(())
    }

    fn clear_score(&self, locality: LocalityId, factor: Factor) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM diversity_index WHERE local_id = ? AND factor = ?",
            params![i64::from(locality), factor.as_ref()],
        )?;
        Ok(())
    }

    fn fetch_all_scores(&self, factor: Factor) -> Result<Vec<(LocalityId, f64)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT local_id, score FROM diversity_index WHERE factor = ?")?;
        let mut rows = stmt.query(params![factor.as_ref()])?;

        let mut scores = Vec::new();
        while let Some(row) = rows.next()? {
            scores.push((to_locality(row.get(0)?)?, row.get(1)?));
        }

        Ok(scores)
    }

    fn write_rank(
        &self,
        locality: LocalityId,
        factor: Factor,
        rank: Rank,
    ) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE diversity_index SET diversity_rank = ? WHERE local_id = ? AND factor = ?",
            params![i64::from(rank), i64::from(locality), factor.as_ref()],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound {
                what: index_key(locality, factor),
            });
        }
        Ok(())
    }

    fn fetch_histogram_records(
        &self,
        scope: &HistogramScope,
        locality: LocalityId,
    ) -> Result<Vec<HistogramRecord>, StoreError> {
        let mut buckets: BTreeMap<Year, Vec<HistogramBucket>> = BTreeMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT election_year, min_age, bucket_count FROM age_hist_buckets
                 WHERE councilor_type = ? AND method = ? AND bucket_level = ? AND local_id = ?
                 ORDER BY election_year, min_age",
            )?;
            let mut rows = stmt.query(params![
                scope.councilor_type.as_ref(),
                scope.method.as_str(),
                i64::from(scope.level),
                i64::from(locality),
            ])?;
            while let Some(row) = rows.next()? {
                let year = to_year(row.get(0)?)?;
                let bucket = HistogramBucket::new(row.get(1)?, to_count(row.get(2)?)?);
                buckets.entry(year).or_default().push(bucket);
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT election_year, diversity_index, diversity_rank FROM age_hist
             WHERE councilor_type = ? AND method = ? AND bucket_level = ? AND local_id = ?
             ORDER BY election_year",
        )?;
        let mut rows = stmt.query(params![
            scope.councilor_type.as_ref(),
            scope.method.as_str(),
            i64::from(scope.level),
            i64::from(locality),
        ])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let year = to_year(row.get(0)?)?;
            records.push(HistogramRecord {
                locality_id: locality,
                year,
                buckets: buckets.remove(&year).unwrap_or_default(),
                score: row.get(1)?,
                rank: row.get::<_, Option<i64>>(2)?.map(to_rank).transpose()?,
            });
        }

        Ok(records)
    }

    fn write_histogram_score(
        &self,
        scope: &HistogramScope,
        locality: LocalityId,
        year: Year,
        score: f64,
    ) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE age_hist SET diversity_index = ?
             WHERE councilor_type = ? AND method = ? AND bucket_level = ? AND local_id = ?
               AND election_year = ?",
            params![
                score,
                scope.councilor_type.as_ref(),
                scope.method.as_str(),
                i64::from(scope.level),
                i64::from(locality),
                i64::from(year),
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound {
                what: histogram_key(scope, locality, year),
            });
        }
        Ok(())
    }

    fn clear_histogram_score(
        &self,
        scope: &HistogramScope,
        locality: LocalityId,
        year: Year,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE age_hist SET diversity_index = NULL, diversity_rank = NULL
             WHERE councilor_type = ? AND method = ? AND bucket_level = ? AND local_id = ?
               AND election_year = ?",
            params![
                scope.councilor_type.as_ref(),
                scope.method.as_str(),
                i64::from(scope.level),
                i64::from(locality),
                i64::from(year),
            ],
        )?;
        Ok(())
    }

    fn fetch_histogram_localities(
        &self,
        scope: &HistogramScope,
    ) -> Result<Vec<LocalityId>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT local_id FROM age_hist
             WHERE councilor_type = ? AND method = ? AND bucket_level = ?
             ORDER BY local_id",
        )?;
        let mut rows = stmt.query(params![
            scope.councilor_type.as_ref(),
            scope.method.as_str(),
            i64::from(scope.level),
        ])?;

        let mut localities = Vec::new();
        while let Some(row) = rows.next()? {
            localities.push(to_locality(row.get(0)?)?);
        }

        Ok(localities)
    }

    fn fetch_distinct_years(&self, scope: &HistogramScope) -> Result<BTreeSet<Year>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT election_year FROM age_hist
             WHERE councilor_type = ? AND method = ? AND bucket_level = ?",
        )?;
        let mut rows = stmt.query(params![
            scope.councilor_type.as_ref(),
            scope.method.as_str(),
            i64::from(scope.level),
        ])?;

        let mut years = BTreeSet::new();
        while let Some(row) = rows.next()? {
            years.insert(to_year(row.get(0)?)?);
        }

        Ok(years)
    }

    fn fetch_histogram_scores_for_year(
        &self,
        scope: &HistogramScope,
        year: Year,
    ) -> Result<Vec<(LocalityId, f64)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT local_id, diversity_index FROM age_hist
             WHERE councilor_type = ? AND method = ? AND bucket_level = ? AND election_year = ?
               AND diversity_index IS NOT NULL",
        )?;
        let mut rows = stmt.query(params![
            scope.councilor_type.as_ref(),
            scope.method.as_str(),
            i64::from(scope.level),
            i64::from(year),
        ])?;

        let mut scores = Vec::new();
        while let Some(row) = rows.next()? {
            scores.push((to_locality(row.get(0)?)?, row.get(1)?));
        }

        Ok(scores)
    }

    fn write_histogram_rank(
        &self,
        scope: &HistogramScope,
        locality: LocalityId,
        year: Year,
        rank: Rank,
    ) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE age_hist SET diversity_rank = ?
             WHERE councilor_type = ? AND method = ? AND bucket_level = ? AND local_id = ?
               AND election_year = ?",
            params![
                i64::from(rank),
                scope.councilor_type.as_ref(),
                scope.method.as_str(),
                i64::from(scope.level),
                i64::from(locality),
                i64::from(year),
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound {
                what: histogram_key(scope, locality, year),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creation_is_idempotent() {
        let store = DuckDbStore::open_in_memory().unwrap();
        create_schema(store.connection()).unwrap();
    }

    #[test]
    fn index_records_are_ordered_by_rank() {
        let store = DuckDbStore::open_in_memory().unwrap();
        store.upsert_score(1, Factor::Gender, 0.2).unwrap();
        store.upsert_score(2, Factor::Gender, 0.8).unwrap();
        store.upsert_score(3, Factor::Gender, 0.5).unwrap();
        store.write_rank(2, Factor::Gender, 1).unwrap();
        store.write_rank(1, Factor::Gender, 2).unwrap();

        let records = store.index_records(Factor::Gender).unwrap();
        let order: Vec<_> = records.iter().map(|r| (r.locality_id, r.rank)).collect();
        assert_eq!(order, vec![(2, Some(1)), (1, Some(2)), (3, None)]);
    }

    #[test]
    fn upsert_keeps_existing_rank() {
        let store = DuckDbStore::open_in_memory().unwrap();
        store.upsert_score(4, Factor::Party, 0.3).unwrap();
        store.write_rank(4, Factor::Party, 7).unwrap();
        store.upsert_score(4, Factor::Party, 0.4).unwrap();

        let records = store.index_records(Factor::Party).unwrap();
        assert_eq!(records.len(), 1);
        assert!((records[0].score - 0.4).abs() < f64::EPSILON);
        assert_eq!(records[0].rank, Some(7));
    }
}
