//! In-process store backed by ordered maps.
//!
//! Useful for tests and for embedding the engine where records are already
//! in memory. Interior mutability matches the `&self` write signatures of
//! [`DiversityStore`]; the store is single-threaded.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use council_diversity_models::{
    CouncilorRecord, DiversityIndexRecord, Factor, HistogramDocument, HistogramRecord,
    HistogramScope, LocalityId, Observation, Rank, Year,
};

use crate::{
    DiversityStore, RecordSink, StoreError, histogram_key, index_key, validate_histograms,
};

type HistogramKey = (HistogramScope, LocalityId, Year);

#[derive(Debug, Default)]
struct State {
    councilors: Vec<CouncilorRecord>,
    index: BTreeMap<(LocalityId, Factor), DiversityIndexRecord>,
    histograms: BTreeMap<HistogramKey, HistogramRecord>,
}

/// A [`DiversityStore`] that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RefCell<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the snapshot record for `(locality, factor)`.
    #[must_use]
    pub fn index_record(
        &self,
        locality: LocalityId,
        factor: Factor,
    ) -> Option<DiversityIndexRecord> {
        self.state.borrow().index.get(&(locality, factor)).cloned()
    }

    /// Returns a copy of one histogram record.
    #[must_use]
    pub fn histogram_record(
        &self,
        scope: &HistogramScope,
        locality: LocalityId,
        year: Year,
    ) -> Option<HistogramRecord> {
        self.state
            .borrow()
            .histograms
            .get(&(scope.clone(), locality, year))
            .cloned()
    }
}

impl DiversityStore for MemoryStore {
    fn fetch_localities(&self) -> Result<Vec<LocalityId>, StoreError> {
        let ids: BTreeSet<LocalityId> = self
            .state
            .borrow()
            .councilors
            .iter()
            .map(|c| c.locality_id)
            .collect();
        Ok(ids.into_iter().collect())
    }

    fn fetch_observations(
        &self,
        locality: LocalityId,
        factor: Factor,
    ) -> Result<Vec<Observation>, StoreError> {
        Ok(self
            .state
            .borrow()
            .councilors
            .iter()
            .filter(|c| c.locality_id == locality)
            .filter_map(|c| c.observation(factor))
            .collect())
    }

    fn upsert_score(
        &self,
        locality: LocalityId,
        factor: Factor,
        score: f64,
    ) -> Result<(), StoreError> {
        self.state
            .borrow_mut()
            .index
            .entry((locality, factor))
            .and_modify(|record| record.score = score)
            .or_insert(DiversityIndexRecord {
                locality_id: locality,
                factor,
                score,
                rank: None,
            });
        Ok(())
    }

    fn clear_score(&self, locality: LocalityId, factor: Factor) -> Result<(), StoreError> {
        self.state.borrow_mut().index.remove(&(locality, factor));
        Ok(())
    }

    fn fetch_all_scores(&self, factor: Factor) -> Result<Vec<(LocalityId, f64)>, StoreError> {
        Ok(self
            .state
            .borrow()
            .index
            .values()
            .filter(|record| record.factor == factor)
            .map(|record| (record.locality_id, record.score))
            .collect())
    }

    fn write_rank(
        &self,
        locality: LocalityId,
        factor: Factor,
        rank: Rank,
    ) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        let record = state
            .index
            .get_mut(&(locality, factor))
            .ok_or_else(|| StoreError::NotFound {
                what: index_key(locality, factor),
            })?;
        record.rank = Some(rank);
        Ok(())
    }

    fn fetch_histogram_records(
        &self,
        scope: &HistogramScope,
        locality: LocalityId,
    ) -> Result<Vec<HistogramRecord>, StoreError> {
        // Map order is (scope, locality, year), so years come out ascending.
        Ok(self
            .state
            .borrow()
            .histograms
            .iter()
            .filter(|((s, l, _), _)| s == scope && *l == locality)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn write_histogram_score(
        &self,
        scope: &HistogramScope,
        locality: LocalityId,
        year: Year,
        score: f64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        let record = state
            .histograms
            .get_mut(&(scope.clone(), locality, year))
            .ok_or_else(|| StoreError::NotFound {
                what: histogram_key(scope, locality, year),
            })?;
        record.score = Some(score);
        Ok(())
    }

    fn clear_histogram_score(
        &self,
        scope: &HistogramScope,
        locality: LocalityId,
        year: Year,
    ) -> Result<(), StoreError> {
        if let Some(record) = self
            .state
            .borrow_mut()
            .histograms
            .get_mut(&(scope.clone(), locality, year))
        {
            record.score = None;
            record.rank = None;
        }
        Ok(())
    }

    fn fetch_histogram_localities(
        &self,
        scope: &HistogramScope,
    ) -> Result<Vec<LocalityId>, StoreError> {
        let ids: BTreeSet<LocalityId> = self
            .state
            .borrow()
            .histograms
            .keys()
            .filter(|(s, _, _)| s == scope)
            .map(|(_, locality, _)| *locality)
            .collect();
        Ok(ids.into_iter().collect())
    }

    fn fetch_distinct_years(&self, scope: &HistogramScope) -> Result<BTreeSet<Year>, StoreError> {
        Ok(self
            .state
            .borrow()
            .histograms
            .keys()
            .filter(|(s, _, _)| s == scope)
            .map(|(_, _, year)| *year)
            .collect())
    }

    fn fetch_histogram_scores_for_year(
        &self,
        scope: &HistogramScope,
        year: Year,
    ) -> Result<Vec<(LocalityId, f64)>, StoreError> {
        Ok(self
            .state
            .borrow()
            .histograms
            .iter()
            .filter(|((s, _, y), _)| s == scope && *y == year)
            .filter_map(|((_, locality, _), record)| record.score.map(|score| (*locality, score)))
            .collect())
    }

    fn write_histogram_rank(
        &self,
        scope: &HistogramScope,
        locality: LocalityId,
        year: Year,
        rank: Rank,
    ) -> Result<(), StoreError> {
        let mut state = self.state.borrow_mut();
        let record = state
            .histograms
            .get_mut(&(scope.clone(), locality, year))
            .ok_or_else(|| StoreError::NotFound {
                what: histogram_key(scope, locality, year),
            })?;
        record.rank = Some(rank);
        Ok(())
    }
}

impl RecordSink for MemoryStore {
    fn import_councilors(&self, records: &[CouncilorRecord]) -> Result<u64, StoreError> {
        let replaced: BTreeSet<LocalityId> = records.iter().map(|r| r.locality_id).collect();

        let mut state = self.state.borrow_mut();
        state
            .councilors
            .retain(|c| !replaced.contains(&c.locality_id));
        state.councilors.extend_from_slice(records);

        Ok(records.len() as u64)
    }

    fn import_histograms(&self, documents: &[HistogramDocument]) -> Result<u64, StoreError> {
        validate_histograms(documents)?;

        let mut state = self.state.borrow_mut();
        for doc in documents {
            state.histograms.insert(
                (doc.scope(), doc.locality_id, doc.year),
                HistogramRecord {
                    locality_id: doc.locality_id,
                    year: doc.year,
                    buckets: doc.data.clone(),
                    score: None,
                    rank: None,
                },
            );
        }
        Ok(documents.len() as u64)
    }
}
