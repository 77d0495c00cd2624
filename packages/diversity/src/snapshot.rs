//! Current-council diversity indices.
//!
//! Each `(locality, factor)` pair is scored independently and upserted into
//! the store. Ranking is a separate step that re-reads every persisted score
//! for a factor, so it always reflects the latest scores of all localities.

use council_diversity_models::{Factor, LocalityId, RankedEntry};
use council_diversity_store::DiversityStore;

use crate::DiversityError;
use crate::config::SnapshotSettings;
use crate::index::score_observations;
use crate::progress::ProgressCallback;
use crate::rank::assign_ranks;

/// Result of scoring one `(locality, factor)` pair.
#[derive(Debug)]
pub enum SnapshotOutcome {
    /// The score was computed and persisted.
    Scored {
        /// The persisted score.
        score: f64,
    },
    /// The locality had too little data; its score and rank were cleared.
    Skipped {
        /// Why the locality was skipped.
        reason: DiversityError,
    },
}

/// A locality left out of a snapshot run.
#[derive(Debug)]
pub struct SnapshotSkip {
    /// Skipped locality.
    pub locality_id: LocalityId,
    /// Factor that could not be scored.
    pub factor: Factor,
    /// Why it was skipped.
    pub reason: DiversityError,
}

/// Totals for a batch snapshot run.
#[derive(Debug, Default)]
pub struct SnapshotSummary {
    /// Number of `(locality, factor)` pairs scored.
    pub scored: u64,
    /// Pairs skipped for insufficient data.
    pub skipped: Vec<SnapshotSkip>,
}

/// Computes and persists the diversity score of `factor` in `locality`.
///
/// A locality with too few councilors for the metric is not an error: its
/// stored score and rank are cleared and [`SnapshotOutcome::Skipped`] is
/// returned.
///
/// # Errors
///
/// Returns [`DiversityError`] for malformed observations (e.g. a
/// non-numeric value with a nonzero bin width) or if the store fails.
pub fn compute_locality_index(
    store: &dyn DiversityStore,
    locality: LocalityId,
    factor: Factor,
    settings: &SnapshotSettings,
) -> Result<SnapshotOutcome, DiversityError> {
    let observations = store.fetch_observations(locality, factor)?;
    let width = settings.bin_widths.get(factor);

    match score_observations(settings.metric, &observations, width, settings.normalize) {
        Ok(score) => {
            store.upsert_score(locality, factor, score)?;
            log::debug!("Locality {locality} {factor}: {score:.4}");
            Ok(SnapshotOutcome::Scored { score })
        }
        Err(reason) if reason.is_insufficient_data() => {
            store.clear_score(locality, factor)?;
            log::warn!("Skipping locality {locality} {factor}: {reason}");
            Ok(SnapshotOutcome::Skipped { reason })
        }
        Err(e) => Err(e),
    }
}

/// Scores every `(locality, factor)` pair.
///
/// # Errors
///
/// Stops at the first input or store error.
pub fn compute_snapshot(
    store: &dyn DiversityStore,
    localities: &[LocalityId],
    factors: &[Factor],
    settings: &SnapshotSettings,
    progress: &dyn ProgressCallback,
) -> Result<SnapshotSummary, DiversityError> {
    let mut summary = SnapshotSummary::default();
    progress.set_total((localities.len() * factors.len()) as u64);

    for &factor in factors {
        progress.set_message(format!("Scoring {factor}"));
        for &locality_id in localities {
            match compute_locality_index(store, locality_id, factor, settings)? {
                SnapshotOutcome::Scored { .. } => summary.scored += 1,
                SnapshotOutcome::Skipped { reason } => summary.skipped.push(SnapshotSkip {
                    locality_id,
                    factor,
                    reason,
                }),
            }
            progress.inc(1);
        }
    }

    progress.finish(format!(
        "Scored {} locality indices, skipped {}",
        summary.scored,
        summary.skipped.len()
    ));
    log::info!(
        "Snapshot complete: {} scored, {} skipped",
        summary.scored,
        summary.skipped.len()
    );

    Ok(summary)
}

/// Recomputes the global ranking for `factor` from every persisted score.
///
/// # Errors
///
/// Returns [`DiversityError::Store`] if a read or rank write fails.
pub fn rank_factor(
    store: &dyn DiversityStore,
    factor: Factor,
) -> Result<Vec<RankedEntry>, DiversityError> {
    let scores = store.fetch_all_scores(factor)?;
    let ranked = assign_ranks(&scores);

    for entry in &ranked {
        store.write_rank(entry.locality_id, factor, entry.rank)?;
    }

    log::info!("Ranked {} localities by {factor}", ranked.len());
    Ok(ranked)
}

/// Ranks each factor in turn.
///
/// # Errors
///
/// Returns [`DiversityError::Store`] if a read or rank write fails.
pub fn rank_factors(
    store: &dyn DiversityStore,
    factors: &[Factor],
    progress: &dyn ProgressCallback,
) -> Result<Vec<(Factor, Vec<RankedEntry>)>, DiversityError> {
    progress.set_total(factors.len() as u64);

    let mut results = Vec::with_capacity(factors.len());
    for &factor in factors {
        progress.set_message(format!("Ranking {factor}"));
        results.push((factor, rank_factor(store, factor)?));
        progress.inc(1);
    }

    progress.finish(format!("Ranked {} factors", factors.len()));
    Ok(results)
}

#[cfg(test)]
mod tests {
    use council_diversity_models::{CouncilorRecord, Rank};
    use council_diversity_store::{MemoryStore, RecordSink as _};

    use super::*;
    use crate::config::BinWidths;
    use crate::progress::NullProgress;

    fn councilor(
        locality_id: LocalityId,
        age: Option<f64>,
        gender: &str,
        party: Option<&str>,
    ) -> CouncilorRecord {
        CouncilorRecord {
            locality_id,
            name: None,
            age,
            gender: Some(gender.to_string()),
            party: party.map(str::to_string),
        }
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .import_councilors(&[
                // Locality 1: three men, one woman.
                councilor(1, Some(34.0), "M", Some("Red")),
                councilor(1, Some(38.0), "M", Some("Red")),
                councilor(1, Some(45.0), "M", Some("Blue")),
                councilor(1, Some(61.0), "F", Some("Blue")),
                // Locality 2: balanced.
                councilor(2, Some(31.0), "M", Some("Red")),
                councilor(2, Some(52.0), "F", Some("Blue")),
                // Locality 3: a single councilor.
                councilor(3, Some(70.0), "F", None),
            ])
            .unwrap();
        store
    }

    fn settings() -> SnapshotSettings {
        SnapshotSettings {
            bin_widths: BinWidths {
                age: 10.0,
                ..BinWidths::default()
            },
            ..SnapshotSettings::default()
        }
    }

    fn rank_of(store: &MemoryStore, locality: LocalityId, factor: Factor) -> Option<Rank> {
        store.index_record(locality, factor).and_then(|r| r.rank)
    }

    #[test]
    fn scores_and_persists_locality() {
        let store = store();
        let outcome = compute_locality_index(&store, 1, Factor::Gender, &settings()).unwrap();
        let SnapshotOutcome::Scored { score } = outcome else {
            panic!("expected a score, got {outcome:?}");
        };
        assert!((score - 0.75).abs() < 1e-9);

        let record = store.index_record(1, Factor::Gender).unwrap();
        assert!((record.score - 0.75).abs() < 1e-9);
        assert_eq!(record.rank, None);
    }

    #[test]
    fn rescoring_overwrites_previous_score() {
        let store = store();
        compute_locality_index(&store, 2, Factor::Gender, &settings()).unwrap();
        store
            .import_councilors(&[
                councilor(2, Some(31.0), "M", Some("Red")),
                councilor(2, Some(52.0), "M", Some("Blue")),
            ])
            .unwrap();
        compute_locality_index(&store, 2, Factor::Gender, &settings()).unwrap();

        let record = store.index_record(2, Factor::Gender).unwrap();
        assert!(record.score.abs() < 1e-9);
    }

    #[test]
    fn single_councilor_is_skipped_and_cleared() {
        let store = store();
        store.upsert_score(3, Factor::Age, 0.4).unwrap();
        store.write_rank(3, Factor::Age, 1).unwrap();

        let outcome = compute_locality_index(&store, 3, Factor::Age, &settings()).unwrap();
        assert!(matches!(
            outcome,
            SnapshotOutcome::Skipped {
                reason: DiversityError::InsufficientData { observations: 1, .. }
            }
        ));
        assert!(store.index_record(3, Factor::Age).is_none());
    }

    #[test]
    fn categorical_factor_with_bin_width_is_an_error() {
        let store = store();
        let settings = SnapshotSettings {
            bin_widths: BinWidths {
                party: 5.0,
                ..BinWidths::default()
            },
            ..SnapshotSettings::default()
        };
        let err = compute_locality_index(&store, 1, Factor::Party, &settings).unwrap_err();
        assert!(matches!(err, DiversityError::NonNumericObservation { .. }));
    }

    #[test]
    fn batch_reports_skipped_localities() {
        let store = store();
        let summary = compute_snapshot(
            &store,
            &[1, 2, 3],
            &[Factor::Age, Factor::Gender],
            &settings(),
            &NullProgress,
        )
        .unwrap();

        assert_eq!(summary.scored, 4);
        let skipped: Vec<_> = summary
            .skipped
            .iter()
            .map(|s| (s.locality_id, s.factor))
            .collect();
        assert_eq!(skipped, vec![(3, Factor::Age), (3, Factor::Gender)]);
        assert!(summary.skipped.iter().all(|s| s.reason.is_insufficient_data()));
    }

    #[test]
    fn ranking_excludes_skipped_localities() {
        let store = store();
        compute_snapshot(&store, &[1, 2, 3], &[Factor::Gender], &settings(), &NullProgress)
            .unwrap();
        let ranked = rank_factor(&store, Factor::Gender).unwrap();

        // Locality 2 (1.0) outranks locality 1 (0.75); locality 3 has no score.
        let ranks: Vec<_> = ranked.iter().map(|e| (e.locality_id, e.rank)).collect();
        assert_eq!(ranks, vec![(2, 1), (1, 2)]);
        assert_eq!(rank_of(&store, 2, Factor::Gender), Some(1));
        assert_eq!(rank_of(&store, 1, Factor::Gender), Some(2));
        assert_eq!(rank_of(&store, 3, Factor::Gender), None);
    }

    #[test]
    fn tied_scores_rank_by_locality_id() {
        let store = MemoryStore::new();
        store.upsert_score(7, Factor::Party, 0.9).unwrap();
        store.upsert_score(4, Factor::Party, 0.9).unwrap();
        store.upsert_score(9, Factor::Party, 0.5).unwrap();

        rank_factor(&store, Factor::Party).unwrap();
        assert_eq!(rank_of(&store, 4, Factor::Party), Some(1));
        assert_eq!(rank_of(&store, 7, Factor::Party), Some(2));
        assert_eq!(rank_of(&store, 9, Factor::Party), Some(3));
    }

    #[test]
    fn rank_factors_ranks_each_factor_independently() {
        let store = store();
        compute_snapshot(
            &store,
            &[1, 2],
            &[Factor::Age, Factor::Party],
            &settings(),
            &NullProgress,
        )
        .unwrap();
        let results = rank_factors(&store, &[Factor::Age, Factor::Party], &NullProgress).unwrap();

        assert_eq!(results.len(), 2);
        for (factor, ranked) in &results {
            let mut ranks: Vec<Rank> = ranked.iter().map(|e| e.rank).collect();
            ranks.sort_unstable();
            assert_eq!(ranks, vec![1, 2], "{factor}");
        }
    }
}
