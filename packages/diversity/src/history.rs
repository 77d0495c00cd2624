//! Historical age diversity over pre-aggregated histograms.
//!
//! Each stored histogram stands for its individual ages (one copy of the
//! bucket's lower bound per councilor). Those ages are re-binned at the
//! shared `age_bucket_width` and scored in place. Binning works on the
//! bucket counts directly, so a histogram is never expanded in memory.
//! Once every locality in a series is scored, each election year is ranked
//! on its own.

use std::collections::BTreeMap;

use council_diversity_models::{
    CouncilorType, FrequencyDistribution, HistogramBucket, HistogramScope, LocalityId,
    Observation, RankedEntry, Year,
};
use council_diversity_store::DiversityStore;

use crate::DiversityError;
use crate::binning::bin_counted;
use crate::config::HistorySettings;
use crate::index::score;
use crate::progress::ProgressCallback;
use crate::rank::assign_ranks;

/// A histogram record left out of a historical run.
#[derive(Debug)]
pub struct HistorySkip {
    /// Skipped locality.
    pub locality_id: LocalityId,
    /// Year of the skipped histogram.
    pub year: Year,
    /// Why it was skipped.
    pub reason: DiversityError,
}

/// Outcome of the scoring phase for one series.
#[derive(Debug, Default)]
pub struct SeriesScores {
    /// Histogram records scored.
    pub scored: u64,
    /// Records skipped for insufficient data.
    pub skipped: Vec<HistorySkip>,
}

/// Outcome of scoring and ranking one series.
#[derive(Debug)]
pub struct SeriesSummary {
    /// Series the summary describes.
    pub scope: HistogramScope,
    /// Scoring phase totals.
    pub scores: SeriesScores,
    /// Ranking per election year.
    pub rankings: BTreeMap<Year, Vec<RankedEntry>>,
}

/// Expands histogram buckets into one observation per councilor, valued at
/// the bucket's lower bound.
///
/// Allocates one observation per councilor; scoring uses
/// [`histogram_distribution`] instead.
#[must_use]
pub fn expand_histogram(buckets: &[HistogramBucket]) -> Vec<Observation> {
    buckets
        .iter()
        .flat_map(|bucket| (0..bucket.count).map(|_| Observation::Numeric(bucket.lower_bound)))
        .collect()
}

/// Bins the ages a histogram stands for at `width`. Same result as binning
/// [`expand_histogram`]'s output, in memory proportional to the bucket count.
///
/// # Errors
///
/// Returns [`DiversityError::InvalidBinWidth`] or
/// [`DiversityError::NonFiniteObservation`] for unusable input.
pub fn histogram_distribution(
    buckets: &[HistogramBucket],
    width: f64,
) -> Result<FrequencyDistribution, DiversityError> {
    bin_counted(buckets.iter().map(|b| (b.lower_bound, b.count)), width)
}

/// Scores every histogram year of every locality in `scope`.
///
/// Records with too few councilors for the metric have their score and rank
/// cleared and are reported in [`SeriesScores::skipped`].
///
/// # Errors
///
/// Stops at the first input or store error.
pub fn score_series(
    store: &dyn DiversityStore,
    scope: &HistogramScope,
    localities: &[LocalityId],
    settings: &HistorySettings,
    progress: &dyn ProgressCallback,
) -> Result<SeriesScores, DiversityError> {
    let mut scores = SeriesScores::default();
    progress.set_total(localities.len() as u64);
    progress.set_message(format!("Scoring {scope}"));

    for &locality_id in localities {
        for record in store.fetch_histogram_records(scope, locality_id)? {
            let ages = histogram_distribution(&record.buckets, settings.age_bucket_width)?;
            match score(settings.metric, &ages, settings.normalize) {
                Ok(score) => {
                    store.write_histogram_score(scope, locality_id, record.year, score)?;
                    log::debug!("{scope} locality {locality_id} {}: {score:.4}", record.year);
                    scores.scored += 1;
                }
                Err(reason) if reason.is_insufficient_data() => {
                    store.clear_histogram_score(scope, locality_id, record.year)?;
                    log::warn!(
                        "Skipping {scope} locality {locality_id} {}: {reason}",
                        record.year
                    );
                    scores.skipped.push(HistorySkip {
                        locality_id,
                        year: record.year,
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        progress.inc(1);
    }

    progress.finish(format!(
        "Scored {} {scope} histograms, skipped {}",
        scores.scored,
        scores.skipped.len()
    ));
    Ok(scores)
}

/// Ranks every year of `scope` independently.
///
/// # Errors
///
/// Returns [`DiversityError::Store`] if a read or rank write fails.
pub fn rank_series(
    store: &dyn DiversityStore,
    scope: &HistogramScope,
) -> Result<BTreeMap<Year, Vec<RankedEntry>>, DiversityError> {
    let mut rankings = BTreeMap::new();

    for year in store.fetch_distinct_years(scope)? {
        let scores = store.fetch_histogram_scores_for_year(scope, year)?;
        let ranked = assign_ranks(&scores);
        for entry in &ranked {
            store.write_histogram_rank(scope, entry.locality_id, year, entry.rank)?;
        }
        log::debug!("Ranked {} localities for {scope} {year}", ranked.len());
        rankings.insert(year, ranked);
    }

    Ok(rankings)
}

/// Scores then ranks one councilor series.
///
/// # Errors
///
/// Stops at the first input or store error.
pub fn compute_series(
    store: &dyn DiversityStore,
    councilor_type: CouncilorType,
    localities: &[LocalityId],
    settings: &HistorySettings,
    progress: &dyn ProgressCallback,
) -> Result<SeriesSummary, DiversityError> {
    let scope = settings.scope(councilor_type);
    let scores = score_series(store, &scope, localities, settings, progress)?;
    let rankings = rank_series(store, &scope)?;

    log::info!(
        "{scope}: {} histograms scored, {} skipped, {} years ranked",
        scores.scored,
        scores.skipped.len(),
        rankings.len()
    );

    Ok(SeriesSummary {
        scope,
        scores,
        rankings,
    })
}

/// Processes every configured councilor series.
///
/// # Errors
///
/// Stops at the first input or store error.
pub fn compute_history(
    store: &dyn DiversityStore,
    localities: &[LocalityId],
    settings: &HistorySettings,
    progress: &dyn ProgressCallback,
) -> Result<Vec<SeriesSummary>, DiversityError> {
    settings
        .councilor_types
        .iter()
        .map(|&councilor_type| {
            compute_series(store, councilor_type, localities, settings, progress)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use council_diversity_models::{HistogramDocument, Metric, Rank};
    use council_diversity_store::{MemoryStore, RecordSink as _};

    use super::*;
    use crate::progress::NullProgress;

    fn document(
        councilor_type: CouncilorType,
        locality_id: LocalityId,
        year: Year,
        buckets: &[(f64, u64)],
    ) -> HistogramDocument {
        HistogramDocument {
            locality_id,
            councilor_type,
            method: "equal".to_string(),
            level: 2,
            year,
            data: buckets
                .iter()
                .map(|&(lower, count)| HistogramBucket::new(lower, count))
                .collect(),
        }
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .import_histograms(&[
                document(CouncilorType::Elected, 1, 2014, &[(30.0, 3), (50.0, 1)]),
                document(CouncilorType::Elected, 2, 2014, &[(30.0, 2), (50.0, 2)]),
                document(CouncilorType::Elected, 1, 2018, &[(40.0, 4)]),
                document(CouncilorType::Elected, 2, 2018, &[(40.0, 1), (60.0, 1)]),
                document(CouncilorType::Elected, 3, 2018, &[(70.0, 1)]),
                document(CouncilorType::Candidate, 1, 2018, &[(20.0, 1), (30.0, 1)]),
            ])
            .unwrap();
        store
    }

    fn scope(councilor_type: CouncilorType) -> HistogramScope {
        HistorySettings::default().scope(councilor_type)
    }

    fn rank_of(store: &MemoryStore, locality: LocalityId, year: Year) -> Option<Rank> {
        store
            .histogram_record(&scope(CouncilorType::Elected), locality, year)
            .and_then(|r| r.rank)
    }

    #[test]
    fn expansion_repeats_lower_bounds() {
        let ages = expand_histogram(&[
            HistogramBucket::new(30.0, 2),
            HistogramBucket::new(40.0, 0),
            HistogramBucket::new(60.0, 1),
        ]);
        assert_eq!(
            ages,
            vec![
                Observation::Numeric(30.0),
                Observation::Numeric(30.0),
                Observation::Numeric(60.0),
            ]
        );
        assert!(expand_histogram(&[]).is_empty());
    }

    #[test]
    fn distribution_matches_expanded_ages() {
        let buckets = [
            HistogramBucket::new(30.0, 2),
            HistogramBucket::new(35.0, 1),
            HistogramBucket::new(40.0, 0),
            HistogramBucket::new(60.0, 3),
        ];
        let direct = histogram_distribution(&buckets, 10.0).unwrap();
        let expanded = crate::binning::bin(&expand_histogram(&buckets), 10.0).unwrap();
        assert_eq!(direct, expanded);
        assert_eq!(direct.total(), 6);
    }

    #[test]
    fn large_counts_are_scored_without_expansion() {
        let buckets = [
            HistogramBucket::new(30.0, 1 << 40),
            HistogramBucket::new(50.0, 1 << 40),
        ];
        let dist = histogram_distribution(&buckets, 10.0).unwrap();
        let s = score(Metric::GiniSimpson, &dist, true).unwrap();
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn scores_histograms_in_place() {
        let store = store();
        let scope = scope(CouncilorType::Elected);
        let scores =
            score_series(&store, &scope, &[1, 2], &HistorySettings::default(), &NullProgress)
                .unwrap();
        assert_eq!(scores.scored, 4);
        assert!(scores.skipped.is_empty());

        let record = store.histogram_record(&scope, 1, 2014).unwrap();
        assert!((record.score.unwrap() - 0.75).abs() < 1e-9);
        let record = store.histogram_record(&scope, 2, 2014).unwrap();
        assert!((record.score.unwrap() - 1.0).abs() < 1e-9);
        let record = store.histogram_record(&scope, 1, 2018).unwrap();
        assert!(record.score.unwrap().abs() < 1e-9);
    }

    #[test]
    fn degenerate_histogram_is_skipped_and_cleared() {
        let store = store();
        let scope = scope(CouncilorType::Elected);
        store.write_histogram_score(&scope, 3, 2018, 0.5).unwrap();
        store.write_histogram_rank(&scope, 3, 2018, 1).unwrap();

        let scores =
            score_series(&store, &scope, &[3], &HistorySettings::default(), &NullProgress)
                .unwrap();
        assert_eq!(scores.scored, 0);
        assert_eq!(scores.skipped.len(), 1);
        assert_eq!(scores.skipped[0].year, 2018);

        let record = store.histogram_record(&scope, 3, 2018).unwrap();
        assert_eq!(record.score, None);
        assert_eq!(record.rank, None);
    }

    #[test]
    fn each_year_is_ranked_separately() {
        let store = store();
        let summaries =
            compute_history(&store, &[1, 2, 3], &HistorySettings::default(), &NullProgress)
                .unwrap();
        assert_eq!(summaries.len(), 2);

        let elected = &summaries[0];
        assert_eq!(elected.scope.councilor_type, CouncilorType::Elected);
        assert_eq!(elected.rankings.keys().copied().collect::<Vec<_>>(), vec![2014, 2018]);

        assert_eq!(rank_of(&store, 2, 2014), Some(1));
        assert_eq!(rank_of(&store, 1, 2014), Some(2));
        assert_eq!(rank_of(&store, 2, 2018), Some(1));
        assert_eq!(rank_of(&store, 1, 2018), Some(2));
        assert_eq!(rank_of(&store, 3, 2018), None);

        // The candidate series is ranked on its own.
        let candidate = &summaries[1];
        assert_eq!(candidate.rankings[&2018].len(), 1);
        assert_eq!(candidate.rankings[&2018][0].rank, 1);
    }

    #[test]
    fn changing_one_year_leaves_other_years_ranks_alone() {
        let store = store();
        let scope = scope(CouncilorType::Elected);
        compute_series(
            &store,
            CouncilorType::Elected,
            &[1, 2, 3],
            &HistorySettings::default(),
            &NullProgress,
        )
        .unwrap();
        let before = (rank_of(&store, 1, 2014), rank_of(&store, 2, 2014));

        // Flip the 2018 order and re-rank.
        store.write_histogram_score(&scope, 1, 2018, 0.9).unwrap();
        store.write_histogram_score(&scope, 2, 2018, 0.2).unwrap();
        let rankings = rank_series(&store, &scope).unwrap();

        assert_eq!(rankings[&2018][0].locality_id, 1);
        assert_eq!((rank_of(&store, 1, 2014), rank_of(&store, 2, 2014)), before);
    }

    #[test]
    fn other_methods_are_not_touched() {
        let store = store();
        let settings = HistorySettings {
            method: "kmeans".to_string(),
            ..HistorySettings::default()
        };
        let summaries = compute_history(&store, &[1, 2], &settings, &NullProgress).unwrap();
        assert!(summaries.iter().all(|s| s.scores.scored == 0 && s.rankings.is_empty()));

        let record = store
            .histogram_record(&scope(CouncilorType::Elected), 1, 2014)
            .unwrap();
        assert_eq!(record.score, None);
    }
}
