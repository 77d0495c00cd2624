//! Batch steps shared by the subcommands and the interactive flow.
//!
//! Each step logs its own timing and summary. Progress bars are added to
//! the shared [`MultiProgress`] that is registered with the log bridge.

use std::path::Path;
use std::time::Instant;

use council_diversity::config::{DiversityConfig, HistorySettings, LocalityRange, SnapshotSettings};
use council_diversity::{history, snapshot};
use council_diversity_cli_utils::{IndicatifProgress, MultiProgress};
use council_diversity_models::{
    CouncilorRecord, Factor, HistogramDocument, HistogramScope, LocalityId,
};
use council_diversity_store::import::read_json_documents;
use council_diversity_store::{DiversityStore, DuckDbStore, RecordSink as _, StoreError};

/// Localities from the configured range, or every locality with councilor
/// records when no range is configured. Used by the snapshot step.
///
/// # Errors
///
/// Returns [`StoreError`] if the store cannot list its localities.
pub fn configured_localities(
    store: &dyn DiversityStore,
    config: &DiversityConfig,
) -> Result<Vec<LocalityId>, StoreError> {
    match config.localities {
        Some(range) => Ok(range.ids()),
        None => store.fetch_localities(),
    }
}

/// Localities from `range`, or every locality with a histogram in `scope`
/// when no range is configured.
///
/// # Errors
///
/// Returns [`StoreError`] if the store cannot list the series' localities.
pub fn series_localities(
    store: &dyn DiversityStore,
    range: Option<LocalityRange>,
    scope: &HistogramScope,
) -> Result<Vec<LocalityId>, StoreError> {
    match range {
        Some(range) => Ok(range.ids()),
        None => store.fetch_histogram_localities(scope),
    }
}

/// Loads JSON exports into the store.
///
/// # Errors
///
/// Returns [`StoreError`] if a file cannot be read or decoded, or a write
/// fails.
pub fn run_import(
    store: &DuckDbStore,
    councilors: Option<&Path>,
    histograms: Option<&Path>,
) -> Result<(), StoreError> {
    if let Some(path) = councilors {
        let records: Vec<CouncilorRecord> = read_json_documents(path)?;
        let written = store.import_councilors(&records)?;
        log::info!("Imported {written} councilor records from {}", path.display());
    }

    if let Some(path) = histograms {
        let documents: Vec<HistogramDocument> = read_json_documents(path)?;
        let written = store.import_histograms(&documents)?;
        log::info!("Imported {written} age histograms from {}", path.display());
    }

    Ok(())
}

/// Scores the current councils of `localities`.
///
/// # Errors
///
/// Returns an error on malformed input or a store failure.
pub fn run_snapshot(
    store: &dyn DiversityStore,
    localities: &[LocalityId],
    settings: &SnapshotSettings,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    log::info!(
        "Computing {} snapshot for {} localities ({})",
        settings.metric,
        localities.len(),
        join(&settings.factors)
    );

    let progress = IndicatifProgress::localities_bar(multi, "Scoring localities");
    let summary = snapshot::compute_snapshot(
        store,
        localities,
        &settings.factors,
        settings,
        progress.as_ref(),
    )?;

    for skip in &summary.skipped {
        log::debug!(
            "Locality {} has no {} index: {}",
            skip.locality_id,
            skip.factor,
            skip.reason
        );
    }
    log::info!(
        "Snapshot finished in {:.1}s: {} scored, {} skipped",
        start.elapsed().as_secs_f64(),
        summary.scored,
        summary.skipped.len()
    );
    Ok(())
}

/// Recomputes the global ranking of each factor.
///
/// # Errors
///
/// Returns an error if a store read or write fails.
pub fn run_rank(
    store: &dyn DiversityStore,
    factors: &[Factor],
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let progress = IndicatifProgress::factors_bar(multi, factors.len() as u64);
    for (factor, ranked) in snapshot::rank_factors(store, factors, progress.as_ref())? {
        if let Some(top) = ranked.first() {
            log::info!(
                "Most diverse by {factor}: locality {} ({:.4})",
                top.locality_id,
                top.score
            );
        }
    }
    Ok(())
}

/// Scores and ranks each configured councilor series over the localities
/// in `range`, or over every locality the series has histograms for.
///
/// # Errors
///
/// Returns an error on malformed input or a store failure.
pub fn run_history(
    store: &dyn DiversityStore,
    range: Option<LocalityRange>,
    settings: &HistorySettings,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    for &councilor_type in &settings.councilor_types {
        let localities = series_localities(store, range, &settings.scope(councilor_type))?;
        let label = format!("Scoring {councilor_type} histograms");
        let progress = IndicatifProgress::localities_bar(multi, &label);
        let summary = history::compute_series(
            store,
            councilor_type,
            &localities,
            settings,
            progress.as_ref(),
        )?;

        for (year, ranked) in &summary.rankings {
            log::debug!("{} {year}: {} localities ranked", summary.scope, ranked.len());
        }
    }

    log::info!(
        "History finished in {:.1}s",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Runs snapshot, rank and history with the configured settings.
///
/// # Errors
///
/// Stops at the first failing step.
pub fn run_all(
    store: &dyn DiversityStore,
    config: &DiversityConfig,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let localities = configured_localities(store, config)?;

    run_snapshot(store, &localities, &config.snapshot, multi)?;
    run_rank(store, &config.snapshot.factors, multi)?;
    run_history(store, config.localities, &config.history, multi)?;

    log::info!(
        "All steps finished in {:.1}s",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use council_diversity_models::{CouncilorType, HistogramBucket};
    use council_diversity_store::{MemoryStore, RecordSink as _};
    use indicatif::ProgressDrawTarget;

    use super::*;

    fn councilor(locality_id: LocalityId, gender: &str) -> CouncilorRecord {
        CouncilorRecord {
            locality_id,
            name: None,
            age: Some(40.0),
            gender: Some(gender.to_string()),
            party: None,
        }
    }

    #[test]
    fn configured_range_takes_precedence() {
        let store = MemoryStore::new();
        store.import_councilors(&[councilor(9, "F")]).unwrap();

        let mut config = DiversityConfig::embedded().unwrap();
        config.localities = Some(LocalityRange { first: 2, last: 4 });
        assert_eq!(configured_localities(&store, &config).unwrap(), vec![2, 3, 4]);

        config.localities = None;
        assert_eq!(configured_localities(&store, &config).unwrap(), vec![9]);
    }

    #[test]
    fn history_without_range_covers_histogram_only_localities() {
        let store = MemoryStore::new();
        store
            .import_histograms(&[HistogramDocument {
                locality_id: 5,
                councilor_type: CouncilorType::Elected,
                method: "equal".to_string(),
                level: 2,
                year: 2018,
                data: vec![HistogramBucket::new(30.0, 2), HistogramBucket::new(40.0, 2)],
            }])
            .unwrap();
        assert!(store.fetch_localities().unwrap().is_empty());

        let mut settings = DiversityConfig::embedded().unwrap().history;
        settings.councilor_types = vec![CouncilorType::Elected];
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        run_history(&store, None, &settings, &multi).unwrap();

        let record = store
            .histogram_record(&settings.scope(CouncilorType::Elected), 5, 2018)
            .unwrap();
        assert!(record.score.is_some());
        assert_eq!(record.rank, Some(1));
    }

    #[test]
    fn history_range_limits_scored_localities() {
        let store = MemoryStore::new();
        let doc = |locality_id| HistogramDocument {
            locality_id,
            councilor_type: CouncilorType::Elected,
            method: "equal".to_string(),
            level: 2,
            year: 2018,
            data: vec![HistogramBucket::new(30.0, 1), HistogramBucket::new(40.0, 1)],
        };
        store.import_histograms(&[doc(1), doc(8)]).unwrap();

        let mut settings = DiversityConfig::embedded().unwrap().history;
        settings.councilor_types = vec![CouncilorType::Elected];
        let scope = settings.scope(CouncilorType::Elected);
        assert_eq!(series_localities(&store, None, &scope).unwrap(), vec![1, 8]);

        let range = Some(LocalityRange { first: 1, last: 3 });
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        run_history(&store, range, &settings, &multi).unwrap();

        assert!(store.histogram_record(&scope, 1, 2018).unwrap().score.is_some());
        assert_eq!(store.histogram_record(&scope, 8, 2018).unwrap().score, None);
    }

    #[test]
    fn joins_display_values() {
        assert_eq!(join(&[Factor::Age, Factor::Party]), "age, party");
    }
}
