//! Dense ordinal ranking of scores within one comparison scope.
//!
//! Items are sorted by score descending and ranked by 1-based position, so
//! every item gets its own rank even when scores tie. Ties are broken by
//! ascending locality id, which makes the ranking independent of the order
//! the store returned the scores in.

use std::cmp::Ordering;

use council_diversity_models::{LocalityId, Rank, RankedEntry};

/// Ranks `items` by descending score.
///
/// Each locality is expected to appear at most once. NaN scores, which the
/// calculators never produce, sort after every real score.
#[must_use]
pub fn assign_ranks(items: &[(LocalityId, f64)]) -> Vec<RankedEntry> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|(a_id, a), (b_id, b)| by_score_desc(*a, *b).then_with(|| a_id.cmp(b_id)));

    sorted
        .into_iter()
        .zip(1..)
        .map(|((locality_id, score), rank): ((LocalityId, f64), Rank)| RankedEntry {
            locality_id,
            score,
            rank,
        })
        .collect()
}

fn by_score_desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}
