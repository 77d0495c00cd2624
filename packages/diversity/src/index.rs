//! Gini-Simpson and Shannon diversity calculators.
//!
//! Both calculators are pure functions of a [`FrequencyDistribution`] and
//! do not depend on category order. With `normalize` set, scores are divided
//! by the maximum achievable for the same number of nonzero categories `k`,
//! which puts them in `[0, 1]`; a distribution with `k <= 1` normalizes to
//! `0.0` for both metrics.

#![allow(clippy::cast_precision_loss)]

use council_diversity_models::{FrequencyDistribution, Metric, Observation};

use crate::DiversityError;

/// Gini-Simpson index: the probability that two observations drawn without
/// replacement fall into different categories.
///
/// Raw index is `1 - Σ (n_i/N) · ((n_i-1)/(N-1))`. The normalized index
/// divides by `(k-1)/k · N/(N-1)`.
///
/// # Errors
///
/// Returns [`DiversityError::InsufficientData`] if the distribution holds
/// fewer than two observations.
pub fn gini_simpson(
    dist: &FrequencyDistribution,
    normalize: bool,
) -> Result<f64, DiversityError> {
    let total = dist.total();
    check_observations(total, Metric::GiniSimpson)?;

    let n_total = total as f64;
    let same = dist
        .counts()
        .map(|n| {
            let n = n as f64;
            (n / n_total) * ((n - 1.0) / (n_total - 1.0))
        })
        .sum::<f64>();
    let raw = 1.0 - same;

    if !normalize {
        return Ok(raw);
    }

    let k = dist.category_count();
    if k <= 1 {
        return Ok(0.0);
    }

    let k = k as f64;
    let max = (k - 1.0) / k * n_total / (n_total - 1.0);
    Ok((raw / max).clamp(0.0, 1.0))
}

/// Shannon entropy `-Σ p_i · ln(p_i)` of the category proportions.
///
/// The normalized index divides by `ln(k)`.
///
/// # Errors
///
/// Returns [`DiversityError::InsufficientData`] if the distribution is empty.
pub fn shannon(dist: &FrequencyDistribution, normalize: bool) -> Result<f64, DiversityError> {
    let total = dist.total();
    check_observations(total, Metric::Shannon)?;

    let n_total = total as f64;
    let raw = dist
        .counts()
        .map(|n| {
            let p = n as f64 / n_total;
            -p * p.ln()
        })
        .sum::<f64>()
        .max(0.0);

    if !normalize {
        return Ok(raw);
    }

    let k = dist.category_count();
    if k <= 1 {
        return Ok(0.0);
    }

    Ok((raw / (k as f64).ln()).clamp(0.0, 1.0))
}

/// Scores `dist` with `metric`.
///
/// # Errors
///
/// Returns [`DiversityError::InsufficientData`] if the distribution is too
/// small for `metric`.
pub fn score(
    metric: Metric,
    dist: &FrequencyDistribution,
    normalize: bool,
) -> Result<f64, DiversityError> {
    match metric {
        Metric::GiniSimpson => gini_simpson(dist, normalize),
        Metric::Shannon => shannon(dist, normalize),
    }
}

/// Bins `observations` at `bin_width` and scores the result with `metric`.
///
/// # Errors
///
/// Returns any binning error, or [`DiversityError::InsufficientData`] if
/// there are too few observations for `metric`.
pub fn score_observations(
    metric: Metric,
    observations: &[Observation],
    bin_width: f64,
    normalize: bool,
) -> Result<f64, DiversityError> {
    let dist = crate::binning::bin(observations, bin_width)?;
    score(metric, &dist, normalize)
}

fn check_observations(total: u64, metric: Metric) -> Result<(), DiversityError> {
    let required = metric.min_observations();
    if total < required {
        return Err(DiversityError::InsufficientData {
            observations: total,
            required,
        });
    }
    Ok(())
}
