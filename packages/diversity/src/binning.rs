//! Quantizes raw observations into a frequency distribution.
//!
//! A width of zero groups observations by exact value. A positive width
//! maps each numeric value to `floor(value / width) * width`; categorical
//! observations are rejected in that case.
//!
//! Quotients within [`SNAP_TOLERANCE`] of an integer are snapped to it before
//! flooring, so values that are exact multiples of a fractional width (e.g.
//! `4.3` at `0.1`, whose quotient is `42.999...`) land in their own bin and
//! re-binning a bin key at the same width returns the same key.

use council_diversity_models::{BinKey, FrequencyDistribution, Observation};

use crate::DiversityError;

/// Relative distance from an integer below which a quotient is treated as
/// that integer.
const SNAP_TOLERANCE: f64 = 1e-9;

/// Bins `observations` at `width` and counts each bin.
///
/// The result does not depend on the order of `observations`. An empty
/// slice yields an empty distribution.
///
/// # Errors
///
/// * [`DiversityError::InvalidBinWidth`] if `width` is negative or not finite
/// * [`DiversityError::NonNumericObservation`] if `width > 0` and any
///   observation is categorical
/// * [`DiversityError::NonFiniteObservation`] if a numeric observation is NaN
///   or infinite
pub fn bin(
    observations: &[Observation],
    width: f64,
) -> Result<FrequencyDistribution, DiversityError> {
    check_width(width)?;

    let mut distribution = FrequencyDistribution::new();
    for observation in observations {
        distribution.record(bin_key(observation, width)?);
    }

    Ok(distribution)
}

/// Bins pre-counted numeric values, e.g. histogram buckets, without
/// materializing one observation per count.
///
/// Equivalent to [`bin`] over each value repeated `count` times.
///
/// # Errors
///
/// Same as [`bin`].
pub fn bin_counted(
    values: impl IntoIterator<Item = (f64, u64)>,
    width: f64,
) -> Result<FrequencyDistribution, DiversityError> {
    check_width(width)?;

    values
        .into_iter()
        .map(|(value, count)| {
            bin_key(&Observation::Numeric(value), width).map(|key| (key, count))
        })
        .collect()
}

fn check_width(width: f64) -> Result<(), DiversityError> {
    if !width.is_finite() || width < 0.0 {
        return Err(DiversityError::InvalidBinWidth { width });
    }
    Ok(())
}

/// `floor(value / width)`, with quotients that sit on an integer up to
/// rounding error snapped to it.
fn bin_index(value: f64, width: f64) -> f64 {
    let quotient = value / width;
    let nearest = quotient.round();
    if (quotient - nearest).abs() <= SNAP_TOLERANCE * nearest.abs().max(1.0) {
        nearest
    } else {
        quotient.floor()
    }
}

/// Maps a single observation to its bin key. `width` must already be
/// validated as finite and non-negative.
fn bin_key(observation: &Observation, width: f64) -> Result<BinKey, DiversityError> {
    match observation {
        Observation::Numeric(value) if !value.is_finite() => {
            Err(DiversityError::NonFiniteObservation { value: *value })
        }
        Observation::Numeric(value) if width > 0.0 => {
            Ok(BinKey::numeric(bin_index(*value, width) * width))
        }
        Observation::Numeric(value) => Ok(BinKey::numeric(*value)),
        Observation::Categorical(value) if width > 0.0 => {
            Err(DiversityError::NonNumericObservation {
                value: value.clone(),
                width,
            })
        }
        Observation::Categorical(value) => Ok(BinKey::categorical(value.as_str())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(values: &[f64]) -> Vec<Observation> {
        values.iter().copied().map(Observation::Numeric).collect()
    }

    #[test]
    fn zero_width_groups_exact_values() {
        let observations = vec![
            Observation::from("M"),
            Observation::from("F"),
            Observation::from("M"),
            Observation::Numeric(3.0),
        ];
        let dist = bin(&observations, 0.0).unwrap();
        assert_eq!(dist.total(), 4);
        assert_eq!(dist.category_count(), 3);
        assert_eq!(dist.get(&BinKey::categorical("M")), 2);
        assert_eq!(dist.get(&BinKey::numeric(3.0)), 1);
    }

    #[test]
    fn decade_bins_floor_ages() {
        let dist = bin(&numeric(&[34.0, 39.9, 40.0, 41.0, 67.0]), 10.0).unwrap();
        let bins: Vec<_> = dist.iter().map(|(k, n)| (k.clone(), n)).collect();
        assert_eq!(
            bins,
            vec![
                (BinKey::numeric(30.0), 2),
                (BinKey::numeric(40.0), 2),
                (BinKey::numeric(60.0), 1),
            ]
        );
    }

    #[test]
    fn floor_rounds_toward_negative_infinity() {
        let dist = bin(&numeric(&[-0.5, -10.0, -10.5]), 10.0).unwrap();
        assert_eq!(dist.get(&BinKey::numeric(-10.0)), 2);
        assert_eq!(dist.get(&BinKey::numeric(-20.0)), 1);
    }

    #[test]
    fn fractional_width() {
        let dist = bin(&numeric(&[0.0, 2.4, 2.5, 7.6]), 2.5).unwrap();
        assert_eq!(dist.get(&BinKey::numeric(0.0)), 2);
        assert_eq!(dist.get(&BinKey::numeric(2.5)), 1);
        assert_eq!(dist.get(&BinKey::numeric(7.5)), 1);
    }

    #[test]
    fn fractional_width_keeps_exact_multiples_in_their_bin() {
        let dist = bin(&numeric(&[4.3, 4.35, 0.3, 0.7]), 0.1).unwrap();
        assert_eq!(dist.category_count(), 3);

        let keys: Vec<f64> = dist
            .iter()
            .map(|(key, _)| match key {
                BinKey::Numeric(lower) => *lower,
                BinKey::Categorical(_) => unreachable!("numeric input yields numeric keys"),
            })
            .collect();
        assert!((keys[0] - 0.3).abs() < 1e-9, "{keys:?}");
        assert!((keys[1] - 0.7).abs() < 1e-9, "{keys:?}");
        assert!((keys[2] - 4.3).abs() < 1e-9, "{keys:?}");
        assert_eq!(dist.iter().last().map(|(_, n)| n), Some(2));

        let rebinned = bin(&numeric(&keys), 0.1).unwrap();
        let rebinned_keys: Vec<&BinKey> = rebinned.iter().map(|(key, _)| key).collect();
        let original_keys: Vec<&BinKey> = dist.iter().map(|(key, _)| key).collect();
        assert_eq!(rebinned_keys, original_keys);
    }

    #[test]
    fn counted_values_match_repeated_observations() {
        let counted = bin_counted([(30.0, 3), (35.0, 1), (50.0, 0), (60.0, 2)], 10.0).unwrap();
        let repeated = bin(&numeric(&[30.0, 30.0, 30.0, 35.0, 60.0, 60.0]), 10.0).unwrap();
        assert_eq!(counted, repeated);
        assert_eq!(counted.get(&BinKey::numeric(30.0)), 4);
        assert!(matches!(
            bin_counted([(1.0, 1)], -1.0),
            Err(DiversityError::InvalidBinWidth { .. })
        ));
    }

    #[test]
    fn categorical_with_nonzero_width_is_rejected() {
        let observations = vec![Observation::Numeric(40.0), Observation::from("unknown")];
        let err = bin(&observations, 10.0).unwrap_err();
        assert!(matches!(
            err,
            DiversityError::NonNumericObservation { ref value, .. } if value == "unknown"
        ));
    }

    #[test]
    fn invalid_widths_are_rejected() {
        for width in [-1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                bin(&numeric(&[1.0]), width),
                Err(DiversityError::InvalidBinWidth { .. })
            ));
        }
    }

    #[test]
    fn non_finite_observation_is_rejected() {
        assert!(matches!(
            bin(&numeric(&[f64::NAN]), 0.0),
            Err(DiversityError::NonFiniteObservation { .. })
        ));
    }

    #[test]
    fn empty_input_yields_empty_distribution() {
        let dist = bin(&[], 10.0).unwrap();
        assert!(dist.is_empty());
        assert_eq!(dist.total(), 0);
    }

    #[test]
    fn order_independent() {
        let forward = bin(&numeric(&[21.0, 55.0, 58.0, 33.0]), 10.0).unwrap();
        let reversed = bin(&numeric(&[33.0, 58.0, 55.0, 21.0]), 10.0).unwrap();
        assert_eq!(forward, reversed);
    }

    #[test]
    fn rebinning_at_same_width_is_idempotent() {
        let first = bin(&numeric(&[18.0, 27.0, 29.0, 45.0, 45.5, 71.0]), 10.0).unwrap();
        let expanded: Vec<Observation> = first
            .iter()
            .flat_map(|(key, n)| {
                let BinKey::Numeric(lower) = key else {
                    unreachable!("numeric input yields numeric keys")
                };
                std::iter::repeat_n(Observation::Numeric(*lower), usize::try_from(n).unwrap())
            })
            .collect();
        assert_eq!(bin(&expanded, 10.0).unwrap(), first);
    }
}
