#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Value types shared by the diversity engine and its stores.
//!
//! This crate defines the demographic factors a council is scored on, the
//! observations pulled from councilor records, the binned frequency
//! distributions the calculators consume, and the historical age histogram
//! records that the longitudinal ranking works over.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Identifier of a local council.
pub type LocalityId = u32;

/// Calendar year of an election or candidate registration.
pub type Year = i32;

/// 1-based position within a ranking scope.
pub type Rank = u32;

/// Demographic factor a council's diversity is measured on.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Factor {
    /// Councilor age in years (numeric, usually binned by decade).
    Age,
    /// Councilor gender (categorical).
    Gender,
    /// Councilor party affiliation (categorical).
    Party,
}

impl Factor {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Age, Self::Gender, Self::Party]
    }

    /// Name of the councilor record field holding this factor's value.
    #[must_use]
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::Age => "age",
            Self::Gender => "gender",
            Self::Party => "jdName",
        }
    }
}

/// Which series of councilors an age histogram describes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CouncilorType {
    /// Councilors who won their seat.
    Elected,
    /// Everyone who stood for election.
    Candidate,
}

impl CouncilorType {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Elected, Self::Candidate]
    }
}

/// Diversity metric used to score a frequency distribution.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Metric {
    /// Probability that two observations drawn without replacement differ.
    #[default]
    GiniSimpson,
    /// Shannon entropy of the category proportions (natural log).
    Shannon,
}

impl Metric {
    /// Smallest number of observations the raw formula is defined for.
    #[must_use]
    pub const fn min_observations(self) -> u64 {
        match self {
            Self::GiniSimpson => 2,
            Self::Shannon => 1,
        }
    }
}

/// A single raw value taken from one councilor record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Observation {
    /// A numeric value such as an age.
    Numeric(f64),
    /// A categorical value such as a gender or party name.
    Categorical(String),
}

impl From<f64> for Observation {
    fn from(value: f64) -> Self {
        Self::Numeric(value)
    }
}

impl From<u32> for Observation {
    fn from(value: u32) -> Self {
        Self::Numeric(f64::from(value))
    }
}

impl From<&str> for Observation {
    fn from(value: &str) -> Self {
        Self::Categorical(value.to_string())
    }
}

impl From<String> for Observation {
    fn from(value: String) -> Self {
        Self::Categorical(value)
    }
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "{v}"),
            Self::Categorical(s) => write!(f, "{s:?}"),
        }
    }
}

/// Category key of a frequency distribution after binning.
///
/// Numeric keys compare by [`f64::total_cmp`] and `-0.0` is folded into
/// `0.0` on construction, so equal bins always collapse into one entry.
/// Numeric keys sort before categorical ones.
#[derive(Debug, Clone)]
pub enum BinKey {
    /// Lower bound of a numeric bin (or the exact value when unbinned).
    Numeric(f64),
    /// Exact categorical value.
    Categorical(String),
}

impl BinKey {
    /// Creates a numeric key, normalising negative zero.
    #[must_use]
    pub fn numeric(value: f64) -> Self {
        Self::Numeric(if value == 0.0 { 0.0 } else { value })
    }

    /// Creates a categorical key.
    #[must_use]
    pub fn categorical(value: impl Into<String>) -> Self {
        Self::Categorical(value.into())
    }
}

impl PartialEq for BinKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BinKey {}

impl PartialOrd for BinKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BinKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.total_cmp(b),
            (Self::Numeric(_), Self::Categorical(_)) => Ordering::Less,
            (Self::Categorical(_), Self::Numeric(_)) => Ordering::Greater,
            (Self::Categorical(a), Self::Categorical(b)) => a.cmp(b),
        }
    }
}

impl Hash for BinKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Numeric(v) => {
                0u8.hash(state);
                v.to_bits().hash(state);
            }
            Self::Categorical(s) => {
                1u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl std::fmt::Display for BinKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "{v}"),
            Self::Categorical(s) => f.write_str(s),
        }
    }
}

/// Occurrence count per category key.
///
/// Every stored count is positive and the counts sum to the number of
/// observations that were recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyDistribution {
    counts: BTreeMap<BinKey, u64>,
}

impl FrequencyDistribution {
    /// Creates an empty distribution.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// Records one observation falling into `key`.
    pub fn record(&mut self, key: BinKey) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    /// Total number of recorded observations (`N`).
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Number of categories with a nonzero count (`k`).
    #[must_use]
    pub fn category_count(&self) -> usize {
        self.counts.len()
    }

    /// Whether no observations were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count recorded for `key`, or zero.
    #[must_use]
    pub fn get(&self, key: &BinKey) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Iterates `(key, count)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&BinKey, u64)> {
        self.counts.iter().map(|(k, &n)| (k, n))
    }

    /// Iterates the counts in key order.
    pub fn counts(&self) -> impl Iterator<Item = u64> + '_ {
        self.counts.values().copied()
    }
}

/// Builds a distribution from explicit `(key, count)` pairs. Zero counts are
/// dropped and repeated keys are summed.
impl FromIterator<(BinKey, u64)> for FrequencyDistribution {
    fn from_iter<I: IntoIterator<Item = (BinKey, u64)>>(iter: I) -> Self {
        let mut counts = BTreeMap::new();
        for (key, n) in iter {
            if n > 0 {
                *counts.entry(key).or_insert(0) += n;
            }
        }
        Self { counts }
    }
}

/// One bucket of a pre-aggregated age histogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// Inclusive lower bound of the bucket (e.g. `30` for ages 30-39).
    #[serde(rename = "minAge")]
    pub lower_bound: f64,
    /// Number of councilors in the bucket.
    pub count: u64,
}

impl HistogramBucket {
    /// Creates a new bucket.
    #[must_use]
    pub const fn new(lower_bound: f64, count: u64) -> Self {
        Self { lower_bound, count }
    }
}

/// Key prefix identifying one historical histogram series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramScope {
    /// Elected councilors or all candidates.
    pub councilor_type: CouncilorType,
    /// Label of the upstream bucketing method (e.g. `"equal"`).
    pub method: String,
    /// Upstream bucketing granularity level.
    pub level: u8,
}

impl HistogramScope {
    /// Creates a new scope.
    #[must_use]
    pub fn new(councilor_type: CouncilorType, method: impl Into<String>, level: u8) -> Self {
        Self {
            councilor_type,
            method: method.into(),
            level,
        }
    }
}

impl std::fmt::Display for HistogramScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/level {}",
            self.councilor_type, self.method, self.level
        )
    }
}

/// One year of one locality's age histogram within a [`HistogramScope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramRecord {
    /// Locality the histogram belongs to.
    pub locality_id: LocalityId,
    /// Year of the election the histogram describes.
    pub year: Year,
    /// Buckets ordered by lower bound.
    pub buckets: Vec<HistogramBucket>,
    /// Diversity score, once computed.
    pub score: Option<f64>,
    /// Rank within `(councilor type, year)`, once computed.
    pub rank: Option<Rank>,
}

impl HistogramRecord {
    /// Number of councilors across all buckets.
    #[must_use]
    pub fn observation_count(&self) -> u64 {
        self.buckets.iter().map(|b| b.count).sum()
    }
}

/// Persisted snapshot diversity score for one locality and factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiversityIndexRecord {
    /// Locality the score belongs to.
    pub locality_id: LocalityId,
    /// Factor the score measures.
    pub factor: Factor,
    /// Diversity score.
    pub score: f64,
    /// Rank among all localities for this factor, once computed.
    pub rank: Option<Rank>,
}

/// One entity's position in a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    /// Ranked locality.
    pub locality_id: LocalityId,
    /// Score the rank was derived from.
    pub score: f64,
    /// 1-based rank, 1 being the most diverse.
    pub rank: Rank,
}

/// A raw councilor record as deposited by the external data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouncilorRecord {
    /// Council the councilor sits on.
    #[serde(rename = "localId")]
    pub locality_id: LocalityId,
    /// Councilor name.
    #[serde(default)]
    pub name: Option<String>,
    /// Age in years.
    #[serde(default)]
    pub age: Option<f64>,
    /// Gender label.
    #[serde(default)]
    pub gender: Option<String>,
    /// Party name.
    #[serde(default, rename = "jdName")]
    pub party: Option<String>,
}

impl CouncilorRecord {
    /// Returns this record's value for `factor`, if present.
    #[must_use]
    pub fn observation(&self, factor: Factor) -> Option<Observation> {
        match factor {
            Factor::Age => self.age.map(Observation::Numeric),
            Factor::Gender => self.gender.clone().map(Observation::Categorical),
            Factor::Party => self.party.clone().map(Observation::Categorical),
        }
    }
}

/// A historical age histogram document as deposited by the upstream
/// aggregation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramDocument {
    /// Council the histogram belongs to.
    #[serde(rename = "localId")]
    pub locality_id: LocalityId,
    /// Elected councilors or all candidates.
    pub councilor_type: CouncilorType,
    /// Upstream bucketing method label.
    pub method: String,
    /// Upstream bucketing granularity level.
    pub level: u8,
    /// Election year.
    pub year: Year,
    /// Histogram buckets.
    pub data: Vec<HistogramBucket>,
}

impl HistogramDocument {
    /// Scope this document belongs to.
    #[must_use]
    pub fn scope(&self) -> HistogramScope {
        HistogramScope::new(self.councilor_type, self.method.clone(), self.level)
    }
}
