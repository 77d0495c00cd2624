#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Diversity index calculation and ranking engine for local councils.
//!
//! Raw councilor values flow through [`binning`] into a frequency
//! distribution, are scored by one of the [`index`] calculators, and the
//! resulting scores are ranked with [`rank`]. The [`snapshot`] orchestrator
//! applies this to the current councils (one global ranking per factor);
//! the [`history`] orchestrator applies it to pre-aggregated age histograms
//! (one ranking per councilor type and year).
//!
//! Every orchestrator takes the record store as an explicit
//! `&dyn DiversityStore` argument.

pub mod binning;
pub mod config;
pub mod history;
pub mod index;
pub mod progress;
pub mod rank;
pub mod snapshot;

use council_diversity_store::StoreError;
use thiserror::Error;

pub use binning::bin;
pub use index::{gini_simpson, score, shannon};
pub use rank::assign_ranks;

/// Errors that can occur while computing or ranking diversity indices.
#[derive(Debug, Error)]
pub enum DiversityError {
    /// The bin width is negative, NaN, or infinite.
    #[error("Invalid bin width {width}: must be finite and non-negative")]
    InvalidBinWidth {
        /// The rejected width.
        width: f64,
    },

    /// A categorical observation was supplied with a nonzero bin width.
    #[error("Cannot bin non-numeric observation {value} with width {width}")]
    NonNumericObservation {
        /// The offending observation.
        value: String,
        /// The requested bin width.
        width: f64,
    },

    /// A numeric observation is NaN or infinite.
    #[error("Non-finite observation {value}")]
    NonFiniteObservation {
        /// The offending value.
        value: f64,
    },

    /// Too few observations for the metric to be defined.
    #[error("Insufficient data: {observations} observations, at least {required} required")]
    InsufficientData {
        /// Observations available.
        observations: u64,
        /// Observations the metric needs.
        required: u64,
    },

    /// Reading from or writing to the record store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DiversityError {
    /// Whether this error only means the input was too small to score.
    #[must_use]
    pub const fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}
