//! Progress hooks for the snapshot, ranking and history passes.
//!
//! A pass reports how many units it will visit (locality and factor pairs
//! for a snapshot, factors for ranking, localities for a history series),
//! ticks once per unit finished, and closes with a one-line summary such as
//! `Scored 12 elected histograms, skipped 1`. The terminal binary draws
//! these as bars; library callers and tests pass [`NullProgress`].

/// Receives updates from one scoring or ranking pass.
pub trait ProgressCallback: Send + Sync {
    /// Number of units the pass will visit.
    fn set_total(&self, total: u64);

    /// Marks `delta` more units as finished.
    fn inc(&self, delta: u64);

    /// Names the series or factor currently being processed.
    fn set_message(&self, msg: String);

    /// Ends the pass with its summary line.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}
