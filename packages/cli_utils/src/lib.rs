#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal helpers for the council diversity binaries.
//!
//! [`IndicatifProgress`] draws the scoring and ranking passes as bars:
//! one per locality pass (snapshot factors or a history series) and one for
//! the factor ranking. [`init_logger`] sends `log` output through the same
//! [`MultiProgress`] so messages land above the bars.

use std::sync::Arc;
use std::time::Duration;

use council_diversity::progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

const LOCALITIES_TEMPLATE: &str = "  {msg} {wide_bar:.cyan/dim} {pos}/{len} {percent}% [{eta}]";
const FACTORS_TEMPLATE: &str = "{msg} {wide_bar:.green/dim} {pos}/{len} factors [{elapsed}]";

/// Progress of one scoring or ranking pass, drawn with `indicatif`.
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Counting style, applied once the pass reports its size.
    bar_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Bar for a pass over localities, labelled with the series or factor
    /// being scored. Spins while the locality list is resolved.
    #[must_use]
    pub fn localities_bar(multi: &MultiProgress, label: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(label.to_string());

        Arc::new(Self {
            bar,
            bar_style: counting_style(LOCALITIES_TEMPLATE),
        })
    }

    /// Bar for ranking `factors` factors one after another.
    #[must_use]
    pub fn factors_bar(multi: &MultiProgress, factors: u64) -> Arc<dyn ProgressCallback> {
        let bar_style = counting_style(FACTORS_TEMPLATE);
        let bar = multi.add(ProgressBar::new(factors));
        bar.set_style(bar_style.clone());
        bar.set_message("Ranking");

        Arc::new(Self { bar, bar_style })
    }
}

fn counting_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Initializes `pretty_env_logger` (filtered by `RUST_LOG`) behind
/// `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // Already set when called twice, e.g. from tests.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_bar_tracks_progress() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let progress = IndicatifProgress::localities_bar(&multi, "Scoring elected histograms");
        progress.set_total(3);
        progress.inc(2);
        progress.set_message("Scoring elected/equal/2".to_string());
        progress.finish("Scored 2 elected histograms, skipped 0".to_string());
    }

    #[test]
    fn counting_styles_parse() {
        for template in [LOCALITIES_TEMPLATE, FACTORS_TEMPLATE] {
            assert!(ProgressStyle::with_template(template).is_ok(), "{template}");
        }
    }

    #[test]
    fn factors_bar_counts_factors() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let progress = IndicatifProgress::factors_bar(&multi, 2);
        progress.set_total(2);
        progress.inc(2);
        progress.finish("Ranked 2 factors".to_string());
    }

    #[test]
    fn init_logger_can_run_twice() {
        let _first = init_logger();
        let _second = init_logger();
    }
}
