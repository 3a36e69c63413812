#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the retail crawl toolchain.
//!
//! Provides an `indicatif` spinner behind the [`ProgressObserver`] trait,
//! plus [`init_logger`] which sets up `indicatif-log-bridge` so that
//! `log::info!` and friends are suspended while the spinner redraws.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use retail_crawl_scraper::{BatchProgress, ProgressObserver};

pub use indicatif::MultiProgress;

/// An `indicatif` spinner that implements [`ProgressObserver`].
///
/// The crawl queue grows while it is drained, so no total is ever known;
/// the spinner shows the latest counters instead.
pub struct IndicatifProgress {
    bar: ProgressBar,
}

impl IndicatifProgress {
    /// Adds a spinner labelled `message` to `multi`.
    #[must_use]
    pub fn batch_spinner(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressObserver> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.yellow} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        Arc::new(Self { bar })
    }
}

impl ProgressObserver for IndicatifProgress {
    fn on_batch(&self, progress: &BatchProgress) {
        self.bar.set_message(progress.to_string());
    }

    fn on_finish(&self, progress: &BatchProgress) {
        self.bar.finish_with_message(progress.to_string());
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // Already set in tests.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}
