//! Terminal progress bar for planning and applying.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

use broke_core::{Phase, ProgressSink};

/// Shows one bar per phase, cleared when the phase ends.
#[derive(Default)]
pub struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressSink for BarProgress {
    fn start(&self, phase: Phase, total: u64) {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::with_template("{prefix:>9.cyan.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.set_prefix(phase.to_string());
        if let Ok(mut current) = self.bar.lock() {
            *current = Some(bar);
        }
    }

    fn advance(&self, username: &str) {
        if let Ok(current) = self.bar.lock() {
            if let Some(bar) = current.as_ref() {
                bar.set_message(username.to_string());
                bar.inc(1);
            }
        }
    }

    fn finish(&self) {
        if let Ok(mut current) = self.bar.lock() {
            if let Some(bar) = current.take() {
                bar.finish_and_clear();
            }
        }
    }
}
