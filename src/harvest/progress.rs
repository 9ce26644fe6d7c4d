//! Terminal progress over the work queue

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

use crate::celex::CelexNumber;

/// Progress bar over pending identifiers (hidden in quiet mode)
pub struct HarvestProgress {
    progress_bar: Option<ProgressBar>,
    start_time: Instant,
}

impl HarvestProgress {
    pub fn new(total: usize, quiet: bool) -> Self {
        let progress_bar = (!quiet).then(|| {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        });

        Self {
            progress_bar,
            start_time: Instant::now(),
        }
    }

    /// Advance by one identifier
    pub fn document_done(&self, celex: &CelexNumber, resolved: bool) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(1);
            let done = pb.position();
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 { done as f64 / elapsed } else { 0.0 };
            let mark = if resolved { "ok" } else { "skipped" };
            pb.set_message(format!("{:.2} docs/s | {} {}", rate, celex, mark));
        }
    }

    pub fn batch_published(&self, index: usize, total: usize) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(format!("batch {}/{} published", index, total));
        }
    }

    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_with_message("Done");
        }
    }

    pub fn abandon(&self, reason: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.abandon_with_message(reason.to_string());
        }
    }
}
