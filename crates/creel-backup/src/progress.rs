//! Progress reporting for backup and restore runs

use indicatif::{ProgressBar, ProgressStyle};

/// Optional progress bar ticked once per table or bucket.
///
/// The hidden variant does nothing, so library callers and tests pay no
/// terminal cost.
#[derive(Debug, Clone, Default)]
pub struct PipelineProgress {
    bar: Option<ProgressBar>,
}

impl PipelineProgress {
    pub fn hidden() -> Self {
        Self { bar: None }
    }

    /// Visible bar with `total` steps
    pub fn bar(total: u64, message: &str) -> Self {
        let bar = ProgressBar::new(total);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(message.to_string());
        Self { bar: Some(bar) }
    }

    pub fn set_length(&self, total: u64) {
        if let Some(bar) = &self.bar {
            bar.set_length(total);
        }
    }

    pub fn set_message(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.to_string());
        }
    }

    pub fn inc(&self) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    /// Print a line above the bar without tearing it
    pub fn println(&self, line: &str) {
        if let Some(bar) = &self.bar {
            bar.println(line);
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.bar.is_some()
    }
}
