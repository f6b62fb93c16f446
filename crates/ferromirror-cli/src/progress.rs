//! Terminal progress bars

use ferromirror_types::{ProgressReporter, ProgressUpdate};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

const BAR_TEMPLATE: &str = "{spinner:.green} {prefix:.bold} [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}";

/// Progress reporter drawing an `indicatif` bar on stderr
pub struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    /// Create a bar titled `title`; hidden in quiet mode
    pub fn new(title: &str, quiet: bool) -> Self {
        let bar = ProgressBar::new(0);
        if quiet {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        let style = ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix(title.to_string());
        bar.set_message("Listing remote files...");
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl ProgressReporter for BarReporter {
    fn report(&self, update: &ProgressUpdate) {
        if self.bar.length() != Some(update.total) {
            self.bar.set_length(update.total);
        }
        self.bar.set_position(update.processed);
        self.bar.set_message(update.message.clone());
    }

    fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Format bytes as a human readable size
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_hidden_bar_tracks_updates() {
        let reporter = BarReporter::new("Sync", true);
        reporter.report(&ProgressUpdate::new(1, 4, "a.txt"));
        assert_eq!(reporter.bar.length(), Some(4));
        assert_eq!(reporter.bar.position(), 1);
        reporter.finish("done");
        assert!(reporter.bar.is_finished());
    }
}
