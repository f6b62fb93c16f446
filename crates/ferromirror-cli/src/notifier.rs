//! Console front end for notifications and the output log

use crate::progress::BarReporter;
use chrono::Local;
use console::{style, Term};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use ferromirror_types::{Logger, Notifier, ProgressReporter};
use std::sync::atomic::{AtomicBool, Ordering};

/// Notifier printing to the terminal and prompting with `dialoguer`
pub struct ConsoleNotifier {
    quiet: bool,
    interactive: bool,
}

impl ConsoleNotifier {
    /// Create a notifier; prompts only appear on an interactive terminal
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            interactive: Term::stderr().is_term(),
        }
    }

    /// Never prompt, e.g. for scripted use
    pub fn non_interactive(mut self) -> Self {
        self.interactive = false;
        self
    }
}

impl Notifier for ConsoleNotifier {
    fn status(&self, text: &str) {
        tracing::debug!("status: {}", text);
    }

    fn info(&self, text: &str) {
        if !self.quiet {
            println!("{} {}", style("✓").green().bold(), text);
        }
    }

    fn warn(&self, text: &str, choices: &[&str]) -> Option<String> {
        eprintln!("{} {}", style("!").yellow().bold(), text);
        if choices.is_empty() || !self.interactive {
            return None;
        }
        match Select::with_theme(&ColorfulTheme::default())
            .items(choices)
            .default(0)
            .interact_opt()
        {
            Ok(selection) => selection.map(|index| choices[index].to_string()),
            Err(e) => {
                tracing::warn!("Prompt failed: {}", e);
                None
            }
        }
    }

    fn error(&self, text: &str) {
        eprintln!("{} {}", style("✗").red().bold(), text);
    }

    fn progress(&self, title: &str, _cancellable: bool) -> Box<dyn ProgressReporter> {
        Box::new(BarReporter::new(title, self.quiet))
    }
}

/// Output log: every line goes to `tracing`, and to stderr once shown
#[derive(Default)]
pub struct ConsoleLogger {
    visible: AtomicBool,
}

impl ConsoleLogger {
    /// Create a logger that echoes lines when `verbose`
    pub fn new(verbose: bool) -> Self {
        Self {
            visible: AtomicBool::new(verbose),
        }
    }
}

impl Logger for ConsoleLogger {
    fn log(&self, line: &str) {
        tracing::info!(target: "ferromirror::log", "{}", line);
        if self.visible.load(Ordering::Relaxed) {
            eprintln!(
                "{} {}",
                style(Local::now().format("[%H:%M:%S]")).dim(),
                line
            );
        }
    }

    fn show(&self) {
        self.visible.store(true, Ordering::Relaxed);
    }

    fn dispose(&self) {
        self.visible.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warn_without_terminal_returns_none() {
        let notifier = ConsoleNotifier::new(true).non_interactive();
        assert_eq!(notifier.warn("Reset?", &["Reset", "Cancel"]), None);
    }

    #[test]
    fn test_logger_visibility() {
        let logger = ConsoleLogger::new(false);
        logger.show();
        assert!(logger.visible.load(Ordering::Relaxed));
        logger.dispose();
        assert!(!logger.visible.load(Ordering::Relaxed));
    }
}
