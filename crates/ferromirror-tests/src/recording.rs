//! Collaborators that remember what the engine told them

use ferromirror_types::{Logger, Notifier, ProgressReporter, ProgressUpdate};
use std::sync::{Arc, Mutex, PoisonError};

/// One call on the notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Status line
    Status(String),
    /// Information message
    Info(String),
    /// Warning with its choices
    Warn(String, Vec<String>),
    /// Error message
    Error(String),
    /// Progress started
    Progress(String),
}

#[derive(Debug, Default)]
struct ProgressLog {
    updates: Vec<ProgressUpdate>,
    finished: Option<String>,
}

/// Notifier recording every call
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<Notification>>,
    answer: Mutex<Option<String>>,
    progress: Arc<Mutex<ProgressLog>>,
}

impl RecordingNotifier {
    /// Notifier that answers warnings with nothing
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Notifier that picks `choice` for every warning
    pub fn answering(choice: &str) -> Arc<Self> {
        let notifier = Self::default();
        *notifier.answer.lock().unwrap_or_else(PoisonError::into_inner) = Some(choice.to_string());
        Arc::new(notifier)
    }

    /// Every call so far
    pub fn calls(&self) -> Vec<Notification> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, notification: Notification) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }

    /// Error messages so far
    pub fn errors(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Notification::Error(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Information messages so far
    pub fn infos(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Notification::Info(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Status lines so far
    pub fn statuses(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Notification::Status(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Progress ticks of all runs so far
    pub fn progress_updates(&self) -> Vec<ProgressUpdate> {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .updates
            .clone()
    }

    /// Final message of the last progress run
    pub fn progress_finished(&self) -> Option<String> {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finished
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn status(&self, text: &str) {
        self.push(Notification::Status(text.to_string()));
    }

    fn info(&self, text: &str) {
        self.push(Notification::Info(text.to_string()));
    }

    fn warn(&self, text: &str, choices: &[&str]) -> Option<String> {
        self.push(Notification::Warn(
            text.to_string(),
            choices.iter().map(|c| (*c).to_string()).collect(),
        ));
        self.answer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn error(&self, text: &str) {
        self.push(Notification::Error(text.to_string()));
    }

    fn progress(&self, title: &str, _cancellable: bool) -> Box<dyn ProgressReporter> {
        self.push(Notification::Progress(title.to_string()));
        Box::new(RecordingProgress {
            log: Arc::clone(&self.progress),
        })
    }
}

struct RecordingProgress {
    log: Arc<Mutex<ProgressLog>>,
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, update: &ProgressUpdate) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .updates
            .push(update.clone());
    }

    fn finish(&self, message: &str) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finished = Some(message.to_string());
    }
}

/// Logger keeping lines in memory
#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<String>>,
}

impl MemoryLogger {
    /// Empty logger
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Logged lines
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl Logger for MemoryLogger {
    fn log(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}
