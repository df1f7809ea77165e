//! Human readable status log with progress coalescing.
//!
//! Everything the user sees about a session (status lines, errors, device
//! output, flash progress) goes through a [`LogSink`]. The routing rules for
//! raw lines live in [`log_line`]:
//!
//! - lines starting with `Programming: ` are dropped,
//! - lines starting with `Writing at` replace the single progress line,
//! - everything else is appended.

use std::sync::{Mutex, MutexGuard};

/// Prefix of percentage lines the bootloader client emits; never shown.
pub const PROGRAMMING_PREFIX: &str = "Programming: ";

/// Prefix of per-block write lines that are coalesced into one entry.
pub const WRITING_PREFIX: &str = "Writing at";

/// Destination for status lines.
pub trait LogSink: Send + Sync {
    /// Append a line.
    fn write_line(&self, text: &str);

    /// Append an error line, rendered as `Error: {text}`.
    fn error(&self, text: &str) {
        self.write_line(&format!("Error: {text}"));
    }

    /// Replace the content of the progress line, creating it on first use.
    fn update_progress(&self, text: &str);

    /// Forget the current progress line; the next update starts a new one.
    fn end_progress(&self);

    /// Remove all entries.
    fn clean(&self);
}

/// Route one raw line through the coalescing rules.
pub fn log_line(sink: &dyn LogSink, text: &str) {
    if text.starts_with(PROGRAMMING_PREFIX) {
        return;
    }
    if text.starts_with(WRITING_PREFIX) {
        sink.update_progress(text);
        return;
    }
    sink.write_line(text);
}

#[derive(Debug, Default)]
struct MemoryLogInner {
    entries: Vec<String>,
    progress: Option<usize>,
}

/// In-memory log that keeps every entry, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryLog {
    inner: Mutex<MemoryLogInner>,
}

impl MemoryLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries in order.
    pub fn lines(&self) -> Vec<String> {
        self.lock()
            .entries
            .clone()
    }

    /// Whether any entry equals `text`.
    pub fn contains(&self, text: &str) -> bool {
        self.lock()
            .entries
            .iter()
            .any(|line| line == text)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryLogInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl LogSink for MemoryLog {
    fn write_line(&self, text: &str) {
        self.lock()
            .entries
            .push(text.to_string());
    }

    fn update_progress(&self, text: &str) {
        let mut inner = self.lock();
        match inner.progress {
            Some(index) if index < inner.entries.len() => {
                inner.entries[index] = text.to_string();
            },
            _ => {
                inner
                    .entries
                    .push(text.to_string());
                inner.progress = Some(inner.entries.len() - 1);
            },
        }
    }

    fn end_progress(&self) {
        self.lock()
            .progress = None;
    }

    fn clean(&self) {
        let mut inner = self.lock();
        inner
            .entries
            .clear();
        inner.progress = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lines_append() {
        let log = MemoryLog::new();
        log_line(&log, "boot: ok");
        log_line(&log, "ready");
        assert_eq!(log.lines(), vec!["boot: ok", "ready"]);
    }

    #[test]
    fn test_programming_lines_dropped() {
        let log = MemoryLog::new();
        log_line(&log, "Programming: 42%");
        assert!(log.lines().is_empty());
    }

    #[test]
    fn test_writing_lines_coalesce() {
        let log = MemoryLog::new();
        log_line(&log, "start");
        log_line(&log, "Writing at 0x00000000... (10%)");
        log_line(&log, "Writing at 0x00004000... (50%)");
        log_line(&log, "Writing at 0x00008000... (100%)");
        assert_eq!(
            log.lines(),
            vec!["start", "Writing at 0x00008000... (100%)"]
        );
    }

    #[test]
    fn test_progress_line_stays_in_place() {
        let log = MemoryLog::new();
        log_line(&log, "Writing at 0x0... (1%)");
        log_line(&log, "after");
        log_line(&log, "Writing at 0x0... (2%)");
        assert_eq!(log.lines(), vec!["Writing at 0x0... (2%)", "after"]);
    }

    #[test]
    fn test_end_progress_starts_new_line() {
        let log = MemoryLog::new();
        log_line(&log, "Writing at 0x0... (100%)");
        log.end_progress();
        log_line(&log, "Writing at 0x0... (5%)");
        assert_eq!(log.lines().len(), 2);
    }

    #[test]
    fn test_error_prefix() {
        let log = MemoryLog::new();
        log.error("boom");
        assert!(log.contains("Error: boom"));
    }

    #[test]
    fn test_clean_resets_progress() {
        let log = MemoryLog::new();
        log_line(&log, "Writing at 0x0... (1%)");
        log.clean();
        assert!(log.lines().is_empty());
        log_line(&log, "Writing at 0x0... (2%)");
        assert_eq!(log.lines(), vec!["Writing at 0x0... (2%)"]);
    }
}
