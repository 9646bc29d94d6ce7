use super::types::LogEntry;

/// Append-only sequence of user-visible log entries
///
/// Entries are never mutated or removed once pushed.
#[derive(Debug, Clone, Default)]
pub struct LogBook {
    entries: Vec<LogEntry>,
}

impl LogBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return a copy of it
    pub fn append(&mut self, entry: LogEntry) -> LogEntry {
        self.entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
