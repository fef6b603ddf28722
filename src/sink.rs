//! Line-oriented destinations for the rendered report.

use parking_lot::Mutex;

/// Appends one line of text. Best effort: implementations swallow their own
/// failures.
pub trait LogSink: Send + Sync {
    fn line(&self, line: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn line(&self, line: &str) {
        self(line)
    }
}

/// Emits each line as an `INFO` event on the `reqprof::report` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn line(&self, line: &str) {
        tracing::info!(target: "reqprof::report", "{line}");
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
