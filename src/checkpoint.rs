//! Checkpoints: one observed instant in a session timeline.

use serde::Serialize;

use std::time::Duration;

use crate::{CallSite, MemorySnapshot};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checkpoint {
    pub index: usize,
    pub label: String,
    pub description: String,
    /// Offset of this checkpoint from session start.
    #[serde(rename = "elapsed_since_start", serialize_with = "crate::duration::serialize_secs")]
    pub at: Duration,
    #[serde(serialize_with = "crate::duration::serialize_secs")]
    pub elapsed_since_last: Duration,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::duration::serialize_opt_secs"
    )]
    pub elapsed_since_external: Option<Duration>,
    pub memory_usage: u64,
    pub peak_memory_usage: u64,
    pub call_site: CallSite,
}

impl Checkpoint {
    pub fn elapsed_since_start(&self) -> Duration {
        self.at
    }
}

/// Append-only checkpoint sequence.
///
/// Each push derives `elapsed_since_last` from the previous checkpoint (or
/// the start for the first), so the deltas always telescope to the final
/// offset.
#[derive(Debug, Clone, Default)]
pub struct CheckpointLog {
    entries: Vec<Checkpoint>,
    last: Duration,
}

pub(crate) struct NewCheckpoint {
    pub label: String,
    pub description: String,
    pub at: Duration,
    pub queue_delay: Option<Duration>,
    pub memory: MemorySnapshot,
    pub call_site: CallSite,
}

impl CheckpointLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, new: NewCheckpoint) -> &Checkpoint {
        // A clock that steps backwards must not produce a negative delta; the
        // offset is pinned to the previous one instead.
        let at = new.at.max(self.last);
        let elapsed_since_last = at - self.last;
        self.last = at;
        let index = self.entries.len();
        self.entries.push(Checkpoint {
            index,
            label: new.label,
            description: new.description,
            at,
            elapsed_since_last,
            elapsed_since_external: new.queue_delay.map(|q| q.saturating_add(at)),
            memory_usage: new.memory.current,
            peak_memory_usage: new.memory.peak,
            call_site: new.call_site,
        });
        &self.entries[index]
    }

    pub fn entries(&self) -> &[Checkpoint] {
        &self.entries
    }

    pub(crate) fn into_entries(self) -> Vec<Checkpoint> {
        self.entries
    }
}

/// First checkpoint carrying `label`; later duplicates are ignored.
pub(crate) fn first_labelled<'a>(
    entries: &'a [Checkpoint],
    label: &str,
) -> Option<&'a Checkpoint> {
    entries.iter().find(|c| c.label == label)
}

/// Truncates to at most `limit` characters, never splitting a code point.
pub(crate) fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(log: &mut CheckpointLog, label: &str, ms: u64) {
        log.push(NewCheckpoint {
            label: label.to_string(),
            description: String::new(),
            at: Duration::from_millis(ms),
            queue_delay: None,
            memory: MemorySnapshot::default(),
            call_site: CallSite::unknown(),
        });
    }

    #[test]
    fn deltas_telescope_to_final_offset() {
        let mut log = CheckpointLog::new();
        for (i, ms) in [3u64, 40, 41, 900, 1500, 1500, 2750].into_iter().enumerate() {
            at(&mut log, &format!("cp{i}"), ms);
        }
        let sum: Duration = log.entries().iter().map(|c| c.elapsed_since_last).sum();
        let last = log.entries().last().expect("last");
        assert_eq!(sum, last.elapsed_since_start());
        assert_eq!(log.entries()[0].elapsed_since_last, Duration::from_millis(3));
    }

    #[test]
    fn backwards_clock_is_clamped() {
        let mut log = CheckpointLog::new();
        at(&mut log, "a", 500);
        at(&mut log, "b", 200);
        assert_eq!(log.entries()[1].elapsed_since_last, Duration::ZERO);
        assert_eq!(log.entries()[1].at, Duration::from_millis(500));
    }

    #[test]
    fn duplicate_labels_are_kept() {
        let mut log = CheckpointLog::new();
        at(&mut log, "INIT", 1);
        at(&mut log, "INIT", 2);
        assert_eq!(log.entries().len(), 2);
        assert_eq!(first_labelled(log.entries(), "INIT").map(|c| c.index), Some(0));
        assert!(first_labelled(log.entries(), "SHUTDOWN").is_none());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
