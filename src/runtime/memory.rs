//! Resident memory sampling.

use parking_lot::Mutex;
use serde::Serialize;

use std::sync::atomic::{AtomicU64, Ordering};

/// Memory reading taken alongside a checkpoint, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemorySnapshot {
    pub current: u64,
    pub peak: u64,
}

pub trait MemorySampler: Send + Sync {
    fn sample(&self) -> MemorySnapshot;
}

/// Samples the current process through `memory-stats`.
///
/// The platform only reports current usage, so the peak is the running
/// maximum of every reading this sampler has taken. When stats are
/// unavailable the last known reading is repeated.
#[derive(Debug, Default)]
pub struct ProcessMemory {
    last: AtomicU64,
    peak: AtomicU64,
}

impl ProcessMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemorySampler for ProcessMemory {
    fn sample(&self) -> MemorySnapshot {
        let current = match memory_stats::memory_stats() {
            Some(stats) => {
                let bytes = stats.physical_mem as u64;
                self.last.store(bytes, Ordering::Relaxed);
                bytes
            }
            None => self.last.load(Ordering::Relaxed),
        };
        let prev_peak = self.peak.fetch_max(current, Ordering::Relaxed);
        MemorySnapshot {
            current,
            peak: prev_peak.max(current),
        }
    }
}

/// Scripted memory readings for tests and replay.
#[derive(Debug, Default)]
pub struct FixedMemory {
    state: Mutex<MemorySnapshot>,
}

impl FixedMemory {
    pub fn new(current: u64) -> Self {
        Self {
            state: Mutex::new(MemorySnapshot {
                current,
                peak: current,
            }),
        }
    }

    /// Sets the current reading. The peak never decreases.
    pub fn set(&self, current: u64, peak: Option<u64>) {
        let mut state = self.state.lock();
        state.current = current;
        state.peak = state.peak.max(current).max(peak.unwrap_or(0));
    }
}

impl MemorySampler for FixedMemory {
    fn sample(&self) -> MemorySnapshot {
        *self.state.lock()
    }
}

/// Human-readable byte count, `B` through `GB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_memory_peak_is_monotonic() {
        let mem = FixedMemory::new(1024);
        mem.set(4096, None);
        mem.set(2048, None);
        assert_eq!(
            mem.sample(),
            MemorySnapshot {
                current: 2048,
                peak: 4096
            }
        );
        mem.set(1000, Some(8192));
        assert_eq!(mem.sample().peak, 8192);
    }

    #[test]
    fn process_memory_peak_covers_current() {
        let mem = ProcessMemory::new();
        let a = mem.sample();
        let b = mem.sample();
        assert!(a.peak >= a.current);
        assert!(b.peak >= a.peak);
    }

    #[test]
    fn format_bytes_picks_unit() {
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
