//! Flow counters shared between the processing thread and the playback tap.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative frame-loss counters.
///
/// Overflows count frames dropped on clamped ring writes; underflows count
/// frames silence-padded at playback. Both are updated with relaxed
/// ordering from the hot paths and read for diagnostics only.
#[derive(Debug, Default)]
pub struct FlowCounters {
    overflows: AtomicU64,
    underflows: AtomicU64,
}

impl FlowCounters {
    pub(crate) fn add_overflow(&self, frames: u64) {
        self.overflows.fetch_add(frames, Ordering::Relaxed);
    }

    pub(crate) fn add_underflow(&self, frames: u64) {
        self.underflows.fetch_add(frames, Ordering::Relaxed);
    }

    /// Total frames dropped on ring writes since construction.
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Total frames silence-padded at playback since construction.
    pub fn underflows(&self) -> u64 {
        self.underflows.load(Ordering::Relaxed)
    }
}
