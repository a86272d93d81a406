//! Ring buffer health counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Underrun/overrun counters shared by both halves of the ring buffer.
///
/// Counters only ever grow. Use [`AudioMetricsSnapshot::since`] to get
/// per-interval rates.
#[derive(Debug, Default)]
pub struct AudioMetrics {
    samples_written: AtomicU64,
    samples_read: AtomicU64,
    underruns: AtomicU64,
    silent_samples: AtomicU64,
    overruns: AtomicU64,
    overwritten_samples: AtomicU64,
}

/// Plain copy of [`AudioMetrics`] at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioMetricsSnapshot {
    /// Sample pairs accepted by the producer
    pub samples_written: u64,
    /// Sample pairs delivered to the device (excluding silence fill)
    pub samples_read: u64,
    /// Reads that could not be fully satisfied
    pub underruns: u64,
    /// Silent pairs emitted to cover underruns
    pub silent_samples: u64,
    /// Writes that lapped the reader
    pub overruns: u64,
    /// Unread pairs lost to overwriting
    pub overwritten_samples: u64,
}

impl AudioMetrics {
    pub(super) fn record_write(&self, written: usize, overwritten: u64) {
        self.samples_written
            .fetch_add(written as u64, Ordering::Relaxed);
        if overwritten > 0 {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            self.overwritten_samples
                .fetch_add(overwritten, Ordering::Relaxed);
        }
    }

    pub(super) fn record_read(&self, delivered: usize, silent: usize) {
        self.samples_read
            .fetch_add(delivered as u64, Ordering::Relaxed);
        if silent > 0 {
            self.underruns.fetch_add(1, Ordering::Relaxed);
            self.silent_samples
                .fetch_add(silent as u64, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> AudioMetricsSnapshot {
        AudioMetricsSnapshot {
            samples_written: self.samples_written.load(Ordering::Relaxed),
            samples_read: self.samples_read.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            silent_samples: self.silent_samples.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            overwritten_samples: self.overwritten_samples.load(Ordering::Relaxed),
        }
    }
}

impl AudioMetricsSnapshot {
    /// Counter deltas between an earlier snapshot and this one
    pub fn since(&self, earlier: &AudioMetricsSnapshot) -> AudioMetricsSnapshot {
        AudioMetricsSnapshot {
            samples_written: self.samples_written.saturating_sub(earlier.samples_written),
            samples_read: self.samples_read.saturating_sub(earlier.samples_read),
            underruns: self.underruns.saturating_sub(earlier.underruns),
            silent_samples: self.silent_samples.saturating_sub(earlier.silent_samples),
            overruns: self.overruns.saturating_sub(earlier.overruns),
            overwritten_samples: self
                .overwritten_samples
                .saturating_sub(earlier.overwritten_samples),
        }
    }
}
