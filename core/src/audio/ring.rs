//! Lock-free stereo ring buffer with latest-wins overwrite
//!
//! Cursors count sample pairs since creation and never wrap; slot indices
//! are `cursor % capacity`. Samples are stored as `f32` bits in `AtomicU32`
//! slots. The producer stores its slots with `Relaxed` and then publishes the
//! write cursor with `Release`; the consumer loads the write cursor with
//! `Acquire` before touching any slot, so every sample it reads below that
//! cursor is at least as new as the published write.
//!
//! The producer never waits for the consumer. When it laps the reader, the
//! consumer notices on its next read and skips forward to
//! `write - capacity`.
//!
//! A write that laps a read in progress is caught seqlock-style: the
//! producer announces its end cursor in `claimed` before storing any slot,
//! and the consumer re-checks `claimed` after copying. Pairs in slots that
//! were claimed during the copy are dropped, so a delivered pair never mixes
//! two write passes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};
use std::time::Duration;

use tracing::debug;

use super::SamplePair;
use super::metrics::AudioMetrics;

struct Shared {
    left: Box<[AtomicU32]>,
    right: Box<[AtomicU32]>,
    /// Total pairs ever written (published by the producer)
    write: AtomicU64,
    /// End cursor of the write in progress, stored before its slots
    claimed: AtomicU64,
    /// Total pairs ever consumed (published by the consumer)
    read: AtomicU64,
    metrics: AudioMetrics,
}

impl Shared {
    fn capacity(&self) -> usize {
        self.left.len()
    }

    fn slot(&self, cursor: u64) -> usize {
        (cursor % self.left.len() as u64) as usize
    }
}

fn silent_slots(capacity: usize) -> Box<[AtomicU32]> {
    (0..capacity)
        .map(|_| AtomicU32::new(0.0f32.to_bits()))
        .collect()
}

/// Constructor namespace for the split ring buffer.
///
/// The buffer only exists as its two halves: one [`AudioProducer`] for the
/// frame pump and one [`AudioConsumer`] for the device callback. Neither
/// half is `Clone`, so a second writer or reader cannot be created.
pub struct AudioRingBuffer;

impl AudioRingBuffer {
    /// Create a buffer holding `capacity` sample pairs.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> (AudioProducer, AudioConsumer) {
        let capacity = capacity.max(1);
        let shared = Arc::new(Shared {
            left: silent_slots(capacity),
            right: silent_slots(capacity),
            write: AtomicU64::new(0),
            claimed: AtomicU64::new(0),
            read: AtomicU64::new(0),
            metrics: AudioMetrics::default(),
        });

        (
            AudioProducer {
                shared: shared.clone(),
                write_pos: 0,
            },
            AudioConsumer {
                shared,
                read_pos: 0,
            },
        )
    }

    /// Create a buffer sized to hold `duration` of audio at `sample_rate`
    pub fn with_duration(sample_rate: u32, duration: Duration) -> (AudioProducer, AudioConsumer) {
        let capacity = (sample_rate as f64 * duration.as_secs_f64()).ceil() as usize;
        Self::new(capacity)
    }
}

/// Writing half, owned by the frame pump
pub struct AudioProducer {
    shared: Arc<Shared>,
    write_pos: u64,
}

impl AudioProducer {
    /// Append sample pairs, overwriting the oldest unread pairs if the
    /// buffer is full.
    ///
    /// Writes `min(left.len(), right.len())` pairs and returns that count.
    pub fn write(&mut self, left: &[f32], right: &[f32]) -> usize {
        if left.len() != right.len() {
            debug!(
                "Mismatched channel lengths (left={}, right={}), truncating",
                left.len(),
                right.len()
            );
        }
        let count = left.len().min(right.len());
        if count == 0 {
            return 0;
        }

        let shared = &*self.shared;
        let capacity = shared.capacity();
        let start = self.write_pos;
        let end = start + count as u64;

        shared.claimed.store(end, Ordering::Relaxed);
        fence(Ordering::Release);

        // Only the newest `capacity` pairs of an oversized batch can survive
        let skip = count.saturating_sub(capacity);
        for (i, (&l, &r)) in left[..count].iter().zip(&right[..count]).enumerate().skip(skip) {
            let slot = shared.slot(start + i as u64);
            shared.left[slot].store(l.to_bits(), Ordering::Relaxed);
            shared.right[slot].store(r.to_bits(), Ordering::Relaxed);
        }

        self.write_pos = end;
        shared.write.store(end, Ordering::Release);

        let read = shared.read.load(Ordering::Acquire);
        let lost_before = start.saturating_sub(read).saturating_sub(capacity as u64);
        let lost_after = end.saturating_sub(read).saturating_sub(capacity as u64);
        shared.metrics.record_write(count, lost_after - lost_before);

        count
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Total pairs written since creation
    pub fn write_cursor(&self) -> u64 {
        self.write_pos
    }

    pub fn metrics(&self) -> &AudioMetrics {
        &self.shared.metrics
    }
}

/// Reading half, owned by the audio device callback
pub struct AudioConsumer {
    shared: Arc<Shared>,
    read_pos: u64,
}

impl AudioConsumer {
    /// Fill every slot of `out`, using silence for anything not yet written.
    ///
    /// Never blocks. Returns how many slots received real samples; they
    /// come first in `out`, followed by silence. Pairs overwritten since the
    /// last read, or while this read was copying them, are skipped.
    pub fn read_into(&mut self, out: &mut [SamplePair]) -> usize {
        let shared = &*self.shared;
        let capacity = shared.capacity() as u64;
        let write = shared.write.load(Ordering::Acquire);

        let mut read = self.read_pos;
        if write - read > capacity {
            read = write - capacity;
        }

        let count = ((write - read) as usize).min(out.len());
        for (i, pair) in out[..count].iter_mut().enumerate() {
            let slot = shared.slot(read + i as u64);
            *pair = SamplePair::new(
                f32::from_bits(shared.left[slot].load(Ordering::Relaxed)),
                f32::from_bits(shared.right[slot].load(Ordering::Relaxed)),
            );
        }

        fence(Ordering::Acquire);
        let claimed = shared.claimed.load(Ordering::Relaxed);
        let delivered = drop_overwritten(&mut out[..count], read, claimed, capacity);
        out[delivered..].fill(SamplePair::SILENCE);

        read += count as u64;
        self.read_pos = read;
        shared.read.store(read, Ordering::Release);
        shared.metrics.record_read(delivered, out.len() - delivered);

        delivered
    }

    /// Read exactly `count` sample pairs, silence-padded.
    ///
    /// Allocates; device callbacks should prefer [`read_into`](Self::read_into).
    pub fn read(&mut self, count: usize) -> Vec<SamplePair> {
        let mut out = vec![SamplePair::SILENCE; count];
        self.read_into(&mut out);
        out
    }

    /// Unread pairs currently held (at most the capacity)
    pub fn available(&self) -> usize {
        let write = self.shared.write.load(Ordering::Acquire);
        (write - self.read_pos).min(self.shared.capacity() as u64) as usize
    }

    /// Total pairs consumed since creation
    pub fn read_cursor(&self) -> u64 {
        self.read_pos
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn metrics(&self) -> &AudioMetrics {
        &self.shared.metrics
    }
}

/// Drop the leading pairs of `copied` (read from cursor `read` onward) whose
/// slots a writer had claimed up to `claimed`. Survivors move to the front;
/// returns how many remain.
fn drop_overwritten(copied: &mut [SamplePair], read: u64, claimed: u64, capacity: u64) -> usize {
    let stale = (claimed.saturating_sub(capacity).saturating_sub(read) as usize).min(copied.len());
    if stale > 0 {
        copied.copy_within(stale.., 0);
    }
    copied.len() - stale
}
