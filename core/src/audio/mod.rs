//! Audio transport between the frame pump and the audio device
//!
//! The emulation core produces a burst of samples every tick while the
//! output device pulls a fixed quantum on its own clock. The two meet in a
//! single-producer/single-consumer ring buffer:
//!
//! ```text
//! Frame Pump (display refresh)              Audio Device (sample clock)
//!     │                                           │
//! [step core]                                     │
//! [drain core audio]                              │
//! [AudioProducer::write]─────(ring)──────►[AudioConsumer::read_into]
//!                                                 │
//!                                         [silence on underrun]
//! ```
//!
//! Neither side ever blocks. Underruns are filled with silence, overruns
//! overwrite the oldest unread samples, and both are counted in
//! [`AudioMetrics`].

mod metrics;
mod ring;


pub use metrics::{AudioMetrics, AudioMetricsSnapshot};
pub use ring::{AudioConsumer, AudioProducer, AudioRingBuffer};

/// Default output sample rate when a core does not report one
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// One stereo frame: a left and a right amplitude.
///
/// Amplitudes are nominally in `[-1.0, 1.0]` but are carried unclamped;
/// clipping is the output device's concern.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SamplePair {
    pub left: f32,
    pub right: f32,
}

impl SamplePair {
    /// Zero amplitude on both channels
    pub const SILENCE: SamplePair = SamplePair {
        left: 0.0,
        right: 0.0,
    };

    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    pub fn is_silent(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}
