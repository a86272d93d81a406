//! Emulation core capability interface
//!
//! Every core, whatever its native API, is adapted to [`EmulatorCore`] when
//! it is loaded. The frame pump only ever talks to this trait.

use crate::audio::DEFAULT_SAMPLE_RATE;
use crate::input::Button;

/// Static properties reported by a core at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreInfo {
    /// Framebuffer width in pixels
    pub width: u32,
    /// Framebuffer height in pixels
    pub height: u32,
    /// Audio output rate in Hz
    pub sample_rate: u32,
}

impl CoreInfo {
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    /// Size of one packed RGBA frame in bytes
    pub const fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Errors raised by a running core
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("core trapped: {0}")]
    Trap(String),

    #[error("core returned {what} out of bounds (offset {offset}, len {len})")]
    OutOfBounds {
        what: &'static str,
        offset: u64,
        len: u64,
    },

    #[error("framebuffer is {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error("core rejected the state blob (code {0})")]
    StateRejected(i32),

    #[error("core does not support {0}")]
    Unsupported(&'static str),
}

/// A cycle-stepped emulation core.
///
/// One call to [`step`](Self::step) advances exactly one video frame.
pub trait EmulatorCore {
    fn info(&self) -> CoreInfo;

    /// Run one frame
    fn step(&mut self) -> Result<(), CoreError>;

    /// Packed RGBA pixels of the last completed frame.
    ///
    /// Borrowed from the core; callers copy it before stepping again.
    fn framebuffer(&mut self) -> Result<&[u8], CoreError>;

    /// Append audio produced since the last drain. Returns the pair count.
    fn drain_audio(&mut self, left: &mut Vec<f32>, right: &mut Vec<f32>)
    -> Result<usize, CoreError>;

    /// Set one button's level
    fn set_button_state(&mut self, button: Button, pressed: bool) -> Result<(), CoreError>;

    /// Serialize the full machine state
    fn save_state(&mut self) -> Result<Vec<u8>, CoreError> {
        Err(CoreError::Unsupported("save states"))
    }

    /// Restore a blob previously returned by [`save_state`](Self::save_state)
    fn load_state(&mut self, _state: &[u8]) -> Result<(), CoreError> {
        Err(CoreError::Unsupported("save states"))
    }
}

impl<T: EmulatorCore + ?Sized> EmulatorCore for Box<T> {
    fn info(&self) -> CoreInfo {
        (**self).info()
    }

    fn step(&mut self) -> Result<(), CoreError> {
        (**self).step()
    }

    fn framebuffer(&mut self) -> Result<&[u8], CoreError> {
        (**self).framebuffer()
    }

    fn drain_audio(
        &mut self,
        left: &mut Vec<f32>,
        right: &mut Vec<f32>,
    ) -> Result<usize, CoreError> {
        (**self).drain_audio(left, right)
    }

    fn set_button_state(&mut self, button: Button, pressed: bool) -> Result<(), CoreError> {
        (**self).set_button_state(button, pressed)
    }

    fn save_state(&mut self) -> Result<Vec<u8>, CoreError> {
        (**self).save_state()
    }

    fn load_state(&mut self, state: &[u8]) -> Result<(), CoreError> {
        (**self).load_state(state)
    }
}
