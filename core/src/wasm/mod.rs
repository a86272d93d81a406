//! WASM core adapter
//!
//! Loads an emulation core compiled to WebAssembly and exposes it as an
//! [`EmulatorCore`](crate::emu::EmulatorCore).
//!
//! # Guest ABI
//!
//! | Export | Signature | |
//! |---|---|---|
//! | `memory` | memory | required |
//! | `alloc` | `(len: i32) -> ptr` | required |
//! | `load_rom` | `(ptr, len) -> i32` | required, 0 = ok |
//! | `width`, `height` | `() -> i32` | required |
//! | `sample_rate` | `() -> i32` | optional, defaults to 44100 |
//! | `step` | `()` | required, one video frame |
//! | `framebuffer_ptr` | `() -> ptr` | required, packed RGBA |
//! | `audio_samples` | `() -> count` | required, pairs since last call |
//! | `audio_left_ptr`, `audio_right_ptr` | `() -> ptr` | required, f32 LE |
//! | `set_button` | `(index, pressed)` | required |
//! | `state_size`, `save_state(ptr)`, `load_state(ptr, len) -> i32` | | optional |
//!
//! Several alternative export names are accepted per operation; see
//! [`EXPORT_ALIASES`]. The host provides one import, `env.log(ptr, len)`.

mod engine;
mod exports;
mod instance;
#[cfg(test)]
mod tests;

pub use engine::WasmEngine;
pub use exports::EXPORT_ALIASES;
pub use instance::{DEFAULT_RAM_LIMIT, WasmCore};

use crate::emu::CoreError;

/// Errors raised while loading a core module
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreLoadError {
    #[error("failed to compile core module: {0}")]
    Compile(String),

    #[error("failed to instantiate core module: {0}")]
    Instantiate(String),

    #[error("core module does not export '{0}'")]
    MissingExport(&'static str),

    #[error("core export '{name}' (for {op}) has the wrong signature: {reason}")]
    Signature {
        op: &'static str,
        name: String,
        reason: String,
    },

    #[error("core module requires {required} bytes of memory, limit is {limit}")]
    MemoryTooLarge { required: u64, limit: usize },

    #[error("core rejected the ROM (code {0})")]
    RomRejected(i32),

    #[error("core reported invalid dimensions {width}x{height}")]
    BadDimensions { width: u32, height: u32 },

    #[error("core reported a sample rate of 0")]
    BadSampleRate,

    #[error(transparent)]
    Core(#[from] CoreError),
}
