//! RetroBridge Core - host bridge for sandboxed emulation cores
//!
//! Connects a cycle-stepped emulation core to a display, a speaker, input
//! devices and persistent storage, without the core knowing about any of
//! them.
//!
//! # Architecture
//!
//! - [`EmulatorCore`] - Fixed capability interface every core is adapted to
//! - [`WasmCore`] - WebAssembly cores, with export names resolved at load time
//! - [`FramePump`] - One core frame per display refresh: input, step, video, audio, present
//! - [`AudioRingBuffer`] - Lock-free SPSC buffer between the pump and the audio device
//! - [`InputBridge`] - Keyboard and gamepad folded into level button state
//! - [`SaveStore`] - Async, atomic keyed blob storage
//! - [`Session`] - Owns all of the above for one running ROM

pub mod audio;
pub mod config;
pub mod emu;
pub mod input;
pub mod persist;
pub mod pump;
pub mod rom;
pub mod session;
pub mod surface;
pub mod wasm;

pub use audio::{
    AudioConsumer, AudioMetrics, AudioMetricsSnapshot, AudioProducer, AudioRingBuffer, SamplePair,
};
pub use config::{Config, ScaleMode};
pub use emu::{CoreError, CoreInfo, EmulatorCore};
pub use input::{Axis, Button, ButtonSnapshot, ButtonTable, GamepadSnapshot, InputBridge};
pub use persist::{PersistError, SaveStore};
pub use pump::{FramePump, PumpConfig, PumpStats, Stage, TickReport};
pub use rom::{RomError, RomImage};
pub use session::{Session, SessionBuilder, SessionError};
pub use surface::{Framebuffer, NullSurface, RenderSurface};
pub use wasm::{CoreLoadError, WasmCore, WasmEngine};
