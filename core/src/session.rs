//! Session: one running core and every subsystem attached to it

use crate::audio::{AudioConsumer, AudioMetricsSnapshot, AudioRingBuffer};
use crate::config::Config;
use crate::emu::{CoreError, CoreInfo, EmulatorCore};
use crate::input::InputBridge;
use crate::pump::{FramePump, PumpConfig, PumpStats, TickReport};
use crate::rom::RomImage;
use crate::surface::{Framebuffer, RenderSurface};
use crate::wasm::{CoreLoadError, DEFAULT_RAM_LIMIT, WasmCore, WasmEngine};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no ROM was provided")]
    MissingRom,

    #[error("no emulation core was provided")]
    MissingCore,

    #[error(transparent)]
    CoreLoad(#[from] CoreLoadError),
}

enum CoreSource {
    Wasm(Vec<u8>),
    Native(Box<dyn EmulatorCore>),
}

/// Collects a ROM and a core, then boots them into a [`Session`]
pub struct SessionBuilder {
    config: Config,
    pump: PumpConfig,
    ram_limit: usize,
    rom: Option<RomImage>,
    core: Option<CoreSource>,
}

impl SessionBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            pump: PumpConfig::default(),
            ram_limit: DEFAULT_RAM_LIMIT,
            rom: None,
            core: None,
        }
    }

    pub fn rom(mut self, rom: RomImage) -> Self {
        self.rom = Some(rom);
        self
    }

    /// WASM core module, compiled and booted with the ROM in [`build`](Self::build)
    pub fn core_wasm(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.core = Some(CoreSource::Wasm(bytes.into()));
        self
    }

    /// A core that is already running with its ROM loaded
    pub fn core(mut self, core: Box<dyn EmulatorCore>) -> Self {
        self.core = Some(CoreSource::Native(core));
        self
    }

    pub fn pump_config(mut self, pump: PumpConfig) -> Self {
        self.pump = pump;
        self
    }

    /// Guest memory ceiling for WASM cores
    pub fn ram_limit(mut self, bytes: usize) -> Self {
        self.ram_limit = bytes;
        self
    }

    /// Validate inputs and boot. Nothing ticks before this succeeds.
    pub fn build(self) -> Result<Session, SessionError> {
        let rom = self.rom.ok_or(SessionError::MissingRom)?;
        let core = match self.core.ok_or(SessionError::MissingCore)? {
            CoreSource::Wasm(bytes) => {
                let engine = WasmEngine::new();
                Box::new(WasmCore::load(&engine, &bytes, &rom, self.ram_limit)?)
                    as Box<dyn EmulatorCore>
            }
            CoreSource::Native(core) => core,
        };

        let info = core.info();
        let buffer = self.config.audio.buffer_duration();
        let (producer, consumer) = AudioRingBuffer::with_duration(info.sample_rate, buffer);
        let input = InputBridge::new(self.config.input.clone());
        let pump = FramePump::new(core, input.table().clone(), producer, self.pump);

        let origin = rom
            .path()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "memory".to_string());
        tracing::info!(
            "Session started: rom '{}' from {}, {}x{}, {} Hz, {:?} audio buffer ({} pairs)",
            rom.id(),
            origin,
            info.width,
            info.height,
            info.sample_rate,
            buffer,
            consumer.capacity()
        );

        Ok(Session {
            pump,
            input,
            audio: Some(consumer),
            rom_id: rom.id().to_string(),
            info,
        })
    }
}

/// A running core with its pump, input bridge and audio buffer.
///
/// Everything is owned here; dropping the session tears it all down.
pub struct Session {
    pump: FramePump,
    input: InputBridge,
    audio: Option<AudioConsumer>,
    rom_id: String,
    info: CoreInfo,
}

impl Session {
    /// Run one display refresh
    pub fn tick(&mut self, surface: &mut dyn RenderSurface) -> TickReport {
        self.pump.tick(surface)
    }

    pub fn input(&self) -> &InputBridge {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputBridge {
        &mut self.input
    }

    /// Hand the consumer half of the ring buffer to the audio device.
    /// Returns `None` after the first call.
    pub fn take_audio_consumer(&mut self) -> Option<AudioConsumer> {
        self.audio.take()
    }

    pub fn audio_metrics(&self) -> AudioMetricsSnapshot {
        self.pump.audio_metrics()
    }

    pub fn info(&self) -> CoreInfo {
        self.info
    }

    pub fn rom_id(&self) -> &str {
        &self.rom_id
    }

    pub fn stats(&self) -> &PumpStats {
        self.pump.stats()
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        self.pump.framebuffer()
    }

    /// Serialize the core between ticks
    pub fn snapshot_state(&mut self) -> Result<Vec<u8>, CoreError> {
        self.pump.save_state()
    }

    /// Restore a snapshot between ticks
    pub fn restore_state(&mut self, state: &[u8]) -> Result<(), CoreError> {
        self.pump.load_state(state)
    }

    /// Save key for a numbered slot, scoped to this ROM
    pub fn save_key(&self, slot: u8) -> String {
        format!("{}.slot{}", self.rom_id, slot)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let stats = self.pump.stats();
        tracing::info!(
            "Session ended: {} ticks, {} frames stepped, {} over budget",
            stats.ticks,
            stats.frames_stepped,
            stats.over_budget_ticks
        );
    }
}
