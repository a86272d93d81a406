//! `EmulatorCore` implementation for WASM core modules

use wasmtime::{Caller, Linker, Memory, Store, StoreLimits, StoreLimitsBuilder, TypedFunc};

use super::exports::{optional, required};
use super::{CoreLoadError, WasmEngine};
use crate::audio::DEFAULT_SAMPLE_RATE;
use crate::emu::{CoreError, CoreInfo, EmulatorCore};
use crate::input::Button;
use crate::rom::RomImage;

/// Default linear memory ceiling for a core (64 MiB)
pub const DEFAULT_RAM_LIMIT: usize = 64 * 1024 * 1024;

/// Largest framebuffer edge a core may report
const MAX_DIMENSION: u32 = 4096;

/// Per-store host state
pub struct CoreState {
    limits: StoreLimits,
    memory: Option<Memory>,
}

/// Optional save-state entry points; all three or none
struct StateExports {
    size: TypedFunc<(), u32>,
    save: TypedFunc<u32, ()>,
    load: TypedFunc<(u32, u32), i32>,
}

/// A loaded WASM core with every export resolved
pub struct WasmCore {
    store: Store<CoreState>,
    memory: Memory,
    info: CoreInfo,
    alloc_fn: TypedFunc<u32, u32>,
    step_fn: TypedFunc<(), ()>,
    framebuffer_fn: TypedFunc<(), u32>,
    audio_samples_fn: TypedFunc<(), u32>,
    audio_left_fn: TypedFunc<(), u32>,
    audio_right_fn: TypedFunc<(), u32>,
    set_button_fn: TypedFunc<(u32, u32), ()>,
    state: Option<StateExports>,
    /// Guest scratch buffer for state transfer: (ptr, capacity)
    state_buf: Option<(u32, u32)>,
}

impl WasmCore {
    /// Compile, instantiate and boot a core with `rom` loaded.
    ///
    /// `ram_limit` caps the guest's linear memory in bytes.
    pub fn load(
        engine: &WasmEngine,
        core_wasm: &[u8],
        rom: &RomImage,
        ram_limit: usize,
    ) -> Result<Self, CoreLoadError> {
        let module = engine.load_module(core_wasm)?;
        WasmEngine::validate_module_memory(&module, ram_limit)?;

        let limits = StoreLimitsBuilder::new()
            .memory_size(ram_limit)
            .instances(1)
            .build();
        let mut store = Store::new(
            engine.engine(),
            CoreState {
                limits,
                memory: None,
            },
        );
        store.limiter(|state| &mut state.limits);

        let mut linker = Linker::new(engine.engine());
        linker
            .func_wrap("env", "log", log_message)
            .map_err(|e| CoreLoadError::Instantiate(format!("{:#}", e)))?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| CoreLoadError::Instantiate(format!("{:#}", e)))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or(CoreLoadError::MissingExport("memory"))?;
        store.data_mut().memory = Some(memory);

        let s = &mut store;
        let alloc_fn = required(&instance, s, "alloc")?;
        let load_rom_fn: TypedFunc<(u32, u32), i32> = required(&instance, s, "load_rom")?;
        let width_fn: TypedFunc<(), u32> = required(&instance, s, "width")?;
        let height_fn: TypedFunc<(), u32> = required(&instance, s, "height")?;
        let sample_rate_fn: Option<TypedFunc<(), u32>> = optional(&instance, s, "sample_rate")?;
        let step_fn = required(&instance, s, "step")?;
        let framebuffer_fn = required(&instance, s, "framebuffer_ptr")?;
        let audio_samples_fn = required(&instance, s, "audio_samples")?;
        let audio_left_fn = required(&instance, s, "audio_left_ptr")?;
        let audio_right_fn = required(&instance, s, "audio_right_ptr")?;
        let set_button_fn = required(&instance, s, "set_button")?;

        let state = match (
            optional(&instance, s, "state_size")?,
            optional(&instance, s, "save_state")?,
            optional(&instance, s, "load_state")?,
        ) {
            (Some(size), Some(save), Some(load)) => Some(StateExports { size, save, load }),
            (None, None, None) => None,
            _ => {
                tracing::warn!("Core exports only part of the save-state interface; ignoring it");
                None
            }
        };

        let mut core = Self {
            store,
            memory,
            info: CoreInfo::new(0, 0),
            alloc_fn,
            step_fn,
            framebuffer_fn,
            audio_samples_fn,
            audio_left_fn,
            audio_right_fn,
            set_button_fn,
            state,
            state_buf: None,
        };

        // Cores may size their screen from the cartridge, so the ROM goes in first
        let len = guest_len(rom.len(), "rom")?;
        let ptr = core.alloc(len)?;
        core.write_guest("rom", ptr, rom.bytes())?;
        let code = load_rom_fn
            .call(&mut core.store, (ptr, len))
            .map_err(|e| trap("load_rom", e))?;
        if code != 0 {
            return Err(CoreLoadError::RomRejected(code));
        }

        let width = width_fn
            .call(&mut core.store, ())
            .map_err(|e| trap("width", e))?;
        let height = height_fn
            .call(&mut core.store, ())
            .map_err(|e| trap("height", e))?;
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(CoreLoadError::BadDimensions { width, height });
        }
        let sample_rate = match sample_rate_fn {
            Some(f) => f
                .call(&mut core.store, ())
                .map_err(|e| trap("sample_rate", e))?,
            None => DEFAULT_SAMPLE_RATE,
        };
        if sample_rate == 0 {
            return Err(CoreLoadError::BadSampleRate);
        }

        core.info = CoreInfo {
            width,
            height,
            sample_rate,
        };
        tracing::info!(
            "Loaded core: {}x{} @ {} Hz, rom '{}' ({} bytes), {} KiB guest memory, save states {}",
            width,
            height,
            sample_rate,
            rom.id(),
            rom.len(),
            core.memory_size() / 1024,
            if core.state.is_some() {
                "supported"
            } else {
                "unsupported"
            }
        );
        Ok(core)
    }

    /// Bytes of guest linear memory currently allocated
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    fn alloc(&mut self, len: u32) -> Result<u32, CoreError> {
        self.alloc_fn
            .call(&mut self.store, len)
            .map_err(|e| trap("alloc", e))
    }

    fn write_guest(&mut self, what: &'static str, ptr: u32, bytes: &[u8]) -> Result<(), CoreError> {
        self.memory
            .write(&mut self.store, ptr as usize, bytes)
            .map_err(|_| CoreError::OutOfBounds {
                what,
                offset: u64::from(ptr),
                len: bytes.len() as u64,
            })
    }

    /// Borrow `len` bytes of guest memory at `ptr`
    fn guest_slice(&self, what: &'static str, ptr: u32, len: usize) -> Result<&[u8], CoreError> {
        let data = self.memory.data(&self.store);
        let start = ptr as usize;
        start
            .checked_add(len)
            .and_then(|end| data.get(start..end))
            .ok_or(CoreError::OutOfBounds {
                what,
                offset: u64::from(ptr),
                len: len as u64,
            })
    }

    /// Guest buffer of at least `len` bytes, reused across save/load
    fn state_buffer(&mut self, len: u32) -> Result<u32, CoreError> {
        match self.state_buf {
            Some((ptr, capacity)) if capacity >= len => Ok(ptr),
            _ => {
                let ptr = self.alloc(len)?;
                self.state_buf = Some((ptr, len));
                Ok(ptr)
            }
        }
    }
}

impl EmulatorCore for WasmCore {
    fn info(&self) -> CoreInfo {
        self.info
    }

    fn step(&mut self) -> Result<(), CoreError> {
        self.step_fn
            .call(&mut self.store, ())
            .map_err(|e| trap("step", e))
    }

    fn framebuffer(&mut self) -> Result<&[u8], CoreError> {
        let ptr = self
            .framebuffer_fn
            .call(&mut self.store, ())
            .map_err(|e| trap("framebuffer_ptr", e))?;
        self.guest_slice("framebuffer", ptr, self.info.frame_len())
    }

    fn drain_audio(
        &mut self,
        left: &mut Vec<f32>,
        right: &mut Vec<f32>,
    ) -> Result<usize, CoreError> {
        let count = self
            .audio_samples_fn
            .call(&mut self.store, ())
            .map_err(|e| trap("audio_samples", e))? as usize;
        if count == 0 {
            return Ok(0);
        }

        let left_ptr = self
            .audio_left_fn
            .call(&mut self.store, ())
            .map_err(|e| trap("audio_left_ptr", e))?;
        let right_ptr = self
            .audio_right_fn
            .call(&mut self.store, ())
            .map_err(|e| trap("audio_right_ptr", e))?;

        let byte_len = count.checked_mul(4).ok_or(CoreError::OutOfBounds {
            what: "audio buffer",
            offset: u64::from(left_ptr),
            len: count as u64,
        })?;
        let decode = |bytes: &[u8], out: &mut Vec<f32>| {
            out.extend(
                bytes
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );
        };
        decode(self.guest_slice("left audio", left_ptr, byte_len)?, left);
        decode(self.guest_slice("right audio", right_ptr, byte_len)?, right);
        Ok(count)
    }

    fn set_button_state(&mut self, button: Button, pressed: bool) -> Result<(), CoreError> {
        self.set_button_fn
            .call(&mut self.store, (button.index() as u32, u32::from(pressed)))
            .map_err(|e| trap("set_button", e))
    }

    fn save_state(&mut self) -> Result<Vec<u8>, CoreError> {
        let (size_fn, save_fn) = match &self.state {
            Some(s) => (s.size.clone(), s.save.clone()),
            None => return Err(CoreError::Unsupported("save states")),
        };

        let size = size_fn
            .call(&mut self.store, ())
            .map_err(|e| trap("state_size", e))?;
        let ptr = self.state_buffer(size)?;
        save_fn
            .call(&mut self.store, ptr)
            .map_err(|e| trap("save_state", e))?;
        Ok(self.guest_slice("state", ptr, size as usize)?.to_vec())
    }

    fn load_state(&mut self, state: &[u8]) -> Result<(), CoreError> {
        let load_fn = match &self.state {
            Some(s) => s.load.clone(),
            None => return Err(CoreError::Unsupported("save states")),
        };

        let len = guest_len(state.len(), "state")?;
        let ptr = self.state_buffer(len)?;
        self.write_guest("state", ptr, state)?;
        let code = load_fn
            .call(&mut self.store, (ptr, len))
            .map_err(|e| trap("load_state", e))?;
        if code != 0 {
            return Err(CoreError::StateRejected(code));
        }
        Ok(())
    }
}

fn trap(op: &str, e: impl std::fmt::Display) -> CoreError {
    CoreError::Trap(format!("{}() failed: {:#}", op, e))
}

fn guest_len(len: usize, what: &'static str) -> Result<u32, CoreError> {
    u32::try_from(len).map_err(|_| CoreError::OutOfBounds {
        what,
        offset: 0,
        len: len as u64,
    })
}

/// `env.log(ptr, len)`: UTF-8 debug output from the core
fn log_message(caller: Caller<'_, CoreState>, ptr: u32, len: u32) {
    let Some(memory) = caller.data().memory else {
        return;
    };
    let data = memory.data(&caller);
    let start = ptr as usize;
    if let Some(bytes) = start
        .checked_add(len as usize)
        .and_then(|end| data.get(start..end))
        && let Ok(msg) = std::str::from_utf8(bytes)
    {
        tracing::debug!(target: "retrobridge::guest", "{}", msg);
    }
}
