//! WASM engine wrapper for compiling core modules

use wasmtime::{Engine, ExternType, Module};

use super::CoreLoadError;

/// WASM pages are 64 KiB
const WASM_PAGE_SIZE: u64 = 65536;

/// Shared WASM engine (one per application)
pub struct WasmEngine {
    engine: Engine,
}

impl WasmEngine {
    pub fn new() -> Self {
        Self {
            engine: Engine::default(),
        }
    }

    /// Get a reference to the underlying wasmtime engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compile a core module from bytes (binary or text format)
    pub fn load_module(&self, bytes: &[u8]) -> Result<Module, CoreLoadError> {
        Module::new(&self.engine, bytes).map_err(|e| CoreLoadError::Compile(format!("{:#}", e)))
    }

    /// Check that every exported memory's declared minimum fits in `ram_limit`.
    ///
    /// Catching this before instantiation gives a clearer error than the
    /// store limiter refusing the allocation.
    pub fn validate_module_memory(module: &Module, ram_limit: usize) -> Result<(), CoreLoadError> {
        for export in module.exports() {
            if let ExternType::Memory(mem_type) = export.ty() {
                let required = mem_type.minimum().saturating_mul(WASM_PAGE_SIZE);
                if required > ram_limit as u64 {
                    return Err(CoreLoadError::MemoryTooLarge {
                        required,
                        limit: ram_limit,
                    });
                }

                if mem_type.maximum().is_none() {
                    tracing::debug!(
                        "Core memory '{}' has no maximum declared; host will limit to {} bytes",
                        export.name(),
                        ram_limit
                    );
                }
            }
        }
        Ok(())
    }
}

impl Default for WasmEngine {
    fn default() -> Self {
        Self::new()
    }
}
