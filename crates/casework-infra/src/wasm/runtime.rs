//! Wasmtime runtime configuration and component loading.
//!
//! Provides [`ModuleRuntime`], the shared engine every logic module is
//! compiled against. The engine is configured with the Component Model,
//! async support, and fuel consumption; a fresh store (and therefore fresh
//! fuel and memory accounting) is created per invocation by the loader.

use anyhow::Result;
use wasmtime::component::Component;
use wasmtime::{Config, Engine};

// Generate Rust bindings from the WIT dispatch-module world.
// Exported module functions are invoked on an async store (async_support is
// enabled on the engine), so the generated `call_*` wrappers must be async;
// the `log` host import stays synchronous.
wasmtime::component::bindgen!({
    world: "dispatch-module",
    path: "../../wit/casework-module.wit",
    exports: { default: async },
});

/// Maximum fuel one module invocation may consume.
pub const MAX_FUEL: u64 = 1_000_000;

/// Maximum linear memory one module invocation may grow to.
pub const MAX_MEMORY_BYTES: usize = 64 * 1024 * 1024;

/// Shared Wasmtime engine for logic modules.
pub struct ModuleRuntime {
    engine: Engine,
}

impl ModuleRuntime {
    /// Create a runtime with the module engine configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if engine creation fails (e.g., unsupported
    /// platform).
    pub fn new() -> Result<Self> {
        let mut config = Config::new();
        config.async_support(true);
        config.wasm_component_model(true);
        config.consume_fuel(true);
        // Modules are single-threaded by contract.
        config.wasm_threads(false);

        Ok(Self {
            engine: Engine::new(&config)?,
        })
    }

    /// The underlying engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compile and validate a WASM component from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid WASM component or
    /// compilation fails.
    pub fn load_component(&self, wasm_bytes: &[u8]) -> Result<Component> {
        Component::new(&self.engine, wasm_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_runtime_new_succeeds() {
        let runtime = ModuleRuntime::new();
        assert!(runtime.is_ok(), "ModuleRuntime::new() should succeed");
    }

    #[test]
    fn load_component_rejects_garbage_bytes() {
        let runtime = ModuleRuntime::new().expect("runtime creation should succeed");
        let result = runtime.load_component(b"definitely not wasm");
        assert!(result.is_err(), "garbage bytes must not compile");
    }
}
