//! Wasmtime-backed logic-module host: engine configuration and the loader
//! implementing the core `ModuleLoader` port.

pub mod loader;
pub mod runtime;

pub use loader::WasmModuleLoader;
pub use runtime::ModuleRuntime;
