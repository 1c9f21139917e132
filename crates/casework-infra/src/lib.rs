//! Infrastructure implementations for casework.
//!
//! Implements the ports defined in `casework-core`: the SQLite-backed
//! processing-status ledger and entity repositories, and the Wasmtime-backed
//! logic-module loader.

pub mod config;
pub mod sqlite;
pub mod wasm;
