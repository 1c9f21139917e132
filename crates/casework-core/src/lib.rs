//! Dispatch pipeline and module registry for casework.
//!
//! This crate defines the "ports" (loader, ledger, repository traits) that
//! the infrastructure layer implements, plus the pure business logic of the
//! service: the versioned module registry and scanner, the queue transport
//! seam with its in-process broker, and the incoming/response processors.
//! It depends only on `casework-types` -- never on `casework-infra` or any
//! database/WASM crate.

pub mod dispatch;
pub mod ledger;
pub mod module;
pub mod repository;
pub mod transport;
