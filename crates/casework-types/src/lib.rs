//! Shared domain types for casework.
//!
//! This crate contains the core domain types used across the casework
//! dispatch service: message envelopes, processing-status records, module
//! names/versions/manifests, case-file entities, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, semver,
//! serde_yaml_ng, thiserror.

pub mod config;
pub mod entity;
pub mod envelope;
pub mod error;
pub mod module;
pub mod status;
