//! Observability wiring for casework: tracing subscriber initialization
//! with optional OpenTelemetry trace export.

pub mod tracing_setup;
