//! Observability setup for chatrelay: tracing subscriber and optional
//! OpenTelemetry export.

pub mod tracing_setup;
