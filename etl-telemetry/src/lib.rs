//! Telemetry of the target: tracing initialisation and the anonymous usage report.

pub mod tracing;
pub mod usage;
