//! Telemetry and logging infrastructure
//!
//! Provides structured logging with tracing and per-phase timing.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogConfig, LogGuard};
pub use metrics::{Phase, PhaseProfiler, PhaseTimings};
