//! Telemetry subsystem.
//!
//! # Data Flow
//! ```text
//! cascade attempt / orchestrator load outcome
//!     → event.rs (immutable TelemetryEvent, keyed by request id)
//!     → sink.rs:
//!         - JsonLinesSink (append-only trail on disk)
//!         - TracingSink (mirror into structured logs)
//!         - MemorySink (diagnostics, tests)
//! ```
//!
//! # Design Decisions
//! - Events are never mutated after emission
//! - Ordering within one request id is emission order
//! - Sink failures never reach the caller

pub mod event;
pub mod sink;

use std::io;
use std::sync::Arc;

use crate::config::TelemetryConfig;

pub use event::{new_request_id, TelemetryEvent};
pub use sink::{read_trail, FanoutSink, JsonLinesSink, MemorySink, TelemetrySink, TracingSink};

/// Build the sink described by `config`.
pub fn build_sink(config: &TelemetryConfig) -> io::Result<Arc<dyn TelemetrySink>> {
    let mut fanout = FanoutSink::new();
    if let Some(path) = &config.log_path {
        fanout = fanout.with(Arc::new(JsonLinesSink::open(path)?));
    }
    if config.mirror_to_tracing {
        fanout = fanout.with(Arc::new(TracingSink));
    }
    Ok(Arc::new(fanout))
}
