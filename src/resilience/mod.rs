//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to backend:
//!     → circuit_breaker.rs (pre-flight can_execute, skip if open)
//!     → timeouts.rs (enforce per-call deadline)
//!     → circuit_breaker.rs (record success / failure)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries with backoff: failure isolation uses flat thresholds only
//! - Circuit breaker prevents hammering a failing backend

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitMetrics, CircuitState};
pub use timeouts::with_timeout;
