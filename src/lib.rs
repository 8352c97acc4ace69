//! Resilient backend orchestration core.
//!
//! Lazily loads pluggable backends behind circuit breakers and a bounded
//! connection pool, and runs requests through an ordered fallback cascade
//! of processing modes.

pub mod admin;
pub mod backend;
pub mod cascade;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod orchestrator;
pub mod pool;
pub mod resilience;
pub mod telemetry;

pub use backend::{Backend, BackendDescriptor, BackendFactory, BackendRegistry};
pub use cascade::{FallbackCascade, FallbackPolicy, ModeContext, ModeHandler, RequestFlags};
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use lifecycle::{Services, Shutdown};
pub use orchestrator::LazyOrchestrator;
pub use pool::ConnectionPool;
pub use resilience::{CircuitBreaker, CircuitBreakerRegistry};
