//! Backend orchestration subsystem.
//!
//! # Data Flow
//! ```text
//! load(descriptors)
//!     → resilience::CircuitBreakerRegistry (skip if can_execute() is false)
//!     → cache.rs (reuse unexpired instance, no attempt recorded)
//!     → backend::BackendRegistry (factory by category)
//!     → pool::ConnectionPool + timeout (one concurrent future per backend)
//!     → breaker success/failure, cache insert
//!     → map of ready backends (failures are absent keys)
//!
//! health_check_all()
//!     → probe each cached backend under a short timeout
//!     → cache.rs (record HealthStatus, evict failures)
//! ```
//!
//! # Design Decisions
//! - Health checks and loads are independent failure signals; only loads touch breakers
//! - Cache and health maps share one coarse lock; breakers lock per backend
//! - A batch never fails as a whole
//! - A health result only evicts the instance that was probed

pub mod cache;
pub mod lazy;

pub use cache::{BackendCache, CacheEntry, HealthCheck};
pub use lazy::{LazyOrchestrator, LoadedBackends, OrchestratorMetrics};
