//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! monitor.rs:
//!     Periodic timer
//!     → LazyOrchestrator::health_check_all (probe each cached backend)
//!     → state.rs (HealthStatus per backend)
//!     → unhealthy backends evicted from the cache
//! ```
//!
//! # Design Decisions
//! - A single failed probe evicts; the next load recreates the instance
//! - Health results never touch circuit breakers

pub mod monitor;
pub mod state;

pub use monitor::HealthMonitor;
pub use state::HealthStatus;
