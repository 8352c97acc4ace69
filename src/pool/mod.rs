//! Connection pool subsystem.
//!
//! # Data Flow
//! ```text
//! execute_with_connection(backend, op)
//!     → manager.rs (resolve or create the backend's connection)
//!     → connection.rs (acquire per-host slot, track in-flight op)
//!     → manager.rs (acquire global limiter slot)
//!     → op(connection)
//!     → guards dropped: both slots released on every exit path
//! ```
//!
//! # Design Decisions
//! - One reusable HTTP session per backend name, created lazily
//! - Global limiter caps in-flight work across all backends
//! - Slots are RAII permits, so cancellation cannot leak them

pub mod connection;
pub mod manager;

pub use connection::{BackendConnection, OperationGuard};
pub use manager::{ConnectionPool, PoolStats};
