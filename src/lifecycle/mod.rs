//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Build services → Warm-up load → Spawn monitor/admin/watcher
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast stop → Tasks exit → Pool closed
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then services, then background tasks
//! - Ordered shutdown: stop tasks, then close connections

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_shutdown_signal;
pub use startup::{default_registry, Services, StartupError};
