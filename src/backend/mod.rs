//! Backend adapter subsystem.
//!
//! # Data Flow
//! ```text
//! BackendDescriptor (caller)
//!     → registry.rs (category → factory, capabilities declared at registration)
//!     → factory.create(descriptor, connection) under the load timeout
//!     → Arc<dyn Backend> (cached and shared by the orchestrator)
//!     → backend.probe(connection) during health checks
//! ```
//!
//! # Design Decisions
//! - Factory selection is a table lookup, never string matching on names
//! - Capabilities are explicit data, not discovered at call time
//! - The core never interprets what a backend does

pub mod descriptor;
pub mod http;
pub mod registry;

pub use descriptor::{AdapterCapabilities, Backend, BackendDescriptor, BackendFactory};
pub use http::{HttpBackend, HttpBackendFactory, HTTP_CATEGORY};
pub use registry::{BackendRegistry, RegisteredFactory};
