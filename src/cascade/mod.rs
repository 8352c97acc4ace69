//! Fallback cascade over ordered processing modes.
//!
//! # Data Flow
//! ```text
//! RequestFlags + ProcessOverride + AvailabilityProbe
//!     → policy.rs (determine_mode: starting mode)
//!     → executor.rs (one attempt per mode, demote on failure)
//!     → telemetry (completed / demoted / exhausted per attempt)
//! ```

pub mod availability;
pub mod executor;
pub mod policy;

pub use availability::{AvailabilityProbe, AvailabilityRecord, FileAvailabilityProbe, StaticProbe};
pub use executor::{CascadeOutcome, FallbackCascade, ModeContext, ModeHandler};
pub use policy::{determine_mode, FallbackPolicy, ModeSelection, ProcessOverride, RequestFlags, SelectionReason};
