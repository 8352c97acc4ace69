//! Backend health record.
//!
//! # State Transitions
//! ```text
//! probe ok        → healthy: true, last_response_time_ms set
//! probe error     → healthy: false, error set, cached instance evicted
//! probe timeout   → healthy: false, error set, cached instance evicted
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Outcome of the most recent health check for one backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub last_response_time_ms: Option<u64>,
    pub checked_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn healthy(response_time: Option<Duration>) -> Self {
        Self {
            healthy: true,
            last_response_time_ms: response_time.map(|d| d.as_millis() as u64),
            checked_at: Utc::now(),
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            last_response_time_ms: None,
            checked_at: Utc::now(),
            error: Some(error.into()),
        }
    }
}
