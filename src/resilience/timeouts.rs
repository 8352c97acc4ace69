//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap backend calls (loads, health probes, mode handlers) with a deadline
//! - Map an elapsed deadline to [`OrchestratorError::Timeout`]
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the inner future is dropped on expiry,
//!   which releases any pool slot it holds
//! - A timeout is reported exactly like any other failure by callers

use std::future::Future;
use std::time::Duration;

use crate::error::{OrchestratorError, Result};

/// Run a fallible future under `limit`, flattening the timeout into the error type.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(OrchestratorError::Timeout(limit)),
    }
}
