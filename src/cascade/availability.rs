//! Availability signal for the primary mode.
//!
//! The record is produced by a separate provisioning component; the cascade
//! only reads it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

/// Readiness of the primary mode plus opaque identifiers for its handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    #[serde(default)]
    pub supported: bool,
    #[serde(flatten)]
    pub identifiers: BTreeMap<String, Value>,
}

impl AvailabilityRecord {
    pub fn supported() -> Self {
        Self {
            supported: true,
            identifiers: BTreeMap::new(),
        }
    }

    pub fn unsupported() -> Self {
        Self::default()
    }

    pub fn with_identifier(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.identifiers.insert(key.into(), value.into());
        self
    }
}

/// Externally owned readiness check consulted by mode selection.
pub trait AvailabilityProbe: Send + Sync {
    fn availability(&self) -> AvailabilityRecord;
}

/// Fixed record, for tests and for deployments without provisioning.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe(pub AvailabilityRecord);

impl AvailabilityProbe for StaticProbe {
    fn availability(&self) -> AvailabilityRecord {
        self.0.clone()
    }
}

/// How long a file-backed record is reused before the file is read again.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(1);

/// Reads the JSON record written by the provisioning component.
///
/// A missing or unreadable file reads as unsupported. The record is re-read at
/// most once per refresh window, so mode selection does blocking file IO only
/// on the first request after the window lapses.
#[derive(Debug)]
pub struct FileAvailabilityProbe {
    path: PathBuf,
    refresh: Duration,
    cached: RwLock<Option<(Instant, AvailabilityRecord)>>,
}

impl FileAvailabilityProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            refresh: DEFAULT_REFRESH,
            cached: RwLock::new(None),
        }
    }

    /// Reuse a read record for `refresh`. Zero reads the file on every call.
    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    fn read(&self) -> AvailabilityRecord {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "Availability record unreadable");
                return AvailabilityRecord::unsupported();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "Availability record malformed");
            AvailabilityRecord::unsupported()
        })
    }
}

impl AvailabilityProbe for FileAvailabilityProbe {
    fn availability(&self) -> AvailabilityRecord {
        let now = Instant::now();
        if let Some((read_at, record)) = self.cached.read().expect("availability cache lock poisoned").as_ref() {
            if now.saturating_duration_since(*read_at) < self.refresh {
                return record.clone();
            }
        }

        let record = self.read();
        *self.cached.write().expect("availability cache lock poisoned") = Some((now, record.clone()));
        record
    }
}
