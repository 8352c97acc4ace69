//! Mode ordering and mode selection.
//!
//! # Precedence
//! ```text
//! force_offline flag > force_sandbox flag > process-wide override > availability probe
//! ```
//!
//! Selection is a pure function of the policy, the overrides, and the probe result.

use serde::Serialize;
use std::time::Duration;

use crate::cascade::availability::{AvailabilityProbe, AvailabilityRecord};
use crate::config::CascadeConfig;
use crate::error::{OrchestratorError, Result};

/// Ordered processing modes plus the modes that caller flags force.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    modes: Vec<String>,
    mode_timeout: Duration,
    offline_mode: Option<String>,
    sandbox_mode: Option<String>,
}

impl FallbackPolicy {
    /// Policy over `modes`, highest priority first.
    pub fn new<S: Into<String>>(modes: impl IntoIterator<Item = S>) -> Result<Self> {
        let modes: Vec<String> = modes.into_iter().map(Into::into).collect();
        if modes.is_empty() {
            return Err(OrchestratorError::ConfigurationUnavailable(
                "fallback policy needs at least one mode".to_string(),
            ));
        }
        Ok(Self {
            modes,
            mode_timeout: Duration::from_secs(120),
            offline_mode: None,
            sandbox_mode: None,
        })
    }

    pub fn from_config(config: &CascadeConfig) -> Result<Self> {
        let mut policy = Self::new(config.modes.iter().cloned())?
            .with_mode_timeout(Duration::from_secs(config.mode_timeout_secs));
        policy.offline_mode = config.offline_mode.clone();
        policy.sandbox_mode = config.sandbox_mode.clone();
        Ok(policy)
    }

    pub fn with_mode_timeout(mut self, timeout: Duration) -> Self {
        self.mode_timeout = timeout;
        self
    }

    pub fn with_offline_mode(mut self, mode: impl Into<String>) -> Self {
        self.offline_mode = Some(mode.into());
        self
    }

    pub fn with_sandbox_mode(mut self, mode: impl Into<String>) -> Self {
        self.sandbox_mode = Some(mode.into());
        self
    }

    pub fn modes(&self) -> &[String] {
        &self.modes
    }

    pub fn primary(&self) -> &str {
        &self.modes[0]
    }

    pub fn mode_timeout(&self) -> Duration {
        self.mode_timeout
    }

    pub fn position(&self, mode: &str) -> Option<usize> {
        self.modes.iter().position(|m| m == mode)
    }

    fn require(&self, mode: &str, source: &str) -> Result<String> {
        if self.position(mode).is_some() {
            Ok(mode.to_string())
        } else {
            Err(OrchestratorError::ConfigurationUnavailable(format!(
                "{source} requests mode '{mode}' which is not in the fallback order"
            )))
        }
    }
}

/// Per-request caller flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFlags {
    pub force_offline: bool,
    pub force_sandbox: bool,
}

impl RequestFlags {
    pub fn offline() -> Self {
        Self {
            force_offline: true,
            force_sandbox: false,
        }
    }

    pub fn sandbox() -> Self {
        Self {
            force_offline: false,
            force_sandbox: true,
        }
    }
}

/// Process-wide forced mode, read once at startup by the entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOverride(Option<String>);

impl ProcessOverride {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn forced(mode: impl Into<String>) -> Self {
        Self(Some(mode.into()))
    }

    /// Read `var`; unset or blank means no override.
    pub fn from_env(var: &str) -> Self {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => {
                tracing::info!(var = %var, mode = %value.trim(), "Process-wide mode override active");
                Self(Some(value.trim().to_string()))
            }
            _ => Self(None),
        }
    }

    pub fn mode(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Why a mode was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    ForceOffline,
    ForceSandbox,
    ProcessOverride,
    ProbeReady,
    ProbeUnavailable,
}

impl SelectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionReason::ForceOffline => "force_offline",
            SelectionReason::ForceSandbox => "force_sandbox",
            SelectionReason::ProcessOverride => "process_override",
            SelectionReason::ProbeReady => "probe_ready",
            SelectionReason::ProbeUnavailable => "probe_unavailable",
        }
    }
}

/// Outcome of mode selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeSelection {
    pub mode: String,
    pub reason: SelectionReason,
    /// Present only when the probe was consulted.
    pub availability: Option<AvailabilityRecord>,
}

/// Pick the starting mode. The probe is consulted only when no override applies.
pub fn determine_mode(
    policy: &FallbackPolicy,
    flags: &RequestFlags,
    process: &ProcessOverride,
    probe: &dyn AvailabilityProbe,
) -> Result<ModeSelection> {
    let forced = if flags.force_offline {
        Some((policy.offline_mode.as_deref(), SelectionReason::ForceOffline, "force_offline"))
    } else if flags.force_sandbox {
        Some((policy.sandbox_mode.as_deref(), SelectionReason::ForceSandbox, "force_sandbox"))
    } else {
        process
            .mode()
            .map(|mode| (Some(mode), SelectionReason::ProcessOverride, "process override"))
    };

    if let Some((mode, reason, source)) = forced {
        let mode = mode.ok_or_else(|| {
            OrchestratorError::ConfigurationUnavailable(format!("{source} has no mode configured"))
        })?;
        return Ok(ModeSelection {
            mode: policy.require(mode, source)?,
            reason,
            availability: None,
        });
    }

    let record = probe.availability();
    let (mode, reason) = if record.supported {
        (policy.primary(), SelectionReason::ProbeReady)
    } else {
        let next = policy.modes.get(1).unwrap_or(&policy.modes[0]);
        (next.as_str(), SelectionReason::ProbeUnavailable)
    };
    Ok(ModeSelection {
        mode: mode.to_string(),
        reason,
        availability: Some(record),
    })
}
