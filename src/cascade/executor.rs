//! Fallback cascade executor.
//!
//! # Flow
//! ```text
//! run(flags, input)
//!     → determine_mode() once, against one policy snapshot
//!     → execute from the chosen mode:
//!         handler ok        → "completed", return
//!         handler error     → "demoted", next mode in order
//!         last mode error   → "exhausted", AllModesExhausted
//! ```
//!
//! Each mode is attempted at most once per request, so a request makes at most
//! `modes().len()` attempts and emits exactly one telemetry event per attempt.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;

use crate::cascade::availability::{AvailabilityProbe, AvailabilityRecord};
use crate::cascade::policy::{determine_mode, FallbackPolicy, ModeSelection, ProcessOverride, RequestFlags};
use crate::error::{ModeFailure, OrchestratorError, Result};
use crate::observability::metrics;
use crate::resilience::with_timeout;
use crate::telemetry::{new_request_id, TelemetryEvent, TelemetrySink};

/// What a handler learns about the attempt it is serving.
#[derive(Debug, Clone)]
pub struct ModeContext {
    pub request_id: String,
    pub mode: String,
    /// 1-based attempt number within the request.
    pub attempt: usize,
    /// Opaque identifiers from the availability record; only set for the primary mode.
    pub identifiers: BTreeMap<String, Value>,
}

/// Produces the result for one processing mode.
#[async_trait]
pub trait ModeHandler<I, O>: Send + Sync {
    async fn handle(&self, ctx: &ModeContext, input: &I) -> Result<O>;
}

/// Successful cascade result.
#[derive(Debug, Clone)]
pub struct CascadeOutcome<O> {
    pub request_id: String,
    /// Mode that produced `value`.
    pub mode: String,
    pub attempts: usize,
    pub value: O,
}

/// Runs a request through an ordered list of modes until one succeeds.
pub struct FallbackCascade<I, O> {
    policy: Arc<ArcSwap<FallbackPolicy>>,
    handlers: HashMap<String, Arc<dyn ModeHandler<I, O>>>,
    process_override: ProcessOverride,
    probe: Arc<dyn AvailabilityProbe>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl<I, O> FallbackCascade<I, O>
where
    I: Send + Sync + 'static,
    O: Send + 'static,
{
    pub fn new(
        policy: Arc<ArcSwap<FallbackPolicy>>,
        probe: Arc<dyn AvailabilityProbe>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            policy,
            handlers: HashMap::new(),
            process_override: ProcessOverride::none(),
            probe,
            telemetry,
        }
    }

    pub fn with_handler<H>(mut self, mode: impl Into<String>, handler: H) -> Self
    where
        H: ModeHandler<I, O> + 'static,
    {
        self.handlers.insert(mode.into(), Arc::new(handler));
        self
    }

    pub fn with_process_override(mut self, process_override: ProcessOverride) -> Self {
        self.process_override = process_override;
        self
    }

    /// Current policy snapshot.
    pub fn policy(&self) -> Arc<FallbackPolicy> {
        self.policy.load_full()
    }

    /// Swap the policy. Requests already running keep the snapshot they started with.
    pub fn update_policy(&self, policy: FallbackPolicy) {
        tracing::info!(modes = ?policy.modes(), "Fallback policy updated");
        self.policy.store(Arc::new(policy));
    }

    /// Select the starting mode for `flags` under the current policy.
    pub fn determine_mode(&self, flags: &RequestFlags) -> Result<ModeSelection> {
        determine_mode(&self.policy(), flags, &self.process_override, self.probe.as_ref())
    }

    /// Select a mode and execute from it under a fresh request id.
    pub async fn run(&self, flags: &RequestFlags, input: &I) -> Result<CascadeOutcome<O>> {
        let request_id = new_request_id();
        let policy = self.policy();
        let selection = determine_mode(&policy, flags, &self.process_override, self.probe.as_ref())?;
        tracing::debug!(
            request_id = %request_id,
            mode = %selection.mode,
            reason = selection.reason.as_str(),
            "Cascade mode selected"
        );
        self.execute_from(&policy, &request_id, &selection.mode, selection.availability.as_ref(), input)
            .await
    }

    /// Execute starting at `mode`, demoting through the remaining modes on failure.
    pub async fn execute(&self, request_id: &str, mode: &str, input: &I) -> Result<CascadeOutcome<O>> {
        let policy = self.policy();
        self.execute_from(&policy, request_id, mode, None, input).await
    }

    async fn execute_from(
        &self,
        policy: &FallbackPolicy,
        request_id: &str,
        mode: &str,
        availability: Option<&AvailabilityRecord>,
        input: &I,
    ) -> Result<CascadeOutcome<O>> {
        let start = policy.position(mode).ok_or_else(|| {
            OrchestratorError::ConfigurationUnavailable(format!("mode '{mode}' is not in the fallback order"))
        })?;
        let remaining = &policy.modes()[start..];
        let mut failures = Vec::with_capacity(remaining.len());

        for (index, mode) in remaining.iter().enumerate() {
            let attempt = index + 1;
            let ctx = ModeContext {
                request_id: request_id.to_string(),
                mode: mode.clone(),
                attempt,
                identifiers: match availability {
                    Some(record) if mode == policy.primary() => record.identifiers.clone(),
                    _ => BTreeMap::new(),
                },
            };

            let started = Instant::now();
            let outcome = self.attempt(policy, &ctx, input).await;
            let elapsed = started.elapsed();

            let err = match outcome {
                Ok(value) => {
                    metrics::record_cascade_attempt(mode, "completed");
                    tracing::info!(request_id = %request_id, mode = %mode, attempt, "Cascade completed");
                    self.telemetry.emit(
                        &TelemetryEvent::new(request_id, "completed")
                            .with_mode(mode.as_str())
                            .with_field("attempt", attempt)
                            .with_duration(elapsed),
                    );
                    return Ok(CascadeOutcome {
                        request_id: request_id.to_string(),
                        mode: mode.clone(),
                        attempts: attempt,
                        value,
                    });
                }
                Err(err) => err,
            };

            let event = TelemetryEvent::new(request_id, "demoted")
                .with_mode(mode.as_str())
                .with_field("attempt", attempt)
                .with_field("reason", err.kind())
                .with_field("error", err.to_string())
                .with_duration(elapsed);
            failures.push(ModeFailure {
                mode: mode.clone(),
                error: err.to_string(),
            });

            match remaining.get(index + 1) {
                Some(next) => {
                    metrics::record_cascade_attempt(mode, "demoted");
                    tracing::warn!(
                        request_id = %request_id,
                        mode = %mode,
                        next_mode = %next,
                        error = %err,
                        "Mode failed, demoting"
                    );
                    self.telemetry.emit(&event.with_field("next_mode", next.as_str()));
                }
                None => {
                    metrics::record_cascade_attempt(mode, "exhausted");
                    tracing::error!(request_id = %request_id, mode = %mode, error = %err, "All modes exhausted");
                    let mut event = event;
                    event.event_type = "exhausted".to_string();
                    self.telemetry.emit(&event);
                }
            }
        }

        let tried: Vec<&str> = failures.iter().map(|f| f.mode.as_str()).collect();
        Err(OrchestratorError::AllModesExhausted {
            request_id: request_id.to_string(),
            summary: format!("all {} attempted modes failed ({})", failures.len(), tried.join(" -> ")),
            failures,
        })
    }

    async fn attempt(&self, policy: &FallbackPolicy, ctx: &ModeContext, input: &I) -> Result<O> {
        let Some(handler) = self.handlers.get(&ctx.mode) else {
            return Err(OrchestratorError::ConfigurationUnavailable(format!(
                "no handler registered for mode '{}'",
                ctx.mode
            )));
        };

        let guarded = AssertUnwindSafe(handler.handle(ctx, input))
            .catch_unwind()
            .map(|outcome| {
                outcome.unwrap_or_else(|payload| {
                    Err(OrchestratorError::backend(
                        ctx.mode.as_str(),
                        format!("handler panicked: {}", panic_message(payload.as_ref())),
                    ))
                })
            });
        with_timeout(policy.mode_timeout(), guarded).await
    }
}

impl<I, O> std::fmt::Debug for FallbackCascade<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut modes: Vec<&String> = self.handlers.keys().collect();
        modes.sort();
        f.debug_struct("FallbackCascade")
            .field("policy", &self.policy.load().modes())
            .field("handlers", &modes)
            .field("process_override", &self.process_override)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::availability::StaticProbe;
    use crate::telemetry::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Fails(Arc<AtomicUsize>);

    #[async_trait]
    impl ModeHandler<String, String> for Fails {
        async fn handle(&self, ctx: &ModeContext, _input: &String) -> Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(OrchestratorError::backend(ctx.mode.as_str(), "unavailable"))
        }
    }

    struct Echo;

    #[async_trait]
    impl ModeHandler<String, String> for Echo {
        async fn handle(&self, ctx: &ModeContext, input: &String) -> Result<String> {
            Ok(format!("{}:{input}", ctx.mode))
        }
    }

    struct Panics;

    #[async_trait]
    impl ModeHandler<String, String> for Panics {
        async fn handle(&self, _ctx: &ModeContext, _input: &String) -> Result<String> {
            panic!("model crashed");
        }
    }

    struct Hangs;

    #[async_trait]
    impl ModeHandler<String, String> for Hangs {
        async fn handle(&self, _ctx: &ModeContext, _input: &String) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("late".into())
        }
    }

    struct SeesIdentifiers;

    #[async_trait]
    impl ModeHandler<String, String> for SeesIdentifiers {
        async fn handle(&self, ctx: &ModeContext, _input: &String) -> Result<String> {
            Ok(ctx.identifiers.get("agent_id").map(|v| v.to_string()).unwrap_or_default())
        }
    }

    fn policy() -> Arc<ArcSwap<FallbackPolicy>> {
        Arc::new(ArcSwap::from_pointee(
            FallbackPolicy::new(["A", "B", "C"])
                .unwrap()
                .with_offline_mode("C")
                .with_sandbox_mode("B"),
        ))
    }

    fn cascade(sink: Arc<MemorySink>, probe: AvailabilityRecord) -> FallbackCascade<String, String> {
        FallbackCascade::new(policy(), Arc::new(StaticProbe(probe)), sink)
    }

    #[tokio::test]
    async fn exhaustion_attempts_each_mode_once() {
        let sink = Arc::new(MemorySink::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let cascade = cascade(sink.clone(), AvailabilityRecord::supported())
            .with_handler("A", Fails(calls.clone()))
            .with_handler("B", Fails(calls.clone()))
            .with_handler("C", Fails(calls.clone()));

        let err = cascade.execute("req-x", "A", &"input".to_string()).await.unwrap_err();
        match err {
            OrchestratorError::AllModesExhausted { request_id, failures, .. } => {
                assert_eq!(request_id, "req-x");
                let modes: Vec<_> = failures.iter().map(|f| f.mode.as_str()).collect();
                assert_eq!(modes, vec!["A", "B", "C"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let events = sink.events_for("req-x");
        let kinds: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["demoted", "demoted", "exhausted"]);
        assert_eq!(events[0].data["next_mode"], "B");
        assert_eq!(events[2].data["attempt"], 3);
        assert!(events.iter().all(|e| e.duration_ms.is_some()));
    }

    #[tokio::test]
    async fn demotes_until_a_mode_succeeds() {
        let sink = Arc::new(MemorySink::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let cascade = cascade(sink.clone(), AvailabilityRecord::supported())
            .with_handler("A", Fails(calls.clone()))
            .with_handler("B", Echo)
            .with_handler("C", Fails(calls.clone()));

        let outcome = cascade.execute("req-y", "A", &"hi".to_string()).await.unwrap();
        assert_eq!(outcome.value, "B:hi");
        assert_eq!(outcome.mode, "B");
        assert_eq!(outcome.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let kinds: Vec<_> = sink.events_for("req-y").into_iter().map(|e| e.event_type).collect();
        assert_eq!(kinds, vec!["demoted", "completed"]);
    }

    #[tokio::test]
    async fn starting_mid_order_skips_earlier_modes() {
        let sink = Arc::new(MemorySink::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let cascade = cascade(sink.clone(), AvailabilityRecord::supported())
            .with_handler("A", Fails(calls.clone()))
            .with_handler("B", Fails(calls.clone()))
            .with_handler("C", Echo);

        let outcome = cascade.run(&RequestFlags::offline(), &"q".to_string()).await.unwrap();
        assert_eq!(outcome.mode, "C");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panicking_handler_demotes() {
        let sink = Arc::new(MemorySink::new());
        let cascade = cascade(sink.clone(), AvailabilityRecord::supported())
            .with_handler("A", Panics)
            .with_handler("B", Echo);

        let outcome = cascade.execute("req-p", "A", &"x".to_string()).await.unwrap();
        assert_eq!(outcome.mode, "B");
        let first = &sink.events_for("req-p")[0];
        assert_eq!(first.data["reason"], "backend_error");
        assert!(first.data["error"].as_str().unwrap().contains("model crashed"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_mode_times_out_and_demotes() {
        let sink = Arc::new(MemorySink::new());
        let cascade = cascade(sink.clone(), AvailabilityRecord::supported())
            .with_handler("A", Hangs)
            .with_handler("B", Echo);
        cascade.update_policy(
            FallbackPolicy::new(["A", "B"])
                .unwrap()
                .with_mode_timeout(Duration::from_secs(2)),
        );

        let outcome = cascade.execute("req-t", "A", &"x".to_string()).await.unwrap();
        assert_eq!(outcome.mode, "B");
        let first = &sink.events_for("req-t")[0];
        assert_eq!(first.data["reason"], "timeout");
    }

    #[tokio::test]
    async fn missing_handler_counts_as_failure() {
        let sink = Arc::new(MemorySink::new());
        let cascade = cascade(sink.clone(), AvailabilityRecord::supported()).with_handler("C", Echo);

        let outcome = cascade.execute("req-m", "A", &"x".to_string()).await.unwrap();
        assert_eq!(outcome.mode, "C");
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn unknown_start_mode_rejected() {
        let sink = Arc::new(MemorySink::new());
        let cascade = cascade(sink.clone(), AvailabilityRecord::supported()).with_handler("A", Echo);
        let err = cascade.execute("req-u", "Z", &"x".to_string()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ConfigurationUnavailable(_)));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn identifiers_reach_primary_handler_only() {
        let sink = Arc::new(MemorySink::new());
        let record = AvailabilityRecord::supported().with_identifier("agent_id", "AG1");
        let cascade = cascade(sink, record)
            .with_handler("A", SeesIdentifiers)
            .with_handler("B", SeesIdentifiers);

        let outcome = cascade.run(&RequestFlags::default(), &String::new()).await.unwrap();
        assert_eq!(outcome.mode, "A");
        assert_eq!(outcome.value, "\"AG1\"");

        let outcome = cascade.run(&RequestFlags::sandbox(), &String::new()).await.unwrap();
        assert_eq!(outcome.mode, "B");
        assert_eq!(outcome.value, "");
    }

    #[tokio::test]
    async fn policy_swap_applies_to_new_requests() {
        let sink = Arc::new(MemorySink::new());
        let cascade = cascade(sink, AvailabilityRecord::unsupported())
            .with_handler("A", Echo)
            .with_handler("B", Echo);

        assert_eq!(cascade.determine_mode(&RequestFlags::default()).unwrap().mode, "B");
        cascade.update_policy(FallbackPolicy::new(["A"]).unwrap());
        assert_eq!(cascade.determine_mode(&RequestFlags::default()).unwrap().mode, "A");
    }
}
