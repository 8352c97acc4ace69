//! Telemetry sinks.
//!
//! # Design Decisions
//! - `emit` is infallible for callers; a sink that cannot write logs a warning
//! - One event per call, written whole under the sink's lock
//! - The file format is JSON lines, one self-contained record per line

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::telemetry::event::TelemetryEvent;

/// Append-only destination for telemetry events. Safe under concurrent writers.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &TelemetryEvent);
}

/// Keeps events in memory; used for diagnostics and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in emission order.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().expect("telemetry mutex poisoned").clone()
    }

    /// Events for one request in emission order.
    pub fn events_for(&self, request_id: &str) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .expect("telemetry mutex poisoned")
            .iter()
            .filter(|e| e.request_id == request_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("telemetry mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&self, event: &TelemetryEvent) {
        self.events.lock().expect("telemetry mutex poisoned").push(event.clone());
    }
}

/// Appends JSON lines to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Open (or create) `path` in append mode.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::info!(path = %path.display(), "Telemetry log opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TelemetrySink for JsonLinesSink {
    fn emit(&self, event: &TelemetryEvent) {
        let mut line = match event.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, request_id = %event.request_id, "Failed to encode telemetry event");
                return;
            }
        };
        line.push('\n');

        let mut file = self.file.lock().expect("telemetry mutex poisoned");
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
            tracing::warn!(error = %e, path = %self.path.display(), "Failed to append telemetry event");
        }
    }
}

/// Mirrors events into the structured logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: &TelemetryEvent) {
        let data = serde_json::Value::Object(event.data.clone());
        tracing::info!(
            target: "telemetry",
            request_id = %event.request_id,
            event_type = %event.event_type,
            mode = event.mode.as_deref().unwrap_or(""),
            backend = event.backend.as_deref().unwrap_or(""),
            duration_ms = event.duration_ms,
            data = %data,
            "telemetry event"
        );
    }
}

/// Sends each event to several sinks in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TelemetrySink for FanoutSink {
    fn emit(&self, event: &TelemetryEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Read the trail of one request back from a JSON-lines log.
///
/// Lines that fail to parse are skipped.
pub fn read_trail(path: impl AsRef<Path>, request_id: &str) -> io::Result<Vec<TelemetryEvent>> {
    let reader = BufReader::new(File::open(path)?);
    let mut trail = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TelemetryEvent>(&line) {
            Ok(event) if event.request_id == request_id => trail.push(event),
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Skipping malformed telemetry line"),
        }
    }
    Ok(trail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_filters_by_request() {
        let sink = MemorySink::new();
        sink.emit(&TelemetryEvent::new("a", "completed"));
        sink.emit(&TelemetryEvent::new("b", "demoted"));
        sink.emit(&TelemetryEvent::new("a", "exhausted"));

        let trail: Vec<_> = sink.events_for("a").into_iter().map(|e| e.event_type).collect();
        assert_eq!(trail, vec!["completed", "exhausted"]);
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn json_lines_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.jsonl");

        let sink = JsonLinesSink::open(&path).unwrap();
        sink.emit(&TelemetryEvent::new("req-1", "demoted").with_mode("primary"));
        sink.emit(&TelemetryEvent::new("req-2", "completed"));
        sink.emit(&TelemetryEvent::new("req-1", "completed").with_mode("offline"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);

        let trail = read_trail(&path, "req-1").unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].mode.as_deref(), Some("primary"));
        assert_eq!(trail[1].mode.as_deref(), Some("offline"));
    }

    #[test]
    fn concurrent_writers_never_interleave_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.jsonl");
        let sink = Arc::new(JsonLinesSink::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        sink.emit(&TelemetryEvent::new(format!("req-{t}"), "attempt").with_field("i", i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 400);
        for line in contents.lines() {
            serde_json::from_str::<TelemetryEvent>(line).unwrap();
        }
        assert_eq!(read_trail(&path, "req-3").unwrap().len(), 50);
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(MemorySink::new());
        let b = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new().with(a.clone()).with(b.clone()).with(Arc::new(TracingSink));
        fanout.emit(&TelemetryEvent::new("r", "completed"));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }
}
