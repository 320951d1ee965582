//! Outbound notifications to whatever renders the session
//!
//! The core never draws anything. It reports verification status changes,
//! benchmark rows and user-facing notices through [`UiSink`]; a terminal,
//! a web front end or a test recorder decides what to do with them.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::bench::BenchmarkResult;
use crate::message::{EnvelopeId, VerificationStatus};

/// How long a notification stays on screen unless configured otherwise
pub const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_millis(3500);

/// Notification severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Something finished well
    Success,
    /// Neutral information
    Info,
    /// Something failed and the user may need to act
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Success => "success",
            Severity::Info => "info",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// A short-lived user-facing message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Text to show
    pub message: String,
    /// Severity, usually mapped to a colour
    pub severity: Severity,
    /// Auto-dismiss delay
    pub ttl: Duration,
}

impl Notification {
    /// Create a notification with the default TTL
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Notification {
            message: message.into(),
            severity,
            ttl: DEFAULT_NOTIFICATION_TTL,
        }
    }

    /// Override the TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Receiver of state changes produced by the core
pub trait UiSink: Send + Sync {
    /// An envelope's verification status changed
    fn on_verification_status_changed(&self, id: EnvelopeId, status: VerificationStatus);

    /// A benchmark row was recorded
    fn on_benchmark_row_added(&self, result: &BenchmarkResult);

    /// Show a notification
    fn on_notify(&self, notification: &Notification);
}

/// Sink that writes everything to the tracing log
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl UiSink for TracingSink {
    fn on_verification_status_changed(&self, id: EnvelopeId, status: VerificationStatus) {
        info!(%id, %status, "verification status changed");
    }

    fn on_benchmark_row_added(&self, result: &BenchmarkResult) {
        info!(
            algorithm = %result.algorithm,
            iterations = result.iterations,
            time_per_op_ms = %result.time_per_op_ms,
            memory_delta_kb = %result.memory_delta_kb,
            "benchmark row"
        );
    }

    fn on_notify(&self, notification: &Notification) {
        match notification.severity {
            Severity::Error => error!(message = %notification.message, "notification"),
            _ => info!(
                message = %notification.message,
                severity = %notification.severity,
                "notification"
            ),
        }
    }
}

/// Recording sink for tests and embedding
///
/// Keeps every event in arrival order.
pub mod recording {
    use super::*;
    use parking_lot::Mutex;

    /// One recorded sink call
    #[derive(Clone, Debug, PartialEq)]
    pub enum SinkEvent {
        /// Status change
        Status(EnvelopeId, VerificationStatus),
        /// Benchmark row
        Row(BenchmarkResult),
        /// Notification
        Notify(Notification),
    }

    /// Sink that remembers what it was told
    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<SinkEvent>>,
    }

    impl RecordingSink {
        /// Create an empty recorder
        pub fn new() -> Self {
            Self::default()
        }

        /// All events so far
        pub fn events(&self) -> Vec<SinkEvent> {
            self.events.lock().clone()
        }

        /// Recorded notifications only
        pub fn notifications(&self) -> Vec<Notification> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| match e {
                    SinkEvent::Notify(n) => Some(n.clone()),
                    _ => None,
                })
                .collect()
        }

        /// Recorded status changes only
        pub fn status_changes(&self) -> Vec<(EnvelopeId, VerificationStatus)> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| match e {
                    SinkEvent::Status(id, status) => Some((*id, *status)),
                    _ => None,
                })
                .collect()
        }

        /// Recorded benchmark rows only
        pub fn rows(&self) -> Vec<BenchmarkResult> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| match e {
                    SinkEvent::Row(r) => Some(r.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl UiSink for RecordingSink {
        fn on_verification_status_changed(&self, id: EnvelopeId, status: VerificationStatus) {
            self.events.lock().push(SinkEvent::Status(id, status));
        }

        fn on_benchmark_row_added(&self, result: &BenchmarkResult) {
            self.events.lock().push(SinkEvent::Row(result.clone()));
        }

        fn on_notify(&self, notification: &Notification) {
            self.events.lock().push(SinkEvent::Notify(notification.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::recording::{RecordingSink, SinkEvent};
    use super::*;

    #[test]
    fn test_default_ttl() {
        let n = Notification::new("keys generated", Severity::Success);
        assert_eq!(n.ttl, Duration::from_millis(3500));

        let n = n.with_ttl(Duration::from_secs(1));
        assert_eq!(n.ttl, Duration::from_secs(1));
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.on_notify(&Notification::new("one", Severity::Info));
        sink.on_verification_status_changed(EnvelopeId::new(1), VerificationStatus::Valid);
        sink.on_notify(&Notification::new("two", Severity::Error));

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], SinkEvent::Status(_, VerificationStatus::Valid)));

        let messages: Vec<String> = sink.notifications().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["one", "two"]);
    }
}
