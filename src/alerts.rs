//! Notifications about ingest problems.
//!
//! The service reports dropped records and failed appends through an
//! [`AlertSink`]. Only the logging sink ships with the crate; mail or chat
//! notifiers implement the same trait.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    /// Records failed the plausibility filter and were not stored
    RecordsDropped { dropped: usize, received: usize },
    /// A batch could not be appended
    AppendFailed { records: usize, reason: String },
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, alert: Alert);
}

/// Writes alerts to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn notify(&self, alert: Alert) {
        match alert {
            Alert::RecordsDropped { dropped, received } => {
                tracing::warn!(dropped, received, "Implausible observations dropped");
            }
            Alert::AppendFailed { records, reason } => {
                tracing::error!(records, reason = %reason, "Observation batch was not stored");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Sink that remembers what it was told
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub alerts: Mutex<Vec<Alert>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn notify(&self, alert: Alert) {
            self.alerts.lock().unwrap().push(alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_tracing_sink_accepts_every_alert() {
        let sink = TracingAlertSink;
        sink.notify(Alert::RecordsDropped { dropped: 1, received: 3 }).await;
        sink.notify(Alert::AppendFailed {
            records: 2,
            reason: "connection".into(),
        })
        .await;
    }

    #[tokio::test]
    async fn test_sink_as_trait_object() {
        let recording = Arc::new(RecordingSink::default());
        let sink: Arc<dyn AlertSink> = recording.clone();
        sink.notify(Alert::RecordsDropped { dropped: 2, received: 5 }).await;

        assert_eq!(
            recording.alerts.lock().unwrap().as_slice(),
            &[Alert::RecordsDropped { dropped: 2, received: 5 }]
        );
    }
}
