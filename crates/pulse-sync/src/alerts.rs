use std::io::Write;
use std::sync::Arc;

use tracing::{info, trace};

use pulse_core::Notification;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct AlertError(pub String);

/// A side-effect alert triggered by a freshly delivered notification.
/// Sinks are best-effort: a failing sink never blocks siblings or the
/// store mutation that preceded it.
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn alert(&self, notification: &Notification) -> Result<(), AlertError>;
}

/// Audible alert: BEL to the controlling terminal.
pub struct TerminalBell;

impl AlertSink for TerminalBell {
    fn name(&self) -> &'static str {
        "terminal-bell"
    }

    fn alert(&self, _notification: &Notification) -> Result<(), AlertError> {
        let mut out = std::io::stdout();
        out.write_all(b"\x07")
            .and_then(|()| out.flush())
            .map_err(|e| AlertError(e.to_string()))
    }
}

/// Transient visual alert, rendered as one structured log line.
pub struct LogToast;

impl AlertSink for LogToast {
    fn name(&self) -> &'static str {
        "log-toast"
    }

    fn alert(&self, notification: &Notification) -> Result<(), AlertError> {
        info!(
            severity = notification.severity.as_str(),
            message = %notification.message,
            "notification"
        );
        Ok(())
    }
}

/// Run every sink inside its own failure boundary. Failures stay at trace
/// level; audio being blocked by the environment is normal.
pub fn run_sinks(sinks: &[Arc<dyn AlertSink>], notification: &Notification) {
    for sink in sinks {
        if let Err(e) = sink.alert(notification) {
            trace!(sink = sink.name(), error = %e, "alert sink failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_core::{NotificationId, Severity};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn notification() -> Notification {
        Notification {
            id: NotificationId::from_raw("1"),
            user_id: None,
            message: "build finished".into(),
            severity: Severity::Success,
            read: false,
            related_entity_id: None,
            payload: None,
            created_at: Utc::now(),
        }
    }

    struct FailingSink;
    impl AlertSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn alert(&self, _: &Notification) -> Result<(), AlertError> {
            Err(AlertError("blocked".into()))
        }
    }

    struct CountingSink(AtomicUsize);
    impl AlertSink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn alert(&self, _: &Notification) -> Result<(), AlertError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn failing_sink_does_not_block_siblings() {
        let counting = Arc::new(CountingSink(AtomicUsize::new(0)));
        let sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(FailingSink), counting.clone()];

        run_sinks(&sinks, &notification());
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn log_toast_never_fails() {
        assert!(LogToast.alert(&notification()).is_ok());
    }
}
