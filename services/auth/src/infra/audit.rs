use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::domain::repository::AuditLog;
use crate::domain::types::{SecurityEvent, Severity};

/// [`AuditLog`] that hands events to a background writer.
///
/// `record` never blocks; events recorded after the writer stops are dropped.
#[derive(Clone)]
pub struct ChannelAuditLog {
    tx: mpsc::UnboundedSender<SecurityEvent>,
}

impl ChannelAuditLog {
    /// Start the writer task, which emits each event as a structured `tracing` record.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<SecurityEvent>();
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                write_event(&event);
            }
        });
        (Self { tx }, handle)
    }
}

impl AuditLog for ChannelAuditLog {
    fn record(&self, event: SecurityEvent) {
        if self.tx.send(event).is_err() {
            warn!("audit writer stopped, security event dropped");
        }
    }
}

fn write_event(event: &SecurityEvent) {
    let user_id = event.user_id.map(|id| id.to_string());
    let identifier = event.identifier.as_deref().unwrap_or("");
    let user_id = user_id.as_deref().unwrap_or("");
    match event.severity {
        Severity::Low | Severity::Medium => info!(
            target: "security_audit",
            event_type = ?event.event_type,
            severity = ?event.severity,
            user_id,
            identifier,
            occurred_at = %event.occurred_at,
            "{}",
            event.description
        ),
        Severity::High => warn!(
            target: "security_audit",
            event_type = ?event.event_type,
            severity = ?event.severity,
            user_id,
            identifier,
            occurred_at = %event.occurred_at,
            "{}",
            event.description
        ),
        Severity::Critical => error!(
            target: "security_audit",
            event_type = ?event.event_type,
            severity = ?event.severity,
            user_id,
            identifier,
            occurred_at = %event.occurred_at,
            "{}",
            event.description
        ),
    }
}
