use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{AuditEventEnvelope, AuditHandle, AuditRecord, AuditStore};

/// Totals reported when the writer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub written: u64,
    pub failed: u64,
}

/// Persists dispatch audit events off the request path.
///
/// Handlers and the dispatcher push envelopes through an [`AuditHandle`];
/// this task turns each one into an [`AuditRecord`] keyed by batch and user.
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEventEnvelope>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<AuditEventEnvelope>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    /// Drain the channel until every handle is gone.
    ///
    /// A failed insert loses that event only; later events are still written.
    pub async fn run(mut self) -> WriterStats {
        info!("Audit writer started");
        let mut stats = WriterStats::default();

        while let Some(envelope) = self.rx.recv().await {
            let record = Self::record_for(envelope);
            match self.store.insert(&record) {
                Ok(id) => {
                    stats.written += 1;
                    debug!(id, event_type = %record.event_type, batch_id = ?record.batch_id, "Audit event stored");
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(
                        event_type = %record.event_type,
                        batch_id = ?record.batch_id,
                        "Failed to write audit event: {}",
                        e
                    );
                }
            }
        }

        info!(
            written = stats.written,
            failed = stats.failed,
            "Audit writer shutting down"
        );
        stats
    }

    fn record_for(envelope: AuditEventEnvelope) -> AuditRecord {
        AuditRecord {
            id: 0,
            timestamp: envelope.timestamp,
            event_type: envelope.event.event_type().to_string(),
            batch_id: envelope.event.batch_id(),
            user_id: envelope.event.user_id().map(String::from),
            data: envelope.event,
        }
    }
}

/// Build the audit pipeline: a cloneable [`AuditHandle`] for producers and
/// the [`AuditWriter`] to spawn once at startup.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AuditHandle::new(tx), AuditWriter::new(rx, store))
}
