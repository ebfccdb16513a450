//! Domain events emitted after a transaction commits.
//!
//! The emitter is an explicit sink injected into the application state, so
//! tests can swap in a recording sink; downstream listeners (notifications,
//! balance snapshots) consume the events out of process. A sink failure can
//! never roll back the already-committed transaction.

use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

/// Events produced by the invoice engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    InvoiceCreated {
        invoice_id: Uuid,
        code: String,
        details_count: usize,
    },
    DetailsCreated {
        invoice_id: Uuid,
        code: String,
        is_product: bool,
        details_count: usize,
    },
    DetailDeleted {
        invoice_id: Uuid,
        code: String,
        is_product: bool,
    },
    InvoiceDeleted {
        invoice_id: Uuid,
        code: String,
        has_products: bool,
    },
}

/// Outbox for committed domain events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}

/// Default sink: one structured log line per event.
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: DomainEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => tracing::info!(payload = %payload, "Domain event emitted"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize domain event"),
        }
    }
}

/// Sink that records events in memory. Used by tests to assert emissions
/// without a process-wide emitter.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingEventSink {
    pub fn take(&self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events.lock().expect("event sink poisoned"))
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: DomainEvent) {
        self.events.lock().expect("event sink poisoned").push(event);
    }
}
