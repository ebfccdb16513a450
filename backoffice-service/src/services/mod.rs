//! Services module for backoffice-service.

pub mod database;
pub mod events;
pub mod metrics;

pub use database::Database;
pub use events::{DomainEvent, EventSink, LogEventSink, RecordingEventSink};
pub use metrics::{get_metrics, init_metrics};
