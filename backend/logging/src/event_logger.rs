//! Run Event Logger
//!
//! Pipeline events written to the `run_events` tracing target, which the file
//! layer persists as NDJSON.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use labelscan_core::{Event, EventKind};

use crate::redact::redact_sensitive_data;

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub event_id: Uuid,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub payload: Value,
}

impl EventLogEntry {
    pub fn from_event(event: &Event) -> Self {
        Self {
            event_id: event.id,
            run_id: event.run_id,
            timestamp: event.timestamp,
            kind: event.kind,
            payload: redact_value(event.payload.clone()),
        }
    }
}

fn redact_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(redact_sensitive_data(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, redact_value(v)))
                .collect(),
        ),
        other => other,
    }
}

pub struct EventLogger;

impl EventLogger {
    /// Log one pipeline event after scrubbing credentials from its payload.
    pub fn log_event(event: &Event) -> EventLogEntry {
        let entry = EventLogEntry::from_event(event);
        let payload = serde_json::to_string(&entry.payload).unwrap_or_default();
        info!(
            target: "run_events",
            run_id = %entry.run_id,
            kind = %entry.kind,
            payload = %payload,
            "Pipeline event"
        );
        entry
    }
}
