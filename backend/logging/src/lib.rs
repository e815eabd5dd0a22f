//! Structured logging for labelscan.
//!
//! Console and rolling NDJSON output, credential redaction, and the run-event log.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{EventLogEntry, EventLogger};
pub use logger::{init_logger, LoggerOptions};
pub use redact::redact_sensitive_data;
