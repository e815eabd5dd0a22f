use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable record of something that happened to the pipeline.
/// Events outside of a run (image selection, session lifecycle) carry a nil `run_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub payload: serde_json::Value,
}

/// Categories of events the controller emits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An image was loaded and is ready to extract
    ImageSelected,
    /// The loader rejected the user's file
    ImageRejected,
    /// The held image and results were discarded
    ImageCleared,
    /// The OCR session reached `ready`
    SessionReady,
    /// The OCR session failed to initialize
    SessionFailed,
    /// The OCR session was released
    SessionTerminated,
    /// A run was started
    RunStarted,
    /// Recognition produced text
    RecognitionCompleted,
    /// Recognition failed; the run ends in `error`
    RecognitionFailed,
    /// The prompt was sent to the LLM
    AnalysisStarted,
    /// The LLM answered
    AnalysisCompleted,
    /// The LLM call failed; the fallback message is shown
    AnalysisFailed,
    /// A run reached a terminal phase
    RunFinished,
    /// A run's late result was discarded because a newer selection or run replaced it
    RunSuperseded,
}

impl Event {
    pub fn new(run_id: Uuid, kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            timestamp: Utc::now(),
            kind,
            payload,
        }
    }

    /// An event that does not belong to any run.
    pub fn detached(kind: EventKind, payload: serde_json::Value) -> Self {
        Self::new(Uuid::nil(), kind, payload)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let run_id = Uuid::new_v4();
        let event = Event::new(
            run_id,
            EventKind::RunStarted,
            serde_json::json!({"mode": "quick"}),
        );
        assert_eq!(event.run_id, run_id);
        assert_eq!(event.kind, EventKind::RunStarted);
    }

    #[test]
    fn test_detached_event_has_nil_run() {
        let event = Event::detached(EventKind::SessionReady, serde_json::json!({}));
        assert!(event.run_id.is_nil());
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::new(
            Uuid::new_v4(),
            EventKind::AnalysisCompleted,
            serde_json::json!({"chars": 120}),
        );
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.kind, EventKind::AnalysisCompleted);
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(EventKind::RunStarted.to_string(), "run_started");
        assert_eq!(EventKind::RecognitionFailed.to_string(), "recognition_failed");
    }
}
