//! OCR side of the pipeline.
//!
//! - [`OcrSession`] owns the one live engine instance (lazy init, teardown).
//! - [`Recognizer`] runs recognition on a ready session and normalizes progress.
//! - [`engines`] holds the collaborator adapters.

pub mod engines;
pub mod recognizer;
pub mod session;

pub use engines::{build_engine, EngineKind, EngineOptions, MockEngine, MockRecognition};
pub use recognizer::{ProgressTracker, Recognizer, DEFAULT_RECOGNITION_TIMEOUT};
pub use session::OcrSession;
