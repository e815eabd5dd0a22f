//! Recognition Orchestrator.
//!
//! Drives one recognition to completion on a ready [`OcrSession`], turning the
//! engine's progress ticks into monotone [`ProgressEvent`]s. Every call that
//! gets past the readiness check resolves to an [`OcrResult`]; engine errors,
//! panics and timeouts become failed results.

use std::sync::Arc;
use std::time::Duration;

use labelscan_core::{
    EngineProgress, ImageAsset, OcrResult, ProgressEvent, ProgressPhase, ScanError,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::session::OcrSession;

pub const DEFAULT_RECOGNITION_TIMEOUT: Duration = Duration::from_secs(120);

/// Engine ticks buffered between the engine and the orchestrator.
const PROGRESS_BUFFER: usize = 32;

#[derive(Debug, Clone)]
pub struct Recognizer {
    timeout: Duration,
}

impl Recognizer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Recognize `asset` on `session`, reporting progress through `on_progress`.
    ///
    /// Fails only with `SessionNotReady`; everything after that is a result value.
    pub async fn recognize<F>(
        &self,
        session: &OcrSession,
        asset: &ImageAsset,
        mut on_progress: F,
    ) -> Result<OcrResult, ScanError>
    where
        F: FnMut(ProgressEvent) + Send,
    {
        let handle = session.ready_handle().await?;
        let mut tracker = ProgressTracker::default();
        on_progress(tracker.start());

        let (tx, mut rx) = mpsc::channel::<EngineProgress>(PROGRESS_BUFFER);
        let engine = Arc::clone(session.engine());
        let image = asset.clone();
        let mut task = tokio::spawn(async move { engine.recognize(&handle, &image, tx).await });

        let outcome = {
            let work = tokio::time::timeout(self.timeout, &mut task);
            tokio::pin!(work);
            loop {
                tokio::select! {
                    biased;
                    Some(tick) = rx.recv() => {
                        if let Some(event) = tracker.observe(&tick) {
                            on_progress(event);
                        }
                    }
                    res = &mut work => break res,
                }
            }
        };

        while let Ok(tick) = rx.try_recv() {
            if let Some(event) = tracker.observe(&tick) {
                on_progress(event);
            }
        }

        let result = match outcome {
            Ok(Ok(Ok(text))) => {
                info!(chars = text.len(), "Recognition completed");
                OcrResult::success(text)
            }
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "Recognition failed");
                OcrResult::failure(format!("{e:#}"))
            }
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "Recognition task aborted");
                OcrResult::failure(format!("recognition task aborted: {join_err}"))
            }
            Err(_) => {
                task.abort();
                warn!(timeout = ?self.timeout, "Recognition timed out");
                OcrResult::failure(format!("recognition timed out after {:?}", self.timeout))
            }
        };

        on_progress(tracker.finish(result.succeeded));
        Ok(result)
    }
}

impl Default for Recognizer {
    fn default() -> Self {
        Self::new(DEFAULT_RECOGNITION_TIMEOUT)
    }
}

/// Folds raw engine ticks into a non-decreasing progress sequence.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: f32,
}

impl ProgressTracker {
    pub fn start(&mut self) -> ProgressEvent {
        self.last = 0.0;
        ProgressEvent::new(ProgressPhase::Recognizing, 0.0, "Starting OCR...")
    }

    /// Map one tick. Regressions are clamped to the last value; non-finite
    /// ticks are dropped.
    pub fn observe(&mut self, tick: &EngineProgress) -> Option<ProgressEvent> {
        if !tick.progress.is_finite() {
            debug!(status = %tick.status, "Dropping non-finite progress tick");
            return None;
        }
        let percent = tick.progress.clamp(0.0, 1.0).max(self.last);
        self.last = percent;

        let label = if tick.status.trim().is_empty() {
            "Processing".to_string()
        } else {
            tick.status.clone()
        };
        Some(ProgressEvent::new(phase_for(&tick.status), percent, label))
    }

    pub fn finish(&mut self, succeeded: bool) -> ProgressEvent {
        if succeeded {
            self.last = 1.0;
            ProgressEvent::new(ProgressPhase::Done, 1.0, "Done")
        } else {
            ProgressEvent::new(ProgressPhase::Error, self.last, "Error")
        }
    }

    pub fn last(&self) -> f32 {
        self.last
    }
}

fn phase_for(status: &str) -> ProgressPhase {
    let status = status.to_ascii_lowercase();
    if status.contains("initializ") || status.contains("loading") {
        ProgressPhase::Initializing
    } else {
        ProgressPhase::Recognizing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::{MockEngine, MockRecognition};
    use bytes::Bytes;
    use labelscan_core::{ImageEncoding, ImageOrigin};
    use std::sync::Mutex;

    fn asset() -> ImageAsset {
        ImageAsset {
            data: Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
            mime_type: "image/png".into(),
            encoding: ImageEncoding::RawBytes,
            origin: ImageOrigin::Select,
            name: None,
        }
    }

    async fn ready_session(engine: MockEngine) -> OcrSession {
        let session = OcrSession::new(Arc::new(engine));
        session.initialize("eng").await.unwrap();
        session
    }

    #[tokio::test]
    async fn returns_recognized_text() {
        let session = ready_session(MockEngine::new("Sugar: 40g, Sodium: 900mg")).await;
        let result = Recognizer::default()
            .recognize(&session, &asset(), |_| {})
            .await
            .unwrap();
        assert!(result.succeeded);
        assert_eq!(result.text, "Sugar: 40g, Sodium: 900mg");
        assert!(result.error_detail.is_none());
    }

    #[tokio::test]
    async fn rejects_session_that_is_not_ready() {
        let session = OcrSession::new(Arc::new(MockEngine::new("x")));
        let err = Recognizer::default()
            .recognize(&session, &asset(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::SessionNotReady));
    }

    #[tokio::test]
    async fn progress_never_regresses() {
        let engine = MockEngine::new("x");
        engine.push(MockRecognition::text("ok").with_ticks(vec![
            EngineProgress::new("loading language traineddata", 0.4),
            EngineProgress::new("recognizing text", 0.1),
            EngineProgress::new("recognizing text", 0.6),
            EngineProgress::new("recognizing text", f32::NAN),
            EngineProgress::new("recognizing text", 0.5),
            EngineProgress::new("recognizing text", 1.3),
        ]));
        let session = ready_session(engine).await;

        let seen = Mutex::new(Vec::new());
        let result = Recognizer::default()
            .recognize(&session, &asset(), |ev| seen.lock().unwrap().push(ev))
            .await
            .unwrap();
        assert!(result.succeeded);

        let seen = seen.into_inner().unwrap();
        let percents: Vec<f32> = seen.iter().map(|e| e.percent).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
        assert_eq!(seen.first().unwrap().percent, 0.0);
        let last = seen.last().unwrap();
        assert_eq!(last.phase, ProgressPhase::Done);
        assert_eq!(last.percent, 1.0);
        assert_eq!(last.label, "Done");
        assert!(seen.iter().any(|e| e.phase == ProgressPhase::Initializing));
    }

    #[tokio::test]
    async fn engine_fault_becomes_failed_result() {
        let engine = MockEngine::new("x");
        engine.push(MockRecognition::failing("image decode error"));
        let session = ready_session(engine).await;

        let mut last = None;
        let result = Recognizer::default()
            .recognize(&session, &asset(), |ev| last = Some(ev))
            .await
            .unwrap();
        assert!(!result.succeeded);
        assert!(result.text.is_empty());
        assert!(result.error_detail.unwrap().contains("image decode error"));
        assert_eq!(last.unwrap().phase, ProgressPhase::Error);
    }

    #[tokio::test]
    async fn engine_panic_becomes_failed_result() {
        let engine = MockEngine::new("x");
        engine.push(MockRecognition::panicking());
        let session = ready_session(engine).await;

        let result = Recognizer::default()
            .recognize(&session, &asset(), |_| {})
            .await
            .unwrap();
        assert!(!result.succeeded);
        assert!(result.error_detail.unwrap().contains("aborted"));
    }

    #[tokio::test]
    async fn slow_engine_times_out() {
        let engine = MockEngine::new("x");
        engine.push(MockRecognition::text("late").with_delay(Duration::from_secs(5)));
        let session = ready_session(engine).await;

        let result = Recognizer::new(Duration::from_millis(30))
            .recognize(&session, &asset(), |_| {})
            .await
            .unwrap();
        assert!(!result.succeeded);
        assert_eq!(
            result.error_detail.as_deref(),
            Some("recognition timed out after 30ms")
        );
    }

    #[test]
    fn empty_status_is_labelled_processing() {
        let mut tracker = ProgressTracker::default();
        let ev = tracker.observe(&EngineProgress::new("", 0.2)).unwrap();
        assert_eq!(ev.label, "Processing");
        assert_eq!(ev.phase, ProgressPhase::Recognizing);
    }
}
