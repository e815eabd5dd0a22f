use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use labelscan_analysis::{build_request, AnalysisRequester};
use labelscan_core::{
    AnalysisMode, Event, EventKind, ImageInfo, ImageOrigin, OcrResult, Phase, PipelineState,
    ProgressEvent, ProgressPhase, ScanError, SessionState,
};
use labelscan_logging::EventLogger;
use labelscan_media::{ImageLoader, ImageSource, DEFAULT_MAX_IMAGE_BYTES};
use labelscan_ocr::{OcrSession, Recognizer, DEFAULT_RECOGNITION_TIMEOUT};
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::run::{RunOutcome, RunTicket};

/// Events kept for slow subscribers before they start lagging.
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub language: String,
    pub default_mode: AnalysisMode,
    pub recognition_timeout: Duration,
    pub max_image_bytes: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            default_mode: AnalysisMode::default(),
            recognition_timeout: DEFAULT_RECOGNITION_TIMEOUT,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

/// The Pipeline Controller owns the pipeline state, guards the extract
/// action, and sequences recognition and analysis for each run.
///
/// State lives in a `watch` channel: readers get snapshots, and every write
/// made on behalf of a run first checks that the run is still current.
pub struct PipelineController {
    session: Arc<OcrSession>,
    recognizer: Recognizer,
    requester: Arc<AnalysisRequester>,
    loader: ImageLoader,
    language: String,
    state: watch::Sender<PipelineState>,
    events: broadcast::Sender<Event>,
    /// Bumped by every image selection; a load that finishes under an older
    /// value is discarded.
    selection: AtomicU64,
}

impl PipelineController {
    pub fn new(
        session: Arc<OcrSession>,
        requester: Arc<AnalysisRequester>,
        options: PipelineOptions,
    ) -> Self {
        let mut initial = PipelineState::new(options.default_mode);
        initial.session = session.state();
        let (state, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        Self {
            session,
            recognizer: Recognizer::new(options.recognition_timeout),
            requester,
            loader: ImageLoader::new(options.max_image_bytes),
            language: options.language,
            state,
            events,
            selection: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Stream of run and lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn max_image_bytes(&self) -> usize {
        self.loader.max_bytes()
    }

    /// Bring up the OCR session. Until this succeeds the extract action stays
    /// disabled.
    pub async fn start(&self) -> Result<(), ScanError> {
        self.state.send_modify(|s| {
            s.session = SessionState::Loading;
            s.message = Some("Initializing OCR engine...".into());
        });

        match self.session.initialize(&self.language).await {
            Ok(session_state) => {
                self.state.send_modify(|s| {
                    s.session = session_state;
                    s.message = None;
                });
                self.emit(Event::detached(
                    EventKind::SessionReady,
                    json!({ "engine": self.session.engine_name(), "language": self.language }),
                ));
                Ok(())
            }
            Err(e) => {
                let session_state = self.session.state();
                let message = e.to_string();
                self.state.send_modify(|s| {
                    s.session = session_state;
                    s.message = Some(message.clone());
                });
                self.emit(Event::detached(
                    EventKind::SessionFailed,
                    json!({ "engine": self.session.engine_name(), "error": message }),
                ));
                Err(e)
            }
        }
    }

    /// Load a user-selected image and hold it, ready to extract.
    ///
    /// Only a successfully loaded image changes the pipeline: it replaces the
    /// held asset, clears results and supersedes any run in flight. A rejected
    /// file leaves asset, results and the current run untouched; the error is
    /// returned and shown as the status message.
    pub async fn select_image(
        &self,
        source: ImageSource,
        origin: ImageOrigin,
    ) -> Result<ImageInfo, ScanError> {
        let epoch = self.selection.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_if_modified(|s| {
            if s.phase.is_busy() {
                return false;
            }
            s.phase = Phase::LoadingImage;
            s.message = Some("Loading image...".into());
            true
        });

        let loaded = self.loader.load(source, origin).await;
        let current = || self.selection.load(Ordering::SeqCst) == epoch;

        match loaded {
            Ok(asset) => {
                let info = asset.info();
                let asset = Arc::new(asset);
                let mut superseded = None;
                let applied = self.state.send_if_modified(|s| {
                    if !current() {
                        return false;
                    }
                    if s.phase.is_busy() {
                        superseded = s.run_id;
                    }
                    s.run_id = None;
                    s.set_asset(Some(asset));
                    s.clear_results();
                    s.phase = Phase::Idle;
                    s.progress = ProgressEvent::idle();
                    s.message = None;
                    true
                });
                if !applied {
                    debug!("Image load finished after a newer selection; discarded");
                    return Ok(info);
                }
                if let Some(run_id) = superseded {
                    info!(run_id = %run_id, "Run superseded by new image selection");
                }
                self.emit(Event::detached(EventKind::ImageSelected, json!(info)));
                Ok(info)
            }
            Err(e) => {
                let message = e.to_string();
                let applied = self.state.send_if_modified(|s| {
                    if !current() {
                        return false;
                    }
                    if s.phase == Phase::LoadingImage {
                        s.phase = settled_phase(s);
                    }
                    s.message = Some(message.clone());
                    true
                });
                if applied {
                    self.emit(Event::detached(
                        EventKind::ImageRejected,
                        json!({ "error": message }),
                    ));
                }
                Err(e)
            }
        }
    }

    /// Discard the held image and all results and return to `Idle`.
    ///
    /// A run in flight is not cancelled, but nothing it produces will be
    /// applied. The OCR session is kept for the next image.
    pub fn select_new_image(&self) {
        self.selection.fetch_add(1, Ordering::SeqCst);
        let mut superseded = None;
        self.state.send_modify(|s| {
            if s.phase.is_busy() {
                superseded = s.run_id;
            }
            s.run_id = None;
            s.set_asset(None);
            s.clear_results();
            s.phase = Phase::Idle;
            s.progress = ProgressEvent::idle();
            s.message = None;
        });
        if let Some(run_id) = superseded {
            info!(run_id = %run_id, "Run superseded by new image selection");
        }
        self.emit(Event::detached(
            EventKind::ImageCleared,
            json!({ "superseded_run": superseded }),
        ));
    }

    /// Set the analysis mode used by the next run.
    pub fn set_mode(&self, mode: AnalysisMode) {
        self.state.send_if_modified(|s| {
            if s.mode == mode {
                return false;
            }
            debug!(from = %s.mode, to = %mode, "Analysis mode changed");
            s.mode = mode;
            true
        });
    }

    /// Check the extract guard and enter `Recognizing` with a fresh run id.
    ///
    /// Prior results are cleared before this returns, so no progress of the
    /// new run can be observed next to stale results.
    pub fn begin_run(&self) -> Result<RunTicket, ScanError> {
        let session_ready = self.session.is_ready();
        let mut outcome = Err(ScanError::NoImage);

        self.state.send_if_modified(|s| {
            let Some(asset) = s.asset.clone() else {
                return false;
            };
            if !session_ready || s.session != SessionState::Ready {
                outcome = Err(ScanError::SessionNotReady);
                return false;
            }
            if s.phase.is_busy() {
                outcome = Err(ScanError::RunInProgress);
                return false;
            }

            let run_id = Uuid::new_v4();
            s.run_id = Some(run_id);
            s.clear_results();
            s.phase = Phase::Recognizing;
            s.progress = ProgressEvent::new(ProgressPhase::Recognizing, 0.0, "Starting OCR...");
            s.message = None;
            outcome = Ok(RunTicket {
                run_id,
                mode: s.mode,
                asset,
            });
            true
        });

        let ticket = outcome?;
        info!(run_id = %ticket.run_id, mode = %ticket.mode, "Run started");
        self.emit(Event::new(
            ticket.run_id,
            EventKind::RunStarted,
            json!({ "mode": ticket.mode, "image": ticket.asset.info() }),
        ));
        Ok(ticket)
    }

    /// Execute a run: recognition, then (on success) analysis.
    pub async fn drive_run(&self, ticket: RunTicket) -> RunOutcome {
        let run_id = ticket.run_id;

        let ocr = match self
            .recognizer
            .recognize(&self.session, &ticket.asset, |progress| {
                self.apply(run_id, move |s| s.progress = progress);
            })
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Recognition could not start");
                OcrResult::failure(e.to_string())
            }
        };

        if !ocr.succeeded {
            let detail = ocr
                .error_detail
                .clone()
                .unwrap_or_else(|| "recognition failed".into());
            let applied = self.apply(run_id, |s| {
                s.phase = Phase::Error;
                s.progress = ProgressEvent::new(ProgressPhase::Error, s.progress.percent, "Error");
                s.message = Some(format!("Text extraction failed: {detail}"));
                s.ocr_result = Some(ocr.clone());
            });
            if !applied {
                return self.superseded(run_id, Phase::Recognizing);
            }
            warn!(run_id = %run_id, error = %detail, "Run failed during recognition");
            self.emit(Event::new(
                run_id,
                EventKind::RecognitionFailed,
                json!({ "error": detail }),
            ));
            self.emit(Event::new(
                run_id,
                EventKind::RunFinished,
                json!({ "phase": Phase::Error }),
            ));
            return RunOutcome::Failed;
        }

        let applied = self.apply(run_id, |s| {
            s.ocr_result = Some(ocr.clone());
            s.phase = Phase::Analyzing;
            s.message = Some("Analyzing...".into());
        });
        if !applied {
            return self.superseded(run_id, Phase::Recognizing);
        }
        self.emit(Event::new(
            run_id,
            EventKind::RecognitionCompleted,
            json!({ "chars": ocr.text.chars().count() }),
        ));

        let request = build_request(&ocr.text, ticket.mode);
        self.emit(Event::new(
            run_id,
            EventKind::AnalysisStarted,
            json!({ "mode": ticket.mode, "provider": self.requester.provider_name() }),
        ));
        // Dropping the request on supersede frees the requester for the next run.
        let mut watcher = self.state.subscribe();
        let replaced = async move {
            let _ = watcher.wait_for(|s| s.run_id != Some(run_id)).await;
        };
        let analysis = tokio::select! {
            analysis = self.requester.analyze(&request) => analysis,
            () = replaced => {
                return self.superseded(run_id, Phase::Analyzing);
            }
        };

        let applied = self.apply(run_id, |s| {
            s.phase = Phase::Done;
            s.message = (!analysis.succeeded).then(|| analysis.text.clone());
            s.analysis_result = Some(analysis.clone());
        });
        if !applied {
            return self.superseded(run_id, Phase::Analyzing);
        }

        let kind = if analysis.succeeded {
            EventKind::AnalysisCompleted
        } else {
            EventKind::AnalysisFailed
        };
        self.emit(Event::new(
            run_id,
            kind,
            json!({ "chars": analysis.text.chars().count() }),
        ));
        self.emit(Event::new(
            run_id,
            EventKind::RunFinished,
            json!({ "phase": Phase::Done }),
        ));
        info!(run_id = %run_id, succeeded = analysis.succeeded, "Run finished");
        RunOutcome::Done
    }

    /// [`begin_run`](Self::begin_run) followed by [`drive_run`](Self::drive_run).
    pub async fn run_extract_and_analyze(&self) -> Result<RunOutcome, ScanError> {
        let ticket = self.begin_run()?;
        Ok(self.drive_run(ticket).await)
    }

    /// Release the OCR session. Safe to call more than once.
    pub async fn shutdown(&self) {
        let first = self.session.state() != SessionState::Terminated;
        self.session.terminate().await;
        self.state.send_modify(|s| s.session = SessionState::Terminated);
        if first {
            self.emit(Event::detached(
                EventKind::SessionTerminated,
                json!({ "engine": self.session.engine_name() }),
            ));
        }
    }

    /// Apply `update` only while `run_id` is still the current run.
    fn apply(&self, run_id: Uuid, update: impl FnOnce(&mut PipelineState)) -> bool {
        self.state.send_if_modified(|s| {
            if s.run_id != Some(run_id) {
                return false;
            }
            update(s);
            true
        })
    }

    fn superseded(&self, run_id: Uuid, stage: Phase) -> RunOutcome {
        info!(run_id = %run_id, stage = %stage, "Discarding result of superseded run");
        self.emit(Event::new(
            run_id,
            EventKind::RunSuperseded,
            json!({ "stage": stage }),
        ));
        RunOutcome::Superseded
    }

    fn emit(&self, event: Event) {
        EventLogger::log_event(&event);
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Phase implied by the results currently held, for leaving `LoadingImage`
/// without a new image.
fn settled_phase(state: &PipelineState) -> Phase {
    match (&state.ocr_result, &state.analysis_result) {
        (_, Some(_)) => Phase::Done,
        (Some(ocr), None) if !ocr.succeeded => Phase::Error,
        _ => Phase::Idle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelscan_analysis::providers::MockProvider;
    use labelscan_analysis::{RequesterOptions, FALLBACK_MESSAGE, QUICK_INSTRUCTION};
    use labelscan_core::AnalysisResult;
    use labelscan_ocr::{MockEngine, MockRecognition};
    use tokio::sync::Notify;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";
    const LABEL: &str = "Sugar: 40g, Sodium: 900mg";

    struct Harness {
        engine: Arc<MockEngine>,
        provider: Arc<MockProvider>,
        controller: Arc<PipelineController>,
    }

    fn harness_with(engine: MockEngine, provider: MockProvider, options: RequesterOptions) -> Harness {
        let engine = Arc::new(engine);
        let provider = Arc::new(provider);
        let session = Arc::new(OcrSession::new(engine.clone()));
        let requester = Arc::new(AnalysisRequester::new(provider.clone(), options));
        let controller = Arc::new(PipelineController::new(
            session,
            requester,
            PipelineOptions::default(),
        ));
        Harness {
            engine,
            provider,
            controller,
        }
    }

    fn harness(engine: MockEngine, provider: MockProvider) -> Harness {
        harness_with(engine, provider, RequesterOptions::default())
    }

    async fn ready_with_image(h: &Harness) {
        h.controller.start().await.unwrap();
        h.controller
            .select_image(ImageSource::bytes(Some("label.png".into()), PNG), ImageOrigin::Select)
            .await
            .unwrap();
    }

    async fn run_to_end(controller: &PipelineController) -> RunOutcome {
        tokio::time::timeout(Duration::from_secs(5), controller.run_extract_and_analyze())
            .await
            .expect("run did not finish")
            .unwrap()
    }

    #[tokio::test]
    async fn quick_run_reaches_done_with_table() {
        let h = harness(MockEngine::new(LABEL), MockProvider::new("mock").with_response("Table: ..."));
        ready_with_image(&h).await;
        h.controller.set_mode(AnalysisMode::Quick);

        assert_eq!(run_to_end(&h.controller).await, RunOutcome::Done);

        let state = h.controller.state();
        assert_eq!(state.phase, Phase::Done);
        assert_eq!(state.ocr_result.unwrap().text, LABEL);
        assert_eq!(state.analysis_result, Some(AnalysisResult::success("Table: ...")));
        assert_eq!(state.progress.percent, 1.0);
        assert!(state.message.is_none());
    }

    #[tokio::test]
    async fn prompt_carries_text_and_captured_mode() {
        let h = harness(MockEngine::new(LABEL), MockProvider::new("mock").echo());
        ready_with_image(&h).await;
        h.controller.set_mode(AnalysisMode::Quick);

        let ticket = h.controller.begin_run().unwrap();
        assert_eq!(ticket.mode(), AnalysisMode::Quick);
        h.controller.set_mode(AnalysisMode::Detailed);
        h.controller.drive_run(ticket).await;

        let prompt = h.controller.state().analysis_result.unwrap().text;
        assert!(prompt.starts_with(LABEL));
        assert!(prompt.contains(QUICK_INSTRUCTION));
        assert_eq!(h.controller.state().mode, AnalysisMode::Detailed);
    }

    #[tokio::test]
    async fn recognition_fault_ends_in_error_without_analysis() {
        let engine = MockEngine::new(LABEL);
        engine.push(MockRecognition::failing("decoder crashed"));
        let h = harness(engine, MockProvider::new("mock"));
        ready_with_image(&h).await;

        assert_eq!(run_to_end(&h.controller).await, RunOutcome::Failed);

        let state = h.controller.state();
        assert_eq!(state.phase, Phase::Error);
        assert!(!state.ocr_result.unwrap().succeeded);
        assert!(state.analysis_result.is_none());
        assert!(state.message.unwrap().contains("decoder crashed"));
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test]
    async fn engine_panic_still_terminates_run() {
        let engine = MockEngine::new(LABEL);
        engine.push(MockRecognition::panicking());
        let h = harness(engine, MockProvider::new("mock"));
        ready_with_image(&h).await;

        assert_eq!(run_to_end(&h.controller).await, RunOutcome::Failed);
        assert_eq!(h.controller.state().phase, Phase::Error);
    }

    #[tokio::test]
    async fn llm_timeout_still_reaches_done() {
        let h = harness_with(
            MockEngine::new(LABEL),
            MockProvider::new("slow")
                .with_response("late")
                .with_delay(Duration::from_secs(10)),
            RequesterOptions {
                timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );
        ready_with_image(&h).await;

        assert_eq!(run_to_end(&h.controller).await, RunOutcome::Done);

        let state = h.controller.state();
        assert_eq!(state.phase, Phase::Done);
        let analysis = state.analysis_result.unwrap();
        assert!(!analysis.succeeded);
        assert_eq!(analysis.text, FALLBACK_MESSAGE);
        assert_eq!(state.message.as_deref(), Some(FALLBACK_MESSAGE));
    }

    #[tokio::test]
    async fn new_image_after_done_resets_results_but_keeps_session() {
        let h = harness(MockEngine::new(LABEL), MockProvider::new("mock"));
        ready_with_image(&h).await;
        run_to_end(&h.controller).await;

        h.controller.select_new_image();

        let state = h.controller.state();
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.ocr_result.is_none());
        assert!(state.analysis_result.is_none());
        assert!(state.asset.is_none());
        assert!(state.image.is_none());
        assert_eq!(state.session, SessionState::Ready);
        assert_eq!(h.engine.init_calls(), 1);
        assert_eq!(h.engine.terminate_calls(), 0);
    }

    #[tokio::test]
    async fn extract_guard_is_enforced() {
        let h = harness(MockEngine::new(LABEL), MockProvider::new("mock"));

        assert!(matches!(h.controller.begin_run(), Err(ScanError::NoImage)));

        h.controller
            .select_image(ImageSource::bytes(None, PNG), ImageOrigin::Drop)
            .await
            .unwrap();
        assert!(!h.controller.state().can_extract());
        assert!(matches!(h.controller.begin_run(), Err(ScanError::SessionNotReady)));

        h.controller.start().await.unwrap();
        assert!(h.controller.state().can_extract());
        let _ticket = h.controller.begin_run().unwrap();
        assert!(matches!(h.controller.begin_run(), Err(ScanError::RunInProgress)));
        assert_eq!(h.engine.recognize_calls(), 0);
    }

    #[tokio::test]
    async fn engine_init_failure_disables_extract() {
        let h = harness(
            MockEngine::new(LABEL).failing_init("traineddata missing"),
            MockProvider::new("mock"),
        );
        let err = h.controller.start().await.unwrap_err();
        assert!(matches!(err, ScanError::EngineInit(_)));

        h.controller
            .select_image(ImageSource::bytes(None, PNG), ImageOrigin::Select)
            .await
            .unwrap();
        let state = h.controller.state();
        assert_eq!(state.session, SessionState::Uninitialized);
        assert!(!state.can_extract());
        assert!(matches!(h.controller.begin_run(), Err(ScanError::SessionNotReady)));
    }

    #[tokio::test]
    async fn rejected_file_keeps_previous_image() {
        let h = harness(MockEngine::new(LABEL), MockProvider::new("mock"));

        let err = h
            .controller
            .select_image(ImageSource::bytes(None, &b"not an image"[..]), ImageOrigin::Select)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidInput(_)));
        let state = h.controller.state();
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.asset.is_none());
        assert!(state.message.is_some());

        h.controller
            .select_image(ImageSource::bytes(Some("label.png".into()), PNG), ImageOrigin::Drop)
            .await
            .unwrap();
        h.controller
            .select_image(ImageSource::bytes(None, Vec::new()), ImageOrigin::Drop)
            .await
            .unwrap_err();
        let state = h.controller.state();
        assert_eq!(state.image.unwrap().name.as_deref(), Some("label.png"));
        assert_eq!(state.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn rejected_file_after_done_keeps_results() {
        let h = harness(MockEngine::new(LABEL), MockProvider::new("mock").with_response("Table: ..."));
        ready_with_image(&h).await;
        run_to_end(&h.controller).await;
        let before = h.controller.state();

        let err = h
            .controller
            .select_image(ImageSource::bytes(None, &b"hello"[..]), ImageOrigin::Select)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidInput(_)));

        let after = h.controller.state();
        assert_eq!(after.phase, Phase::Done);
        assert_eq!(after.run_id, before.run_id);
        assert_eq!(after.ocr_result, before.ocr_result);
        assert_eq!(after.analysis_result, before.analysis_result);
        assert_eq!(after.progress, before.progress);
        assert_eq!(after.image, before.image);
        assert!(after.message.unwrap().contains("not a recognized image format"));
    }

    #[tokio::test]
    async fn rejected_file_during_run_does_not_supersede_it() {
        let gate = Arc::new(Notify::new());
        let engine = MockEngine::new(LABEL);
        engine.push(MockRecognition::text(LABEL).gated(gate.clone()));
        let h = harness(engine, MockProvider::new("mock").with_response("Table: ..."));
        ready_with_image(&h).await;

        let ticket = h.controller.begin_run().unwrap();
        let run_id = ticket.run_id();
        let run = {
            let controller = h.controller.clone();
            tokio::spawn(async move { controller.drive_run(ticket).await })
        };
        while h.engine.recognize_calls() == 0 {
            tokio::task::yield_now().await;
        }

        h.controller
            .select_image(ImageSource::bytes(None, &b"hello"[..]), ImageOrigin::Drop)
            .await
            .unwrap_err();
        let state = h.controller.state();
        assert_eq!(state.phase, Phase::Recognizing);
        assert_eq!(state.run_id, Some(run_id));

        gate.notify_one();
        let outcome = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run did not finish")
            .unwrap();
        assert_eq!(outcome, RunOutcome::Done);

        let state = h.controller.state();
        assert_eq!(state.phase, Phase::Done);
        assert_eq!(state.analysis_result, Some(AnalysisResult::success("Table: ...")));
    }

    #[tokio::test]
    async fn run_superseded_while_analyzing_stops_waiting() {
        let h = harness(
            MockEngine::new(LABEL),
            MockProvider::new("slow")
                .with_response("late")
                .with_delay(Duration::from_secs(30)),
        );
        ready_with_image(&h).await;

        let ticket = h.controller.begin_run().unwrap();
        let stale = {
            let controller = h.controller.clone();
            tokio::spawn(async move { controller.drive_run(ticket).await })
        };
        while h.provider.calls() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.controller.state().phase, Phase::Analyzing);

        h.controller.select_new_image();

        let outcome = tokio::time::timeout(Duration::from_secs(5), stale)
            .await
            .expect("superseded run kept waiting on the LLM")
            .unwrap();
        assert_eq!(outcome, RunOutcome::Superseded);
        let state = h.controller.state();
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.analysis_result.is_none());
    }

    #[tokio::test]
    async fn superseded_run_result_is_discarded() {
        let gate = Arc::new(Notify::new());
        let engine = MockEngine::new(LABEL);
        engine.push(MockRecognition::text("first label").gated(gate.clone()));
        engine.push(MockRecognition::text("second label"));
        let h = harness(engine, MockProvider::new("mock").echo());
        ready_with_image(&h).await;

        let first = h.controller.begin_run().unwrap();
        let first_id = first.run_id();
        let stale = {
            let controller = h.controller.clone();
            tokio::spawn(async move { controller.drive_run(first).await })
        };
        while h.engine.recognize_calls() == 0 {
            tokio::task::yield_now().await;
        }

        h.controller.select_new_image();
        h.controller
            .select_image(ImageSource::bytes(None, PNG), ImageOrigin::Select)
            .await
            .unwrap();
        assert_eq!(run_to_end(&h.controller).await, RunOutcome::Done);

        gate.notify_one();
        assert_eq!(stale.await.unwrap(), RunOutcome::Superseded);

        let state = h.controller.state();
        assert_ne!(state.run_id, Some(first_id));
        assert_eq!(state.phase, Phase::Done);
        assert!(state.analysis_result.unwrap().text.starts_with("second label"));
        assert!(state.ocr_result.unwrap().text == "second label");
        assert_eq!(h.provider.calls(), 1);
    }

    #[tokio::test]
    async fn run_events_arrive_in_order() {
        let h = harness(MockEngine::new(LABEL), MockProvider::new("mock"));
        ready_with_image(&h).await;
        let mut events = h.controller.events();

        run_to_end(&h.controller).await;

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_ne!(event.run_id, Uuid::nil());
            kinds.push(event.kind);
        }
        assert_eq!(
            kinds,
            vec![
                EventKind::RunStarted,
                EventKind::RecognitionCompleted,
                EventKind::AnalysisStarted,
                EventKind::AnalysisCompleted,
                EventKind::RunFinished,
            ]
        );
    }

    #[tokio::test]
    async fn progress_observed_through_subscription_never_regresses() {
        let engine = MockEngine::new(LABEL);
        engine.push(MockRecognition::text(LABEL).with_ticks(vec![
            labelscan_core::EngineProgress::new("recognizing text", 0.5),
            labelscan_core::EngineProgress::new("recognizing text", 0.2),
            labelscan_core::EngineProgress::new("recognizing text", 0.9),
        ]));
        let h = harness(engine, MockProvider::new("mock"));
        ready_with_image(&h).await;

        let mut rx = h.controller.subscribe();
        let watcher = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                if state.phase == Phase::Recognizing {
                    seen.push(state.progress.percent);
                }
                if state.phase.is_terminal() {
                    break;
                }
            }
            seen
        });

        run_to_end(&h.controller).await;
        let seen = watcher.await.unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    }

    #[tokio::test]
    async fn shutdown_terminates_session_once() {
        let h = harness(MockEngine::new(LABEL), MockProvider::new("mock"));
        ready_with_image(&h).await;

        h.controller.shutdown().await;
        h.controller.shutdown().await;

        assert_eq!(h.engine.terminate_calls(), 1);
        assert_eq!(h.controller.state().session, SessionState::Terminated);
        assert!(matches!(h.controller.begin_run(), Err(ScanError::SessionNotReady)));
    }
}
