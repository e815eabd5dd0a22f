//! OCR Session Manager.
//!
//! Exactly one engine instance lives per session. `initialize` is idempotent and
//! serialized, `terminate` is idempotent, and dropping a session that was never
//! terminated releases the engine on the current runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use labelscan_core::{EngineHandle, OcrEngine, ScanError, SessionState};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

pub struct OcrSession {
    engine: Arc<dyn OcrEngine>,
    slot: Mutex<Option<EngineHandle>>,
    state_tx: watch::Sender<SessionState>,
    terminated: AtomicBool,
}

impl OcrSession {
    /// Wrap an engine. No engine instance exists until [`initialize`](Self::initialize).
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Uninitialized);
        Self {
            engine,
            slot: Mutex::new(None),
            state_tx,
            terminated: AtomicBool::new(false),
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Watch session state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Create and warm the engine instance for `language`.
    ///
    /// Concurrent callers queue on the slot lock; whoever comes second finds the
    /// session ready and returns without touching the engine. A failure leaves the
    /// session `uninitialized` so a later call may retry. A terminated session
    /// cannot be brought back.
    pub async fn initialize(&self, language: &str) -> Result<SessionState, ScanError> {
        let mut slot = self.slot.lock().await;

        match self.state() {
            SessionState::Ready => {
                debug!(engine = self.engine.name(), "OCR session already ready");
                return Ok(SessionState::Ready);
            }
            SessionState::Terminated => {
                return Err(ScanError::EngineInit("session has been terminated".into()));
            }
            SessionState::Uninitialized | SessionState::Loading => {}
        }
        if self.terminated.load(Ordering::SeqCst) {
            return Err(ScanError::EngineInit("session has been terminated".into()));
        }

        self.state_tx.send_replace(SessionState::Loading);
        info!(engine = self.engine.name(), language, "Initializing OCR engine");

        match self.engine.initialize(language).await {
            Ok(handle) => {
                info!(engine = self.engine.name(), instance = %handle.id, "OCR session ready");
                *slot = Some(handle);
                self.state_tx.send_replace(SessionState::Ready);
                Ok(SessionState::Ready)
            }
            Err(e) => {
                error!(engine = self.engine.name(), error = %e, "OCR engine failed to initialize");
                self.state_tx.send_replace(SessionState::Uninitialized);
                Err(ScanError::EngineInit(format!("{e:#}")))
            }
        }
    }

    /// Release the engine instance. Safe to call any number of times.
    pub async fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            debug!("OCR session already terminated");
            return;
        }

        let handle = self.slot.lock().await.take();
        self.state_tx.send_replace(SessionState::Terminated);

        if let Some(handle) = handle {
            let id = handle.id;
            match self.engine.terminate(handle).await {
                Ok(()) => info!(instance = %id, "OCR session terminated"),
                Err(e) => warn!(instance = %id, error = %e, "OCR engine terminate failed"),
            }
        }
    }

    /// Handle of the live instance, or `SessionNotReady`.
    pub(crate) async fn ready_handle(&self) -> Result<EngineHandle, ScanError> {
        let slot = self.slot.lock().await;
        match (&*slot, self.state()) {
            (Some(handle), SessionState::Ready) => Ok(handle.clone()),
            _ => Err(ScanError::SessionNotReady),
        }
    }

    pub(crate) fn engine(&self) -> &Arc<dyn OcrEngine> {
        &self.engine
    }
}

impl Drop for OcrSession {
    fn drop(&mut self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(handle) = self.slot.get_mut().take() else {
            return;
        };

        let engine = Arc::clone(&self.engine);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let id = handle.id;
                    if let Err(e) = engine.terminate(handle).await {
                        warn!(instance = %id, error = %e, "OCR engine terminate on drop failed");
                    }
                });
            }
            Err(_) => warn!(
                instance = %handle.id,
                "OCR session dropped outside a runtime; engine instance not released"
            ),
        }
    }
}
