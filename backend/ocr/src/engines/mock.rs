use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Notify;

use labelscan_core::{EngineHandle, EngineProgress, ImageAsset, OcrEngine, ProgressSender};

/// One scripted recognition.
#[derive(Debug, Clone)]
pub struct MockRecognition {
    outcome: std::result::Result<String, String>,
    ticks: Vec<EngineProgress>,
    gate: Option<Arc<Notify>>,
    delay: Option<Duration>,
    panic: bool,
}

impl MockRecognition {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            outcome: Ok(text.into()),
            ticks: Vec::new(),
            gate: None,
            delay: None,
            panic: false,
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            ..Self::text("")
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Self::text("")
        }
    }

    pub fn with_ticks(mut self, ticks: Vec<EngineProgress>) -> Self {
        self.ticks = ticks;
        self
    }

    /// Hold the recognition until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Scripted OCR engine. Recognitions are served from a queue; once it is
/// empty, every call returns the default text.
pub struct MockEngine {
    default_text: String,
    script: Mutex<VecDeque<MockRecognition>>,
    init_error: Option<String>,
    init_calls: AtomicUsize,
    recognize_calls: AtomicUsize,
    terminate_calls: AtomicUsize,
}

impl MockEngine {
    pub fn new(default_text: impl Into<String>) -> Self {
        Self {
            default_text: default_text.into(),
            script: Mutex::new(VecDeque::new()),
            init_error: None,
            init_calls: AtomicUsize::new(0),
            recognize_calls: AtomicUsize::new(0),
            terminate_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_init(mut self, message: impl Into<String>) -> Self {
        self.init_error = Some(message.into());
        self
    }

    /// Queue a scripted recognition.
    pub fn push(&self, recognition: MockRecognition) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(recognition);
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn recognize_calls(&self) -> usize {
        self.recognize_calls.load(Ordering::SeqCst)
    }

    pub fn terminate_calls(&self) -> usize {
        self.terminate_calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> MockRecognition {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| MockRecognition::text(self.default_text.clone()))
    }
}

#[async_trait]
impl OcrEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn initialize(&self, language: &str) -> Result<EngineHandle> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if let Some(message) = &self.init_error {
            bail!("{message}");
        }
        Ok(EngineHandle::new("mock", language))
    }

    async fn recognize(
        &self,
        _handle: &EngineHandle,
        _image: &ImageAsset,
        progress: ProgressSender,
    ) -> Result<String> {
        self.recognize_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.next();

        for tick in step.ticks {
            let _ = progress.try_send(tick);
        }
        if let Some(gate) = &step.gate {
            gate.notified().await;
        }
        if let Some(delay) = step.delay {
            tokio::time::sleep(delay).await;
        }
        if step.panic {
            panic!("mock engine crashed");
        }
        match step.outcome {
            Ok(text) => Ok(text),
            Err(message) => bail!("{message}"),
        }
    }

    async fn terminate(&self, _handle: EngineHandle) -> Result<()> {
        self.terminate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
