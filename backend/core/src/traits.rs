use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::types::ImageAsset;

/// Raw progress tick as reported by an OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineProgress {
    pub status: String,
    /// Nominally within `[0, 1]`; engines are not trusted to respect it.
    pub progress: f32,
}

impl EngineProgress {
    pub fn new(status: impl Into<String>, progress: f32) -> Self {
        Self {
            status: status.into(),
            progress,
        }
    }
}

/// Channel engines push progress into. Engines should use `try_send`:
/// intermediate ticks may be dropped.
pub type ProgressSender = mpsc::Sender<EngineProgress>;

/// Opaque handle to one live engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineHandle {
    pub id: Uuid,
    pub engine: String,
    pub language: String,
}

impl EngineHandle {
    pub fn new(engine: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            engine: engine.into(),
            language: language.into(),
        }
    }
}

/// External OCR collaborator.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine name (e.g., "tesseract", "vision").
    fn name(&self) -> &str;

    /// Create and warm one engine instance for the given language code.
    async fn initialize(&self, language: &str) -> Result<EngineHandle>;

    /// Recognize the text in `image`, pushing progress ticks as it goes.
    async fn recognize(
        &self,
        handle: &EngineHandle,
        image: &ImageAsset,
        progress: ProgressSender,
    ) -> Result<String>;

    /// Release the engine instance.
    async fn terminate(&self, handle: EngineHandle) -> Result<()>;
}

/// External text-generation collaborator.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "gemini", "ollama").
    fn name(&self) -> &str;

    /// Send a completion request and return the response text.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;
}

/// Request to an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub tokens_used: u64,
    pub latency_ms: u64,
}
