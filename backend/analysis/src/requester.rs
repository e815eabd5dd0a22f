//! Analysis Requester.
//!
//! Sends one prompt to the configured [`LlmProvider`] and always answers with an
//! [`AnalysisResult`]. Requests are serialized per requester: `analyze` waits
//! for a prior request, `try_analyze` refuses instead.

use std::sync::Arc;
use std::time::Duration;

use labelscan_core::{AnalysisRequest, AnalysisResult, LlmProvider, LlmRequest, ScanError};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Shown in place of the analysis when the LLM call fails.
pub const FALLBACK_MESSAGE: &str =
    "An error occurred while fetching the answer. Please try again.";

#[derive(Debug, Clone)]
pub struct RequesterOptions {
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for RequesterOptions {
    fn default() -> Self {
        Self {
            model: "gemini-pro".to_string(),
            system_prompt: String::new(),
            max_tokens: 2048,
            temperature: 0.4,
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct AnalysisRequester {
    provider: Arc<dyn LlmProvider>,
    options: RequesterOptions,
    inflight: Mutex<()>,
}

impl AnalysisRequester {
    pub fn new(provider: Arc<dyn LlmProvider>, options: RequesterOptions) -> Self {
        Self {
            provider,
            options,
            inflight: Mutex::new(()),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn options(&self) -> &RequesterOptions {
        &self.options
    }

    /// Analyze `request`, waiting for any request already in flight.
    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult {
        let _slot = self.inflight.lock().await;
        self.send(request).await
    }

    /// Like [`analyze`](Self::analyze), but fails with `RequestInProgress`
    /// instead of queueing behind another request.
    pub async fn try_analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, ScanError> {
        let _slot = self
            .inflight
            .try_lock()
            .map_err(|_| ScanError::RequestInProgress)?;
        Ok(self.send(request).await)
    }

    async fn send(&self, request: &AnalysisRequest) -> AnalysisResult {
        match self.complete(request).await {
            Ok(text) => AnalysisResult::success(text),
            Err(e) => {
                warn!(provider = %self.provider.name(), error = %e, "Analysis failed");
                AnalysisResult::failed(FALLBACK_MESSAGE)
            }
        }
    }

    async fn complete(&self, request: &AnalysisRequest) -> Result<String, ScanError> {
        let llm_request = LlmRequest {
            model: self.options.model.clone(),
            system_prompt: self.options.system_prompt.clone(),
            user_prompt: request.prompt.clone(),
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        };

        let response = tokio::time::timeout(self.options.timeout, self.provider.complete(&llm_request))
            .await
            .map_err(|_| {
                ScanError::AnalysisFailure(format!("no answer within {:?}", self.options.timeout))
            })?
            .map_err(|e| ScanError::AnalysisFailure(format!("{e:#}")))?;

        if response.content.trim().is_empty() {
            return Err(ScanError::AnalysisFailure("empty response".into()));
        }

        info!(
            provider = %response.provider,
            model = %response.model,
            tokens = response.tokens_used,
            latency_ms = response.latency_ms,
            "Analysis completed"
        );
        Ok(response.content)
    }
}
