use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use labelscan_core::{LlmProvider, LlmRequest, LlmResponse};

#[derive(Debug, Clone)]
enum Behavior {
    Fixed(String),
    Echo,
    Fail(String),
}

/// A mock LLM provider that returns canned responses.
pub struct MockProvider {
    name: String,
    behavior: Behavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behavior: Behavior::Fixed("Mock response".to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.behavior = Behavior::Fixed(response.into());
        self
    }

    /// Answer with the prompt itself.
    pub fn echo(mut self) -> Self {
        self.behavior = Behavior::Echo;
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.behavior = Behavior::Fail(message.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, req: &LlmRequest) -> Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let content = match &self.behavior {
            Behavior::Fixed(text) => text.clone(),
            Behavior::Echo => req.user_prompt.clone(),
            Behavior::Fail(message) => bail!("{message}"),
        };
        Ok(LlmResponse {
            content,
            provider: self.name.clone(),
            model: "mock".to_string(),
            tokens_used: 0,
            latency_ms: 0,
        })
    }
}
