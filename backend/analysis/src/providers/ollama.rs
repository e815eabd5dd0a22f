use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use labelscan_core::{LlmProvider, LlmRequest, LlmResponse};

use super::ensure_success;

/// Local models served by Ollama's chat endpoint.
pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: "http://localhost:11434".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    options: Options,
}

#[derive(Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Message,
    eval_count: Option<u64>,
    prompt_eval_count: Option<u64>,
}

/// `ollama/llama3` and `llama3` both name the local model `llama3`.
fn local_model(model: &str) -> &str {
    model.rsplit('/').next().unwrap_or(model)
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let start = Instant::now();

        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(Message {
                role: "system".to_string(),
                content: request.system_prompt.clone(),
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: request.user_prompt.clone(),
        });

        let model = local_model(&request.model);
        let body = ChatRequest {
            model,
            messages,
            stream: false,
            options: Options {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        debug!(model = %model, base_url = %self.base_url, "Sending request to Ollama");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .context("Ollama HTTP request failed")?;
        let response = ensure_success("Ollama", response).await?;

        let chat: ChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(LlmResponse {
            content: chat.message.content,
            provider: "ollama".to_string(),
            model: model.to_string(),
            tokens_used: chat.eval_count.unwrap_or(0) + chat.prompt_eval_count.unwrap_or(0),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_provider_prefix() {
        assert_eq!(local_model("ollama/llama3"), "llama3");
        assert_eq!(local_model("mistral"), "mistral");
    }

    #[test]
    fn parses_chat_reply() {
        let raw = r#"{"message":{"role":"assistant","content":"| Sodium | 900mg |"},"eval_count":7,"prompt_eval_count":3,"done":true}"#;
        let chat: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(chat.message.content, "| Sodium | 900mg |");
        assert_eq!(chat.eval_count.unwrap() + chat.prompt_eval_count.unwrap(), 10);
    }
}
