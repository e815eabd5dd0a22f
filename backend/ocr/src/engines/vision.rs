//! OCR through a local vision model served by Ollama.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use labelscan_core::{EngineHandle, EngineProgress, ImageAsset, OcrEngine, ProgressSender};

pub struct VisionEngine {
    client: Client,
    base_url: String,
    model: String,
}

impl VisionEngine {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

fn transcription_prompt(language: &str) -> String {
    format!(
        "Transcribe all text visible in this image exactly as written, preserving line breaks. \
         The text is expected to be in language '{language}'. \
         Return only the transcribed text, nothing else."
    )
}

#[async_trait]
impl OcrEngine for VisionEngine {
    fn name(&self) -> &str {
        "vision"
    }

    async fn initialize(&self, language: &str) -> Result<EngineHandle> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("vision server at {} is unreachable", self.base_url))?;
        if !response.status().is_success() {
            bail!("vision server returned {}", response.status());
        }

        let tags: TagsResponse = response
            .json()
            .await
            .context("Failed to parse vision model list")?;
        let available = tags
            .models
            .iter()
            .any(|m| m.name == self.model || m.name.starts_with(&format!("{}:", self.model)));
        if !available {
            bail!("vision model '{}' is not pulled on {}", self.model, self.base_url);
        }

        info!(model = %self.model, language, "Vision OCR ready");
        Ok(EngineHandle::new("vision", language))
    }

    async fn recognize(
        &self,
        handle: &EngineHandle,
        image: &ImageAsset,
        progress: ProgressSender,
    ) -> Result<String> {
        let _ = progress.try_send(EngineProgress::new("uploading image", 0.1));

        let body = serde_json::json!({
            "model": self.model,
            "prompt": transcription_prompt(&handle.language),
            "images": [STANDARD.encode(&image.data)],
            "stream": false
        });

        debug!(model = %self.model, bytes = image.len(), "Sending image to vision model");
        let _ = progress.try_send(EngineProgress::new("recognizing text", 0.3));

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .context("Vision HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            bail!("vision server returned {}: {}", status, error_body);
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse vision response")?;

        let _ = progress.try_send(EngineProgress::new("recognizing text", 1.0));
        Ok(generated.response.trim().to_string())
    }

    async fn terminate(&self, handle: EngineHandle) -> Result<()> {
        debug!(instance = %handle.id, "Vision instance released");
        Ok(())
    }
}
