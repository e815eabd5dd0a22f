pub mod gemini;
pub mod mock;
pub mod ollama;
pub mod openrouter;

pub use gemini::GeminiProvider;
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openrouter::OpenRouterProvider;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};
use reqwest::{Response, StatusCode};

use labelscan_core::{LlmProvider, ScanError};

/// Hosted or local text-generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Gemini,
    OpenRouter,
    Ollama,
}

impl ProviderKind {
    /// Whether the backend refuses requests without an API key.
    pub fn needs_api_key(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(format!("unknown LLM provider '{other}'")),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Gemini => f.write_str("gemini"),
            ProviderKind::OpenRouter => f.write_str("openrouter"),
            ProviderKind::Ollama => f.write_str("ollama"),
        }
    }
}

/// What is needed to construct a provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Build the configured provider.
///
/// A missing key is not an error here: hosted backends will reject the call
/// and the requester turns that into its fallback result.
pub fn provider_from_settings(settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, ScanError> {
    let key = settings.api_key.clone().unwrap_or_default();
    let provider: Arc<dyn LlmProvider> = match settings.kind {
        ProviderKind::Gemini => {
            let mut p = GeminiProvider::new(key);
            if let Some(url) = &settings.base_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        ProviderKind::OpenRouter => {
            let mut p = OpenRouterProvider::new(key);
            if let Some(url) = &settings.base_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        ProviderKind::Ollama => {
            let mut p = OllamaProvider::new();
            if let Some(url) = &settings.base_url {
                if url.trim().is_empty() {
                    return Err(ScanError::Config("ollama base url is empty".into()));
                }
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
    };
    Ok(provider)
}

/// Turn a non-2xx reply into an error naming the likely cause.
pub(crate) async fn ensure_success(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            bail!("{provider} rejected the credential ({status}): {body}")
        }
        StatusCode::TOO_MANY_REQUESTS => bail!("{provider} quota exhausted ({status}): {body}"),
        _ => bail!("{provider} returned {status}: {body}"),
    }
}

/// Registry of LLM providers, looked up by name.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_kind() {
        assert_eq!("Gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!("openrouter".parse::<ProviderKind>().unwrap(), ProviderKind::OpenRouter);
        assert!("langchain".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::Ollama.to_string(), "ollama");
    }

    #[test]
    fn only_hosted_backends_need_keys() {
        assert!(ProviderKind::Gemini.needs_api_key());
        assert!(!ProviderKind::Ollama.needs_api_key());
    }

    #[test]
    fn builds_each_kind() {
        for kind in [ProviderKind::Gemini, ProviderKind::OpenRouter, ProviderKind::Ollama] {
            let provider = provider_from_settings(&ProviderSettings {
                kind,
                api_key: Some("k".into()),
                base_url: None,
            })
            .unwrap();
            assert_eq!(provider.name(), kind.to_string());
        }
    }

    #[test]
    fn empty_ollama_url_is_rejected() {
        let result = provider_from_settings(&ProviderSettings {
            kind: ProviderKind::Ollama,
            api_key: None,
            base_url: Some(" ".into()),
        });
        assert!(matches!(result, Err(ScanError::Config(_))));
    }

    #[test]
    fn registry_lookup() {
        let mut registry = ProviderRegistry::new();
        registry.register("mock", Arc::new(MockProvider::new("mock")));
        registry.register("alt", Arc::new(MockProvider::new("alt")));

        assert!(registry.get("mock").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.list(), vec!["alt", "mock"]);
    }
}
