//! Turns the loaded [`LabelScanConfig`] into component options and wires the
//! pipeline together.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use labelscan_analysis::{provider_from_settings, AnalysisRequester, ProviderSettings, RequesterOptions};
use labelscan_config::{config_dir, config_file_path, load_and_prepare, LabelScanConfig};
use labelscan_core::AnalysisMode;
use labelscan_logging::LoggerOptions;
use labelscan_ocr::{build_engine, EngineOptions, OcrSession};
use labelscan_pipeline::{PipelineController, PipelineOptions};

/// `--config` if given, else `config.yaml` in the config directory.
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config_file_path(&config_dir()))
}

pub async fn load(explicit: Option<&Path>) -> Result<(PathBuf, LabelScanConfig)> {
    let path = resolve_path(explicit);
    let config = load_and_prepare(&path)
        .await
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    Ok((path, config))
}

pub fn logger_options(config: &LabelScanConfig, json_console: bool) -> LoggerOptions {
    LoggerOptions {
        level: config.logging.level().to_string(),
        dir: config.logging.dir.as_ref().map(PathBuf::from),
        json_console,
    }
}

pub fn engine_options(config: &LabelScanConfig) -> Result<EngineOptions> {
    let ocr = &config.ocr;
    Ok(EngineOptions {
        kind: ocr.engine().parse().map_err(|e: String| anyhow!(e))?,
        tesseract_path: ocr.tesseract_path().to_string(),
        vision_url: ocr.vision_url().to_string(),
        vision_model: ocr.vision_model().to_string(),
    })
}

pub fn provider_settings(config: &LabelScanConfig) -> Result<ProviderSettings> {
    let analysis = &config.analysis;
    Ok(ProviderSettings {
        kind: analysis.provider().parse().map_err(|e: String| anyhow!(e))?,
        api_key: analysis.api_key().map(str::to_string),
        base_url: analysis.base_url.clone(),
    })
}

pub fn requester_options(config: &LabelScanConfig) -> RequesterOptions {
    let analysis = &config.analysis;
    RequesterOptions {
        model: analysis.model().to_string(),
        system_prompt: String::new(),
        max_tokens: analysis.max_tokens(),
        temperature: analysis.temperature(),
        timeout: Duration::from_secs(analysis.timeout_secs()),
    }
}

pub fn default_mode(config: &LabelScanConfig) -> Result<AnalysisMode> {
    config
        .analysis
        .default_mode()
        .parse()
        .map_err(|e: String| anyhow!(e))
}

pub fn pipeline_options(config: &LabelScanConfig) -> Result<PipelineOptions> {
    Ok(PipelineOptions {
        language: config.ocr.language().to_string(),
        default_mode: default_mode(config)?,
        recognition_timeout: Duration::from_secs(config.ocr.timeout_secs()),
        max_image_bytes: config.media.max_image_bytes(),
    })
}

/// Build a controller whose OCR session is not yet initialized.
pub fn build_controller(config: &LabelScanConfig) -> Result<Arc<PipelineController>> {
    let engine = build_engine(&engine_options(config)?);
    let provider = provider_from_settings(&provider_settings(config)?)?;
    let session = Arc::new(OcrSession::new(engine));
    let requester = Arc::new(AnalysisRequester::new(provider, requester_options(config)));
    Ok(Arc::new(PipelineController::new(
        session,
        requester,
        pipeline_options(config)?,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelscan_analysis::ProviderKind;
    use labelscan_config::apply_all_defaults;
    use labelscan_ocr::EngineKind;

    fn config() -> LabelScanConfig {
        apply_all_defaults(LabelScanConfig::default())
    }

    #[test]
    fn explicit_path_wins() {
        let path = resolve_path(Some(Path::new("/tmp/custom.yaml")));
        assert_eq!(path, PathBuf::from("/tmp/custom.yaml"));
    }

    #[test]
    fn maps_defaults() {
        let cfg = config();
        let engine = engine_options(&cfg).unwrap();
        assert_eq!(engine.kind, EngineKind::Tesseract);
        let provider = provider_settings(&cfg).unwrap();
        assert_eq!(provider.kind, ProviderKind::Gemini);
        assert!(provider.api_key.is_none());
        let requester = requester_options(&cfg);
        assert_eq!(requester.model, "gemini-pro");
        assert_eq!(requester.timeout, Duration::from_secs(60));
        let pipeline = pipeline_options(&cfg).unwrap();
        assert_eq!(pipeline.language, "eng");
        assert_eq!(pipeline.default_mode, AnalysisMode::Detailed);
    }

    #[test]
    fn maps_overrides() {
        let mut cfg = config();
        cfg.ocr.engine = Some("vision".into());
        cfg.analysis.provider = Some("ollama".into());
        cfg.analysis.default_mode = Some("quick".into());
        cfg.logging.dir = Some("/var/log/labelscan".into());

        assert_eq!(engine_options(&cfg).unwrap().kind, EngineKind::Vision);
        assert_eq!(provider_settings(&cfg).unwrap().kind, ProviderKind::Ollama);
        assert_eq!(default_mode(&cfg).unwrap(), AnalysisMode::Quick);
        assert_eq!(
            logger_options(&cfg, false).dir,
            Some(PathBuf::from("/var/log/labelscan"))
        );
    }

    #[test]
    fn unknown_names_are_errors() {
        let mut cfg = config();
        cfg.analysis.provider = Some("langchain".into());
        assert!(provider_settings(&cfg).is_err());
    }

    #[tokio::test]
    async fn builds_idle_controller() {
        let controller = build_controller(&config()).unwrap();
        let state = controller.state();
        assert!(!state.can_extract());
        assert_eq!(state.mode, AnalysisMode::Detailed);
    }
}
