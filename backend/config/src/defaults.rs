//! Config defaults: applies default values to parsed config.

use crate::schema::LabelScanConfig;

pub const DEFAULT_OCR_ENGINE: &str = "tesseract";
pub const DEFAULT_OCR_LANGUAGE: &str = "eng";
pub const DEFAULT_TESSERACT_PATH: &str = "tesseract";
pub const DEFAULT_VISION_URL: &str = "http://localhost:11434";
pub const DEFAULT_VISION_MODEL: &str = "llava";
pub const DEFAULT_OCR_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_PROVIDER: &str = "gemini";
pub const DEFAULT_MODEL: &str = "gemini-pro";
pub const DEFAULT_OPENROUTER_MODEL: &str = "openrouter/auto";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";
pub const DEFAULT_ANALYSIS_MODE: &str = "detailed";
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_TEMPERATURE: f32 = 0.4;

/// 10 MiB.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8787;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Model used when none is configured for `provider`.
pub fn default_model_for(provider: &str) -> &'static str {
    match provider {
        "openrouter" => DEFAULT_OPENROUTER_MODEL,
        "ollama" => DEFAULT_OLLAMA_MODEL,
        _ => DEFAULT_MODEL,
    }
}

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: LabelScanConfig) -> LabelScanConfig {
    let config = apply_ocr_defaults(config);
    let config = apply_analysis_defaults(config);
    let config = apply_media_defaults(config);
    let config = apply_server_defaults(config);
    apply_logging_defaults(config)
}

fn fill<T>(slot: &mut Option<T>, value: impl FnOnce() -> T) {
    if slot.is_none() {
        *slot = Some(value());
    }
}

fn apply_ocr_defaults(mut config: LabelScanConfig) -> LabelScanConfig {
    let ocr = &mut config.ocr;
    fill(&mut ocr.engine, || DEFAULT_OCR_ENGINE.to_string());
    fill(&mut ocr.language, || DEFAULT_OCR_LANGUAGE.to_string());
    fill(&mut ocr.timeout_secs, || DEFAULT_OCR_TIMEOUT_SECS);
    match ocr.engine.as_deref() {
        Some("vision") => {
            fill(&mut ocr.vision_url, || DEFAULT_VISION_URL.to_string());
            fill(&mut ocr.vision_model, || DEFAULT_VISION_MODEL.to_string());
        }
        _ => fill(&mut ocr.tesseract_path, || DEFAULT_TESSERACT_PATH.to_string()),
    }
    config
}

fn apply_analysis_defaults(mut config: LabelScanConfig) -> LabelScanConfig {
    let analysis = &mut config.analysis;
    fill(&mut analysis.provider, || DEFAULT_PROVIDER.to_string());
    let provider = analysis.provider.clone().unwrap_or_default();
    fill(&mut analysis.model, || default_model_for(&provider).to_string());
    fill(&mut analysis.default_mode, || DEFAULT_ANALYSIS_MODE.to_string());
    fill(&mut analysis.timeout_secs, || DEFAULT_ANALYSIS_TIMEOUT_SECS);
    fill(&mut analysis.max_tokens, || DEFAULT_MAX_TOKENS);
    fill(&mut analysis.temperature, || DEFAULT_TEMPERATURE);
    config
}

fn apply_media_defaults(mut config: LabelScanConfig) -> LabelScanConfig {
    fill(&mut config.media.max_image_bytes, || DEFAULT_MAX_IMAGE_BYTES);
    config
}

fn apply_server_defaults(mut config: LabelScanConfig) -> LabelScanConfig {
    fill(&mut config.server.bind, || DEFAULT_BIND.to_string());
    fill(&mut config.server.port, || DEFAULT_PORT);
    config
}

fn apply_logging_defaults(mut config: LabelScanConfig) -> LabelScanConfig {
    fill(&mut config.logging.level, || DEFAULT_LOG_LEVEL.to_string());
    config
}
