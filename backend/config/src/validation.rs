//! Config validation with user-friendly error messages.

use crate::schema::LabelScanConfig;
use thiserror::Error;

pub const KNOWN_ENGINES: &[&str] = &["tesseract", "vision"];
pub const KNOWN_PROVIDERS: &[&str] = &["gemini", "openrouter", "ollama"];
pub const KNOWN_MODES: &[&str] = &["detailed", "quick"];

/// Providers that refuse requests without a credential.
const KEYED_PROVIDERS: &[&str] = &["gemini", "openrouter"];

#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &LabelScanConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_ocr(config, &mut report);
    validate_analysis(config, &mut report);
    validate_media(config, &mut report);
    validate_server(config, &mut report);
    report
}

fn validate_ocr(config: &LabelScanConfig, report: &mut ValidationReport) {
    let ocr = &config.ocr;
    let engine = ocr.engine().to_ascii_lowercase();
    if !KNOWN_ENGINES.contains(&engine.as_str()) {
        report.error(
            "ocr.engine",
            format!("Unknown OCR engine '{engine}'. Use 'tesseract' or 'vision'"),
        );
    }
    if ocr.language().trim().is_empty() {
        report.error("ocr.language", "Language code cannot be empty");
    }
    if ocr.timeout_secs() == 0 {
        report.error("ocr.timeoutSecs", "timeoutSecs must be > 0");
    }
}

fn validate_analysis(config: &LabelScanConfig, report: &mut ValidationReport) {
    let analysis = &config.analysis;
    let provider = analysis.provider().to_ascii_lowercase();
    if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
        report.error(
            "analysis.provider",
            format!("Unknown provider '{provider}'. Use 'gemini', 'openrouter', or 'ollama'"),
        );
    } else if KEYED_PROVIDERS.contains(&provider.as_str()) && analysis.api_key().is_none() {
        report.warn(
            "analysis.apiKey",
            format!("No API key for '{provider}'; analysis requests will fail"),
        );
    }

    let mode = analysis.default_mode().to_ascii_lowercase();
    if !KNOWN_MODES.contains(&mode.as_str()) {
        report.error(
            "analysis.defaultMode",
            format!("Unknown mode '{mode}'. Use 'detailed' or 'quick'"),
        );
    }
    if analysis.timeout_secs() == 0 {
        report.error("analysis.timeoutSecs", "timeoutSecs must be > 0");
    }
    if analysis.max_tokens() == 0 {
        report.error("analysis.maxTokens", "maxTokens must be > 0");
    }
    let temperature = analysis.temperature();
    if !(0.0..=2.0).contains(&temperature) {
        report.warn(
            "analysis.temperature",
            format!("Temperature {temperature} is outside the usual 0.0-2.0 range"),
        );
    }
}

fn validate_media(config: &LabelScanConfig, report: &mut ValidationReport) {
    if config.media.max_image_bytes() == 0 {
        report.error("media.maxImageBytes", "maxImageBytes must be > 0");
    }
}

fn validate_server(config: &LabelScanConfig, report: &mut ValidationReport) {
    let port = config.server.port();
    if port != 0 && port < 1024 {
        report.warn(
            "server.port",
            format!("Port {port} requires elevated privileges; consider using a port >= 1024"),
        );
    }
}
