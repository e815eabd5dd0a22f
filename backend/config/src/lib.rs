//! `labelscan-config`: runtime configuration.
//!
//! Provides:
//! - Typed config schema (OCR, analysis, media, server, logging)
//! - YAML read/write
//! - `${ENV_VAR}` substitution and `LABELSCAN_*` overrides
//! - Default value application
//! - Validation and redaction for display

pub mod defaults;
pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{
    apply_env_overrides, apply_env_overrides_with, collect_referenced_vars, resolve_env_vars,
    resolve_env_vars_with, MissingEnvVarError,
};
pub use io::{config_dir, config_file_path, load_config, load_raw, write_config};
pub use redact::{collect_redacted_paths, redact};
pub use schema::{
    AnalysisConfig, LabelScanConfig, LoggingConfig, MediaConfig, OcrConfig, ServerConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// Load a config file and make it ready for use: `${VAR}` substitution,
/// `LABELSCAN_*` overrides, defaults, then validation.
///
/// Warnings are logged; any validation error fails the load.
pub async fn load_and_prepare(path: &Path) -> Result<LabelScanConfig> {
    let env: HashMap<String, String> = std::env::vars().collect();
    let raw = load_raw(path).await?;
    prepare(raw, &env)
}

/// [`load_and_prepare`] on an already-parsed tree with an explicit environment.
pub fn prepare(raw: serde_json::Value, env: &HashMap<String, String>) -> Result<LabelScanConfig> {
    let value = resolve_env_vars_with(&raw, env).context("Failed to resolve env vars in config")?;

    let config: LabelScanConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;
    let config = apply_env_overrides_with(config, env);
    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if let Some(first) = report.errors.first() {
        bail!("{first}");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitution_overrides_and_defaults_compose() {
        let raw = json!({
            "analysis": { "apiKey": "${GEMINI_API_KEY}", "defaultMode": "detailed" },
            "ocr": { "language": "eng" }
        });
        let cfg = prepare(
            raw,
            &env(&[
                ("GEMINI_API_KEY", "AIza-from-env"),
                ("LABELSCAN_DEFAULT_MODE", "quick"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.analysis.api_key(), Some("AIza-from-env"));
        assert_eq!(cfg.analysis.default_mode(), "quick");
        assert_eq!(cfg.ocr.language.as_deref(), Some("eng"));
        assert_eq!(cfg.server.port, Some(defaults::DEFAULT_PORT));
    }

    #[test]
    fn invalid_config_fails_to_load() {
        let raw = json!({ "ocr": { "engine": "easyocr" } });
        let err = prepare(raw, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("ocr.engine"));
    }

    #[test]
    fn unset_key_reference_loads_without_key() {
        let raw = json!({ "analysis": { "apiKey": "${GEMINI_API_KEY}" } });
        let cfg = prepare(raw, &HashMap::new()).unwrap();
        assert_eq!(cfg.analysis.api_key(), None);
        let report = validate(&cfg);
        assert!(report.is_valid());
        assert_eq!(report.warnings[0].path, "analysis.apiKey");
    }

    #[tokio::test]
    async fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file_path(dir.path());
        tokio::fs::write(&path, "analysis:\n  provider: ollama\n").await.unwrap();
        let cfg = load_and_prepare(&path).await.unwrap();
        assert_eq!(cfg.analysis.provider(), "ollama");
        assert_eq!(cfg.analysis.model(), defaults::DEFAULT_OLLAMA_MODEL);
    }
}
