//! Environment handling for config values.
//!
//! - `${VAR_NAME}` references in string values are substituted at load time.
//!   Only uppercase `[A-Z_][A-Z0-9_]*` names match; `$${VAR}` is a literal `${VAR}`.
//! - `LABELSCAN_*` variables override individual settings after the file is read.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;

use crate::schema::LabelScanConfig;

/// Config paths whose `${VAR}` references may be unset. They resolve to an
/// empty string and validation reports the missing value as a warning.
const OPTIONAL_REF_PATHS: &[&str] = &["analysis.apiKey"];

/// `$${NAME}` (escaped) or `${NAME}`.
static ENV_REF_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references using the process environment.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    resolve_env_vars_with(value, &std::env::vars().collect())
}

/// Substitute `${VAR}` references using `env`. Unset or empty variables are
/// errors, except under [`OPTIONAL_REF_PATHS`].
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    Ok(substitute_value(value, env, "")?)
}

fn substitute_value(
    value: &Value,
    env: &HashMap<String, String>,
    path: &str,
) -> Result<Value, MissingEnvVarError> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => arr
            .iter()
            .enumerate()
            .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                result.insert(k.clone(), substitute_value(v, env, &child_path)?);
            }
            Ok(Value::Object(result))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(
    s: &str,
    env: &HashMap<String, String>,
    path: &str,
) -> Result<String, MissingEnvVarError> {
    if !s.contains('$') {
        return Ok(s.to_string());
    }

    let mut missing = None;
    let substituted = ENV_REF_PATTERN.replace_all(s, |caps: &Captures| {
        let name = &caps[2];
        if !caps[1].is_empty() {
            return format!("${{{name}}}");
        }
        match env.get(name) {
            Some(val) if !val.is_empty() => val.clone(),
            _ => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });

    match missing {
        Some(err) if OPTIONAL_REF_PATHS.contains(&path) => {
            tracing::warn!(var = %err.var_name, path, "Env var unset; leaving value empty");
            Ok(substituted.into_owned())
        }
        Some(err) => Err(err),
        None => Ok(substituted.into_owned()),
    }
}

/// Collect env var names referenced in a config value tree (for diagnostics).
pub fn collect_referenced_vars(value: &Value) -> Vec<String> {
    let mut vars = Vec::new();
    collect_vars_recursive(value, &mut vars);
    vars.sort();
    vars.dedup();
    vars
}

fn collect_vars_recursive(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for caps in ENV_REF_PATTERN.captures_iter(s) {
                if caps[1].is_empty() {
                    out.push(caps[2].to_string());
                }
            }
        }
        Value::Array(arr) => arr.iter().for_each(|v| collect_vars_recursive(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_vars_recursive(v, out)),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// LABELSCAN_* overrides
// ---------------------------------------------------------------------------

pub const ENV_OCR_LANGUAGE: &str = "LABELSCAN_OCR_LANGUAGE";
pub const ENV_OCR_ENGINE: &str = "LABELSCAN_OCR_ENGINE";
pub const ENV_PROVIDER: &str = "LABELSCAN_PROVIDER";
pub const ENV_API_KEY: &str = "LABELSCAN_API_KEY";
pub const ENV_MODEL: &str = "LABELSCAN_MODEL";
pub const ENV_DEFAULT_MODE: &str = "LABELSCAN_DEFAULT_MODE";
pub const ENV_PORT: &str = "LABELSCAN_PORT";

/// Apply `LABELSCAN_*` overrides from the process environment.
pub fn apply_env_overrides(config: LabelScanConfig) -> LabelScanConfig {
    apply_env_overrides_with(config, &std::env::vars().collect())
}

/// Apply `LABELSCAN_*` overrides from `env`. Blank values are ignored, and so
/// is a port that does not parse.
pub fn apply_env_overrides_with(
    mut config: LabelScanConfig,
    env: &HashMap<String, String>,
) -> LabelScanConfig {
    let get = |name: &str| {
        env.get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = get(ENV_OCR_LANGUAGE) {
        config.ocr.language = Some(v);
    }
    if let Some(v) = get(ENV_OCR_ENGINE) {
        config.ocr.engine = Some(v);
    }
    if let Some(v) = get(ENV_PROVIDER) {
        config.analysis.provider = Some(v);
    }
    if let Some(v) = get(ENV_API_KEY) {
        config.analysis.api_key = Some(v);
    }
    if let Some(v) = get(ENV_MODEL) {
        config.analysis.model = Some(v);
    }
    if let Some(v) = get(ENV_DEFAULT_MODE) {
        config.analysis.default_mode = Some(v);
    }
    if let Some(v) = get(ENV_PORT) {
        match v.parse::<u16>() {
            Ok(port) => config.server.port = Some(port),
            Err(_) => tracing::warn!(var = ENV_PORT, value = %v, "Ignoring invalid port override"),
        }
    }
    config
}
