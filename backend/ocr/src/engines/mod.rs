pub mod mock;
pub mod tesseract;
pub mod vision;

pub use mock::{MockEngine, MockRecognition};
pub use tesseract::TesseractEngine;
pub use vision::VisionEngine;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use labelscan_core::OcrEngine;

/// Available OCR backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    #[default]
    Tesseract,
    Vision,
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Ok(EngineKind::Tesseract),
            "vision" | "ollama" => Ok(EngineKind::Vision),
            other => Err(format!("unknown OCR engine '{other}'")),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Tesseract => f.write_str("tesseract"),
            EngineKind::Vision => f.write_str("vision"),
        }
    }
}

/// Settings needed to construct an engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub kind: EngineKind,
    pub tesseract_path: String,
    pub vision_url: String,
    pub vision_model: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            kind: EngineKind::Tesseract,
            tesseract_path: "tesseract".to_string(),
            vision_url: "http://localhost:11434".to_string(),
            vision_model: "llava".to_string(),
        }
    }
}

pub fn build_engine(options: &EngineOptions) -> Arc<dyn OcrEngine> {
    match options.kind {
        EngineKind::Tesseract => Arc::new(TesseractEngine::new(&options.tesseract_path)),
        EngineKind::Vision => Arc::new(VisionEngine::new(
            &options.vision_url,
            &options.vision_model,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_engine_kind() {
        assert_eq!("Tesseract".parse::<EngineKind>().unwrap(), EngineKind::Tesseract);
        assert_eq!("ollama".parse::<EngineKind>().unwrap(), EngineKind::Vision);
        assert!("easyocr".parse::<EngineKind>().is_err());
    }

    #[test]
    fn builds_requested_engine() {
        let engine = build_engine(&EngineOptions {
            kind: EngineKind::Vision,
            ..Default::default()
        });
        assert_eq!(engine.name(), "vision");
        assert_eq!(build_engine(&EngineOptions::default()).name(), "tesseract");
    }
}
