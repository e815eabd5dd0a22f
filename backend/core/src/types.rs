use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Form in which an image payload reached the loader.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageEncoding {
    RawBytes,
    DataUri,
}

/// Which user gesture produced the image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageOrigin {
    #[default]
    Select,
    Drop,
}

impl FromStr for ImageOrigin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "select" => Ok(ImageOrigin::Select),
            "drop" | "drag" | "drag-and-drop" => Ok(ImageOrigin::Drop),
            other => Err(format!("unknown image origin '{other}'")),
        }
    }
}

/// A validated image held in memory. Bytes are always the decoded image,
/// `encoding` only records how they arrived.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub data: Bytes,
    pub mime_type: String,
    pub encoding: ImageEncoding,
    pub origin: ImageOrigin,
    pub name: Option<String>,
}

impl ImageAsset {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn info(&self) -> ImageInfo {
        ImageInfo {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.data.len(),
            origin: self.origin,
            encoding: self.encoding,
        }
    }
}

/// Serializable description of the image currently held by the controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageInfo {
    pub name: Option<String>,
    pub mime_type: String,
    pub size_bytes: usize,
    pub origin: ImageOrigin,
    pub encoding: ImageEncoding,
}

/// Lifecycle of the single OCR engine instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Loading => "loading",
            SessionState::Ready => "ready",
            SessionState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Coarse stage reported alongside a progress percentage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    #[default]
    Idle,
    Initializing,
    Recognizing,
    Done,
    Error,
}

/// Normalized progress as observed by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    /// Always within `[0, 1]`.
    pub percent: f32,
    pub label: String,
}

impl ProgressEvent {
    pub fn new(phase: ProgressPhase, percent: f32, label: impl Into<String>) -> Self {
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            phase,
            percent,
            label: label.into(),
        }
    }

    pub fn idle() -> Self {
        Self::new(ProgressPhase::Idle, 0.0, "idle")
    }
}

impl Default for ProgressEvent {
    fn default() -> Self {
        Self::idle()
    }
}

/// Outcome of one recognition run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl OcrResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            succeeded: true,
            error_detail: None,
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            succeeded: false,
            error_detail: Some(detail.into()),
        }
    }
}

/// Depth of the nutritional assessment requested from the LLM.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    #[default]
    Detailed,
    Quick,
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisMode::Detailed => f.write_str("detailed"),
            AnalysisMode::Quick => f.write_str("quick"),
        }
    }
}

impl FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "detailed" | "detail" | "full" => Ok(AnalysisMode::Detailed),
            "quick" | "short" => Ok(AnalysisMode::Quick),
            other => Err(format!("unknown analysis mode '{other}'")),
        }
    }
}

/// A prompt ready to be sent to the LLM. Built fresh for every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub prompt: String,
}

/// Final, read-only artifact of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub text: String,
    pub succeeded: bool,
}

impl AnalysisResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            succeeded: true,
        }
    }

    pub fn failed(fallback: impl Into<String>) -> Self {
        Self {
            text: fallback.into(),
            succeeded: false,
        }
    }
}

/// Controller phase exposed to the presentation layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    LoadingImage,
    Recognizing,
    Analyzing,
    Done,
    Error,
}

impl Phase {
    /// A run is executing and owns the pipeline.
    pub fn is_busy(&self) -> bool {
        matches!(self, Phase::Recognizing | Phase::Analyzing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Error)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::LoadingImage => "loading_image",
            Phase::Recognizing => "recognizing",
            Phase::Analyzing => "analyzing",
            Phase::Done => "done",
            Phase::Error => "error",
        };
        f.write_str(s)
    }
}

/// Aggregate state owned by the pipeline controller.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    pub phase: Phase,
    pub progress: ProgressEvent,
    pub mode: AnalysisMode,
    pub session: SessionState,
    pub run_id: Option<Uuid>,
    pub image: Option<ImageInfo>,
    #[serde(skip)]
    pub asset: Option<Arc<ImageAsset>>,
    pub ocr_result: Option<OcrResult>,
    pub analysis_result: Option<AnalysisResult>,
    /// Last status or error text worth showing to the user.
    pub message: Option<String>,
}

impl PipelineState {
    pub fn new(mode: AnalysisMode) -> Self {
        Self {
            phase: Phase::Idle,
            progress: ProgressEvent::idle(),
            mode,
            session: SessionState::Uninitialized,
            run_id: None,
            image: None,
            asset: None,
            ocr_result: None,
            analysis_result: None,
            message: None,
        }
    }

    /// Guard for the extract action: an image is held, the OCR session is
    /// ready and no run currently owns the pipeline.
    pub fn can_extract(&self) -> bool {
        self.asset.is_some() && self.session == SessionState::Ready && !self.phase.is_busy()
    }

    pub fn set_asset(&mut self, asset: Option<Arc<ImageAsset>>) {
        self.image = asset.as_ref().map(|a| a.info());
        self.asset = asset;
    }

    pub fn clear_results(&mut self) {
        self.ocr_result = None;
        self.analysis_result = None;
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new(AnalysisMode::default())
    }
}
