pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use error::ScanError;
pub use event::{Event, EventKind};
pub use traits::{
    EngineHandle, EngineProgress, LlmProvider, LlmRequest, LlmResponse, OcrEngine,
    ProgressSender,
};
pub use types::{
    AnalysisMode, AnalysisRequest, AnalysisResult, ImageAsset, ImageEncoding, ImageInfo,
    ImageOrigin, OcrResult, Phase, PipelineState, ProgressEvent, ProgressPhase, SessionState,
};
