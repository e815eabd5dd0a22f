use thiserror::Error;

/// Error taxonomy of the extraction-and-analysis pipeline.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("OCR engine failed to initialize: {0}")]
    EngineInit(String),

    #[error("OCR session is not ready")]
    SessionNotReady,

    #[error("recognition failed: {0}")]
    OcrFailure(String),

    #[error("analysis failed: {0}")]
    AnalysisFailure(String),

    #[error("an analysis request is already in flight")]
    RequestInProgress,

    #[error("no image selected")]
    NoImage,

    #[error("a run is already in progress")]
    RunInProgress,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScanError {
    /// Whether the error stems from a bad request by the presentation layer
    /// rather than from a collaborator.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidInput(_)
                | ScanError::NoImage
                | ScanError::RunInProgress
                | ScanError::SessionNotReady
        )
    }
}
