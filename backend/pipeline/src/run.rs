use std::sync::Arc;

use labelscan_core::{AnalysisMode, ImageAsset};
use serde::Serialize;
use uuid::Uuid;

/// A run that passed the extract guard and owns the pipeline until it
/// finishes or is superseded.
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub(crate) run_id: Uuid,
    pub(crate) mode: AnalysisMode,
    pub(crate) asset: Arc<ImageAsset>,
}

impl RunTicket {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Mode captured when the run began.
    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Analysis ran (successfully or with the fallback message).
    Done,
    /// Recognition failed; no analysis was attempted.
    Failed,
    /// A newer selection or run replaced this one; its results were discarded.
    Superseded,
}
