//! Pipeline Controller.
//!
//! Owns the [`PipelineState`] and drives the state machine
//! `Idle → LoadingImage → Idle(asset) → Recognizing → Analyzing → Done`,
//! with `Error` reachable from `Recognizing`. Every run carries a run id; work
//! that finishes after its run was superseded is discarded.
//!
//! [`PipelineState`]: labelscan_core::PipelineState

pub mod controller;
pub mod run;

pub use controller::{PipelineController, PipelineOptions};
pub use run::{RunOutcome, RunTicket};
