//! Structured run events.
//!
//! RULE: Every event the engine records goes through SimEvent.
//! Events are serialised to JSON and appended to the event log; nothing
//! reads them back during a run.

use crate::{
    estimate::CompletionCode,
    types::{RunId, SimNo},
};
use serde::{Deserialize, Serialize};

/// Every event emitted during a run.
/// Variants are only ever added, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    RunInitialized {
        run_id: RunId,
        seed: u64,
    },
    DatasetGenerated {
        simno: SimNo,
        case_missing_rate: f64,
        item_missing_rate: f64,
    },
    ImputationFailed {
        simno: SimNo,
        reason: String,
    },
    EstimateRecorded {
        simno: SimNo,
        code: CompletionCode,
    },
}

impl SimEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SimEvent::RunInitialized { .. }   => "run_initialized",
            SimEvent::DatasetGenerated { .. } => "dataset_generated",
            SimEvent::ImputationFailed { .. } => "imputation_failed",
            SimEvent::EstimateRecorded { .. } => "estimate_recorded",
        }
    }

    /// Dataset index the event belongs to; run-level events use 0.
    pub fn simno(&self) -> SimNo {
        match self {
            SimEvent::RunInitialized { .. } => 0,
            SimEvent::DatasetGenerated { simno, .. }
            | SimEvent::ImputationFailed { simno, .. }
            | SimEvent::EstimateRecorded { simno, .. } => *simno,
        }
    }
}

/// A persisted event log entry.
#[derive(Debug, Clone)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    pub simno: SimNo,
    pub source: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized SimEvent
}

impl EventLogEntry {
    pub fn new(run_id: &str, source: &str, event: &SimEvent) -> serde_json::Result<Self> {
        Ok(Self {
            id: None,
            run_id: run_id.to_string(),
            simno: event.simno(),
            source: source.to_string(),
            event_type: event.event_type().to_string(),
            payload: serde_json::to_string(event)?,
        })
    }

    pub fn event(&self) -> serde_json::Result<SimEvent> {
        serde_json::from_str(&self.payload)
    }
}
