//! Append-only per-request routing trace.

use chrono::Utc;
use qr_core::types::{StepStatus, TraceStep};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct TraceRecorder {
    steps: Vec<TraceStep>,
    open: Vec<(usize, Instant)>,
}

/// Handle to a step that is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepId(usize);

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, name: &str, description: impl Into<String>) -> StepId {
        let idx = self.steps.len();
        self.steps.push(TraceStep {
            name: name.to_string(),
            status: StepStatus::Pending,
            started_at: Utc::now(),
            duration_ms: 0,
            description: description.into(),
            metadata: serde_json::Value::Null,
        });
        self.open.push((idx, Instant::now()));
        StepId(idx)
    }

    pub fn complete(&mut self, id: StepId, metadata: serde_json::Value) {
        self.finish(id, StepStatus::Completed, None, metadata);
    }

    pub fn complete_with(&mut self, id: StepId, description: impl Into<String>, metadata: serde_json::Value) {
        self.finish(id, StepStatus::Completed, Some(description.into()), metadata);
    }

    pub fn fail(&mut self, id: StepId, description: impl Into<String>, metadata: serde_json::Value) {
        self.finish(id, StepStatus::Failed, Some(description.into()), metadata);
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<TraceStep> {
        self.steps
    }

    fn finish(&mut self, id: StepId, status: StepStatus, description: Option<String>, metadata: serde_json::Value) {
        let Some(pos) = self.open.iter().position(|(i, _)| *i == id.0) else { return };
        let (_, started) = self.open.swap_remove(pos);
        if let Some(step) = self.steps.get_mut(id.0) {
            step.status = status;
            step.duration_ms = started.elapsed().as_millis() as u64;
            if let Some(d) = description {
                step.description = d;
            }
            if !metadata.is_null() {
                step.metadata = metadata;
            }
        }
    }
}
