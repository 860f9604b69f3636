//! Collaborators the router drives but does not implement.

use crate::quota::BackendTier;
use async_trait::async_trait;
use qr_core::error::Result;
use qr_core::types::Query;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Text produced by either path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub text: String,
    pub confidence: f64,
}

impl ExecutionOutput {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self { text: text.into(), confidence }
    }
}

/// Upstream intent signal consumed by the path decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntentSignal {
    pub confidence: f64,
    pub needs_complex_reasoning: bool,
}

/// Fast responder with no external calls.
#[async_trait]
pub trait LocalExecutor: Send + Sync {
    async fn run(&self, query: &Query) -> Result<ExecutionOutput>;
}

/// Calls an external language-model backend on the given tier.
///
/// Implementations should return `QrError::Backend` or
/// `QrError::BackendTimeout` on failure. The router bounds the call with
/// `timeout` regardless.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, query: &Query, tier: &BackendTier, timeout: Duration) -> Result<ExecutionOutput>;
}

pub trait IntentClassifier: Send + Sync {
    fn classify(&self, query: &str) -> IntentSignal;
}
