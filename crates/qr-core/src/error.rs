use crate::types::ComplexityTier;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QrError {
    #[error("Quota exhausted for every tier able to serve {hint} queries")]
    QuotaExhausted { hint: ComplexityTier },
    #[error("Backend {tier} timed out after {timeout_ms}ms")]
    BackendTimeout { tier: String, timeout_ms: u64 },
    #[error("Backend {tier} failed: {message}")]
    Backend { tier: String, message: String },
    #[error("Local path failed: {0}")]
    LocalPath(String),
    #[error("Unknown tier: {0}")]
    UnknownTier(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QrError {
    /// Expected failures of the remote path: no quota, timeout, backend error.
    /// Anything else coming out of a remote call is a collaborator bug.
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            QrError::QuotaExhausted { .. } | QrError::BackendTimeout { .. } | QrError::Backend { .. }
        )
    }

    /// Short machine-readable code, used in traces and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            QrError::QuotaExhausted { .. } => "quota_exhausted",
            QrError::BackendTimeout { .. } => "backend_timeout",
            QrError::Backend { .. } => "backend_error",
            QrError::LocalPath(_) => "local_path_failure",
            QrError::UnknownTier(_) => "unknown_tier",
            QrError::Config(_) | QrError::Toml(_) => "config_error",
            QrError::Io(_) => "io_error",
            QrError::Serialization(_) => "serialization_error",
            QrError::Other(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, QrError>;
