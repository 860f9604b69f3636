//! Quota-aware query router: complexity scoring, per-tier quotas, a bounded
//! response cache and local/remote path selection with fallback.

pub mod cache;
pub mod clock;
pub mod complexity;
pub mod executor;
pub mod quota;
pub mod router;
pub mod selector;
pub mod trace;

pub use cache::{fingerprint, normalize_query, query_fingerprint, CacheStats, CachedResponse, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use complexity::ComplexityAnalyzer;
pub use executor::{ExecutionOutput, IntentClassifier, IntentSignal, LocalExecutor, RemoteExecutor};
pub use quota::{BackendTier, QuotaPermit, QuotaSnapshot, QuotaTracker};
pub use router::{decide_path, steps, PathChoice, RouteState, Router, RouterParts, RouterStatsSnapshot, LOCAL_BACKEND};
pub use selector::BackendSelector;
pub use trace::TraceRecorder;

#[cfg(test)]
mod tests;
