//! Routing state machine:
//!
//! `CacheCheck -> Classify -> PathDecision -> {LocalExecute | RemoteExecute}
//!  -> [remote failure] FallbackLocalExecute -> CacheStore -> Done`
//!
//! Only `CacheCheck` may jump straight to `Done`. Every remote failure
//! (no quota, backend error, timeout) takes the single fallback edge.

use crate::cache::{query_fingerprint, CachedResponse, ResponseCache};
use crate::complexity::ComplexityAnalyzer;
use crate::executor::{ExecutionOutput, IntentClassifier, IntentSignal, LocalExecutor, RemoteExecutor};
use crate::quota::{QuotaSnapshot, QuotaTracker};
use crate::selector::BackendSelector;
use crate::trace::TraceRecorder;
use qr_core::config::{PathConfig, RouterConfig};
use qr_core::error::{QrError, Result};
use qr_core::types::{ComplexityScore, ComplexityTier, Query, RoutePath, RouteResponse, RoutingMode};
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Trace step names.
pub mod steps {
    pub const CACHE_CHECK: &str = "CacheCheck";
    pub const CLASSIFY: &str = "Classify";
    pub const PATH_DECISION: &str = "PathDecision";
    pub const BACKEND_SELECTION: &str = "BackendSelection";
    pub const REMOTE_EXECUTE: &str = "RemoteExecute";
    pub const LOCAL_EXECUTE: &str = "LocalExecute";
    pub const FALLBACK: &str = "Fallback";
    pub const CACHE_STORE: &str = "CacheStore";
}

/// Backend name reported for the local path.
pub const LOCAL_BACKEND: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    CacheCheck,
    Classify,
    PathDecision,
    LocalExecute,
    RemoteExecute,
    FallbackLocalExecute,
    CacheStore,
    Done,
}

/// Outcome of the path decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathChoice {
    pub path: RoutePath,
    pub reason: &'static str,
}

/// Deterministic local/remote choice. Local unless there is a reason to pay.
pub fn decide_path(config: &PathConfig, intent: IntentSignal, score: &ComplexityScore) -> PathChoice {
    if intent.confidence > config.high_confidence
        && !intent.needs_complex_reasoning
        && score.normalized <= config.local_score_ceiling
    {
        return PathChoice { path: RoutePath::Local, reason: "Simple query suitable for local processing" };
    }
    if intent.needs_complex_reasoning {
        return PathChoice { path: RoutePath::Remote, reason: "Complex reasoning required" };
    }
    if score.normalized > config.remote_score_floor {
        return PathChoice { path: RoutePath::Remote, reason: "High query complexity" };
    }
    if intent.confidence < config.low_confidence {
        return PathChoice { path: RoutePath::Remote, reason: "Low intent confidence" };
    }
    PathChoice { path: RoutePath::Local, reason: "Cost-minimizing default" }
}

#[derive(Debug, Default)]
struct RouterStats {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    local_decisions: AtomicU64,
    remote_decisions: AtomicU64,
    remote_successes: AtomicU64,
    fallbacks: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStatsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub local_decisions: u64,
    pub remote_decisions: u64,
    pub remote_successes: u64,
    pub fallbacks: u64,
    pub failures: u64,
}

/// Shared state and collaborators, built by the composition root.
pub struct RouterParts {
    pub quota: Arc<QuotaTracker>,
    pub cache: Arc<ResponseCache>,
    pub local: Arc<dyn LocalExecutor>,
    pub remote: Arc<dyn RemoteExecutor>,
    pub intent: Arc<dyn IntentClassifier>,
}

pub struct Router {
    analyzer: ComplexityAnalyzer,
    selector: BackendSelector,
    quota: Arc<QuotaTracker>,
    cache: Arc<ResponseCache>,
    local: Arc<dyn LocalExecutor>,
    remote: Arc<dyn RemoteExecutor>,
    intent: Arc<dyn IntentClassifier>,
    path_config: PathConfig,
    default_timeout: Duration,
    stats: RouterStats,
}

struct Executed {
    output: ExecutionOutput,
    backend: String,
}

impl Router {
    pub fn new(config: &RouterConfig, parts: RouterParts) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            analyzer: ComplexityAnalyzer::new(config.complexity.clone())?,
            selector: BackendSelector::new(),
            quota: parts.quota,
            cache: parts.cache,
            local: parts.local,
            remote: parts.remote,
            intent: parts.intent,
            path_config: config.routing,
            default_timeout: Duration::from_millis(config.timeouts.remote_ms),
            stats: RouterStats::default(),
        })
    }

    /// Builds a fresh tracker and cache from `config`.
    pub fn from_config(
        config: &RouterConfig,
        local: Arc<dyn LocalExecutor>,
        remote: Arc<dyn RemoteExecutor>,
        intent: Arc<dyn IntentClassifier>,
    ) -> Result<Self> {
        let parts = RouterParts {
            quota: Arc::new(QuotaTracker::new(config.tiers.clone())?),
            cache: Arc::new(ResponseCache::new(config.cache)),
            local,
            remote,
            intent,
        };
        Self::new(config, parts)
    }

    pub fn quota(&self) -> &Arc<QuotaTracker> {
        &self.quota
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn analyzer(&self) -> &ComplexityAnalyzer {
        &self.analyzer
    }

    pub fn quota_snapshot(&self) -> Vec<QuotaSnapshot> {
        self.quota.snapshot()
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        let s = &self.stats;
        RouterStatsSnapshot {
            total_requests: s.total_requests.load(Ordering::Relaxed),
            cache_hits: s.cache_hits.load(Ordering::Relaxed),
            local_decisions: s.local_decisions.load(Ordering::Relaxed),
            remote_decisions: s.remote_decisions.load(Ordering::Relaxed),
            remote_successes: s.remote_successes.load(Ordering::Relaxed),
            fallbacks: s.fallbacks.load(Ordering::Relaxed),
            failures: s.failures.load(Ordering::Relaxed),
        }
    }

    /// Routes one query. Always returns a response; only a failure of the
    /// local path yields `success == false`.
    pub async fn route(&self, query: Query) -> RouteResponse {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let mut trace = TraceRecorder::new();
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut state = RouteState::CacheCheck;
        let fingerprint = query_fingerprint(&query);
        let mut score: Option<ComplexityScore> = None;
        let mut choice: Option<PathChoice> = None;
        let mut outcome: Option<Result<Executed>> = None;

        loop {
            debug!(request_id = %request_id, state = ?state, "route transition");
            state = match state {
                RouteState::CacheCheck => {
                    let step = trace.begin(steps::CACHE_CHECK, "Look up cached response");
                    match self.cache.get(&fingerprint) {
                        Some(hit) => {
                            trace.complete_with(
                                step,
                                "Cache hit",
                                json!({ "cache_hit": true, "fingerprint": fingerprint }),
                            );
                            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                            info!(request_id = %request_id, backend = %hit.backend_used, "served from cache");
                            return RouteResponse {
                                request_id,
                                success: true,
                                text: hit.text,
                                backend_used: hit.backend_used,
                                confidence: hit.confidence,
                                cache_hit: true,
                                path: None,
                                complexity: None,
                                trace: trace.into_steps(),
                                processing_time_ms: elapsed_ms(started),
                                error: None,
                            };
                        }
                        None => {
                            trace.complete(step, json!({ "cache_hit": false }));
                            RouteState::Classify
                        }
                    }
                }
                RouteState::Classify => {
                    let step = trace.begin(steps::CLASSIFY, "Score query complexity");
                    let s = self.analyzer.score(&query.text, query.context.as_ref());
                    trace.complete_with(
                        step,
                        format!("{} (total {:.1})", s.tier, s.total),
                        json!({
                            "tier": s.tier,
                            "total": s.total,
                            "normalized": s.normalized,
                            "linguistic": s.linguistic,
                            "technical": s.technical,
                            "reasoning": s.reasoning,
                            "response": s.response,
                            "signals": s.signals,
                        }),
                    );
                    score = Some(s);
                    RouteState::PathDecision
                }
                RouteState::PathDecision => {
                    let step = trace.begin(steps::PATH_DECISION, "Choose local or remote path");
                    let c = match query.options.mode {
                        RoutingMode::Local => PathChoice { path: RoutePath::Local, reason: "Local mode requested" },
                        RoutingMode::Remote => PathChoice { path: RoutePath::Remote, reason: "Remote mode requested" },
                        RoutingMode::Auto => {
                            let intent = self.intent.classify(&query.text);
                            debug!(
                                request_id = %request_id,
                                confidence = intent.confidence,
                                needs_complex_reasoning = intent.needs_complex_reasoning,
                                "intent classified"
                            );
                            match score.as_ref() {
                                Some(s) => decide_path(&self.path_config, intent, s),
                                None => PathChoice { path: RoutePath::Local, reason: "Cost-minimizing default" },
                            }
                        }
                    };
                    trace.complete_with(
                        step,
                        format!("Selected {} path: {}", c.path, c.reason),
                        json!({ "path": c.path, "reason": c.reason, "mode": query.options.mode }),
                    );
                    choice = Some(c);
                    match c.path {
                        RoutePath::Local => {
                            self.stats.local_decisions.fetch_add(1, Ordering::Relaxed);
                            RouteState::LocalExecute
                        }
                        RoutePath::Remote => {
                            self.stats.remote_decisions.fetch_add(1, Ordering::Relaxed);
                            RouteState::RemoteExecute
                        }
                    }
                }
                RouteState::LocalExecute => {
                    outcome = Some(self.run_local(&query, &mut trace, false).await);
                    RouteState::CacheStore
                }
                RouteState::RemoteExecute => {
                    let hint = score.as_ref().map(|s| s.tier).unwrap_or(ComplexityTier::Simple);
                    match self.run_remote(&query, hint, &mut trace).await {
                        Ok(executed) => {
                            self.stats.remote_successes.fetch_add(1, Ordering::Relaxed);
                            outcome = Some(Ok(executed));
                            RouteState::CacheStore
                        }
                        Err(e) => {
                            self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                            let expected = e.is_remote_failure();
                            if expected {
                                warn!(request_id = %request_id, error = %e, "remote path failed, falling back to local");
                            } else {
                                error!(request_id = %request_id, error = %e, "unexpected remote path error, falling back to local");
                            }
                            let step = trace.begin(steps::FALLBACK, "Remote path failed, falling back to local path");
                            trace.complete(
                                step,
                                json!({ "error": e.to_string(), "code": e.code(), "expected": expected }),
                            );
                            RouteState::FallbackLocalExecute
                        }
                    }
                }
                RouteState::FallbackLocalExecute => {
                    outcome = Some(self.run_local(&query, &mut trace, true).await);
                    RouteState::CacheStore
                }
                RouteState::CacheStore => {
                    if let Some(Ok(executed)) = &outcome {
                        let step = trace.begin(steps::CACHE_STORE, "Store response");
                        self.cache.put(
                            fingerprint.clone(),
                            CachedResponse {
                                text: executed.output.text.clone(),
                                backend_used: executed.backend.clone(),
                                confidence: executed.output.confidence,
                            },
                        );
                        trace.complete(step, json!({ "fingerprint": fingerprint }));
                    }
                    RouteState::Done
                }
                RouteState::Done => break,
            };
        }

        let processing_time_ms = elapsed_ms(started);
        let path = choice.map(|c| c.path);
        match outcome {
            Some(Ok(executed)) => {
                info!(
                    request_id = %request_id,
                    backend = %executed.backend,
                    elapsed_ms = processing_time_ms,
                    "query routed"
                );
                RouteResponse {
                    request_id,
                    success: true,
                    text: executed.output.text,
                    backend_used: executed.backend,
                    confidence: executed.output.confidence,
                    cache_hit: false,
                    path,
                    complexity: score,
                    trace: trace.into_steps(),
                    processing_time_ms,
                    error: None,
                }
            }
            Some(Err(e)) => self.failed(request_id, e, path, score, trace, processing_time_ms),
            None => self.failed(
                request_id,
                QrError::LocalPath("no path was executed".into()),
                path,
                score,
                trace,
                processing_time_ms,
            ),
        }
    }

    fn failed(
        &self,
        request_id: String,
        error: QrError,
        path: Option<RoutePath>,
        score: Option<ComplexityScore>,
        trace: TraceRecorder,
        processing_time_ms: u64,
    ) -> RouteResponse {
        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        warn!(request_id = %request_id, error = %error, "query failed on the local path");
        RouteResponse {
            request_id,
            success: false,
            text: String::new(),
            backend_used: LOCAL_BACKEND.into(),
            confidence: 0.0,
            cache_hit: false,
            path,
            complexity: score,
            trace: trace.into_steps(),
            processing_time_ms,
            error: Some(error.to_string()),
        }
    }

    async fn run_local(&self, query: &Query, trace: &mut TraceRecorder, fallback: bool) -> Result<Executed> {
        let description = if fallback { "Answer locally after remote failure" } else { "Answer locally" };
        let step = trace.begin(steps::LOCAL_EXECUTE, description);
        match self.local.run(query).await {
            Ok(output) => {
                trace.complete(step, json!({ "fallback": fallback, "confidence": output.confidence }));
                Ok(Executed { output, backend: LOCAL_BACKEND.into() })
            }
            Err(e) => {
                let e = match e {
                    QrError::LocalPath(_) => e,
                    other => QrError::LocalPath(other.to_string()),
                };
                trace.fail(step, "Local path failed", json!({ "fallback": fallback, "error": e.to_string() }));
                Err(e)
            }
        }
    }

    async fn run_remote(
        &self,
        query: &Query,
        hint: ComplexityTier,
        trace: &mut TraceRecorder,
    ) -> Result<Executed> {
        let step = trace.begin(steps::BACKEND_SELECTION, format!("Pick a backend tier for {hint} query"));
        let preferred = self
            .selector
            .fallback_chain(hint, &self.quota)
            .first()
            .map(|t| t.name.clone())
            .unwrap_or_default();

        let Some(permit) = self.selector.pick_and_reserve(hint, &self.quota) else {
            let e = QrError::QuotaExhausted { hint };
            trace.fail(step, "No tier has quota left", json!({ "hint": hint, "preferred": preferred }));
            return Err(e);
        };
        let tier = permit.tier().clone();
        trace.complete_with(
            step,
            format!("Selected tier {}", tier.name),
            json!({ "tier": tier.name, "preferred": preferred, "degraded": tier.name != preferred }),
        );

        let timeout = query.options.timeout_ms.map(Duration::from_millis).unwrap_or(self.default_timeout);
        let step = trace.begin(steps::REMOTE_EXECUTE, format!("Call backend {} ({})", tier.name, tier.model));
        let result = match tokio::time::timeout(timeout, self.remote.run(query, &tier, timeout)).await {
            Ok(r) => r,
            Err(_) => Err(QrError::BackendTimeout { tier: tier.name.clone(), timeout_ms: timeout.as_millis() as u64 }),
        };

        match result {
            Ok(output) => {
                permit.commit();
                trace.complete(step, json!({ "tier": tier.name, "confidence": output.confidence }));
                Ok(Executed { output, backend: tier.name })
            }
            Err(e) => {
                // Unused reservation goes back to the tier.
                drop(permit);
                trace.fail(step, format!("Backend {} failed", tier.name), json!({ "error": e.to_string(), "code": e.code() }));
                Err(e)
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
