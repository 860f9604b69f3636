use crate::*;
use chrono::{DateTime, Duration, Local, TimeZone};
use qr_core::config::{CacheConfig, ComplexityConfig, PathConfig, TierThresholds};
use qr_core::error::QrError;
use qr_core::types::{ComplexityScore, ComplexityTier, QueryContext, RoutePath, RoutingMode, StepStatus};
use std::sync::Arc;

fn start() -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 3, 10, 12, 0, 30).single().unwrap()
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start()))
}

fn tiers(rpm: u32, rpd: u32) -> Vec<BackendTier> {
    vec![
        BackendTier::new("lite", "m-lite", rpm, rpd, ComplexityTier::Simple),
        BackendTier::new("standard", "m-standard", rpm, rpd, ComplexityTier::Medium),
        BackendTier::new("pro", "m-pro", rpm, rpd, ComplexityTier::Complex),
    ]
}

fn tracker(rpm: u32, rpd: u32, clock: Arc<ManualClock>) -> QuotaTracker {
    QuotaTracker::with_clock(tiers(rpm, rpd), clock).unwrap()
}

fn remaining(t: &QuotaTracker, name: &str) -> (u32, u32) {
    let s = t.snapshot().into_iter().find(|s| s.name == name).unwrap();
    (s.remaining_minute, s.remaining_day)
}

fn analyzer() -> ComplexityAnalyzer {
    ComplexityAnalyzer::new(ComplexityConfig::default()).unwrap()
}

fn cached(text: &str) -> CachedResponse {
    CachedResponse { text: text.into(), backend_used: "local".into(), confidence: 0.9 }
}

// ========== Complexity ==========

#[test]
fn test_greeting_is_simple() {
    let s = analyzer().score("hi", None);
    assert_eq!(s.tier, ComplexityTier::Simple);
    assert!(s.total < 5.0);
}

#[test]
fn test_empty_query_minimal() {
    let s = analyzer().score("", None);
    assert_eq!(s.total, 0.0);
    assert_eq!(s.normalized, 0.0);
    assert_eq!(s.tier, ComplexityTier::Simple);
    assert!(s.signals.is_empty());
}

#[test]
fn test_whitespace_query_minimal() {
    let s = analyzer().score("   \n  ", None);
    assert_eq!(s.total, 0.0);
}

#[test]
fn test_complex_analysis_query() {
    let q = "First analyze the root cause of the cpu and memory anomaly on the database servers, \
             then predict the capacity trend for next week and produce a report with a chart.";
    let s = analyzer().score(q, None);
    assert_eq!(s.tier, ComplexityTier::Complex);
    assert!(s.reasoning >= 24.0);
    assert_eq!(s.response, 18.0);
    assert!(s.signals.iter().any(|x| x.contains("complex-shape")));
}

#[test]
fn test_total_is_sum_of_subscores() {
    let s = analyzer().score("why is disk latency high? list the top 5 servers. summarize it.", None);
    let sum = s.linguistic + s.technical + s.reasoning + s.response;
    assert!((s.total - sum).abs() < 1e-9);
}

#[test]
fn test_subscores_clamped_to_caps() {
    let q = "cpu memory disk swap uptime process latency bandwidth packet dns throughput network \
             database index replication deadlock incident outage anomaly alert failure";
    let a = analyzer();
    let s = a.score(&q.repeat(20), None);
    let caps = a.config().caps;
    assert_eq!(s.technical, caps.technical);
    assert_eq!(s.linguistic, caps.linguistic);
    assert!(s.reasoning <= caps.reasoning);
    assert!(s.response <= caps.response);
    assert!(s.normalized <= 1.0);
}

#[test]
fn test_response_shape_takes_largest_hint() {
    let s = analyzer().score("list servers and forecast next month", None);
    assert_eq!(s.response, 18.0);
    assert!(s.signals.iter().any(|x| x.contains("chart_prediction")));
}

#[test]
fn test_domain_context_raises_technical() {
    let a = analyzer();
    let plain = a.score("how are things", None);
    let ctx = QueryContext {
        domain_objects: vec![serde_json::json!({"id": "web-01"}), serde_json::json!({"id": "web-02"})],
        ..Default::default()
    };
    let with_ctx = a.score("how are things", Some(&ctx));
    assert_eq!(with_ctx.technical, plain.technical + 4.0);
}

#[test]
fn test_korean_vocabulary() {
    let s = analyzer().score("서버 장애 원인 분석", None);
    assert!(s.technical > 0.0);
    assert!(s.reasoning >= 12.0);
}

#[test]
fn test_tier_thresholds() {
    let a = analyzer();
    assert_eq!(a.tier_for(30.0), ComplexityTier::Simple);
    assert_eq!(a.tier_for(30.5), ComplexityTier::Medium);
    assert_eq!(a.tier_for(60.0), ComplexityTier::Medium);
    assert_eq!(a.tier_for(60.5), ComplexityTier::Complex);
}

#[test]
fn test_thresholds_are_configurable() {
    let mut cfg = ComplexityConfig::default();
    cfg.thresholds = TierThresholds { simple_max: 0.5, medium_max: 1.0 };
    let a = ComplexityAnalyzer::new(cfg).unwrap();
    assert_eq!(a.score("hi", None).tier, ComplexityTier::Complex);
}

#[test]
fn test_category_weights_are_configurable() {
    let mut cfg = ComplexityConfig::default();
    for c in &mut cfg.categories {
        c.weight = 0.0;
    }
    let a = ComplexityAnalyzer::new(cfg).unwrap();
    assert_eq!(a.score("cpu memory disk", None).technical, 0.0);
}

#[test]
fn test_invalid_pattern_rejected() {
    let mut cfg = ComplexityConfig::default();
    cfg.patterns.medium.patterns.push("([".into());
    assert!(matches!(ComplexityAnalyzer::new(cfg), Err(QrError::Config(_))));
}

#[test]
fn test_scoring_is_pure() {
    let a = analyzer();
    let q = "compare cpu usage between web-01 and web-02";
    assert_eq!(a.score(q, None), a.score(q, None));
}

// ========== Quota ==========

#[test]
fn test_record_decrements_both_counters() {
    let t = tracker(3, 10, clock());
    t.record("lite", true).unwrap();
    assert_eq!(remaining(&t, "lite"), (2, 9));
    assert_eq!(remaining(&t, "pro"), (3, 10));
}

#[test]
fn test_failed_call_consumes_nothing() {
    let t = tracker(3, 10, clock());
    t.record("lite", false).unwrap();
    assert_eq!(remaining(&t, "lite"), (3, 10));
}

#[test]
fn test_counters_never_negative() {
    let t = tracker(2, 10, clock());
    let mut last = remaining(&t, "lite");
    for _ in 0..5 {
        t.record("lite", true).unwrap();
        let now = remaining(&t, "lite");
        assert!(now.0 <= last.0 && now.1 <= last.1);
        last = now;
    }
    assert_eq!(remaining(&t, "lite").0, 0);
    assert!(!t.can_use("lite").unwrap());
}

#[test]
fn test_minute_reset_restores_ceiling() {
    let c = clock();
    let t = tracker(2, 10, c.clone());
    t.record("lite", true).unwrap();
    t.record("lite", true).unwrap();
    assert!(!t.can_use("lite").unwrap());

    c.advance(Duration::seconds(29));
    assert!(!t.can_use("lite").unwrap());

    c.advance(Duration::seconds(1));
    assert!(t.can_use("lite").unwrap());
    assert_eq!(remaining(&t, "lite"), (2, 8));
}

#[test]
fn test_minute_boundary_is_top_of_next_minute() {
    let c = clock();
    let t = tracker(2, 10, c.clone());
    let snap = &t.snapshot()[0];
    assert_eq!(snap.next_minute_reset, Local.with_ymd_and_hms(2026, 3, 10, 12, 1, 0).single().unwrap());

    c.advance(Duration::minutes(5));
    t.record("lite", true).unwrap();
    let snap = &t.snapshot()[0];
    assert_eq!(snap.next_minute_reset, Local.with_ymd_and_hms(2026, 3, 10, 12, 6, 0).single().unwrap());
}

#[test]
fn test_day_reset_at_midnight() {
    let c = clock();
    let t = tracker(10, 2, c.clone());
    t.record("pro", true).unwrap();
    t.record("pro", true).unwrap();
    assert!(!t.can_use("pro").unwrap());

    c.advance(Duration::minutes(2));
    assert!(!t.can_use("pro").unwrap());

    c.set(Local.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).single().unwrap());
    assert!(t.can_use("pro").unwrap());
    assert_eq!(remaining(&t, "pro"), (10, 2));
    let snap = t.snapshot().into_iter().find(|s| s.name == "pro").unwrap();
    assert_eq!(snap.next_day_reset, Local.with_ymd_and_hms(2026, 3, 12, 0, 0, 0).single().unwrap());
}

#[test]
fn test_unknown_tier() {
    let t = tracker(2, 10, clock());
    assert!(matches!(t.can_use("ultra"), Err(QrError::UnknownTier(_))));
    assert!(t.record("ultra", true).is_err());
}

#[test]
fn test_duplicate_tier_rejected() {
    let mut ts = tiers(1, 1);
    ts[1].name = "lite".into();
    assert!(QuotaTracker::with_clock(ts, clock()).is_err());
}

#[test]
fn test_available_tiers_in_capability_order() {
    let t = tracker(1, 10, clock());
    t.record("standard", true).unwrap();
    let names: Vec<_> = t.available_tiers().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["lite", "pro"]);
}

#[test]
fn test_snapshot_usage_pct() {
    let t = tracker(4, 10, clock());
    t.record("lite", true).unwrap();
    let s = &t.snapshot()[0];
    assert_eq!(s.used_minute_pct, 25.0);
    assert_eq!(s.used_day_pct, 10.0);
}

#[test]
fn test_permit_commit_consumes() {
    let t = tracker(2, 10, clock());
    let permit = t.try_acquire("lite").unwrap().unwrap();
    assert_eq!(permit.tier().name, "lite");
    permit.commit();
    assert_eq!(remaining(&t, "lite"), (1, 9));
}

#[test]
fn test_permit_drop_refunds() {
    let t = tracker(2, 10, clock());
    {
        let _permit = t.try_acquire("lite").unwrap().unwrap();
        assert_eq!(remaining(&t, "lite"), (1, 9));
    }
    assert_eq!(remaining(&t, "lite"), (2, 10));
}

#[test]
fn test_permit_refund_after_reset_does_not_overflow() {
    let c = clock();
    let t = tracker(1, 10, c.clone());
    let permit = t.try_acquire("lite").unwrap().unwrap();
    c.advance(Duration::seconds(45));
    drop(permit);
    assert_eq!(remaining(&t, "lite"), (1, 10));
}

#[test]
fn test_try_acquire_exhausted() {
    let t = tracker(1, 10, clock());
    t.try_acquire("lite").unwrap().unwrap().commit();
    assert!(t.try_acquire("lite").unwrap().is_none());
}

#[test]
fn test_concurrent_last_unit() {
    let t = tracker(1, 100, clock());
    let successes = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| t.try_acquire("pro").unwrap().map(|p| p.commit()).is_some()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count()
    });
    assert_eq!(successes, 1);
    assert!(!t.can_use("pro").unwrap());
}

// ========== Cache ==========

#[test]
fn test_cache_put_then_get() {
    let c = ResponseCache::with_clock(CacheConfig { ttl_secs: 60, max_entries: 4 }, clock());
    c.put("k", cached("v"));
    assert_eq!(c.get("k"), Some(cached("v")));
    assert_eq!(c.peek("k").unwrap().hits, 1);
    assert_eq!(c.stats().hits, 1);
}

#[test]
fn test_cache_miss() {
    let c = ResponseCache::new(CacheConfig::default());
    assert!(c.get("missing").is_none());
    assert_eq!(c.stats().misses, 1);
}

#[test]
fn test_cache_ttl_expiry() {
    let clk = clock();
    let c = ResponseCache::with_clock(CacheConfig { ttl_secs: 60, max_entries: 4 }, clk.clone());
    c.put("k", cached("v"));
    clk.advance(Duration::seconds(59));
    assert!(c.get("k").is_some());
    clk.advance(Duration::seconds(1));
    assert!(c.get("k").is_none());
    assert_eq!(c.stats().expirations, 1);
    assert!(c.is_empty());
}

#[test]
fn test_cache_eviction_bound() {
    let c = ResponseCache::with_clock(CacheConfig { ttl_secs: 60, max_entries: 3 }, clock());
    for i in 0..4 {
        c.put(format!("k{i}"), cached(&i.to_string()));
    }
    assert_eq!(c.len(), 3);
    assert!(c.get("k0").is_none());
    assert!(c.get("k3").is_some());
    assert_eq!(c.stats().evictions, 1);
}

#[test]
fn test_cache_hits_do_not_affect_eviction() {
    let c = ResponseCache::with_clock(CacheConfig { ttl_secs: 60, max_entries: 2 }, clock());
    c.put("a", cached("a"));
    c.put("b", cached("b"));
    for _ in 0..5 {
        c.get("a");
    }
    c.put("c", cached("c"));
    assert!(c.peek("a").is_none());
    assert!(c.peek("b").is_some());
}

#[test]
fn test_cache_overwrite_refreshes_insertion() {
    let c = ResponseCache::with_clock(CacheConfig { ttl_secs: 60, max_entries: 2 }, clock());
    c.put("a", cached("a1"));
    c.put("b", cached("b"));
    c.put("a", cached("a2"));
    assert_eq!(c.len(), 2);
    c.put("c", cached("c"));
    assert!(c.peek("b").is_none());
    assert_eq!(c.get("a").unwrap().text, "a2");
}

#[test]
fn test_cache_purge_expired() {
    let clk = clock();
    let c = ResponseCache::with_clock(CacheConfig { ttl_secs: 10, max_entries: 8 }, clk.clone());
    c.put("a", cached("a"));
    clk.advance(Duration::seconds(5));
    c.put("b", cached("b"));
    clk.advance(Duration::seconds(6));
    assert_eq!(c.purge_expired(), 1);
    assert_eq!(c.len(), 1);
}

#[test]
fn test_fingerprint_normalization() {
    let a = fingerprint("  Hi   there ", RoutingMode::Auto, false);
    let b = fingerprint("hi there", RoutingMode::Auto, false);
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert_eq!(normalize_query("  CPU\tusage\n now "), "cpu usage now");
}

#[test]
fn test_fingerprint_mode_and_context() {
    let base = fingerprint("hi", RoutingMode::Local, false);
    assert_ne!(base, fingerprint("hi", RoutingMode::Remote, false));
    assert_ne!(base, fingerprint("hi", RoutingMode::Local, true));
}

// ========== Selector ==========

#[test]
fn test_pick_preferred_tier() {
    let t = tracker(2, 10, clock());
    let s = BackendSelector::new();
    assert_eq!(s.pick(ComplexityTier::Simple, &t).unwrap().name, "lite");
    assert_eq!(s.pick(ComplexityTier::Medium, &t).unwrap().name, "standard");
    assert_eq!(s.pick(ComplexityTier::Complex, &t).unwrap().name, "pro");
}

#[test]
fn test_pick_degrades_when_preferred_exhausted() {
    let t = tracker(1, 10, clock());
    t.record("standard", true).unwrap();
    let tier = BackendSelector::new().pick(ComplexityTier::Medium, &t).unwrap();
    assert_eq!(tier.name, "lite");
}

#[test]
fn test_degrade_never_escalate() {
    let t = tracker(1, 10, clock());
    t.record("standard", true).unwrap();
    t.record("pro", true).unwrap();
    let s = BackendSelector::new();
    assert_eq!(s.pick(ComplexityTier::Complex, &t).unwrap().name, "lite");

    let t = tracker(1, 10, clock());
    t.record("lite", true).unwrap();
    assert!(s.pick(ComplexityTier::Simple, &t).is_none());
}

#[test]
fn test_fallback_chain_order() {
    let t = tracker(1, 10, clock());
    let names: Vec<_> = BackendSelector::new()
        .fallback_chain(ComplexityTier::Complex, &t)
        .into_iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(names, vec!["pro", "lite", "standard"]);
}

#[test]
fn test_equal_capability_peer_is_a_fallback() {
    let ts = vec![
        BackendTier::new("lite", "m", 1, 10, ComplexityTier::Simple),
        BackendTier::new("pro-a", "m", 1, 10, ComplexityTier::Complex),
        BackendTier::new("pro-b", "m", 1, 10, ComplexityTier::Complex),
    ];
    let t = QuotaTracker::with_clock(ts, clock()).unwrap();
    t.record("pro-a", true).unwrap();
    t.record("lite", true).unwrap();
    assert_eq!(BackendSelector::new().pick(ComplexityTier::Complex, &t).unwrap().name, "pro-b");
}

#[test]
fn test_hint_above_every_tier_uses_most_capable() {
    let ts = vec![
        BackendTier::new("a", "m", 1, 1, ComplexityTier::Simple),
        BackendTier::new("b", "m", 1, 1, ComplexityTier::Medium),
    ];
    let t = QuotaTracker::with_clock(ts, clock()).unwrap();
    assert_eq!(BackendSelector::new().pick(ComplexityTier::Complex, &t).unwrap().name, "b");
}

#[test]
fn test_pick_and_reserve_consumes() {
    let t = tracker(1, 10, clock());
    let s = BackendSelector::new();
    let permit = s.pick_and_reserve(ComplexityTier::Simple, &t).unwrap();
    assert!(s.pick_and_reserve(ComplexityTier::Simple, &t).is_none());
    drop(permit);
    assert!(s.pick_and_reserve(ComplexityTier::Simple, &t).is_some());
}

// ========== Path Decision ==========

fn score_with(normalized: f64) -> ComplexityScore {
    ComplexityScore {
        linguistic: 0.0,
        technical: 0.0,
        reasoning: 0.0,
        response: 0.0,
        total: normalized * 100.0,
        normalized,
        tier: ComplexityTier::Simple,
        signals: vec![],
    }
}

fn intent(confidence: f64, needs_complex_reasoning: bool) -> IntentSignal {
    IntentSignal { confidence, needs_complex_reasoning }
}

#[test]
fn test_path_confident_simple_is_local() {
    let c = decide_path(&PathConfig::default(), intent(0.9, false), &score_with(0.2));
    assert_eq!(c.path, RoutePath::Local);
}

#[test]
fn test_path_complex_reasoning_is_remote() {
    let c = decide_path(&PathConfig::default(), intent(0.9, true), &score_with(0.2));
    assert_eq!(c.path, RoutePath::Remote);
    assert_eq!(c.reason, "Complex reasoning required");
}

#[test]
fn test_path_high_score_is_remote() {
    let c = decide_path(&PathConfig::default(), intent(0.9, false), &score_with(0.8));
    assert_eq!(c.path, RoutePath::Remote);
    assert_eq!(c.reason, "High query complexity");
}

#[test]
fn test_path_low_confidence_is_remote() {
    let c = decide_path(&PathConfig::default(), intent(0.3, false), &score_with(0.1));
    assert_eq!(c.path, RoutePath::Remote);
    assert_eq!(c.reason, "Low intent confidence");
}

#[test]
fn test_path_middle_defaults_local() {
    let c = decide_path(&PathConfig::default(), intent(0.6, false), &score_with(0.6));
    assert_eq!(c.path, RoutePath::Local);
    assert_eq!(c.reason, "Cost-minimizing default");
}

// ========== Trace ==========

#[test]
fn test_trace_records_in_order() {
    let mut t = TraceRecorder::new();
    let a = t.begin("A", "first");
    let b = t.begin("B", "second");
    t.complete(a, serde_json::json!({"ok": true}));
    t.fail(b, "broke", serde_json::Value::Null);
    let steps = t.into_steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].name, "A");
    assert_eq!(steps[0].status, StepStatus::Completed);
    assert_eq!(steps[0].metadata["ok"], true);
    assert_eq!(steps[1].status, StepStatus::Failed);
    assert_eq!(steps[1].description, "broke");
}

#[test]
fn test_trace_pending_until_finished() {
    let mut t = TraceRecorder::new();
    let _ = t.begin("A", "open");
    assert_eq!(t.steps()[0].status, StepStatus::Pending);
}
