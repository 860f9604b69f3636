//! Default domain vocabulary, shape patterns and response hints.

use crate::config::{PatternConfig, PatternSet, ResponseHint, VocabularyCategory};

fn s(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn category(name: &str, weight: f64, terms: &[&str]) -> VocabularyCategory {
    VocabularyCategory { name: name.into(), weight, terms: s(terms) }
}

fn hint(shape: &str, points: f64, keywords: &[&str]) -> ResponseHint {
    ResponseHint { shape: shape.into(), points, keywords: s(keywords) }
}

pub fn default_categories() -> Vec<VocabularyCategory> {
    vec![
        category("system", 3.0, &[
            "cpu", "memory", "disk", "load average", "process", "swap", "uptime",
            "서버", "메모리", "디스크",
        ]),
        category("network", 3.0, &[
            "latency", "bandwidth", "packet", "dns", "throughput", "network",
            "네트워크", "지연",
        ]),
        category("database", 4.0, &[
            "database", "query plan", "index", "replication", "deadlock", "postgres", "sql",
            "데이터베이스",
        ]),
        category("incident", 4.0, &[
            "incident", "outage", "anomaly", "alert", "error rate", "failure",
            "장애", "이상",
        ]),
        category("capacity", 5.0, &[
            "capacity", "scaling", "autoscal", "forecast", "trend", "saturation",
            "용량", "추세",
        ]),
        category("security", 5.0, &[
            "vulnerability", "intrusion", "certificate", "firewall", "ssl",
            "보안",
        ]),
    ]
}

pub fn default_patterns() -> PatternConfig {
    PatternConfig {
        simple: PatternSet {
            increment: 1.0,
            patterns: s(&[
                r"^(hi|hello|hey|안녕)",
                r"^(what is|what's|show|list)\b",
                r"\bstatus\b",
            ]),
        },
        medium: PatternSet {
            increment: 6.0,
            patterns: s(&[
                r"\b(compare|difference|between|why)\b",
                r"\bhow (do|can|to|does)\b",
                r"\b(top|highest|lowest)\s+\d*",
                r"(비교|차이)",
            ]),
        },
        complex: PatternSet {
            increment: 12.0,
            patterns: s(&[
                r"\b(root cause|correlat\w*|predict\w*|optimi[sz]\w*)\b",
                r"\bfirst\b.*\bthen\b",
                r"\b(step by step|trade-?offs?)\b",
                r"\bwhat if\b",
                r"(예측|원인 분석|최적화)",
            ]),
        },
    }
}

pub fn default_response_hints() -> Vec<ResponseHint> {
    vec![
        hint("short_fact", 2.0, &["what is", "how many", "is it", "status", "상태"]),
        hint("list", 6.0, &["list", "show all", "top ", "which servers", "목록"]),
        hint("report", 14.0, &["report", "summary", "summarize", "analysis", "analyze", "보고서", "분석"]),
        hint("chart_prediction", 18.0, &["chart", "graph", "predict", "forecast", "trend", "예측"]),
    ]
}
