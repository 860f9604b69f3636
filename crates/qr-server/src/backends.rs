//! Built-in collaborators used by the binary.

use async_trait::async_trait;
use qr_core::error::{QrError, Result};
use qr_core::types::{Query, QueryContext};
use qr_router::{normalize_query, BackendTier, ExecutionOutput, IntentClassifier, IntentSignal, LocalExecutor, RemoteExecutor};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const GREETINGS: &[&str] = &["hi", "hello", "hey", "안녕"];

const GREETING_ANSWER: &str =
    "Hello! Ask me about server status, alerts, resource usage or capacity trends.";

const GUIDANCE_ANSWER: &str =
    "I can answer status and lookup questions locally. Try asking about a specific server, alert or metric.";

fn is_greeting(text: &str) -> bool {
    let Some(first) = text.split_whitespace().next() else { return false };
    let word = first.trim_end_matches(|c: char| !c.is_alphanumeric());
    GREETINGS.iter().any(|g| word == *g || (!g.is_ascii() && word.starts_with(g)))
}

/// Keyword-triggered canned answer.
#[derive(Debug, Clone)]
pub struct LocalRule {
    pub keywords: Vec<String>,
    pub answer: String,
    pub confidence: f64,
}

impl LocalRule {
    pub fn new(keywords: &[&str], answer: &str, confidence: f64) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            answer: answer.to_string(),
            confidence,
        }
    }

    fn matches(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

pub fn default_rules() -> Vec<LocalRule> {
    vec![
        LocalRule::new(
            &["status", "상태", "health"],
            "All monitored servers are reporting. Open the dashboard for per-server status.",
            0.85,
        ),
        LocalRule::new(
            &["alert", "경고", "알림"],
            "Active alerts are listed on the alerts panel, newest first.",
            0.8,
        ),
        LocalRule::new(
            &["cpu", "memory", "disk", "메모리", "디스크"],
            "Current resource usage is shown per server on the metrics panel.",
            0.75,
        ),
        LocalRule::new(
            &["list", "show", "목록"],
            "Use the server list to filter by role, location or state.",
            0.7,
        ),
    ]
}

/// Fast local answers from a fixed rule table. Never calls out.
pub struct RuleBasedLocalExecutor {
    rules: Vec<LocalRule>,
}

impl RuleBasedLocalExecutor {
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<LocalRule>) -> Self {
        Self { rules }
    }
}

impl Default for RuleBasedLocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn context_note(context: Option<&QueryContext>) -> String {
    match context.map(|c| c.domain_objects.len()).unwrap_or(0) {
        0 => String::new(),
        1 => " (1 object in context)".to_string(),
        n => format!(" ({n} objects in context)"),
    }
}

#[async_trait]
impl LocalExecutor for RuleBasedLocalExecutor {
    async fn run(&self, query: &Query) -> Result<ExecutionOutput> {
        let text = normalize_query(&query.text);
        if is_greeting(&text) {
            return Ok(ExecutionOutput::new(GREETING_ANSWER, 0.95));
        }
        let note = context_note(query.context.as_ref());
        match self.rules.iter().find(|r| r.matches(&text)) {
            Some(rule) => Ok(ExecutionOutput::new(format!("{}{note}", rule.answer), rule.confidence)),
            None => {
                debug!("no local rule matched, returning guidance");
                Ok(ExecutionOutput::new(format!("{GUIDANCE_ANSWER}{note}"), 0.3))
            }
        }
    }
}

/// Intent confidence from keyword coverage.
pub struct KeywordIntentClassifier {
    known: Vec<&'static str>,
    complex: Vec<&'static str>,
}

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self {
            known: vec![
                "status", "server", "cpu", "memory", "disk", "alert", "list", "show", "network",
                "서버", "상태", "메모리", "알림",
            ],
            complex: vec![
                "analyze", "analysis", "predict", "forecast", "root cause", "correlat", "why",
                "optimi", "report", "분석", "예측", "원인",
            ],
        }
    }
}

impl Default for KeywordIntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&self, query: &str) -> IntentSignal {
        let text = normalize_query(query);
        let needs_complex_reasoning = self.complex.iter().any(|k| text.contains(k));
        let confidence = if is_greeting(&text) {
            0.95
        } else {
            let hits = self.known.iter().filter(|k| text.contains(*k)).count();
            (0.4 + 0.2 * hits as f64).min(0.95)
        };
        IntentSignal { confidence, needs_complex_reasoning }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a QueryContext>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    text: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Posts `{ model, prompt, context }` to `{endpoint}/generate`.
pub struct HttpRemoteExecutor {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpRemoteExecutor {
    /// Without an endpoint every call fails, so the router always falls back.
    pub fn new(endpoint: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| QrError::Config(format!("http client: {e}")))?;
        let endpoint = endpoint.map(|e| e.trim_end_matches('/').to_string());
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl RemoteExecutor for HttpRemoteExecutor {
    async fn run(&self, query: &Query, tier: &BackendTier, timeout: Duration) -> Result<ExecutionOutput> {
        let backend_err = |message: String| QrError::Backend { tier: tier.name.clone(), message };
        let Some(endpoint) = &self.endpoint else {
            return Err(backend_err("no remote endpoint configured".into()));
        };
        let url = format!("{endpoint}/generate");
        let body = GenerateRequest { model: &tier.model, prompt: &query.text, context: query.context.as_ref() };

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    QrError::BackendTimeout { tier: tier.name.clone(), timeout_ms: timeout.as_millis() as u64 }
                } else {
                    backend_err(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(tier = %tier.name, status = %status, "remote backend rejected request");
            return Err(backend_err(format!("HTTP {status}: {}", text.chars().take(200).collect::<String>())));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| backend_err(format!("invalid response: {e}")))?;
        Ok(ExecutionOutput::new(parsed.text, parsed.confidence.unwrap_or(0.9)))
    }
}
