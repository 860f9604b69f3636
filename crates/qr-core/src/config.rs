use crate::error::{QrError, Result};
use crate::types::ComplexityTier;
use crate::vocabulary;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_ENV: &str = "QR_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub tiers: Vec<BackendTierConfig>,
    pub complexity: ComplexityConfig,
    pub routing: PathConfig,
    pub cache: CacheConfig,
    pub timeouts: TimeoutConfig,
    pub server: ServerConfig,
}

/// One backend tier. Tiers are listed cheapest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendTierConfig {
    pub name: String,
    /// Identifier handed to the remote executor (model name, endpoint key...).
    #[serde(default)]
    pub model: String,
    pub rpm: u32,
    pub rpd: u32,
    pub max_complexity: ComplexityTier,
}

impl BackendTierConfig {
    pub fn new(name: &str, model: &str, rpm: u32, rpd: u32, max_complexity: ComplexityTier) -> Self {
        Self { name: name.into(), model: model.into(), rpm, rpd, max_complexity }
    }
}

pub fn default_tiers() -> Vec<BackendTierConfig> {
    vec![
        BackendTierConfig::new("lite", "gemini-2.0-flash-lite", 30, 1500, ComplexityTier::Simple),
        BackendTierConfig::new("standard", "gemini-2.0-flash", 15, 1500, ComplexityTier::Medium),
        BackendTierConfig::new("pro", "gemini-2.5-pro", 5, 25, ComplexityTier::Complex),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityConfig {
    pub caps: SubScoreCaps,
    pub thresholds: TierThresholds,
    pub linguistic: LinguisticConfig,
    pub categories: Vec<VocabularyCategory>,
    pub patterns: PatternConfig,
    pub response_hints: Vec<ResponseHint>,
}

impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            caps: SubScoreCaps::default(),
            thresholds: TierThresholds::default(),
            linguistic: LinguisticConfig::default(),
            categories: vocabulary::default_categories(),
            patterns: vocabulary::default_patterns(),
            response_hints: vocabulary::default_response_hints(),
        }
    }
}

/// Maximum value of each sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubScoreCaps {
    pub linguistic: f64,
    pub technical: f64,
    pub reasoning: f64,
    pub response: f64,
}

impl SubScoreCaps {
    pub fn sum(&self) -> f64 {
        self.linguistic + self.technical + self.reasoning + self.response
    }
}

impl Default for SubScoreCaps {
    fn default() -> Self {
        Self { linguistic: 20.0, technical: 30.0, reasoning: 30.0, response: 20.0 }
    }
}

/// `total <= simple_max` is simple, `total <= medium_max` is medium, else complex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub simple_max: f64,
    pub medium_max: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self { simple_max: 30.0, medium_max: 60.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinguisticConfig {
    /// One point per this many characters.
    pub chars_per_point: f64,
    /// Points per sentence after the first.
    pub sentence_points: f64,
    /// Points per question mark after the first.
    pub question_points: f64,
}

impl Default for LinguisticConfig {
    fn default() -> Self {
        Self { chars_per_point: 25.0, sentence_points: 2.0, question_points: 1.5 }
    }
}

/// Domain vocabulary bucket; each distinct matched term adds `weight`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyCategory {
    pub name: String,
    pub weight: f64,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSet {
    pub increment: f64,
    pub patterns: Vec<String>,
}

/// Query shape patterns, checked in order simple, medium, complex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub simple: PatternSet,
    pub medium: PatternSet,
    pub complex: PatternSet,
}

impl Default for PatternConfig {
    fn default() -> Self {
        vocabulary::default_patterns()
    }
}

/// Expected output shape (short fact, list, report, chart...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseHint {
    pub shape: String,
    pub points: f64,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Intent confidence above this allows the local path.
    pub high_confidence: f64,
    /// Intent confidence below this forces the remote path.
    pub low_confidence: f64,
    /// Normalized complexity at or below this allows the local path.
    pub local_score_ceiling: f64,
    /// Normalized complexity above this forces the remote path.
    pub remote_score_floor: f64,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self { high_confidence: 0.7, low_confidence: 0.5, local_score_ceiling: 0.5, remote_score_floor: 0.7 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300, max_entries: 1000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub remote_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { remote_ms: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub remote_endpoint: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 8080, remote_endpoint: None }
    }
}

impl RouterConfig {
    /// Defaults with the built-in tier table.
    pub fn with_default_tiers() -> Self {
        Self { tiers: default_tiers(), ..Self::default() }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut config: RouterConfig = toml::from_str(s)?;
        if config.tiers.is_empty() {
            config.tiers = default_tiers();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Reads `$QR_CONFIG` when set, then applies `QR_*` overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                tracing::info!(path = %path, "loading router config");
                Self::load(path)?
            }
            Err(_) => Self::with_default_tiers(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("QR_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_env("QR_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("QR_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse_env("QR_CACHE_MAX_ENTRIES", &v)?;
        }
        if let Some(v) = lookup("QR_REMOTE_TIMEOUT_MS") {
            self.timeouts.remote_ms = parse_env("QR_REMOTE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("QR_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("QR_PORT") {
            self.server.port = parse_env("QR_PORT", &v)?;
        }
        if let Some(v) = lookup("QR_REMOTE_ENDPOINT") {
            self.server.remote_endpoint = Some(v).filter(|s| !s.trim().is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.tiers.is_empty() {
            return Err(QrError::Config("at least one backend tier is required".into()));
        }
        let mut seen = HashSet::new();
        for tier in &self.tiers {
            if tier.name.trim().is_empty() {
                return Err(QrError::Config("tier name must not be empty".into()));
            }
            if !seen.insert(tier.name.as_str()) {
                return Err(QrError::Config(format!("duplicate tier '{}'", tier.name)));
            }
            if tier.rpm == 0 || tier.rpd == 0 {
                return Err(QrError::Config(format!("tier '{}' must allow at least one request per window", tier.name)));
            }
        }
        if self.tiers.windows(2).any(|w| w[0].max_complexity > w[1].max_complexity) {
            return Err(QrError::Config("tiers must be listed in non-decreasing capability order".into()));
        }

        let t = &self.complexity.thresholds;
        if !(t.simple_max >= 0.0 && t.simple_max < t.medium_max) {
            return Err(QrError::Config(format!(
                "thresholds must satisfy 0 <= simple_max < medium_max (got {} / {})",
                t.simple_max, t.medium_max
            )));
        }
        let caps = &self.complexity.caps;
        if [caps.linguistic, caps.technical, caps.reasoning, caps.response].iter().any(|c| *c < 0.0) || caps.sum() <= 0.0 {
            return Err(QrError::Config("sub-score caps must be non-negative with a positive sum".into()));
        }
        if self.complexity.linguistic.chars_per_point <= 0.0 {
            return Err(QrError::Config("linguistic.chars_per_point must be positive".into()));
        }
        let p = &self.complexity.patterns;
        for pattern in p.simple.patterns.iter().chain(&p.medium.patterns).chain(&p.complex.patterns) {
            regex::Regex::new(pattern).map_err(|e| QrError::Config(format!("invalid pattern '{pattern}': {e}")))?;
        }

        let r = &self.routing;
        if r.low_confidence > r.high_confidence {
            return Err(QrError::Config("routing.low_confidence must not exceed routing.high_confidence".into()));
        }
        if r.local_score_ceiling > r.remote_score_floor {
            return Err(QrError::Config("routing.local_score_ceiling must not exceed routing.remote_score_floor".into()));
        }
        if self.cache.max_entries == 0 {
            return Err(QrError::Config("cache.max_entries must be at least 1".into()));
        }
        if self.timeouts.remote_ms == 0 {
            return Err(QrError::Config("timeouts.remote_ms must be positive".into()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| QrError::Config(format!("{key}: cannot parse '{value}'")))
}
