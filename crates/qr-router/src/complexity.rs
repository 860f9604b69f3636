//! Four-factor complexity scorer. Runs without touching any backend.

use qr_core::config::{ComplexityConfig, PatternSet};
use qr_core::error::{QrError, Result};
use qr_core::types::{ComplexityScore, ComplexityTier, QueryContext};
use regex::Regex;

struct CompiledPatterns {
    increment: f64,
    label: &'static str,
    regexes: Vec<Regex>,
}

impl CompiledPatterns {
    fn compile(set: &PatternSet, label: &'static str) -> Result<Self> {
        let regexes = set
            .patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| QrError::Config(format!("invalid pattern '{p}': {e}"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { increment: set.increment, label, regexes })
    }
}

struct SubScore {
    score: f64,
    signal: Option<String>,
}

/// Scores a query into bounded sub-scores and a tier.
pub struct ComplexityAnalyzer {
    config: ComplexityConfig,
    patterns: [CompiledPatterns; 3],
}

impl ComplexityAnalyzer {
    pub fn new(config: ComplexityConfig) -> Result<Self> {
        let patterns = [
            CompiledPatterns::compile(&config.patterns.simple, "simple-shape")?,
            CompiledPatterns::compile(&config.patterns.medium, "medium-shape")?,
            CompiledPatterns::compile(&config.patterns.complex, "complex-shape")?,
        ];
        Ok(Self { config, patterns })
    }

    pub fn config(&self) -> &ComplexityConfig {
        &self.config
    }

    /// Always returns a score; an empty query gets minimal sub-scores.
    pub fn score(&self, query: &str, context: Option<&QueryContext>) -> ComplexityScore {
        let text = query.trim().to_lowercase();
        let caps = self.config.caps;

        let linguistic = self.score_linguistic(query.trim());
        let mut technical = self.score_technical(&text);
        let reasoning = self.score_reasoning(&text);
        let response = self.score_response(&text);

        // Attached domain objects mean the answer has to reason over them.
        if let Some(ctx) = context.filter(|c| c.has_domain_context()) {
            technical.score += 2.0 * ctx.domain_objects.len().min(5) as f64;
            technical.signal.get_or_insert_with(|| "domain-context".into());
        }

        let linguistic_v = clamp(linguistic.score, caps.linguistic);
        let technical_v = clamp(technical.score, caps.technical);
        let reasoning_v = clamp(reasoning.score, caps.reasoning);
        let response_v = clamp(response.score, caps.response);
        let total = linguistic_v + technical_v + reasoning_v + response_v;

        let max_total = caps.sum();
        let normalized = if max_total > 0.0 { (total / max_total).clamp(0.0, 1.0) } else { 0.0 };

        let signals = [linguistic, technical, reasoning, response]
            .into_iter()
            .filter_map(|s| s.signal)
            .collect();

        ComplexityScore {
            linguistic: linguistic_v,
            technical: technical_v,
            reasoning: reasoning_v,
            response: response_v,
            total,
            normalized,
            tier: self.tier_for(total),
            signals,
        }
    }

    pub fn tier_for(&self, total: f64) -> ComplexityTier {
        let t = self.config.thresholds;
        if total <= t.simple_max {
            ComplexityTier::Simple
        } else if total <= t.medium_max {
            ComplexityTier::Medium
        } else {
            ComplexityTier::Complex
        }
    }

    fn score_linguistic(&self, query: &str) -> SubScore {
        if query.is_empty() {
            return SubScore { score: 0.0, signal: None };
        }
        let cfg = self.config.linguistic;
        let chars = query.chars().count();
        let sentences = query
            .split(['.', '!', '?', '\n'])
            .filter(|s| !s.trim().is_empty())
            .count()
            .max(1);
        let questions = query.matches('?').count();

        let score = chars as f64 / cfg.chars_per_point
            + (sentences - 1) as f64 * cfg.sentence_points
            + questions.saturating_sub(1) as f64 * cfg.question_points;

        let signal = (sentences > 1 || chars > 200).then(|| format!("long ({chars} chars, {sentences} sentences)"));
        SubScore { score, signal }
    }

    fn score_technical(&self, text: &str) -> SubScore {
        let mut score = 0.0;
        let mut hit_categories = Vec::new();
        for category in &self.config.categories {
            let matches = category
                .terms
                .iter()
                .filter(|term| text.contains(term.to_lowercase().as_str()))
                .count();
            if matches > 0 {
                score += matches as f64 * category.weight;
                hit_categories.push(category.name.as_str());
            }
        }
        let signal = (!hit_categories.is_empty()).then(|| format!("technical ({})", hit_categories.join(", ")));
        SubScore { score, signal }
    }

    fn score_reasoning(&self, text: &str) -> SubScore {
        let mut score = 0.0;
        let mut labels = Vec::new();
        for set in &self.patterns {
            let hits = set.regexes.iter().filter(|r| r.is_match(text)).count();
            if hits > 0 {
                score += hits as f64 * set.increment;
                labels.push(set.label);
            }
        }
        let signal = (!labels.is_empty()).then(|| labels.join(", "));
        SubScore { score, signal }
    }

    fn score_response(&self, text: &str) -> SubScore {
        self.config
            .response_hints
            .iter()
            .filter(|h| h.keywords.iter().any(|kw| text.contains(kw.to_lowercase().as_str())))
            .max_by(|a, b| a.points.total_cmp(&b.points))
            .map(|h| SubScore { score: h.points, signal: Some(format!("expects {}", h.shape)) })
            .unwrap_or(SubScore { score: 0.0, signal: None })
    }
}

fn clamp(value: f64, cap: f64) -> f64 {
    value.clamp(0.0, cap.max(0.0))
}
