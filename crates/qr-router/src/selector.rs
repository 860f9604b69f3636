//! Backend tier selection under quota pressure. Degrades, never escalates.

use crate::quota::{BackendTier, QuotaPermit, QuotaTracker};
use qr_core::types::ComplexityTier;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
pub struct BackendSelector;

impl BackendSelector {
    pub fn new() -> Self {
        Self
    }

    /// Position of the cheapest tier able to serve `hint`, or the most capable
    /// tier when none is rated that high.
    pub fn preferred_index(&self, hint: ComplexityTier, tracker: &QuotaTracker) -> usize {
        let tiers: Vec<&BackendTier> = tracker.tiers().collect();
        tiers
            .iter()
            .position(|t| t.max_complexity >= hint)
            .unwrap_or(tiers.len().saturating_sub(1))
    }

    /// Preferred tier first, then every other tier of equal or lesser
    /// capability, in capability order.
    pub fn fallback_chain<'a>(&self, hint: ComplexityTier, tracker: &'a QuotaTracker) -> Vec<&'a BackendTier> {
        let preferred = self.preferred_index(hint, tracker);
        let tiers: Vec<&BackendTier> = tracker.tiers().collect();
        let Some(&first) = tiers.get(preferred) else { return Vec::new() };
        let mut chain = vec![first];
        chain.extend(
            tiers
                .iter()
                .enumerate()
                .filter(|(i, t)| *i != preferred && t.max_complexity <= first.max_complexity)
                .map(|(_, t)| *t),
        );
        chain
    }

    /// Returns the tier to use without reserving quota.
    pub fn pick(&self, hint: ComplexityTier, tracker: &QuotaTracker) -> Option<BackendTier> {
        self.fallback_chain(hint, tracker)
            .into_iter()
            .find(|t| tracker.can_use(&t.name).unwrap_or(false))
            .cloned()
    }

    /// Like `pick`, but atomically reserves one unit on the chosen tier so
    /// concurrent callers cannot both take the last unit.
    pub fn pick_and_reserve<'a>(&self, hint: ComplexityTier, tracker: &'a QuotaTracker) -> Option<QuotaPermit<'a>> {
        let chain = self.fallback_chain(hint, tracker);
        let preferred = chain.first().map(|t| t.name.clone());
        for tier in chain {
            match tracker.try_acquire(&tier.name) {
                Ok(Some(permit)) => {
                    if preferred.as_deref() != Some(tier.name.as_str()) {
                        info!(hint = %hint, tier = %tier.name, "preferred tier exhausted, degraded");
                    }
                    return Some(permit);
                }
                Ok(None) => debug!(tier = %tier.name, "tier unavailable"),
                Err(e) => debug!(tier = %tier.name, error = %e, "tier lookup failed"),
            }
        }
        None
    }
}
