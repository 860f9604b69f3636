//! Per-tier request quotas with minute and day windows.
//!
//! Every tier has its own lock, so check-and-decrement is serialized per tier
//! while different tiers never contend. Windows reset lazily: any read or
//! write first rolls the counters forward if a boundary has passed.

use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Duration, Local, Timelike};
use qr_core::config::BackendTierConfig;
use qr_core::error::{QrError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// A configured backend tier; immutable for the process lifetime.
pub type BackendTier = BackendTierConfig;

#[derive(Debug, Clone)]
struct QuotaState {
    remaining_minute: u32,
    remaining_day: u32,
    next_minute_reset: DateTime<Local>,
    next_day_reset: DateTime<Local>,
    minute_window: u64,
    day_window: u64,
}

struct TierSlot {
    tier: BackendTier,
    state: Mutex<QuotaState>,
}

/// Read-only view of one tier's counters.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaSnapshot {
    pub name: String,
    pub rpm: u32,
    pub rpd: u32,
    pub remaining_minute: u32,
    pub remaining_day: u32,
    pub next_minute_reset: DateTime<Local>,
    pub next_day_reset: DateTime<Local>,
    pub used_minute_pct: f64,
    pub used_day_pct: f64,
}

pub struct QuotaTracker {
    slots: Vec<TierSlot>,
    index: HashMap<String, usize>,
    clock: Arc<dyn Clock>,
}

impl QuotaTracker {
    pub fn new(tiers: Vec<BackendTier>) -> Result<Self> {
        Self::with_clock(tiers, Arc::new(SystemClock))
    }

    pub fn with_clock(tiers: Vec<BackendTier>, clock: Arc<dyn Clock>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(QrError::Config("quota tracker needs at least one tier".into()));
        }
        let now = clock.now();
        let mut index = HashMap::new();
        let mut slots = Vec::with_capacity(tiers.len());
        for (i, tier) in tiers.into_iter().enumerate() {
            if index.insert(tier.name.clone(), i).is_some() {
                return Err(QrError::Config(format!("duplicate tier '{}'", tier.name)));
            }
            let state = QuotaState {
                remaining_minute: tier.rpm,
                remaining_day: tier.rpd,
                next_minute_reset: next_minute_boundary(now),
                next_day_reset: next_day_boundary(now),
                minute_window: 0,
                day_window: 0,
            };
            slots.push(TierSlot { tier, state: Mutex::new(state) });
        }
        Ok(Self { slots, index, clock })
    }

    /// Tiers in capability order.
    pub fn tiers(&self) -> impl Iterator<Item = &BackendTier> {
        self.slots.iter().map(|s| &s.tier)
    }

    pub fn tier(&self, name: &str) -> Result<&BackendTier> {
        self.slot_index(name).map(|i| &self.slots[i].tier)
    }

    pub fn can_use(&self, name: &str) -> Result<bool> {
        let i = self.slot_index(name)?;
        let state = self.refreshed(i);
        Ok(state.remaining_minute > 0 && state.remaining_day > 0)
    }

    /// Records one finished call. Failed calls consume nothing.
    pub fn record(&self, name: &str, success: bool) -> Result<()> {
        let i = self.slot_index(name)?;
        if !success {
            debug!(tier = %name, "failed call, quota untouched");
            return Ok(());
        }
        let mut state = self.refreshed(i);
        state.remaining_minute = state.remaining_minute.saturating_sub(1);
        state.remaining_day = state.remaining_day.saturating_sub(1);
        Ok(())
    }

    /// Atomically checks and reserves one unit of quota.
    ///
    /// Returns `None` when the tier is exhausted for the current window. The
    /// unit is refunded when the permit is dropped without `commit`.
    pub fn try_acquire(&self, name: &str) -> Result<Option<QuotaPermit<'_>>> {
        let i = self.slot_index(name)?;
        let mut state = self.refreshed(i);
        if state.remaining_minute == 0 || state.remaining_day == 0 {
            warn!(
                tier = %name,
                remaining_minute = state.remaining_minute,
                remaining_day = state.remaining_day,
                "quota exhausted"
            );
            return Ok(None);
        }
        state.remaining_minute -= 1;
        state.remaining_day -= 1;
        Ok(Some(QuotaPermit {
            tracker: self,
            slot: i,
            minute_window: state.minute_window,
            day_window: state.day_window,
            committed: false,
        }))
    }

    /// Usable tiers, in capability order.
    pub fn available_tiers(&self) -> Vec<BackendTier> {
        (0..self.slots.len())
            .filter(|&i| {
                let state = self.refreshed(i);
                state.remaining_minute > 0 && state.remaining_day > 0
            })
            .map(|i| self.slots[i].tier.clone())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<QuotaSnapshot> {
        (0..self.slots.len())
            .map(|i| {
                let tier = &self.slots[i].tier;
                let state = self.refreshed(i);
                QuotaSnapshot {
                    name: tier.name.clone(),
                    rpm: tier.rpm,
                    rpd: tier.rpd,
                    remaining_minute: state.remaining_minute,
                    remaining_day: state.remaining_day,
                    next_minute_reset: state.next_minute_reset,
                    next_day_reset: state.next_day_reset,
                    used_minute_pct: used_pct(state.remaining_minute, tier.rpm),
                    used_day_pct: used_pct(state.remaining_day, tier.rpd),
                }
            })
            .collect()
    }

    fn slot_index(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| QrError::UnknownTier(name.to_string()))
    }

    /// Locks a tier and applies any window reset that is due.
    fn refreshed(&self, i: usize) -> MutexGuard<'_, QuotaState> {
        let slot = &self.slots[i];
        let mut state = slot.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();
        if now >= state.next_minute_reset {
            state.remaining_minute = slot.tier.rpm;
            state.next_minute_reset = next_minute_boundary(now);
            state.minute_window += 1;
            debug!(tier = %slot.tier.name, next = %state.next_minute_reset, "minute quota reset");
        }
        if now >= state.next_day_reset {
            state.remaining_day = slot.tier.rpd;
            state.next_day_reset = next_day_boundary(now);
            state.day_window += 1;
            debug!(tier = %slot.tier.name, next = %state.next_day_reset, "daily quota reset");
        }
        state
    }
}

/// One reserved unit of quota.
#[must_use = "dropping a permit without commit() refunds the reserved quota"]
pub struct QuotaPermit<'a> {
    tracker: &'a QuotaTracker,
    slot: usize,
    minute_window: u64,
    day_window: u64,
    committed: bool,
}

impl QuotaPermit<'_> {
    pub fn tier(&self) -> &BackendTier {
        &self.tracker.slots[self.slot].tier
    }

    /// Keeps the reserved unit consumed.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for QuotaPermit<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let tier = &self.tracker.slots[self.slot].tier;
        let mut state = self.tracker.refreshed(self.slot);
        // A reset in between already restored the ceiling.
        if state.minute_window == self.minute_window {
            state.remaining_minute = (state.remaining_minute + 1).min(tier.rpm);
        }
        if state.day_window == self.day_window {
            state.remaining_day = (state.remaining_day + 1).min(tier.rpd);
        }
        debug!(tier = %tier.name, "quota permit released without use");
    }
}

fn used_pct(remaining: u32, ceiling: u32) -> f64 {
    if ceiling == 0 {
        return 100.0;
    }
    (ceiling - remaining.min(ceiling)) as f64 * 100.0 / ceiling as f64
}

/// Top of the next wall-clock minute.
pub fn next_minute_boundary(now: DateTime<Local>) -> DateTime<Local> {
    now.with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .map(|t| t + Duration::minutes(1))
        .unwrap_or_else(|| now + Duration::minutes(1))
}

/// Next local midnight.
pub fn next_day_boundary(now: DateTime<Local>) -> DateTime<Local> {
    now.date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .unwrap_or_else(|| now + Duration::days(1))
}
