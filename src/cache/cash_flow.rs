// src/cache/cash_flow.rs
use super::{lru_cache, settled_len};
use crate::domain::finance::Projection;
use crate::domain::listing::ListingFingerprint;
use chrono::{DateTime, Utc};
use log::debug;
use moka::sync::Cache;

#[derive(Debug, Clone, PartialEq)]
pub enum CashFlowValue {
    Computed(Projection),
    /// Rent display mode: the reference rent alone.
    RentOnly(f64),
    /// Inputs were missing or the engine rejected them.
    Unavailable,
    RateLimited,
}

impl CashFlowValue {
    /// Failure outcomes that hold until the listing, mode or auth changes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CashFlowValue::Unavailable | CashFlowValue::RateLimited)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CashFlowCacheEntry {
    pub value: CashFlowValue,
    pub has_fee: bool,
    pub inserted_at: DateTime<Utc>,
}

/// Per-listing results. Cleared wholesale on any mode or auth change.
pub struct CashFlowCache {
    entries: Cache<ListingFingerprint, CashFlowCacheEntry>,
}

impl CashFlowCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: lru_cache("cash flow", capacity),
        }
    }

    /// With `require_fee`, a computed entry without fee data is a miss.
    /// Terminal entries are returned either way: knowing the fee cannot
    /// change them.
    pub fn get_cash_flow(
        &self,
        fp: &ListingFingerprint,
        require_fee: bool,
    ) -> Option<CashFlowCacheEntry> {
        let entry = self.entries.get(fp)?;
        if require_fee && !entry.has_fee && !entry.value.is_terminal() {
            return None;
        }
        Some(entry)
    }

    /// Fee-aware entries are never replaced by fee-less ones. Returns whether
    /// the write happened.
    pub fn set_cash_flow(
        &self,
        fp: &ListingFingerprint,
        value: CashFlowValue,
        has_fee: bool,
    ) -> bool {
        if !has_fee && self.has_fee_aware(fp) {
            debug!("kept fee-aware result for {fp}");
            return false;
        }
        let entry = CashFlowCacheEntry {
            value,
            has_fee,
            inserted_at: Utc::now(),
        };
        self.entries.insert(fp.clone(), entry);
        true
    }

    /// Whether a fee-aware entry exists.
    pub fn has_fee_aware(&self, fp: &ListingFingerprint) -> bool {
        self.entries.get(fp).map(|e| e.has_fee).unwrap_or(false)
    }

    pub fn len(&self) -> u64 {
        settled_len(&self.entries)
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}
