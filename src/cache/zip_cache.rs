// src/cache/zip_cache.rs
use super::{lru_cache, settled_len};
use crate::domain::finance::RentTable;
use chrono::{DateTime, Utc};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};

/// Which ZIP table an entry belongs to. The two are bounded separately and
/// never merged: an FMR-only entry cannot stand in for complete market data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataTier {
    Complete,
    FmrOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaParams {
    pub tax_rate_annual_pct: f64,
    pub mortgage_rate_annual_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZipCacheEntry {
    pub area: AreaParams,
    pub rents: RentTable,
    pub inserted_at: DateTime<Utc>,
}

impl ZipCacheEntry {
    pub fn new(area: AreaParams, rents: RentTable) -> Self {
        Self {
            area,
            rents,
            inserted_at: Utc::now(),
        }
    }
}

/// Area-level reference data. Mode-independent, so it survives display and
/// rent-source switches.
pub struct ZipCache {
    complete: Cache<String, ZipCacheEntry>,
    fmr_only: Cache<String, ZipCacheEntry>,
}

impl ZipCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            complete: lru_cache("zip (complete)", capacity),
            fmr_only: lru_cache("zip (fmr)", capacity),
        }
    }

    fn table(&self, tier: DataTier) -> &Cache<String, ZipCacheEntry> {
        match tier {
            DataTier::Complete => &self.complete,
            DataTier::FmrOnly => &self.fmr_only,
        }
    }

    pub fn get_zip(&self, zip: &str, tier: DataTier) -> Option<ZipCacheEntry> {
        self.table(tier).get(zip)
    }

    pub fn set_zip(&self, zip: &str, tier: DataTier, entry: ZipCacheEntry) {
        self.table(tier).insert(zip.to_string(), entry);
    }

    pub fn len(&self, tier: DataTier) -> u64 {
        settled_len(self.table(tier))
    }

    pub fn clear(&self) {
        self.complete.invalidate_all();
        self.fmr_only.invalidate_all();
    }
}
