mod cash_flow;
mod zip_cache;

use log::debug;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::fmt::Display;
use std::hash::Hash;

/// A bounded in-memory table with least-recently-used eviction.
fn lru_cache<K, V>(name: &'static str, capacity: usize) -> Cache<K, V>
where
    K: Display + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    Cache::builder()
        .max_capacity(capacity.max(1) as u64)
        .eviction_policy(EvictionPolicy::lru())
        .eviction_listener(move |key, _, cause| {
            if cause.was_evicted() {
                debug!("{name} cache evicted {key}");
            }
        })
        .build()
}

/// Settles pending evictions so the count is exact.
fn settled_len<K, V>(cache: &Cache<K, V>) -> u64
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache.run_pending_tasks();
    cache.entry_count()
}

pub use cash_flow::{CashFlowCache, CashFlowCacheEntry, CashFlowValue};
pub use zip_cache::{AreaParams, DataTier, ZipCache, ZipCacheEntry};
