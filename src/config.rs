// src/config.rs
use crate::errors::OverlayError;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.rentcheck.app";

/// Policy constants for the overlay. The cache bounds and timings were
/// tuned against observed host-page behaviour, so all of them can be
/// overridden from the environment.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub zip_cache_capacity: usize,
    pub cash_flow_cache_capacity: usize,
    pub listings_debounce: Duration,
    pub detail_debounce: Duration,
    pub poll_interval: Duration,
    pub poll_max_cards: usize,
    pub api_base: String,
    pub prefs_path: String,
    /// Area defaults used when reference rents come from a local FMR file.
    pub default_tax_rate_pct: f64,
    pub default_mortgage_rate_pct: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            zip_cache_capacity: 100,
            cash_flow_cache_capacity: 200,
            listings_debounce: Duration::from_millis(400),
            detail_debounce: Duration::from_millis(150),
            poll_interval: Duration::from_millis(750),
            poll_max_cards: 6,
            api_base: DEFAULT_API_BASE.to_string(),
            prefs_path: "cashflow_prefs.sqlite3".to_string(),
            default_tax_rate_pct: 1.1,
            default_mortgage_rate_pct: 6.5,
        }
    }
}

impl OverlayConfig {
    /// Defaults overridden by `CASHFLOW_*` environment variables.
    pub fn from_env() -> Result<Self, OverlayError> {
        let mut cfg = Self::default();

        if let Some(v) = env_parse::<usize>("CASHFLOW_ZIP_CACHE_CAPACITY")? {
            cfg.zip_cache_capacity = v;
        }
        if let Some(v) = env_parse::<usize>("CASHFLOW_CASH_FLOW_CACHE_CAPACITY")? {
            cfg.cash_flow_cache_capacity = v;
        }
        if let Some(v) = env_parse::<u64>("CASHFLOW_LISTINGS_DEBOUNCE_MS")? {
            cfg.listings_debounce = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("CASHFLOW_DETAIL_DEBOUNCE_MS")? {
            cfg.detail_debounce = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("CASHFLOW_POLL_INTERVAL_MS")? {
            cfg.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<usize>("CASHFLOW_POLL_MAX_CARDS")? {
            cfg.poll_max_cards = v;
        }
        if let Some(v) = env_parse::<f64>("CASHFLOW_DEFAULT_TAX_RATE_PCT")? {
            cfg.default_tax_rate_pct = v;
        }
        if let Some(v) = env_parse::<f64>("CASHFLOW_DEFAULT_MORTGAGE_RATE_PCT")? {
            cfg.default_mortgage_rate_pct = v;
        }
        if let Ok(v) = std::env::var("CASHFLOW_API_BASE") {
            cfg.api_base = v;
        }
        if let Ok(v) = std::env::var("CASHFLOW_PREFS_PATH") {
            cfg.prefs_path = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), OverlayError> {
        if self.zip_cache_capacity == 0 || self.cash_flow_cache_capacity == 0 {
            return Err(OverlayError::Config(
                "cache capacities must be at least 1".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(OverlayError::Config("poll interval must be non-zero".into()));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, OverlayError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| OverlayError::Config(format!("{key} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}
