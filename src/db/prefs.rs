// src/db/prefs.rs
use crate::db::connection::Database;
use crate::domain::finance::{DownPayment, LineItem};
use crate::errors::OverlayError;
use crate::extractor::Site;
use chrono::Utc;
use log::{debug, warn};
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

pub mod keys {
    use crate::extractor::Site;

    pub const DISPLAY_MODE: &str = "display_mode";
    pub const RENT_SOURCE: &str = "rent_source";
    pub const DOWN_PAYMENT: &str = "down_payment";
    pub const HOA_OVERRIDE: &str = "hoa_override";
    pub const INSURANCE_MONTHLY: &str = "insurance_monthly";
    pub const MANAGEMENT_MONTHLY: &str = "management_monthly";
    pub const LOAN_TERM_MONTHS: &str = "loan_term_months";
    pub const CUSTOM_ITEMS: &str = "custom_items";
    pub const SESSION_TOKEN: &str = "session_token";
    pub const SESSION_EXPIRES_AT: &str = "session_expires_at";
    pub const SITE_ENABLED_PREFIX: &str = "site_enabled.";

    pub fn site_enabled(site: Site) -> String {
        format!("{SITE_ENABLED_PREFIX}{}", site.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    CashFlow,
    Rent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentSource {
    #[default]
    Fmr,
    Market,
}

/// Typed view over the key/value store, with defaults for absent keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    pub display_mode: DisplayMode,
    pub rent_source: RentSource,
    pub down_payment: DownPayment,
    /// Replaces whatever association fee the page shows.
    pub hoa_override: Option<f64>,
    pub insurance_monthly: f64,
    pub management_monthly: f64,
    pub loan_term_months: u32,
    pub custom_items: Vec<LineItem>,
    pub disabled_sites: Vec<Site>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            display_mode: DisplayMode::CashFlow,
            rent_source: RentSource::Fmr,
            down_payment: DownPayment::default(),
            hoa_override: None,
            insurance_monthly: 0.0,
            management_monthly: 0.0,
            loan_term_months: 360,
            custom_items: Vec::new(),
            disabled_sites: Vec::new(),
        }
    }
}

impl Preferences {
    pub fn site_enabled(&self, site: Site) -> bool {
        !self.disabled_sites.contains(&site)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefChange {
    pub key: String,
}

/// SQLite-backed preferences with change notifications. Values are JSON.
pub struct PrefsStore {
    db: Database,
    changes: broadcast::Sender<PrefChange>,
}

impl PrefsStore {
    pub fn open(path: impl Into<String>) -> Result<Self, OverlayError> {
        let db = Database::new(path);
        db.init()?;
        let (changes, _) = broadcast::channel(64);
        Ok(Self { db, changes })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PrefChange> {
        self.changes.subscribe()
    }

    fn read_raw(&self, key: &str) -> Result<Option<String>, OverlayError> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT value FROM prefs WHERE key = ?", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .map_err(|e| OverlayError::Db(format!("read {key} failed: {e}")))
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, OverlayError> {
        match self.read_raw(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Stores `value`. Returns false (and notifies nobody) when the stored
    /// value was already equal.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<bool, OverlayError> {
        let json = serde_json::to_string(value)?;
        if self.read_raw(key)?.as_deref() == Some(json.as_str()) {
            return Ok(false);
        }
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO prefs (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, json, now],
            )
            .map_err(|e| OverlayError::Db(format!("write {key} failed: {e}")))
        })?;
        debug!("pref {key} = {json}");
        self.notify(key);
        Ok(true)
    }

    pub async fn remove(&self, key: &str) -> Result<bool, OverlayError> {
        let removed = self.db.with_conn(|conn| {
            conn.execute("DELETE FROM prefs WHERE key = ?", [key])
                .map_err(|e| OverlayError::Db(format!("delete {key} failed: {e}")))
        })?;
        if removed > 0 {
            self.notify(key);
        }
        Ok(removed > 0)
    }

    /// Every stored key with its JSON value, sorted by key.
    pub async fn entries(&self) -> Result<Vec<(String, Value)>, OverlayError> {
        let rows: Vec<(String, String)> = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT key, value FROM prefs ORDER BY key")
                .map_err(|e| OverlayError::Db(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(|e| OverlayError::Db(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| OverlayError::Db(e.to_string()))?;
            Ok(rows)
        })?;
        rows.into_iter()
            .map(|(k, v)| -> Result<(String, Value), OverlayError> {
                Ok((k, serde_json::from_str(&v)?))
            })
            .collect()
    }

    /// Loads the typed preferences. A malformed value falls back to its
    /// default rather than failing the whole load.
    pub async fn load(&self) -> Result<Preferences, OverlayError> {
        let defaults = Preferences::default();
        let mut disabled_sites = Vec::new();
        for site in Site::ALL {
            if !self.lenient(&keys::site_enabled(site), true).await? {
                disabled_sites.push(site);
            }
        }
        Ok(Preferences {
            display_mode: self.lenient(keys::DISPLAY_MODE, defaults.display_mode).await?,
            rent_source: self.lenient(keys::RENT_SOURCE, defaults.rent_source).await?,
            down_payment: self.lenient(keys::DOWN_PAYMENT, defaults.down_payment).await?,
            hoa_override: self.lenient(keys::HOA_OVERRIDE, defaults.hoa_override).await?,
            insurance_monthly: self
                .lenient(keys::INSURANCE_MONTHLY, defaults.insurance_monthly)
                .await?,
            management_monthly: self
                .lenient(keys::MANAGEMENT_MONTHLY, defaults.management_monthly)
                .await?,
            loan_term_months: self
                .lenient(keys::LOAN_TERM_MONTHS, defaults.loan_term_months)
                .await?,
            custom_items: self.lenient(keys::CUSTOM_ITEMS, defaults.custom_items).await?,
            disabled_sites,
        })
    }

    async fn lenient<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, OverlayError> {
        match self.get::<T>(key).await {
            Ok(Some(v)) => Ok(v),
            Ok(None) => Ok(default),
            Err(OverlayError::Json(e)) => {
                warn!("ignoring malformed pref {key}: {e}");
                Ok(default)
            }
            Err(e) => Err(e),
        }
    }

    fn notify(&self, key: &str) {
        // No receivers is fine.
        let _ = self.changes.send(PrefChange {
            key: key.to_string(),
        });
    }
}
