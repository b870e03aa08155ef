// src/extractor/models.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// What one card yields. Every field is advisory; anything unreadable is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyData {
    pub address: Option<String>,
    pub bedrooms: Option<u32>,
    pub price: Option<f64>,
    pub association_fee_monthly: Option<f64>,
}

impl PropertyData {
    pub fn is_empty(&self) -> bool {
        self.address.is_none()
            && self.bedrooms.is_none()
            && self.price.is_none()
            && self.association_fee_monthly.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    Zillow,
    Redfin,
    Realtor,
}

impl Site {
    pub const ALL: [Site; 3] = [Site::Zillow, Site::Redfin, Site::Realtor];

    pub fn as_str(self) -> &'static str {
        match self {
            Site::Zillow => "zillow",
            Site::Redfin => "redfin",
            Site::Realtor => "realtor",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Site::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Matches `www.zillow.com`, `zillow.com`, `m.redfin.com`, ...
    pub fn from_host(host: &str) -> Option<Self> {
        let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
        let matches = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));
        if matches("zillow.com") {
            Some(Site::Zillow)
        } else if matches("redfin.com") {
            Some(Site::Redfin)
        } else if matches("realtor.com") {
            Some(Site::Realtor)
        } else {
            None
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of card a node is rendered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    List,
    Map,
    Detail,
}

impl View {
    pub fn as_str(self) -> &'static str {
        match self {
            View::List => "list",
            View::Map => "map",
            View::Detail => "detail",
        }
    }
}
