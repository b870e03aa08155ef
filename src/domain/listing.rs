// src/domain/listing.rs
use crate::extractor::{extract_zip, PropertyData};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identity of "the same listing", independent of which card node renders it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingFingerprint {
    // Normalized: lowercase, punctuation folded to spaces.
    pub address: String,
    pub price: Option<u64>,
    pub bedrooms: Option<u32>,
    // ZIP as it appeared in the raw address.
    zip: Option<String>,
}

impl ListingFingerprint {
    /// `None` when the card has no usable address; such cards carry no badge.
    pub fn from_property(data: &PropertyData) -> Option<Self> {
        let raw = data.address.as_deref()?;
        let address = normalize_address(raw);
        if address.is_empty() {
            return None;
        }
        Some(Self {
            address,
            price: data
                .price
                .filter(|p| p.is_finite() && *p > 0.0)
                .map(|p| p.round() as u64),
            bedrooms: data.bedrooms,
            zip: extract_zip(raw),
        })
    }

    pub fn zip(&self) -> Option<&str> {
        self.zip.as_deref()
    }

    /// `address|price|bedrooms`, with empty slots for unknown values.
    pub fn key(&self) -> String {
        let price = self.price.map(|p| p.to_string()).unwrap_or_default();
        let beds = self.bedrooms.map(|b| b.to_string()).unwrap_or_default();
        format!("{}|{}|{}", self.address, price, beds)
    }

    /// Short stable hash written to the badge's `data-rc-key`.
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(self.key().as_bytes());
        hash.iter()
            .take(6)
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

impl fmt::Display for ListingFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

pub fn normalize_address(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
