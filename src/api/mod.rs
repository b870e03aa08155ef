// src/api/mod.rs
//
// Network boundary for area-level reference data.

mod fmr_csv;
mod http;

pub use fmr_csv::LocalFmrApi;
pub use http::HttpDataApi;

use crate::cache::AreaParams;
use crate::domain::finance::RentTable;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of one API call. `RateLimited` is its own terminal case and must
/// not be retried like an ordinary error.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome<T> {
    Data(T),
    Error(String),
    RateLimited,
}

impl<T> ApiOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiOutcome<U> {
        match self {
            ApiOutcome::Data(v) => ApiOutcome::Data(f(v)),
            ApiOutcome::Error(e) => ApiOutcome::Error(e),
            ApiOutcome::RateLimited => ApiOutcome::RateLimited,
        }
    }
}

/// Reference rents for one ZIP. `market` is absent when only FMR data exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub fmr: RentTable,
    #[serde(default)]
    pub market: Option<RentTable>,
}

#[async_trait(?Send)]
pub trait DataApi {
    async fn fetch_reference_data(&self, zip: &str) -> ApiOutcome<ReferenceData>;
    async fn fetch_area_params(&self, zip: &str) -> ApiOutcome<AreaParams>;
}

/// Wire shapes: `{"rateLimited": true}`, `{"error": ".."}`, `{"data": ..}`
/// or the payload itself.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Limited {
        #[serde(rename = "rateLimited")]
        rate_limited: bool,
    },
    Failed {
        error: String,
    },
    Wrapped {
        data: T,
    },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_outcome(self) -> ApiOutcome<T> {
        match self {
            Envelope::Limited { rate_limited: true } => ApiOutcome::RateLimited,
            Envelope::Limited { rate_limited: false } => {
                ApiOutcome::Error("response carried no data".into())
            }
            Envelope::Failed { error } => ApiOutcome::Error(error),
            Envelope::Wrapped { data } | Envelope::Bare(data) => ApiOutcome::Data(data),
        }
    }
}

pub(crate) fn decode_body<T: serde::de::DeserializeOwned>(body: &str) -> ApiOutcome<T> {
    match serde_json::from_str::<Envelope<T>>(body) {
        Ok(envelope) => envelope.into_outcome(),
        Err(e) => ApiOutcome::Error(format!("unexpected response shape: {e}")),
    }
}
