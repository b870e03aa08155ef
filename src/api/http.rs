// src/api/http.rs
use super::{decode_body, ApiOutcome, DataApi, ReferenceData};
use crate::auth::AuthBoundary;
use crate::cache::AreaParams;
use crate::errors::OverlayError;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::rc::Rc;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("cashflow-overlay/", env!("CARGO_PKG_VERSION"));

pub struct HttpDataApi {
    client: Client,
    base: Url,
    auth: Option<Rc<dyn AuthBoundary>>,
}

impl HttpDataApi {
    pub fn new(base: &str, auth: Option<Rc<dyn AuthBoundary>>) -> Result<Self, OverlayError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| OverlayError::Network(e.to_string()))?;

        let base = Url::parse(base)
            .map_err(|e| OverlayError::Config(format!("invalid API base {base:?}: {e}")))?;

        Ok(Self { client, base, auth })
    }

    fn endpoint(&self, path: &str, zip: &str) -> Result<Url, String> {
        let mut url = self.base.join(path).map_err(|e| e.to_string())?;
        url.query_pairs_mut().append_pair("zip", zip);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, zip: &str) -> ApiOutcome<T> {
        let url = match self.endpoint(path, zip) {
            Ok(url) => url,
            Err(e) => return ApiOutcome::Error(e),
        };
        debug!("GET {url}");

        let mut req = self.client.get(url.clone());
        if let Some(auth) = &self.auth {
            if let Some(token) = auth.bearer_token().await {
                req = req.bearer_auth(token);
            }
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("request to {url} failed: {e}");
                return ApiOutcome::Error(e.to_string());
            }
        };

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return ApiOutcome::RateLimited;
        }

        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => return ApiOutcome::Error(e.to_string()),
        };

        if !status.is_success() {
            // Some deployments report the limit in the body with a 4xx.
            if let ApiOutcome::RateLimited = decode_body::<serde_json::Value>(&body) {
                return ApiOutcome::RateLimited;
            }
            return ApiOutcome::Error(format!("HTTP {status} from {url}"));
        }

        decode_body(&body)
    }
}

#[async_trait(?Send)]
impl DataApi for HttpDataApi {
    async fn fetch_reference_data(&self, zip: &str) -> ApiOutcome<ReferenceData> {
        self.get_json("api/reference-data", zip).await
    }

    async fn fetch_area_params(&self, zip: &str) -> ApiOutcome<AreaParams> {
        self.get_json("api/area-params", zip).await
    }
}
