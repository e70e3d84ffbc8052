use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::domain::{StationId, StationRecord, parse_timestamp};
use crate::error::FetchError;

pub const DEFAULT_CATALOG_URL: &str = "https://web-services.unavco.org/gps/metadata/sites/v1";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Result<Self, FetchError> {
        let in_range = |value: f64, limit: f64| value.is_finite() && value.abs() <= limit;
        if !in_range(min_lat, 90.0) || !in_range(max_lat, 90.0) {
            return Err(FetchError::InvalidBoundingBox(format!(
                "latitude must be within [-90, 90], got [{min_lat}, {max_lat}]"
            )));
        }
        if !in_range(min_lon, 180.0) || !in_range(max_lon, 180.0) {
            return Err(FetchError::InvalidBoundingBox(format!(
                "longitude must be within [-180, 180], got [{min_lon}, {max_lon}]"
            )));
        }
        if min_lat > max_lat || min_lon > max_lon {
            return Err(FetchError::InvalidBoundingBox(
                "minimum must not exceed maximum".to_string(),
            ));
        }
        Ok(Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        })
    }

    fn query(&self) -> [(&'static str, f64); 4] {
        [
            ("minlatitude", self.min_lat),
            ("maxlatitude", self.max_lat),
            ("minlongitude", self.min_lon),
            ("maxlongitude", self.max_lon),
        ]
    }
}

pub trait StationCatalog: Send + Sync {
    fn stations_in(&self, bbox: &BoundingBox) -> Result<Vec<StationRecord>, FetchError>;
}

#[derive(Clone)]
pub struct UnavcoCatalogClient {
    client: Client,
    base_url: String,
}

impl UnavcoCatalogClient {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gnss-fetch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FetchError::CatalogHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| FetchError::CatalogHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, FetchError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::CatalogHttp(err.to_string()));
                }
            }
        }
    }
}

impl StationCatalog for UnavcoCatalogClient {
    fn stations_in(&self, bbox: &BoundingBox) -> Result<Vec<StationRecord>, FetchError> {
        let query = bbox.query();
        let response = self.send_with_retries(|| self.client.get(&self.base_url).query(&query))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "catalog request failed".to_string());
            return Err(FetchError::CatalogStatus { status, message });
        }
        let body: Value = response
            .json()
            .map_err(|err| FetchError::CatalogFormat(err.to_string()))?;
        parse_catalog(&body)
    }
}

/// Turns the catalog's JSON array into station records.
///
/// Entries without a usable `id` are dropped with a warning; bad session
/// timestamps leave that side of the window open.
pub fn parse_catalog(body: &Value) -> Result<Vec<StationRecord>, FetchError> {
    let entries = body.as_array().ok_or_else(|| {
        FetchError::CatalogFormat("expected a list of station records".to_string())
    })?;

    let mut stations: Vec<StationRecord> = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(raw_id) = entry.get("id").and_then(Value::as_str) else {
            tracing::warn!("catalog entry without an id, ignoring");
            continue;
        };
        let id = match raw_id.parse::<StationId>() {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring catalog entry");
                continue;
            }
        };
        if stations.iter().any(|station| station.id == id) {
            continue;
        }
        let bound = |key: &str| {
            entry
                .get(key)
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
        };
        stations.push(StationRecord::with_window(
            id,
            bound("session_start_time"),
            bound("session_stop_time"),
        ));
    }
    Ok(stations)
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
