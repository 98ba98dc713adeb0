// src/fetch/http.rs
// =============================================================================
// HTTP implementation of the parcel lookup.
//
// Key functionality:
// - One GET per coordinate: `<endpoint>?lng=<lng>&lat=<lat>`
// - Auth headers (X-Auth-Token, X-Auth-Email) and User-Agent set once on
//   the client, from the config
// - The first parcel in the response is the answer
// - Non-2xx status, network trouble and bad JSON become FetchError values;
//   the crawler decides what to do with them
//
// Expected response shape:
//   {"parcels": [{"parcel_data": {"geom_as_wkt": "POLYGON(...)", ...},
//                 "field_data": [{"name": "...", "value": ...}, ...]}, ...]}
// =============================================================================

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{ParcelFetcher, ParcelHit};
use crate::config::FetcherConfig;
use crate::error::{ConfigError, FetchError};
use crate::geometry::parse_multipolygon;

#[derive(Debug, Clone)]
pub struct HttpParcelFetcher {
    client: Client,
    endpoint: Url,
}

impl HttpParcelFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| ConfigError::Invalid(format!("fetcher.endpoint: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value("user_agent", &config.user_agent)?);
        if let Some(token) = config.resolved_token() {
            let mut value = header_value("auth_token", &token)?;
            value.set_sensitive(true);
            headers.insert("X-Auth-Token", value);
        }
        if let Some(email) = &config.auth_email {
            headers.insert("X-Auth-Email", header_value("auth_email", email)?);
        }

        // We'll reuse this client for every lookup (connection pooling)
        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("could not build HTTP client: {e}")))?;

        Ok(Self { client, endpoint })
    }

    fn lookup_url(&self, lat: f64, lng: f64) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("lng", &lng.to_string())
            .append_pair("lat", &lat.to_string());
        url
    }
}

impl ParcelFetcher for HttpParcelFetcher {
    async fn fetch(&self, lat: f64, lng: f64) -> Result<Option<ParcelHit>, FetchError> {
        let response = self.client.get(self.lookup_url(lat, lng)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_lookup_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    parcels: Option<Vec<serde_json::Value>>,
}

/// Turns a response body into the first parcel it describes.
///
/// A missing or empty `parcels` list is "no parcel", not an error.
pub fn parse_lookup_response(body: &str) -> Result<Option<ParcelHit>, FetchError> {
    let response: LookupResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    let Some(first) = response.parcels.and_then(|parcels| parcels.into_iter().next()) else {
        return Ok(None);
    };

    let wkt = first
        .pointer("/parcel_data/geom_as_wkt")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| FetchError::Decode("parcel has no parcel_data.geom_as_wkt".into()))?;

    let geometry = parse_multipolygon(wkt)?;
    Ok(Some(ParcelHit::new(geometry, first)?))
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value)
        .map_err(|_| ConfigError::Invalid(format!("fetcher.{field} is not a valid header value")))
}
