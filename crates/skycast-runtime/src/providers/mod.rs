//! Upstream provider abstractions for skycast-runtime.
//!
//! Each upstream (geocoding, IP location, weather) sits behind a trait so the
//! clients can be driven by HTTP implementations in production and by mocks
//! in tests. Providers only speak HTTP and decode payloads; breaker, retry,
//! cache and error classification live in the clients.
//!
//! ## Security
//!
//! Keyed providers hold their key as an [`ApiCredential`]; see [`secrets`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use skycast_core::Coordinates;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{GeocodingBackend, GeocodingConfig, HttpConfig};
use crate::resilience::{CircuitFailure, Transient};

pub mod ipinfo;
pub mod mapbox;
pub mod nominatim;
pub mod open_meteo;
pub mod secrets;

pub use ipinfo::IpInfoProvider;
pub use mapbox::MapboxProvider;
pub use nominatim::NominatimProvider;
pub use open_meteo::OpenMeteoProvider;
pub use secrets::{ApiCredential, CredentialSource};

/// Errors from upstream providers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Upstream returned status {0}")]
    Status(u16),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl UpstreamError {
    /// Classify a transport error.
    ///
    /// The request URL is stripped first; keyed providers carry their token
    /// in the query string.
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        let error = error.without_url();
        if error.is_timeout() {
            UpstreamError::Timeout(error.to_string())
        } else if error.is_connect() {
            UpstreamError::Connect(error.to_string())
        } else if error.is_decode() {
            UpstreamError::Parse(error.to_string())
        } else if let Some(status) = error.status() {
            UpstreamError::Status(status.as_u16())
        } else {
            UpstreamError::Http(error.to_string())
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status(code) => Some(*code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, UpstreamError::Timeout(_))
    }
}

impl Transient for UpstreamError {
    /// Timeouts, refused or failed connections and 5xx responses.
    fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Timeout(_) | UpstreamError::Connect(_) => true,
            UpstreamError::Status(code) => (500..600).contains(code),
            _ => false,
        }
    }
}

impl CircuitFailure for UpstreamError {}

/// One geocoding match, in upstream relevance order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeCandidate {
    pub latitude: f64,
    pub longitude: f64,

    /// Postal code from the upstream's dedicated field, if it has one
    pub postal_code: Option<String>,

    /// Nested address components (e.g. `postcode`, `city`, `state`)
    pub address: Option<Map<String, JsonValue>>,

    pub formatted_address: Option<String>,
}

/// Location record for a requester IP.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IpLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,

    /// Raw payload, for timezone fields whose shape varies by provider
    pub data: JsonValue,
}

/// Resolves free-text addresses.
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    /// Search for an address. An empty list means no match.
    async fn search(&self, query: &str) -> Result<Vec<GeocodeCandidate>, UpstreamError>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}

/// Locates requester IPs.
#[async_trait]
pub trait IpLookupProvider: Send + Sync {
    /// Look up an IP. `None` means the upstream has no record for it.
    async fn lookup(&self, ip: IpAddr) -> Result<Option<IpLocation>, UpstreamError>;

    fn name(&self) -> &str;
}

/// Fetches raw forecast payloads.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Fetch the forecast document for a location.
    ///
    /// Returns the decoded JSON body; shape validation is the caller's job.
    async fn forecast(&self, coordinates: Coordinates) -> Result<JsonValue, UpstreamError>;

    fn name(&self) -> &str;
}

/// Build the shared HTTP client with connect and request timeouts.
pub fn http_client(config: &HttpConfig) -> Result<reqwest::Client, UpstreamError> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| UpstreamError::NotConfigured(format!("HTTP client: {e}")))
}

/// Build the configured geocoding provider.
pub fn geocoding_provider(
    config: &GeocodingConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn GeocodingProvider>, UpstreamError> {
    match config.backend {
        GeocodingBackend::Mapbox => {
            let credential = config.api_key.clone().ok_or_else(|| {
                UpstreamError::NotConfigured("Mapbox access token is not set".to_string())
            })?;
            let mut provider = MapboxProvider::new(client, credential);
            if let Some(url) = &config.base_url {
                provider = provider.with_base_url(url.as_str());
            }
            Ok(Arc::new(provider))
        }
        GeocodingBackend::Nominatim => {
            let mut provider = NominatimProvider::new(client);
            if let Some(url) = &config.base_url {
                provider = provider.with_base_url(url.as_str());
            }
            Ok(Arc::new(provider))
        }
    }
}

/// Send a GET and decode a JSON body, mapping non-success statuses.
pub(crate) async fn get_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, UpstreamError> {
    let response = request.send().await.map_err(UpstreamError::from_reqwest)?;

    let status = response.status();
    if !status.is_success() {
        return Err(UpstreamError::Status(status.as_u16()));
    }

    response.json::<T>().await.map_err(UpstreamError::from_reqwest)
}

/// Join path segments onto a base URL, percent-encoding each segment.
pub(crate) fn endpoint(base_url: &str, segments: &[&str]) -> Result<reqwest::Url, UpstreamError> {
    let mut url = reqwest::Url::parse(base_url)
        .map_err(|e| UpstreamError::NotConfigured(format!("invalid base URL '{base_url}': {e}")))?;
    url.path_segments_mut()
        .map_err(|_| UpstreamError::NotConfigured(format!("base URL '{base_url}' cannot take a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(UpstreamError::Timeout("read".into()).is_transient());
        assert!(UpstreamError::Connect("refused".into()).is_transient());
        assert!(UpstreamError::Status(503).is_transient());
        assert!(!UpstreamError::Status(404).is_transient());
        assert!(!UpstreamError::Status(429).is_transient());
        assert!(!UpstreamError::Parse("eof".into()).is_transient());
    }

    #[test]
    fn test_every_upstream_error_trips_breaker() {
        assert!(UpstreamError::Status(400).is_circuit_failure());
        assert!(UpstreamError::Timeout("t".into()).is_circuit_failure());
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let url = endpoint("https://api.example.com/", &["places", "New York, NY.json"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/places/New%20York,%20NY.json");

        let url = endpoint("http://127.0.0.1:8080", &["8.8.8.8", "json"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/8.8.8.8/json");
    }

    #[test]
    fn test_endpoint_rejects_bad_base() {
        assert!(endpoint("not a url", &["x"]).is_err());
    }

    #[test]
    fn test_nominatim_needs_no_key() {
        let config = GeocodingConfig {
            backend: GeocodingBackend::Nominatim,
            ..Default::default()
        };
        let client = http_client(&HttpConfig::default()).unwrap();
        let provider = geocoding_provider(&config, client).unwrap();
        assert_eq!(provider.name(), "nominatim");
    }

    #[test]
    fn test_mapbox_without_key_is_not_configured() {
        let client = http_client(&HttpConfig::default()).unwrap();
        let result = geocoding_provider(&GeocodingConfig::default(), client);
        assert!(matches!(result, Err(UpstreamError::NotConfigured(_))));
    }
}
