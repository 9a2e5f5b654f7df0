//! Mapbox forward geocoding.
//!
//! Uses the `mapbox.places` endpoint; requires an access token.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::fmt;

use super::{endpoint, get_json, ApiCredential, GeocodeCandidate, GeocodingProvider, UpstreamError};

pub const DEFAULT_BASE_URL: &str = "https://api.mapbox.com";
const RESULT_LIMIT: &str = "5";

/// Mapbox geocoding provider.
pub struct MapboxProvider {
    client: reqwest::Client,
    credential: ApiCredential,
    base_url: String,
}

impl fmt::Debug for MapboxProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapboxProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl MapboxProvider {
    pub fn new(client: reqwest::Client, credential: ApiCredential) -> Self {
        Self {
            client,
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct MapboxResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    /// `[longitude, latitude]`
    center: [f64; 2],
    #[serde(default)]
    place_type: Vec<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    place_name: Option<String>,
    #[serde(default)]
    properties: Map<String, JsonValue>,
    #[serde(default)]
    context: Vec<ContextEntry>,
}

#[derive(Debug, Deserialize)]
struct ContextEntry {
    /// e.g. `postcode.8461`
    id: String,
    text: String,
}

impl Feature {
    fn into_candidate(self) -> GeocodeCandidate {
        let postal_code = self
            .properties
            .get("postcode")
            .and_then(JsonValue::as_str)
            .map(String::from)
            .or_else(|| {
                self.place_type
                    .iter()
                    .any(|t| t == "postcode")
                    .then(|| self.text.clone())
                    .flatten()
            });

        let address: Map<String, JsonValue> = self
            .context
            .into_iter()
            .filter_map(|entry| {
                let kind = entry.id.split('.').next()?.to_string();
                Some((kind, JsonValue::String(entry.text)))
            })
            .collect();

        GeocodeCandidate {
            latitude: self.center[1],
            longitude: self.center[0],
            postal_code,
            address: (!address.is_empty()).then_some(address),
            formatted_address: self.place_name,
        }
    }
}

#[async_trait]
impl GeocodingProvider for MapboxProvider {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeCandidate>, UpstreamError> {
        let path = format!("{query}.json");
        let url = endpoint(&self.base_url, &["geocoding", "v5", "mapbox.places", &path])?;

        let request = self.client.get(url).query(&[
            ("access_token", self.credential.expose()),
            ("limit", RESULT_LIMIT),
        ]);

        let body: MapboxResponse = get_json(request).await?;
        Ok(body.features.into_iter().map(Feature::into_candidate).collect())
    }

    fn name(&self) -> &str {
        "mapbox"
    }
}
