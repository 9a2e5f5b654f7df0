//! Nominatim (OpenStreetMap) forward geocoding - free, no API key required.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use super::{endpoint, get_json, GeocodeCandidate, GeocodingProvider, UpstreamError};

pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Nominatim geocoding provider.
///
/// Nominatim's usage policy requires an identifying User-Agent, which the
/// shared client sets.
#[derive(Debug, Clone)]
pub struct NominatimProvider {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
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
struct Place {
    lat: String,
    lon: String,
    display_name: Option<String>,
    address: Option<Map<String, JsonValue>>,
}

impl Place {
    fn into_candidate(self) -> Option<GeocodeCandidate> {
        let latitude = self.lat.trim().parse().ok()?;
        let longitude = self.lon.trim().parse().ok()?;
        Some(GeocodeCandidate {
            latitude,
            longitude,
            // Nominatim only reports the postcode inside `address`.
            postal_code: None,
            address: self.address,
            formatted_address: self.display_name,
        })
    }
}

#[async_trait]
impl GeocodingProvider for NominatimProvider {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeCandidate>, UpstreamError> {
        let url = endpoint(&self.base_url, &["search"])?;
        let request = self.client.get(url).query(&[
            ("q", query),
            ("format", "jsonv2"),
            ("addressdetails", "1"),
            ("limit", "5"),
        ]);

        let places: Vec<Place> = get_json(request).await?;
        Ok(places
            .into_iter()
            .filter_map(|place| {
                let name = place.display_name.clone();
                let candidate = place.into_candidate();
                if candidate.is_none() {
                    tracing::debug!(place = ?name, "Skipping Nominatim result with bad coordinates");
                }
                candidate
            })
            .collect())
    }

    fn name(&self) -> &str {
        "nominatim"
    }
}
