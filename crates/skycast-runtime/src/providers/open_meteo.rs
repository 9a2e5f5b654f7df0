//! Open-Meteo forecast API - free, no API key required.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use skycast_core::builder::MAX_FORECAST_DAYS;
use skycast_core::Coordinates;

use super::{endpoint, get_json, UpstreamError, WeatherProvider};

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";

const CURRENT_FIELDS: &str =
    "temperature_2m,relative_humidity_2m,apparent_temperature,weather_code,wind_speed_10m";
const DAILY_FIELDS: &str = "weather_code,temperature_2m_max,temperature_2m_min,precipitation_sum,precipitation_probability_max";

/// Open-Meteo forecast provider.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteoProvider {
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

/// Query parameters for a forecast request: imperial units, local timezone,
/// seven days.
pub fn query_params(coordinates: Coordinates) -> Vec<(&'static str, String)> {
    vec![
        ("latitude", coordinates.latitude().to_string()),
        ("longitude", coordinates.longitude().to_string()),
        ("current", CURRENT_FIELDS.to_string()),
        ("daily", DAILY_FIELDS.to_string()),
        ("temperature_unit", "fahrenheit".to_string()),
        ("wind_speed_unit", "mph".to_string()),
        ("precipitation_unit", "inch".to_string()),
        ("timezone", "auto".to_string()),
        ("forecast_days", MAX_FORECAST_DAYS.to_string()),
    ]
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    async fn forecast(&self, coordinates: Coordinates) -> Result<JsonValue, UpstreamError> {
        let url = endpoint(&self.base_url, &["v1", "forecast"])?;
        let request = self.client.get(url).query(&query_params(coordinates));
        get_json(request).await
    }

    fn name(&self) -> &str {
        "open-meteo"
    }
}
