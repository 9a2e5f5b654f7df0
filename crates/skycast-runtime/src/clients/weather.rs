//! Current conditions and forecast retrieval with caching and stale fallback.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use skycast_core::builder::{build_snapshot, CurrentConditions, DailySeries};
use skycast_core::{Coordinates, ForecastError, Upstream, WeatherSnapshot, UNKNOWN_POSTAL_CODE};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ResultCache;
use crate::providers::{UpstreamError, WeatherProvider};
use crate::resilience::{CircuitBreaker, CircuitError, RetryPolicy};

/// A validated weather request.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherQuery {
    coordinates: Coordinates,
    postal_code: String,
}

impl WeatherQuery {
    /// Validate coordinates before anything touches the network.
    pub fn new(
        latitude: f64,
        longitude: f64,
        postal_code: impl Into<String>,
    ) -> Result<Self, ForecastError> {
        let coordinates = Coordinates::new(latitude, longitude)?;
        let postal_code = postal_code.into().trim().to_string();
        Ok(Self {
            coordinates,
            postal_code: if postal_code.is_empty() {
                UNKNOWN_POSTAL_CODE.to_string()
            } else {
                postal_code
            },
        })
    }

    pub fn coordinates(&self) -> Coordinates {
        self.coordinates
    }

    pub fn postal_code(&self) -> &str {
        &self.postal_code
    }

    /// Postal code when known, otherwise coordinates to two decimals.
    pub fn cache_key(&self) -> String {
        if self.postal_code != UNKNOWN_POSTAL_CODE {
            return self.postal_code.clone();
        }
        format!(
            "{:.2},{:.2}",
            self.coordinates.latitude(),
            self.coordinates.longitude()
        )
    }
}

/// Weather client: cache, then circuit breaker, then retried upstream call.
pub struct WeatherClient {
    provider: Arc<dyn WeatherProvider>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    cache: Arc<ResultCache<WeatherSnapshot>>,
    ttl: Duration,
}

impl WeatherClient {
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        cache: Arc<ResultCache<WeatherSnapshot>>,
    ) -> Self {
        let ttl = cache.default_ttl();
        Self {
            provider,
            breaker,
            retry,
            cache,
            ttl,
        }
    }

    /// Override the freshness window for entries this client writes.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Fetch a snapshot, preferring a fresh cache entry.
    ///
    /// When the upstream cannot answer, an expired entry for the same key is
    /// served with `is_stale` set. A rejected request (4xx) is never masked
    /// by stale data.
    #[tracing::instrument(skip_all, fields(postal_code = %query.postal_code))]
    pub async fn fetch(&self, query: &WeatherQuery) -> Result<WeatherSnapshot, ForecastError> {
        let key = query.cache_key();

        if let Some(hit) = self.cache.read(&key).await {
            tracing::debug!(key = %key, "Weather cache hit");
            return Ok(hit.value.from_cache(false));
        }

        if self.breaker.is_open() {
            tracing::warn!(upstream = %Upstream::Weather, "Circuit open, trying stale cache");
            return self
                .stale_or(&key, ForecastError::ServiceUnavailable(Upstream::Weather))
                .await;
        }

        match self.fetch_upstream(query.coordinates).await {
            Ok(snapshot) => {
                self.cache
                    .insert_at(key, snapshot.clone(), self.ttl, snapshot.captured_at)
                    .await;
                Ok(snapshot)
            }
            Err(e @ ForecastError::InvalidRequest { .. }) => Err(e),
            Err(e) => self.stale_or(&key, e).await,
        }
    }

    async fn fetch_upstream(&self, coordinates: Coordinates) -> Result<WeatherSnapshot, ForecastError> {
        let provider = &self.provider;
        let retry = &self.retry;
        let payload = self
            .breaker
            .run(move || retry.execute(move || provider.forecast(coordinates)))
            .await
            .map_err(classify)?;

        decode_payload(&payload, Utc::now())
    }

    async fn stale_or(&self, key: &str, error: ForecastError) -> Result<WeatherSnapshot, ForecastError> {
        match self.cache.read_allow_stale(key).await {
            Some(hit) => {
                tracing::warn!(
                    key = %key,
                    captured_at = %hit.captured_at,
                    error = %error,
                    "Serving cached weather after upstream failure"
                );
                Ok(hit.value.from_cache(hit.is_stale))
            }
            None => {
                tracing::error!(key = %key, error = %error, "Weather fetch failed with no cached fallback");
                Err(error)
            }
        }
    }
}

fn classify(error: CircuitError<UpstreamError>) -> ForecastError {
    let upstream = Upstream::Weather;
    match error {
        CircuitError::Open(_) => ForecastError::ServiceUnavailable(upstream),
        CircuitError::Operation(e) => match e {
            UpstreamError::Timeout(detail) => ForecastError::Timeout { upstream, detail },
            UpstreamError::Status(status) if (400..500).contains(&status) => {
                ForecastError::InvalidRequest { upstream, status }
            }
            UpstreamError::Parse(detail) => ForecastError::InvalidResponse { upstream, detail },
            other => ForecastError::FetchFailed {
                upstream,
                detail: other.to_string(),
            },
        },
    }
}

fn section<'a>(payload: &'a JsonValue, name: &str) -> Result<&'a Map<String, JsonValue>, ForecastError> {
    payload
        .get(name)
        .and_then(JsonValue::as_object)
        .filter(|section| !section.is_empty())
        .ok_or_else(|| ForecastError::InvalidResponse {
            upstream: Upstream::Weather,
            detail: format!("missing or empty `{name}` section"),
        })
}

fn weather_code(value: &JsonValue) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|code| code as i64))
}

fn series<T>(
    section: &Map<String, JsonValue>,
    key: &str,
    read: impl Fn(&JsonValue) -> Option<T>,
) -> Vec<Option<T>> {
    section
        .get(key)
        .and_then(JsonValue::as_array)
        .map(|values| values.iter().map(&read).collect())
        .unwrap_or_default()
}

/// Validate an Open-Meteo document and build a fresh snapshot from it.
pub(crate) fn decode_payload(
    payload: &JsonValue,
    captured_at: DateTime<Utc>,
) -> Result<WeatherSnapshot, ForecastError> {
    let current = section(payload, "current")?;
    let daily = section(payload, "daily")?;

    let current = CurrentConditions {
        temperature: current.get("temperature_2m").and_then(JsonValue::as_f64),
        apparent_temperature: current.get("apparent_temperature").and_then(JsonValue::as_f64),
        relative_humidity: current.get("relative_humidity_2m").and_then(JsonValue::as_f64),
        weather_code: current.get("weather_code").and_then(weather_code),
        wind_speed: current.get("wind_speed_10m").and_then(JsonValue::as_f64),
    };

    // Non-string dates become empty and are dropped by the builder, keeping
    // the other series aligned by index.
    let daily = DailySeries {
        time: series(daily, "time", |v| v.as_str().map(String::from))
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect(),
        temperature_max: series(daily, "temperature_2m_max", JsonValue::as_f64),
        temperature_min: series(daily, "temperature_2m_min", JsonValue::as_f64),
        weather_code: series(daily, "weather_code", weather_code),
        precipitation_probability: series(daily, "precipitation_probability_max", JsonValue::as_f64),
    };

    Ok(build_snapshot(&current, &daily, captured_at))
}
