//! Address to coordinates resolution.

use serde_json::Value as JsonValue;
use skycast_core::address::require_address;
use skycast_core::{ForecastError, GeocodeResult, Upstream, UNKNOWN_POSTAL_CODE};
use std::sync::Arc;

use crate::providers::{GeocodeCandidate, GeocodingProvider, UpstreamError};
use crate::resilience::{CircuitBreaker, CircuitError, RetryPolicy};

/// Keys checked, in order, inside a candidate's address components.
const POSTAL_COMPONENT_KEYS: [&str; 2] = ["postcode", "postal_code"];

/// Resolves a free-text address through the geocoding upstream.
pub struct GeocodingClient {
    provider: Arc<dyn GeocodingProvider>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl GeocodingClient {
    pub fn new(
        provider: Arc<dyn GeocodingProvider>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            breaker,
            retry,
        }
    }

    /// Resolve an address to coordinates and postal code.
    ///
    /// A blank address fails with `InvalidInput` before the breaker is
    /// consulted. A lookup with no match is `NotFound` and does not count
    /// against the circuit.
    #[tracing::instrument(skip_all, fields(provider = self.provider.name()))]
    pub async fn resolve<'a>(
        &self,
        address: impl Into<Option<&'a str>>,
    ) -> Result<GeocodeResult, ForecastError> {
        let query = require_address(address.into())?;

        if self.breaker.is_open() {
            tracing::warn!(upstream = %Upstream::Geocoding, "Circuit open, skipping geocoding");
            return Err(ForecastError::ServiceUnavailable(Upstream::Geocoding));
        }

        let provider = &self.provider;
        let retry = &self.retry;
        let search = query.as_str();
        let candidates = self
            .breaker
            .run(move || retry.execute(move || provider.search(search)))
            .await
            .map_err(|e| classify(e, &query))?;

        let Some(first) = candidates.into_iter().next() else {
            tracing::info!(query = %query, "No geocoding match");
            return Err(ForecastError::NotFound {
                upstream: Upstream::Geocoding,
                query,
            });
        };

        let result = GeocodeResult {
            latitude: first.latitude,
            longitude: first.longitude,
            postal_code: postal_code(&first),
            formatted_address: first.formatted_address,
        };
        tracing::debug!(
            postal_code = %result.postal_code,
            latitude = result.latitude,
            longitude = result.longitude,
            "Geocoded address"
        );
        Ok(result)
    }
}

fn classify(error: CircuitError<UpstreamError>, query: &str) -> ForecastError {
    match error {
        CircuitError::Open(_) => ForecastError::ServiceUnavailable(Upstream::Geocoding),
        CircuitError::Operation(e) => {
            tracing::error!(query = %query, error = %e, "Geocoding failed");
            if e.is_timeout() {
                ForecastError::Timeout {
                    upstream: Upstream::Geocoding,
                    detail: e.to_string(),
                }
            } else {
                ForecastError::FetchFailed {
                    upstream: Upstream::Geocoding,
                    detail: e.to_string(),
                }
            }
        }
    }
}

/// Dedicated field, then address components, then the `unknown` sentinel.
fn postal_code(candidate: &GeocodeCandidate) -> String {
    let dedicated = candidate
        .postal_code
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let nested = || {
        let components = candidate.address.as_ref()?;
        POSTAL_COMPONENT_KEYS.iter().find_map(|key| {
            components
                .get(*key)
                .and_then(JsonValue::as_str)
                .map(str::trim)
                .filter(|p| !p.is_empty())
        })
    };

    dedicated
        .or_else(nested)
        .unwrap_or(UNKNOWN_POSTAL_CODE)
        .to_string()
}
