//! Requester IP to timezone resolution. Never fails: every miss is UTC.

use chrono_tz::Tz;
use serde_json::Value as JsonValue;
use skycast_core::network::{is_local_or_private, parse_ip};
use skycast_core::{TimezoneResult, Upstream, DEFAULT_TIMEZONE};
use std::sync::Arc;

use crate::providers::{IpLocation, IpLookupProvider};
use crate::resilience::{CircuitBreaker, RetryPolicy};

/// Continental-US approximation: western edge of each zone, east to west.
const LONGITUDE_BANDS: [(f64, &str); 4] = [
    (-75.0, "America/New_York"),
    (-90.0, "America/Chicago"),
    (-115.0, "America/Denver"),
    (-130.0, "America/Los_Angeles"),
];

/// Timezone name for a longitude when the upstream gives none.
///
/// Outside the bands (including anywhere east of -75) this is a coarse
/// guess, not a geographic lookup.
pub fn timezone_for_longitude(longitude: f64) -> &'static str {
    LONGITUDE_BANDS
        .iter()
        .find(|(edge, _)| longitude > *edge)
        .map(|(_, zone)| *zone)
        .unwrap_or(DEFAULT_TIMEZONE)
}

/// First valid IANA name among the shapes upstreams use.
fn timezone_from_payload(data: &JsonValue) -> Option<&str> {
    let candidates = [
        data.get("timezone").and_then(JsonValue::as_str),
        data.pointer("/location/time_zone/name")
            .and_then(JsonValue::as_str),
        data.get("time_zone").and_then(JsonValue::as_str),
    ];

    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| name.parse::<Tz>().is_ok())
}

fn timezone_for(location: &IpLocation) -> String {
    if let Some(name) = timezone_from_payload(&location.data) {
        return name.to_string();
    }
    match location.longitude {
        Some(longitude) => timezone_for_longitude(longitude).to_string(),
        None => DEFAULT_TIMEZONE.to_string(),
    }
}

/// Resolves requester IPs to a timezone and coarse location.
pub struct TimezoneResolver {
    provider: Arc<dyn IpLookupProvider>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl TimezoneResolver {
    pub fn new(
        provider: Arc<dyn IpLookupProvider>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            breaker,
            retry,
        }
    }

    /// Resolve an IP. Local, private and unparsable addresses never reach
    /// the upstream.
    #[tracing::instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn resolve(&self, ip_address: &str) -> TimezoneResult {
        let Some(ip) = parse_ip(ip_address) else {
            tracing::debug!("Unparsable IP, using UTC");
            return TimezoneResult::utc();
        };
        if is_local_or_private(&ip) {
            tracing::debug!("Local or private IP, using UTC");
            return TimezoneResult::utc();
        }
        if self.breaker.is_open() {
            tracing::warn!(upstream = %Upstream::Timezone, "Circuit open, using UTC");
            return TimezoneResult::utc();
        }

        let provider = &self.provider;
        let retry = &self.retry;
        let location = match self
            .breaker
            .run(move || retry.execute(move || provider.lookup(ip)))
            .await
        {
            Ok(Some(location)) => location,
            Ok(None) => {
                tracing::info!("No location record, using UTC");
                return TimezoneResult::utc();
            }
            Err(e) => {
                tracing::warn!(upstream = %Upstream::Timezone, error = %e, "Lookup failed, using UTC");
                return TimezoneResult::utc();
            }
        };

        let timezone = timezone_for(&location);
        tracing::debug!(timezone = %timezone, "Resolved timezone");
        TimezoneResult {
            timezone,
            city: location.city,
            state: location.state,
            country: location.country,
            country_code: location.country_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::UpstreamError;
    use crate::resilience::{CircuitBreakerConfig, RetryConfig};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockLookup {
        calls: AtomicUsize,
        response: Result<Option<IpLocation>, UpstreamError>,
    }

    impl MockLookup {
        fn new(response: Result<Option<IpLocation>, UpstreamError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                response,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IpLookupProvider for MockLookup {
        async fn lookup(&self, _ip: IpAddr) -> Result<Option<IpLocation>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn resolver(provider: Arc<MockLookup>) -> (TimezoneResolver, Arc<CircuitBreaker>) {
        let breaker = Arc::new(CircuitBreaker::new(
            Upstream::Timezone,
            CircuitBreakerConfig::default(),
        ));
        let resolver = TimezoneResolver::new(
            provider,
            Arc::clone(&breaker),
            RetryPolicy::new(Upstream::Timezone, RetryConfig::timezone()),
        );
        (resolver, breaker)
    }

    fn location(data: JsonValue, longitude: Option<f64>) -> IpLocation {
        IpLocation {
            latitude: longitude.map(|_| 40.0),
            longitude,
            city: Some("Denver".to_string()),
            state: Some("Colorado".to_string()),
            country: Some("United States".to_string()),
            country_code: Some("US".to_string()),
            data,
        }
    }

    #[test]
    fn test_longitude_bands() {
        assert_eq!(timezone_for_longitude(-73.9), "America/New_York");
        assert_eq!(timezone_for_longitude(-80.0), "America/Chicago");
        assert_eq!(timezone_for_longitude(-95.0), "America/Denver");
        assert_eq!(timezone_for_longitude(-120.0), "America/Los_Angeles");
        assert_eq!(timezone_for_longitude(-125.0), "America/Los_Angeles");
        assert_eq!(timezone_for_longitude(-150.0), "UTC");
        // Edges belong to the western zone.
        assert_eq!(timezone_for_longitude(-75.0), "America/Chicago");
        assert_eq!(timezone_for_longitude(-130.0), "UTC");
    }

    proptest! {
        #[test]
        fn test_band_is_always_a_valid_zone(longitude in -180.0f64..=180.0) {
            let zone = timezone_for_longitude(longitude);
            prop_assert!(zone.parse::<Tz>().is_ok());
        }

        #[test]
        fn test_bands_shift_west_monotonically(a in -180.0f64..=180.0, b in -180.0f64..=180.0) {
            let rank = |zone: &str| match zone {
                "America/New_York" => 0,
                "America/Chicago" => 1,
                "America/Denver" => 2,
                "America/Los_Angeles" => 3,
                _ => 4,
            };
            let (east, west) = if a >= b { (a, b) } else { (b, a) };
            prop_assert!(rank(timezone_for_longitude(east)) <= rank(timezone_for_longitude(west)));
        }
    }

    #[test]
    fn test_payload_shapes() {
        assert_eq!(
            timezone_from_payload(&json!({"timezone": "Europe/Paris"})),
            Some("Europe/Paris")
        );
        assert_eq!(
            timezone_from_payload(&json!({"location": {"time_zone": {"name": "Asia/Tokyo"}}})),
            Some("Asia/Tokyo")
        );
        assert_eq!(
            timezone_from_payload(&json!({"time_zone": "America/Denver"})),
            Some("America/Denver")
        );
        assert_eq!(
            timezone_from_payload(&json!({"timezone": "Mars/Olympus", "time_zone": "UTC"})),
            Some("UTC")
        );
        assert_eq!(timezone_from_payload(&json!({"timezone": 5})), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_private_and_unparsable_ips_make_no_call() {
        let mock = MockLookup::new(Ok(Some(location(json!({}), Some(-100.0)))));
        let (resolver, _) = resolver(Arc::clone(&mock));

        for ip in ["127.0.0.1", "10.1.2.3", "192.168.0.10", "::1", "not-an-ip", ""] {
            assert_eq!(resolver.resolve(ip).await, TimezoneResult::utc(), "{ip}");
        }
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_timezone_wins() {
        let data = json!({"timezone": "America/Denver"});
        let mock = MockLookup::new(Ok(Some(location(data, Some(-73.0)))));
        let (resolver, _) = resolver(Arc::clone(&mock));

        let result = resolver.resolve("73.12.44.1").await;
        assert_eq!(result.timezone, "America/Denver");
        assert_eq!(result.city.as_deref(), Some("Denver"));
        assert_eq!(result.country_code.as_deref(), Some("US"));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_timezone_falls_back_to_longitude() {
        let data = json!({"timezone": "Nowhere/Special"});
        let mock = MockLookup::new(Ok(Some(location(data, Some(-95.0)))));
        let (resolver, _) = resolver(mock);

        assert_eq!(resolver.resolve("8.8.8.8").await.timezone, "America/Denver");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_timezone_and_no_longitude_is_utc() {
        let mock = MockLookup::new(Ok(Some(location(json!({}), None))));
        let (resolver, _) = resolver(mock);

        let result = resolver.resolve("8.8.8.8").await;
        assert_eq!(result.timezone, "UTC");
        assert_eq!(result.city.as_deref(), Some("Denver"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_record_is_utc() {
        let mock = MockLookup::new(Ok(None));
        let (resolver, _) = resolver(mock);
        assert_eq!(resolver.resolve("8.8.8.8").await, TimezoneResult::utc());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_degrade_to_utc_and_open_circuit() {
        let mock = MockLookup::new(Err(UpstreamError::Status(503)));
        let (resolver, breaker) = resolver(Arc::clone(&mock));

        for _ in 0..5 {
            assert_eq!(resolver.resolve("8.8.8.8").await, TimezoneResult::utc());
        }
        // Two tries per call.
        assert_eq!(mock.calls(), 10);
        assert!(breaker.is_open());

        assert_eq!(resolver.resolve("8.8.8.8").await, TimezoneResult::utc());
        assert_eq!(mock.calls(), 10);
    }
}
