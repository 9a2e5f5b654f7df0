//! End-to-end retrieval against a mock HTTP upstream.
//!
//! Every upstream base URL points at one wiremock server. Retry intervals
//! are shrunk to milliseconds so exhausted retries finish quickly.

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value as JsonValue};
use skycast_core::builder::{build_snapshot, CurrentConditions, DailySeries};
use skycast_core::{EnglishCatalog, ErrorKind, MessageCatalog, Reading, Upstream};
use skycast_runtime::{ForecastOrchestrator, GeocodingBackend, RetryConfig, SkycastConfig};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry(max_tries: u32) -> RetryConfig {
    RetryConfig {
        max_tries,
        base_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(4),
        multiplier: 2.0,
    }
}

fn config(server: &MockServer) -> SkycastConfig {
    let mut config = SkycastConfig::default();
    config.geocoding.backend = GeocodingBackend::Nominatim;
    config.geocoding.base_url = Some(server.uri());
    config.geocoding.retry = fast_retry(3);
    config.timezone.base_url = server.uri();
    config.timezone.retry = fast_retry(2);
    config.weather.base_url = server.uri();
    config.weather.retry = fast_retry(3);
    config
}

fn orchestrator(server: &MockServer) -> ForecastOrchestrator {
    ForecastOrchestrator::from_config(&config(server)).unwrap()
}

fn new_york_places() -> JsonValue {
    json!([{
        "lat": "40.7127281",
        "lon": "-74.0060152",
        "display_name": "New York, United States",
        "address": {"city": "New York", "state": "New York", "postcode": "10001"}
    }])
}

fn new_york_weather() -> JsonValue {
    json!({
        "latitude": 40.71,
        "longitude": -74.01,
        "timezone": "America/New_York",
        "current": {
            "time": "2026-02-05T12:00",
            "temperature_2m": 72.5,
            "relative_humidity_2m": 65,
            "apparent_temperature": 70.2,
            "weather_code": 0,
            "wind_speed_10m": 8.5
        },
        "daily": {
            "time": ["2026-02-05", "2026-02-06", "2026-02-07", "2026-02-08",
                     "2026-02-09", "2026-02-10", "2026-02-11"],
            "weather_code": [0, 1, 2, 3, 61, 0, 1],
            "temperature_2m_max": [75.2, 73.4, 71.6, 69.8, 72.5, 74.3, 76.1],
            "temperature_2m_min": [55.4, 54.7, 53.6, 52.3, 54.1, 55.8, 57.2],
            "precipitation_sum": [0.0, 0.0, 0.0, 0.0, 0.3, 0.0, 0.0],
            "precipitation_probability_max": [0, 10, 20, 30, 80, 5, 15]
        }
    })
}

async fn mount_geocoding(server: &MockServer, body: JsonValue) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_new_york_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "New York, NY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(new_york_places()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("temperature_unit", "fahrenheit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(new_york_weather()))
        .expect(1)
        .mount(&server)
        .await;

    let forecast = orchestrator(&server).retrieve("  New York,   NY ").await.unwrap();

    assert_eq!(forecast.postal_code, "10001");
    assert_eq!(forecast.current_temperature, Reading::Value(73));
    assert_eq!(forecast.high_temperature, Reading::Value(75));
    assert_eq!(forecast.low_temperature, Reading::Value(55));
    assert_eq!(forecast.current_conditions, "Clear sky");
    assert_eq!(
        forecast.detailed_forecast,
        "Clear sky. High of 75°F and low of 55°F. Humidity: 65%. Wind speed: 8.5 mph."
    );
    assert_eq!(forecast.extended_forecast.len(), 7);
    assert_eq!(forecast.extended_forecast[0].day_label, "Today");
    assert_eq!(forecast.extended_forecast[0].date_label, "February 05");
    assert_eq!(forecast.extended_forecast[1].day_label, "Friday");

    let temperatures = forecast.temperatures();
    assert_eq!(temperatures.current, "73°F");
    assert_eq!(temperatures.high, "75°F");
    assert_eq!(temperatures.low, "55°F");
    assert_eq!(forecast.cache_status(), "Fresh Data");
}

#[tokio::test]
async fn test_repeat_retrieval_hits_weather_once() {
    let server = MockServer::start().await;
    mount_geocoding(&server, new_york_places()).await;
    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(new_york_weather()))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&server);
    let first = orchestrator.retrieve("New York").await.unwrap();
    let second = orchestrator.retrieve("New York").await.unwrap();

    assert!(!first.served_from_cache);
    assert!(second.served_from_cache);
    assert!(!second.is_stale);
    assert_eq!(second.current_temperature, first.current_temperature);
    assert!(second.cache_status().starts_with("Cached (Retrieved at "));
}

#[tokio::test]
async fn test_blank_address_never_reaches_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&server);
    for blank in ["", "   ", "\t\n"] {
        let err = orchestrator.retrieve(blank).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
    let err = orchestrator.retrieve(None::<&str>).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_geocoding_breaker_trips_and_short_circuits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&server);
    for _ in 0..5 {
        let err = orchestrator.retrieve("New York").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FetchFailed);
    }
    let requests = server.received_requests().await.unwrap().len();
    assert_eq!(requests, 15);

    let err = orchestrator.retrieve("New York").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    assert_eq!(err.upstream(), Some(Upstream::Geocoding));
    assert_eq!(server.received_requests().await.unwrap().len(), requests);
}

#[tokio::test]
async fn test_not_found_address() {
    let server = MockServer::start().await;
    mount_geocoding(&server, json!([])).await;

    let err = orchestrator(&server).retrieve("Nowhere at all").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(
        err.user_message(),
        EnglishCatalog.message(ErrorKind::NotFound, Some(Upstream::Geocoding))
    );
}

#[tokio::test]
async fn test_expired_entry_served_when_weather_fails() {
    let server = MockServer::start().await;
    mount_geocoding(&server, new_york_places()).await;
    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&server);
    let captured_at = Utc::now() - ChronoDuration::hours(2);
    let current = CurrentConditions {
        temperature: Some(61.0),
        weather_code: Some(3),
        ..Default::default()
    };
    let snapshot = build_snapshot(&current, &DailySeries::default(), captured_at);
    orchestrator
        .cache()
        .insert_at("10001", snapshot, Duration::from_secs(30 * 60), captured_at)
        .await;

    let forecast = orchestrator.retrieve("New York").await.unwrap();

    assert!(forecast.served_from_cache);
    assert!(forecast.is_stale);
    assert_eq!(forecast.current_temperature, Reading::Value(61));
    assert_eq!(forecast.current_conditions, "Overcast");
    assert!(forecast.cache_status().contains("may be outdated"));
}

#[tokio::test]
async fn test_weather_failure_without_cache_surfaces() {
    let server = MockServer::start().await;
    mount_geocoding(&server, new_york_places()).await;
    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let err = orchestrator(&server).retrieve("New York").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(err.upstream(), Some(Upstream::Weather));
}

#[tokio::test]
async fn test_unparsable_dates_dropped_in_order() {
    let server = MockServer::start().await;
    mount_geocoding(&server, new_york_places()).await;
    let mut weather = new_york_weather();
    weather["daily"]["time"] = json!([
        "2026-02-05", "not-a-date", "2026-02-07", "2026-02-08",
        "2026-13-40", "2026-02-10", "2026-02-11"
    ]);
    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather))
        .mount(&server)
        .await;

    let forecast = orchestrator(&server).retrieve("New York").await.unwrap();
    let labels: Vec<&str> = forecast
        .extended_forecast
        .iter()
        .map(|day| day.date_label.as_str())
        .collect();

    assert_eq!(
        labels,
        ["February 05", "February 07", "February 08", "February 10", "February 11"]
    );
    assert_eq!(forecast.extended_forecast[0].day_label, "Today");
    assert_eq!(forecast.extended_forecast[1].day_label, "Saturday");
}

#[tokio::test]
async fn test_private_ip_makes_no_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let orchestrator = orchestrator(&server);
    for ip in ["127.0.0.1", "10.0.0.8", "192.168.1.20", "::1", "garbage"] {
        let result = orchestrator.resolve_timezone(ip).await;
        assert_eq!(result.timezone, "UTC");
        assert!(result.city.is_none());
    }
}

#[tokio::test]
async fn test_timezone_from_longitude_bands() {
    let cases = [
        ("8.8.4.1", "40.0,-80.0", "America/Chicago"),
        ("8.8.4.2", "40.0,-95.0", "America/Denver"),
        ("8.8.4.3", "40.0,-120.0", "America/Los_Angeles"),
        ("8.8.4.4", "40.0,-125.0", "America/Los_Angeles"),
    ];

    let server = MockServer::start().await;
    for (ip, loc, _) in cases {
        Mock::given(method("GET"))
            .and(path(format!("/{ip}/json")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ip": ip,
                "city": "Somewhere",
                "country": "US",
                "loc": loc
            })))
            .mount(&server)
            .await;
    }

    let orchestrator = orchestrator(&server);
    for (ip, _, expected) in cases {
        assert_eq!(orchestrator.resolve_timezone(ip).await.timezone, expected, "{ip}");
    }
}

#[tokio::test]
async fn test_forecast_and_timezone_together() {
    let server = MockServer::start().await;
    mount_geocoding(&server, new_york_places()).await;
    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(new_york_weather()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/73.12.44.1/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ip": "73.12.44.1",
            "city": "Brooklyn",
            "region": "New York",
            "country": "US",
            "loc": "40.6501,-73.9496",
            "timezone": "America/New_York"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (forecast, timezone) = orchestrator(&server)
        .retrieve_with_timezone("New York", "73.12.44.1")
        .await;

    assert_eq!(forecast.unwrap().postal_code, "10001");
    assert_eq!(timezone.timezone, "America/New_York");
    assert_eq!(
        skycast_core::format_city(&timezone).as_deref(),
        Some("Brooklyn, New York")
    );
}
