//! Forecast orchestrator.
//!
//! Sequences one retrieval: geocode the address, then fetch weather for the
//! result, then merge both into a [`Forecast`]. The requester's timezone is
//! independent of both and can be resolved concurrently.
//!
//! Client failures pass through unchanged. Internal failures, including
//! panics inside the sequence, surface as `RetrievalFailed`.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use skycast_core::{Forecast, ForecastError, TimezoneResult, Upstream, WeatherSnapshot};

use crate::cache::ResultCache;
use crate::clients::{GeocodingClient, TimezoneResolver, WeatherClient, WeatherQuery};
use crate::config::SkycastConfig;
use crate::providers::{
    geocoding_provider, http_client, GeocodingProvider, IpInfoProvider, IpLookupProvider,
    OpenMeteoProvider, WeatherProvider,
};
use crate::resilience::{CircuitBreaker, RetryObserver, RetryPolicy};

/// Runs forecast retrievals against the three upstream clients.
///
/// # Architecture
/// - Sequential: geocoding, then weather (weather needs the coordinates)
/// - Concurrent: timezone lookup alongside, via `tokio::join!`
/// - Resilience: one breaker per upstream, shared weather cache
pub struct ForecastOrchestrator {
    geocoding: GeocodingClient,
    weather: WeatherClient,
    timezone: TimezoneResolver,
    cache: Arc<ResultCache<WeatherSnapshot>>,
}

impl ForecastOrchestrator {
    /// Start building an orchestrator.
    pub fn builder() -> ForecastOrchestratorBuilder {
        ForecastOrchestratorBuilder::new()
    }

    /// Build HTTP providers and clients from configuration.
    pub fn from_config(config: &SkycastConfig) -> Result<Self, ForecastError> {
        let client = http_client(&config.http).map_err(|e| ForecastError::internal(e.to_string()))?;

        let geocoding = geocoding_provider(&config.geocoding, client.clone())
            .map_err(|e| ForecastError::internal(e.to_string()))?;
        let timezone = IpInfoProvider::new(client.clone()).with_base_url(config.timezone.base_url.as_str());
        let weather = OpenMeteoProvider::new(client).with_base_url(config.weather.base_url.as_str());

        Self::builder()
            .config(config.clone())
            .geocoding_provider(geocoding)
            .ip_lookup_provider(Arc::new(timezone))
            .weather_provider(Arc::new(weather))
            .build()
    }

    /// Retrieve the forecast for a free-text address.
    #[tracing::instrument(skip_all)]
    pub async fn retrieve<'a>(
        &self,
        address: impl Into<Option<&'a str>>,
    ) -> Result<Forecast, ForecastError> {
        let address = address.into();

        match AssertUnwindSafe(self.run(address)).catch_unwind().await {
            Ok(Ok(forecast)) => Ok(forecast),
            Ok(Err(ForecastError::Internal(detail))) => {
                tracing::error!(error = %detail, "Forecast retrieval failed");
                Err(ForecastError::RetrievalFailed(detail))
            }
            Ok(Err(e)) => Err(e),
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                tracing::error!(error = %detail, "Forecast retrieval panicked");
                Err(ForecastError::RetrievalFailed(detail))
            }
        }
    }

    /// Retrieve a forecast and resolve the requester's timezone concurrently.
    pub async fn retrieve_with_timezone<'a>(
        &self,
        address: impl Into<Option<&'a str>>,
        ip_address: &str,
    ) -> (Result<Forecast, ForecastError>, TimezoneResult) {
        tokio::join!(self.retrieve(address), self.timezone.resolve(ip_address))
    }

    /// Resolve a requester IP on its own.
    pub async fn resolve_timezone(&self, ip_address: &str) -> TimezoneResult {
        self.timezone.resolve(ip_address).await
    }

    /// The shared weather cache.
    pub fn cache(&self) -> &Arc<ResultCache<WeatherSnapshot>> {
        &self.cache
    }

    async fn run(&self, address: Option<&str>) -> Result<Forecast, ForecastError> {
        let geocode = self.geocoding.resolve(address).await?;
        let query = WeatherQuery::new(
            geocode.latitude,
            geocode.longitude,
            geocode.postal_code.as_str(),
        )?;
        let weather = self.weather.fetch(&query).await?;

        tracing::info!(
            postal_code = %geocode.postal_code,
            served_from_cache = weather.served_from_cache,
            is_stale = weather.is_stale,
            "Forecast retrieved"
        );
        Ok(Forecast::from_parts(geocode, weather))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic during retrieval".to_string())
}

/// Builder for ForecastOrchestrator.
pub struct ForecastOrchestratorBuilder {
    config: SkycastConfig,
    geocoding: Option<Arc<dyn GeocodingProvider>>,
    ip_lookup: Option<Arc<dyn IpLookupProvider>>,
    weather: Option<Arc<dyn WeatherProvider>>,
    cache: Option<Arc<ResultCache<WeatherSnapshot>>>,
    observer: Option<RetryObserver>,
}

impl ForecastOrchestratorBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: SkycastConfig::default(),
            geocoding: None,
            ip_lookup: None,
            weather: None,
            cache: None,
            observer: None,
        }
    }

    /// Set the configuration (breaker, retry and cache settings).
    pub fn config(mut self, config: SkycastConfig) -> Self {
        self.config = config;
        self
    }

    pub fn geocoding_provider(mut self, provider: Arc<dyn GeocodingProvider>) -> Self {
        self.geocoding = Some(provider);
        self
    }

    pub fn ip_lookup_provider(mut self, provider: Arc<dyn IpLookupProvider>) -> Self {
        self.ip_lookup = Some(provider);
        self
    }

    pub fn weather_provider(mut self, provider: Arc<dyn WeatherProvider>) -> Self {
        self.weather = Some(provider);
        self
    }

    /// Share an existing weather cache instead of creating one.
    pub fn cache(mut self, cache: Arc<ResultCache<WeatherSnapshot>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Observe retries on every upstream.
    pub fn retry_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<ForecastOrchestrator, ForecastError> {
        let missing = |what: &str| ForecastError::internal(format!("No {what} provider set"));
        let geocoding = self.geocoding.ok_or_else(|| missing("geocoding"))?;
        let ip_lookup = self.ip_lookup.ok_or_else(|| missing("IP lookup"))?;
        let weather = self.weather.ok_or_else(|| missing("weather"))?;

        let config = &self.config;
        let breaker =
            |upstream| Arc::new(CircuitBreaker::new(upstream, config.circuit_breaker.clone()));
        let observer = self.observer;
        let retry = |upstream, retry_config| {
            let policy = RetryPolicy::new(upstream, retry_config);
            match &observer {
                Some(observer) => policy.with_observer(Arc::clone(observer)),
                None => policy,
            }
        };

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(ResultCache::new(&config.cache)));

        Ok(ForecastOrchestrator {
            geocoding: GeocodingClient::new(
                geocoding,
                breaker(Upstream::Geocoding),
                retry(Upstream::Geocoding, config.geocoding.retry.clone()),
            ),
            timezone: TimezoneResolver::new(
                ip_lookup,
                breaker(Upstream::Timezone),
                retry(Upstream::Timezone, config.timezone.retry.clone()),
            ),
            weather: WeatherClient::new(
                weather,
                breaker(Upstream::Weather),
                retry(Upstream::Weather, config.weather.retry.clone()),
                Arc::clone(&cache),
            )
            .with_ttl(config.cache.ttl),
            cache,
        })
    }
}

impl Default for ForecastOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
