//! # skycast-runtime
//!
//! Resilient retrieval for Skycast: upstream providers, circuit breakers,
//! retries, the weather cache and the orchestrator that ties them together.
//!
//! ## Layers
//!
//! - [`providers`]: HTTP adapters for Mapbox/Nominatim, ipinfo and Open-Meteo
//!   behind async traits
//! - [`resilience`]: per-upstream circuit breaker and retry policy
//! - [`cache`]: time-expiring result cache with stale reads
//! - [`clients`]: one client per upstream, combining the above
//! - [`orchestrator`]: geocode, then fetch weather, then merge
//!
//! Domain types and errors come from `skycast-core`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use skycast_runtime::{ForecastOrchestrator, SkycastConfig};
//!
//! let config = SkycastConfig::load(None)?;
//! let orchestrator = ForecastOrchestrator::from_config(&config)?;
//!
//! let forecast = orchestrator.retrieve("1600 Pennsylvania Ave, Washington DC").await?;
//! println!("{}", forecast.temperatures().current);
//! ```

pub mod cache;
pub mod clients;
pub mod config;
pub mod orchestrator;
pub mod providers;
pub mod resilience;

pub use cache::{CacheConfig, CacheHit, ResultCache};
pub use clients::{GeocodingClient, TimezoneResolver, WeatherClient, WeatherQuery};
pub use config::{ConfigError, GeocodingBackend, SkycastConfig};
pub use orchestrator::{ForecastOrchestrator, ForecastOrchestratorBuilder};
pub use providers::UpstreamError;
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig, RetryPolicy};
