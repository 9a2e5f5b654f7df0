//! Resilient clients for each upstream.
//!
//! Each client owns a provider and is handed its breaker (and, for weather,
//! the result cache) at construction, so process-wide state is explicit and
//! shared by reference.

mod geocoding;
mod timezone;
mod weather;

pub use geocoding::GeocodingClient;
pub use timezone::{timezone_for_longitude, TimezoneResolver};
pub use weather::{WeatherClient, WeatherQuery};
