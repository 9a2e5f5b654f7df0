//! # skycast-core
//!
//! Domain model for Skycast forecast retrieval.
//!
//! This crate holds everything that does not touch the network:
//! - Validated coordinates and the result types each lookup produces
//! - The error kinds callers see, and the catalog that renders them
//! - The forecast builder that turns raw readings into display text
//!
//! ## Example
//!
//! ```rust,ignore
//! use skycast_core::builder::{build_snapshot, CurrentConditions, DailySeries};
//!
//! let snapshot = build_snapshot(&current, &daily, chrono::Utc::now());
//! println!("{}", snapshot.detailed_forecast);
//! ```

pub mod address;
pub mod builder;
pub mod conditions;
pub mod display;
pub mod error;
pub mod network;
pub mod types;

// Re-export main types at crate root
pub use display::{format_city, format_temperature, TemperatureDisplay};
pub use error::{EnglishCatalog, ErrorKind, ForecastError, MessageCatalog, Upstream};
pub use types::{
    Coordinates, DailyEntry, Forecast, GeocodeResult, Reading, TimezoneResult, WeatherSnapshot,
    DEFAULT_TIMEZONE, NOT_AVAILABLE, TEMPERATURE_UNIT, UNKNOWN_POSTAL_CODE,
};
