//! Core value types for forecast retrieval.
//!
//! Every type here is an immutable value owned by the call that produced it.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::display::{format_temperature, TemperatureDisplay};
use crate::error::ForecastError;

/// Sentinel rendered for any numeric field the upstream did not supply.
pub const NOT_AVAILABLE: &str = "N/A";

/// Postal code used when geocoding finds a match without one.
pub const UNKNOWN_POSTAL_CODE: &str = "unknown";

/// Timezone used whenever the requester's zone cannot be determined.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Temperature unit requested from the weather upstream.
pub const TEMPERATURE_UNIT: &str = "F";

const CACHE_STATUS_FRESH: &str = "Fresh Data";
const CACHE_TIME_FORMAT: &str = "%I:%M %p on %B %d, %Y";

/// A validated latitude/longitude pair.
///
/// Only constructible through [`Coordinates::new`], so holding one proves the
/// values are finite and in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
}

impl Coordinates {
    pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);
    pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

    /// Validate and build a coordinate pair.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ForecastError> {
        let latitude = validate_axis("latitude", latitude, Self::LATITUDE_RANGE)?;
        let longitude = validate_axis("longitude", longitude, Self::LONGITUDE_RANGE)?;
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

fn validate_axis(axis: &'static str, value: f64, (min, max): (f64, f64)) -> Result<f64, ForecastError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ForecastError::InvalidCoordinates {
            axis,
            value,
            min,
            max,
        })
    }
}

impl<'de> Deserialize<'de> for Coordinates {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            latitude: f64,
            longitude: f64,
        }

        let raw = Raw::deserialize(deserializer)?;
        Coordinates::new(raw.latitude, raw.longitude).map_err(serde::de::Error::custom)
    }
}

/// A display value that is either a number or the explicit `"N/A"` sentinel.
///
/// Serializes as the bare number or the string `"N/A"`, never `null`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Reading<T> {
    Value(T),
    #[default]
    NotAvailable,
}

impl<T> Reading<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Reading::Value(v) => Some(v),
            Reading::NotAvailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Reading::Value(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reading<U> {
        match self {
            Reading::Value(v) => Reading::Value(f(v)),
            Reading::NotAvailable => Reading::NotAvailable,
        }
    }
}

impl<T> From<Option<T>> for Reading<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Reading::NotAvailable, Reading::Value)
    }
}

impl<T: fmt::Display> fmt::Display for Reading<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Value(v) => v.fmt(f),
            Reading::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl<T: Serialize> Serialize for Reading<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Reading::Value(v) => v.serialize(serializer),
            Reading::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Reading<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw<T> {
            Value(T),
            Text(String),
        }

        match Raw::<T>::deserialize(deserializer)? {
            Raw::Value(v) => Ok(Reading::Value(v)),
            Raw::Text(text) if text == NOT_AVAILABLE => Ok(Reading::NotAvailable),
            Raw::Text(text) => Err(serde::de::Error::custom(format!(
                "expected a number or \"{NOT_AVAILABLE}\", got \"{text}\""
            ))),
        }
    }
}

/// Result of resolving a free-text address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub latitude: f64,
    pub longitude: f64,
    /// Postal code, or [`UNKNOWN_POSTAL_CODE`].
    pub postal_code: String,
    pub formatted_address: Option<String>,
}

impl GeocodeResult {
    pub fn has_postal_code(&self) -> bool {
        self.postal_code != UNKNOWN_POSTAL_CODE
    }
}

/// Result of resolving a requester IP to a display timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimezoneResult {
    /// IANA timezone name.
    pub timezone: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

impl TimezoneResult {
    /// The degraded result: UTC with no location details.
    pub fn utc() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            city: None,
            state: None,
            country: None,
            country_code: None,
        }
    }

    pub fn is_default(&self) -> bool {
        self.timezone == DEFAULT_TIMEZONE && self.city.is_none()
    }
}

impl Default for TimezoneResult {
    fn default() -> Self {
        Self::utc()
    }
}

/// One day of the extended forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEntry {
    /// "Today" for the first entry, weekday name otherwise.
    pub day_label: String,
    /// e.g. "February 05".
    pub date_label: String,
    pub high: Reading<i32>,
    pub low: Reading<i32>,
    pub unit: String,
    pub short_forecast: String,
    pub detailed_forecast: String,
    pub precipitation_probability: Reading<u8>,
}

/// Current conditions plus extended forecast for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub current_temperature: Reading<i32>,
    pub temperature_unit: String,
    pub high_temperature: Reading<i32>,
    pub low_temperature: Reading<i32>,
    pub current_conditions: String,
    pub detailed_forecast: String,
    pub extended_forecast: Vec<DailyEntry>,
    pub feels_like: Reading<i32>,
    pub humidity: Reading<u8>,
    pub wind_speed: Reading<f64>,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub served_from_cache: bool,
    #[serde(default)]
    pub is_stale: bool,
}

impl WeatherSnapshot {
    /// Tag a snapshot as served from the cache.
    pub fn from_cache(mut self, is_stale: bool) -> Self {
        self.served_from_cache = true;
        self.is_stale = is_stale;
        self
    }
}

/// The assembled, display-ready forecast.
///
/// Built once by the orchestrator from a [`GeocodeResult`] and a
/// [`WeatherSnapshot`]; only the fields declared here are carried over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub latitude: f64,
    pub longitude: f64,
    pub postal_code: String,
    pub formatted_address: Option<String>,

    pub current_temperature: Reading<i32>,
    pub temperature_unit: String,
    pub high_temperature: Reading<i32>,
    pub low_temperature: Reading<i32>,
    pub current_conditions: String,
    pub detailed_forecast: String,
    pub extended_forecast: Vec<DailyEntry>,
    pub feels_like: Reading<i32>,
    pub humidity: Reading<u8>,
    pub wind_speed: Reading<f64>,
    pub captured_at: DateTime<Utc>,
    pub served_from_cache: bool,
    pub is_stale: bool,
}

impl Forecast {
    pub fn from_parts(geocode: GeocodeResult, weather: WeatherSnapshot) -> Self {
        Self {
            latitude: geocode.latitude,
            longitude: geocode.longitude,
            postal_code: geocode.postal_code,
            formatted_address: geocode.formatted_address,
            current_temperature: weather.current_temperature,
            temperature_unit: weather.temperature_unit,
            high_temperature: weather.high_temperature,
            low_temperature: weather.low_temperature,
            current_conditions: weather.current_conditions,
            detailed_forecast: weather.detailed_forecast,
            extended_forecast: weather.extended_forecast,
            feels_like: weather.feels_like,
            humidity: weather.humidity,
            wind_speed: weather.wind_speed,
            captured_at: weather.captured_at,
            served_from_cache: weather.served_from_cache,
            is_stale: weather.is_stale,
        }
    }

    /// Current/high/low rendered with the unit, e.g. `73°F`.
    pub fn temperatures(&self) -> TemperatureDisplay {
        TemperatureDisplay {
            current: format_temperature(&self.current_temperature, &self.temperature_unit),
            high: format_temperature(&self.high_temperature, &self.temperature_unit),
            low: format_temperature(&self.low_temperature, &self.temperature_unit),
        }
    }

    /// Cache provenance in UTC.
    pub fn cache_status(&self) -> String {
        self.cache_status_in(&Utc)
    }

    /// Cache provenance with the capture time rendered in `tz`.
    pub fn cache_status_in<Tz: TimeZone>(&self, tz: &Tz) -> String
    where
        Tz::Offset: fmt::Display,
    {
        if !self.served_from_cache {
            return CACHE_STATUS_FRESH.to_string();
        }

        let retrieved = self
            .captured_at
            .with_timezone(tz)
            .format(CACHE_TIME_FORMAT)
            .to_string();

        if self.is_stale {
            format!("Cached, may be outdated (Retrieved at {retrieved})")
        } else {
            format!("Cached (Retrieved at {retrieved})")
        }
    }
}
