//! Small display helpers shared by the CLI and the forecast types.

use serde::Serialize;

use crate::types::{Reading, TimezoneResult, NOT_AVAILABLE};

/// The three headline temperatures, already rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemperatureDisplay {
    pub current: String,
    pub high: String,
    pub low: String,
}

/// Render a temperature as `73°F`, or `N/A` when missing.
pub fn format_temperature(value: &Reading<i32>, unit: &str) -> String {
    match value {
        Reading::Value(v) => format!("{v}°{unit}"),
        Reading::NotAvailable => NOT_AVAILABLE.to_string(),
    }
}

/// Human-readable place name for a located IP.
///
/// US locations render as "City, State", others as "City, Country".
/// Returns `None` when no city is known.
pub fn format_city(location: &TimezoneResult) -> Option<String> {
    let city = location.city.as_deref().filter(|c| !c.is_empty())?;

    let is_us = location.country_code.as_deref() == Some("US");
    match (is_us, location.state.as_deref(), location.country.as_deref()) {
        (true, Some(state), _) => Some(format!("{city}, {state}")),
        (_, _, Some(country)) => Some(format!("{city}, {country}")),
        _ => Some(city.to_string()),
    }
}
