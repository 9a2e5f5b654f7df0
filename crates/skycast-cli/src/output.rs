//! Text rendering for forecast and timezone results.

use chrono_tz::Tz;
use serde::Serialize;
use skycast_core::{format_city, format_temperature, Forecast, Reading, TimezoneResult};
use std::fmt::{self, Write as _};

/// Parse the resolved timezone name, falling back to UTC.
pub fn display_zone(timezone: &TimezoneResult) -> Tz {
    timezone.timezone.parse().unwrap_or(Tz::UTC)
}

/// JSON document printed by `forecast --json`.
#[derive(Debug, Serialize)]
pub struct ForecastReport<'a> {
    pub forecast: &'a Forecast,
    pub cache_status: String,
    pub timezone: &'a TimezoneResult,
    pub location: Option<String>,
}

impl<'a> ForecastReport<'a> {
    pub fn new(forecast: &'a Forecast, timezone: &'a TimezoneResult) -> Self {
        Self {
            forecast,
            cache_status: forecast.cache_status_in(&display_zone(timezone)),
            timezone,
            location: format_city(timezone),
        }
    }
}

pub fn render_forecast(forecast: &Forecast, timezone: &TimezoneResult) -> String {
    let zone = display_zone(timezone);
    let temperatures = forecast.temperatures();
    let mut out = String::new();

    let place = forecast
        .formatted_address
        .as_deref()
        .unwrap_or(forecast.postal_code.as_str());
    let _ = writeln!(out, "{place} ({})", forecast.postal_code);
    let _ = writeln!(
        out,
        "Now: {}, {} (feels like {})",
        temperatures.current,
        forecast.current_conditions,
        format_temperature(&forecast.feels_like, &forecast.temperature_unit)
    );
    let _ = writeln!(out, "High {} / Low {}", temperatures.high, temperatures.low);
    let _ = writeln!(
        out,
        "Humidity: {}  Wind: {}",
        with_unit(&forecast.humidity, "%"),
        with_unit(&forecast.wind_speed, " mph")
    );
    let _ = writeln!(out, "{}", forecast.detailed_forecast);

    if !forecast.extended_forecast.is_empty() {
        let _ = writeln!(out);
        for day in &forecast.extended_forecast {
            let _ = writeln!(
                out,
                "  {:<10} {:<12} {}",
                day.day_label, day.date_label, day.detailed_forecast
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", forecast.cache_status_in(&zone));
    out.push_str(&render_timezone(timezone));
    out
}

/// A reading followed by its unit, or just "N/A" when missing.
fn with_unit<T: fmt::Display>(reading: &Reading<T>, unit: &str) -> String {
    match reading {
        Reading::Value(value) => format!("{value}{unit}"),
        Reading::NotAvailable => reading.to_string(),
    }
}

pub fn render_timezone(timezone: &TimezoneResult) -> String {
    match format_city(timezone) {
        Some(city) => format!("Your location: {city} ({})\n", timezone.timezone),
        None => format!("Timezone: {}\n", timezone.timezone),
    }
}
