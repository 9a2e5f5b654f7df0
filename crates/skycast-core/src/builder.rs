//! Builds display-ready weather snapshots from raw upstream readings.
//!
//! Input is the already-decoded current block and daily series; output is a
//! [`WeatherSnapshot`] with rounded values, composed forecast text and the
//! extended forecast.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::conditions;
use crate::types::{DailyEntry, Reading, WeatherSnapshot, TEMPERATURE_UNIT};

/// Longest extended forecast the builder will emit.
pub const MAX_FORECAST_DAYS: usize = 7;

const TODAY_LABEL: &str = "Today";
const DATE_FORMAT: &str = "%B %d";
const DAY_FORMAT: &str = "%A";

/// Current conditions as reported by the upstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentConditions {
    pub temperature: Option<f64>,
    pub apparent_temperature: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub weather_code: Option<i64>,
    pub wind_speed: Option<f64>,
}

/// Parallel per-day series as reported by the upstream.
///
/// `time` drives the length; shorter companion series yield missing values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailySeries {
    pub time: Vec<String>,
    pub temperature_max: Vec<Option<f64>>,
    pub temperature_min: Vec<Option<f64>>,
    pub weather_code: Vec<Option<i64>>,
    pub precipitation_probability: Vec<Option<f64>>,
}

impl DailySeries {
    fn at<T: Copy>(series: &[Option<T>], index: usize) -> Option<T> {
        series.get(index).copied().flatten()
    }
}

/// Assemble a fresh snapshot captured at `captured_at`.
pub fn build_snapshot(
    current: &CurrentConditions,
    daily: &DailySeries,
    captured_at: DateTime<Utc>,
) -> WeatherSnapshot {
    let conditions = conditions::describe(current.weather_code).to_string();
    let high = Reading::from(DailySeries::at(&daily.temperature_max, 0).map(round_whole));
    let low = Reading::from(DailySeries::at(&daily.temperature_min, 0).map(round_whole));
    let humidity = Reading::from(current.relative_humidity.map(round_percent));
    let wind_speed = Reading::from(current.wind_speed.map(round_tenth));

    WeatherSnapshot {
        current_temperature: Reading::from(current.temperature.map(round_whole)),
        temperature_unit: TEMPERATURE_UNIT.to_string(),
        high_temperature: high,
        low_temperature: low,
        detailed_forecast: detailed_forecast(&conditions, high, low, humidity, wind_speed),
        current_conditions: conditions,
        extended_forecast: build_extended_forecast(daily),
        feels_like: Reading::from(current.apparent_temperature.map(round_whole)),
        humidity,
        wind_speed,
        captured_at,
        served_from_cache: false,
        is_stale: false,
    }
}

/// One entry per day of the series, in series order.
///
/// Days whose date does not parse are dropped; the rest keep their order
/// and their position-based label.
pub fn build_extended_forecast(daily: &DailySeries) -> Vec<DailyEntry> {
    daily
        .time
        .iter()
        .take(MAX_FORECAST_DAYS)
        .enumerate()
        .filter_map(|(index, date)| build_daily_entry(daily, index, date))
        .collect()
}

fn build_daily_entry(daily: &DailySeries, index: usize, date: &str) -> Option<DailyEntry> {
    let Some(day) = parse_date(date) else {
        tracing::warn!(date = %date, index, "Dropping forecast day with unparsable date");
        return None;
    };

    let max = DailySeries::at(&daily.temperature_max, index);
    let min = DailySeries::at(&daily.temperature_min, index);
    let precipitation = DailySeries::at(&daily.precipitation_probability, index).map(round_percent);
    let short_forecast = conditions::describe(DailySeries::at(&daily.weather_code, index));

    Some(DailyEntry {
        day_label: if index == 0 {
            TODAY_LABEL.to_string()
        } else {
            day.format(DAY_FORMAT).to_string()
        },
        date_label: day.format(DATE_FORMAT).to_string(),
        high: Reading::from(max.map(round_whole)),
        low: Reading::from(min.map(round_whole)),
        unit: TEMPERATURE_UNIT.to_string(),
        short_forecast: short_forecast.to_string(),
        detailed_forecast: daily_forecast(short_forecast, max, min, precipitation),
        precipitation_probability: Reading::from(precipitation),
    })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M").map(|dt| dt.date()))
        .ok()
}

/// Text for the current conditions, e.g.
/// `Clear sky. High of 75°F and low of 55°F. Humidity: 65%. Wind speed: 8.5 mph.`
pub fn detailed_forecast(
    conditions: &str,
    high: Reading<i32>,
    low: Reading<i32>,
    humidity: Reading<u8>,
    wind_speed: Reading<f64>,
) -> String {
    let mut parts = vec![conditions.to_string()];

    if let (Reading::Value(high), Reading::Value(low)) = (high, low) {
        parts.push(format!(
            "High of {high}°{TEMPERATURE_UNIT} and low of {low}°{TEMPERATURE_UNIT}"
        ));
    }
    if let Reading::Value(humidity) = humidity {
        parts.push(format!("Humidity: {humidity}%"));
    }
    if let Reading::Value(wind) = wind_speed {
        parts.push(format!("Wind speed: {wind:.1} mph"));
    }

    join_parts(&parts)
}

/// Text for one forecast day, e.g. `Partly cloudy. High: 75°F, Low: 58°F. Precipitation: 20%.`
pub fn daily_forecast(
    conditions: &str,
    high: Option<f64>,
    low: Option<f64>,
    precipitation_probability: Option<u8>,
) -> String {
    let mut parts = vec![conditions.to_string()];

    if let (Some(high), Some(low)) = (high, low) {
        parts.push(format!(
            "High: {}°{TEMPERATURE_UNIT}, Low: {}°{TEMPERATURE_UNIT}",
            round_whole(high),
            round_whole(low)
        ));
    }
    if let Some(chance) = precipitation_probability.filter(|p| *p > 0) {
        parts.push(format!("Precipitation: {chance}%"));
    }

    join_parts(&parts)
}

fn join_parts(parts: &[String]) -> String {
    format!("{}.", parts.join(". "))
}

/// Half-away-from-zero rounding to a whole degree.
fn round_whole(value: f64) -> i32 {
    value.round() as i32
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round_percent(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}
