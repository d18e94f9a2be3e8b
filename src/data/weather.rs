//! Open-Meteo style weather payloads
//!
//! This module parses the `current`/`daily` weather shape into a
//! `WeatherRecord`. Missing fields become "not available" rather than errors;
//! only a body that is not JSON at all fails.

use chrono::{NaiveTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::units::round_two;
use super::{NormalizeError, Reading, UnitSystem, WeatherRecord};

/// Types of weather conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherCondition {
    Clear,
    PartlyCloudy,
    Cloudy,
    Rain,
    Showers,
    Thunderstorm,
    Snow,
    Fog,
}

impl WeatherCondition {
    pub fn description(&self) -> &'static str {
        match self {
            WeatherCondition::Clear => "Clear sky",
            WeatherCondition::PartlyCloudy => "Partly cloudy",
            WeatherCondition::Cloudy => "Cloudy",
            WeatherCondition::Rain => "Rain",
            WeatherCondition::Showers => "Freezing showers",
            WeatherCondition::Thunderstorm => "Thunderstorm",
            WeatherCondition::Snow => "Snow",
            WeatherCondition::Fog => "Fog",
        }
    }
}

/// Map WMO weather code to WeatherCondition enum
///
/// Weather codes from WMO (World Meteorological Organization):
/// - 0: Clear sky
/// - 1-3: Partly cloudy
/// - 45, 48: Fog
/// - 51-55, 61-65, 80-82: Drizzle, rain, rain showers
/// - 56-57, 66-67: Freezing drizzle and rain
/// - 71-77, 85-86: Snow
/// - 95-99: Thunderstorm
pub fn weather_code_to_condition(code: u8) -> WeatherCondition {
    match code {
        0 => WeatherCondition::Clear,
        1..=3 => WeatherCondition::PartlyCloudy,
        45 | 48 => WeatherCondition::Fog,
        51..=55 | 61..=65 | 80..=82 => WeatherCondition::Rain,
        56..=57 | 66..=67 => WeatherCondition::Showers,
        71..=77 | 85..=86 => WeatherCondition::Snow,
        95..=99 => WeatherCondition::Thunderstorm,
        _ => WeatherCondition::Cloudy, // Default for unknown codes
    }
}

/// Weather API response structure
#[derive(Debug, Deserialize)]
struct WeatherResponse {
    current: Option<CurrentWeather>,
    daily: Option<DailyWeather>,
}

/// Current conditions block
#[derive(Debug, Default, Deserialize)]
struct CurrentWeather {
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    weather_code: Option<u8>,
    wind_speed_10m: Option<f64>,
}

/// Daily block; only the first day is used
#[derive(Debug, Default, Deserialize)]
struct DailyWeather {
    #[serde(default)]
    sunrise: Vec<String>,
    #[serde(default)]
    sunset: Vec<String>,
}

/// Normalizes a weather response body into a `WeatherRecord`
pub fn normalize_weather(body: &str, units: UnitSystem) -> Result<WeatherRecord, NormalizeError> {
    if body.trim().is_empty() {
        return Err(NormalizeError::EmptyBody);
    }

    let response: WeatherResponse = serde_json::from_str(body)?;
    let current = response.current.unwrap_or_default();
    let daily = response.daily.unwrap_or_default();

    let condition_code = Reading::from(current.weather_code);
    let description = condition_code
        .map(|code| weather_code_to_condition(code).description().to_string());

    Ok(WeatherRecord {
        temperature: Reading::from(current.temperature_2m)
            .map(|celsius| units.temperature_from_celsius(celsius)),
        humidity: Reading::from(current.relative_humidity_2m).map(round_two),
        condition_code,
        description,
        wind_speed: Reading::from(current.wind_speed_10m).map(round_two),
        sunrise: first_time(&daily.sunrise),
        sunset: first_time(&daily.sunset),
        captured_at: Utc::now(),
    })
}

fn first_time(values: &[String]) -> Reading<NaiveTime> {
    let Some(raw) = values.first() else {
        return Reading::NotAvailable;
    };
    match parse_time(raw) {
        Some(time) => Reading::Value(time),
        None => {
            debug!(value = %raw, "unparseable daily time");
            Reading::NotAvailable
        }
    }
}

/// Parse a time string in ISO 8601 format (e.g., "2024-07-15T05:30") to NaiveTime
fn parse_time(time_str: &str) -> Option<NaiveTime> {
    // Extract the time portion after 'T'
    let time_part = time_str.split('T').nth(1)?;
    NaiveTime::parse_from_str(time_part, "%H:%M").ok()
}
