//! Core data models for remote temperature polling
//!
//! This module contains the source definitions and the canonical records that
//! every remote payload is normalized into before it reaches the display.

pub mod holidays;
pub mod temperature;
pub mod units;
pub mod weather;

pub use holidays::{parse_holidays, DEFAULT_HOLIDAY_CELLS};
pub use temperature::normalize_temperature;
pub use units::{celsius_to_fahrenheit, round_two, UnitSystem};
pub use weather::{normalize_weather, weather_code_to_condition};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Placeholder emitted wherever a value is missing from a payload
pub const NOT_AVAILABLE: &str = "N/A";

/// Category of data a source provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Temperature,
    Weather,
    Holidays,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Temperature => "temperature",
            DataKind::Weather => "weather",
            DataKind::Holidays => "holidays",
        }
    }

    /// Whether sources of this kind contribute to the cross-source average
    pub fn has_average(&self) -> bool {
        matches!(self, DataKind::Temperature)
    }
}

/// One configured remote origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Unique key, used as the key of the outbound data push
    pub id: String,
    /// Full URL fetched with a GET request
    pub endpoint: String,
    /// Data kind, selecting the normalizer and cache policy
    pub kind: DataKind,
}

impl Source {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, kind: DataKind) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            kind,
        }
    }
}

/// A value that may be missing from the remote payload
///
/// Serializes as the plain value, or as `"N/A"` when missing. There is no
/// arithmetic on `Reading` itself, so a missing value can never be mistaken
/// for zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<T = f64> {
    Value(T),
    NotAvailable,
}

impl<T> Reading<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Reading::Value(v) => Some(v),
            Reading::NotAvailable => None,
        }
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
        match value {
            Some(v) => Reading::Value(v),
            None => Reading::NotAvailable,
        }
    }
}

impl<T: Serialize> Serialize for Reading<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Reading::Value(v) => v.serialize(serializer),
            Reading::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

/// Reading from a single remote temperature sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureRecord {
    /// Temperature in the configured unit system, rounded to two decimals
    pub temperature: Reading,
    /// Relative humidity percentage
    pub humidity: Reading,
    /// Battery level percentage
    pub battery: Reading,
    /// When the reading was captured
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub captured_at: DateTime<Utc>,
}

/// Current weather conditions for one weather source
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherRecord {
    /// Temperature in the configured unit system, rounded to two decimals
    pub temperature: Reading,
    /// Relative humidity percentage
    pub humidity: Reading,
    /// WMO weather code
    pub condition_code: Reading<u8>,
    /// Human-readable condition
    pub description: Reading<String>,
    /// Wind speed in km/h
    pub wind_speed: Reading,
    pub sunrise: Reading<NaiveTime>,
    pub sunset: Reading<NaiveTime>,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub captured_at: DateTime<Utc>,
}

/// One named holiday on one date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolidayRecord {
    pub name: String,
    pub date: NaiveDate,
}

/// A failed fetch for one source; never cached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub source_id: String,
    pub reason: String,
}

impl Serialize for ErrorRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ErrorRecord", 2)?;
        state.serialize_field("error", "Unavailable")?;
        state.serialize_field("reason", &self.reason)?;
        state.end()
    }
}

/// Normalized data for one source in one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SourceData {
    Temperature(TemperatureRecord),
    Weather(WeatherRecord),
    Holidays(Vec<HolidayRecord>),
    Error(ErrorRecord),
}

impl SourceData {
    pub fn is_error(&self) -> bool {
        matches!(self, SourceData::Error(_))
    }

    /// Numeric temperature carried by a temperature record, if any
    pub fn temperature(&self) -> Option<f64> {
        match self {
            SourceData::Temperature(record) => record.temperature.value().copied(),
            _ => None,
        }
    }
}

/// Errors that can occur when normalizing a raw payload
///
/// None of these are retried: the same payload would fail the same way.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Payload is not valid JSON for the expected shape
    #[error("Failed to parse JSON response: {0}")]
    Json(#[from] serde_json::Error),

    /// Successful response without a body
    #[error("Response body is empty")]
    EmptyBody,

    /// Document does not contain a table
    #[error("Document does not contain a table")]
    NotATable,

    /// Document has a table but no row carries a date
    #[error("Table has no dated rows")]
    NoDatedRows,

    /// Every dated row has a date that cannot be read
    #[error("No table row has a usable date ({0} rejected)")]
    NoUsableRows(usize),
}
