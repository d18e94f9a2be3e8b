//! Remote temperature sensor payloads
//!
//! Sensors answer `GET /temperature` with a small JSON object in Celsius.
//! Every field is optional on the wire.

use chrono::Utc;
use serde::Deserialize;

use super::{NormalizeError, Reading, TemperatureRecord, UnitSystem};
use super::units::round_two;

/// Raw sensor response
#[derive(Debug, Deserialize)]
struct SensorResponse {
    temperature: Option<f64>,
    humidity: Option<f64>,
    battery: Option<f64>,
}

/// Normalizes a sensor response body into a `TemperatureRecord`
///
/// The temperature is converted to `units` before rounding.
pub fn normalize_temperature(
    body: &str,
    units: UnitSystem,
) -> Result<TemperatureRecord, NormalizeError> {
    if body.trim().is_empty() {
        return Err(NormalizeError::EmptyBody);
    }

    let response: SensorResponse = serde_json::from_str(body)?;

    Ok(TemperatureRecord {
        temperature: Reading::from(response.temperature)
            .map(|celsius| units.temperature_from_celsius(celsius)),
        humidity: Reading::from(response.humidity).map(round_two),
        battery: Reading::from(response.battery).map(round_two),
        captured_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imperial_converts_before_rounding() {
        let record =
            normalize_temperature(r#"{"temperature": 20, "humidity": 45}"#, UnitSystem::Imperial)
                .unwrap();

        assert_eq!(record.temperature, Reading::Value(68.0));
        assert_eq!(record.humidity, Reading::Value(45.0));
        assert_eq!(record.battery, Reading::NotAvailable);
    }

    #[test]
    fn test_metric_rounds_to_two_decimals() {
        let record = normalize_temperature(
            r#"{"temperature": 21.4567, "humidity": 40.123, "battery": 87}"#,
            UnitSystem::Metric,
        )
        .unwrap();

        assert_eq!(record.temperature, Reading::Value(21.46));
        assert_eq!(record.humidity, Reading::Value(40.12));
        assert_eq!(record.battery, Reading::Value(87.0));
    }

    #[test]
    fn test_missing_temperature_is_not_available() {
        let record = normalize_temperature(r#"{"humidity": 50}"#, UnitSystem::Imperial).unwrap();
        assert_eq!(record.temperature, Reading::NotAvailable);
    }

    #[test]
    fn test_null_temperature_is_not_available() {
        let record =
            normalize_temperature(r#"{"temperature": null}"#, UnitSystem::Metric).unwrap();
        assert_eq!(record.temperature, Reading::NotAvailable);
    }

    #[test]
    fn test_empty_body_is_distinct_error() {
        let result = normalize_temperature("  ", UnitSystem::Metric);
        assert!(matches!(result, Err(NormalizeError::EmptyBody)));
    }

    #[test]
    fn test_malformed_json() {
        let result = normalize_temperature("{ invalid json }", UnitSystem::Metric);
        assert!(matches!(result, Err(NormalizeError::Json(_))));
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let record = normalize_temperature(
            r#"{"temperature": 19.5, "sensor": "dht22", "uptime": 1234}"#,
            UnitSystem::Metric,
        )
        .unwrap();
        assert_eq!(record.temperature, Reading::Value(19.5));
    }
}
