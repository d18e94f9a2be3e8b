//! Unit system handling and rounding of exposed temperatures

use serde::{Deserialize, Serialize};

/// Unit system requested by the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    /// Celsius, as reported by the sensors
    #[default]
    Metric,
    /// Fahrenheit
    Imperial,
}

impl UnitSystem {
    /// Converts a Celsius reading into this unit system and rounds it for display
    pub fn temperature_from_celsius(&self, celsius: f64) -> f64 {
        let value = match self {
            UnitSystem::Metric => celsius,
            UnitSystem::Imperial => celsius_to_fahrenheit(celsius),
        };
        round_two(value)
    }
}

impl std::str::FromStr for UnitSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "metric" => Ok(UnitSystem::Metric),
            "imperial" => Ok(UnitSystem::Imperial),
            other => Err(format!(
                "invalid unit system '{}': expected metric or imperial",
                other
            )),
        }
    }
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Rounds to two decimal places, ties away from zero
pub fn round_two(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
