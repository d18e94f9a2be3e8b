//! Init configuration sent by the display
//!
//! The display sends one Init payload at startup. `InitConfig::into_sources`
//! turns it into the immutable source set used for the rest of the run.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::cache::CacheTtls;
use crate::data::{DataKind, Source, UnitSystem};

/// Poll interval when the display does not set one
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(60);

/// Errors that can occur while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two sources would share the same key in the data push
    #[error("Duplicate source id '{0}'")]
    DuplicateSource(String),

    /// Weather and holidays are cached in one slot per kind
    #[error("Only one {0} source is supported, '{1}' is a second one")]
    SharedKindSlot(&'static str, String),

    #[error("Device host must not be empty")]
    EmptyHost,

    #[error("Source '{0}' has an empty url")]
    EmptyUrl(String),

    #[error("fetchIntervalMs must be greater than zero")]
    ZeroInterval,
}

/// A remote temperature sensor
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Display name, only used by the display
    pub name: Option<String>,
}

fn default_port() -> u16 {
    80
}

impl DeviceConfig {
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}/temperature", self.host, self.port)
    }
}

/// Any other remote origin, addressed by full URL
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub url: String,
    pub kind: DataKind,
}

/// Payload of the Init message
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitConfig {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub units: UnitSystem,
    pub fetch_interval_ms: Option<u64>,
    pub weather_cache_ms: Option<u64>,
    pub holidays_cache_ms: Option<u64>,
    pub temperature_cache_ms: Option<u64>,
}

impl InitConfig {
    /// Reads an Init payload from a JSON file
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn fetch_interval(&self) -> Result<Duration, ConfigError> {
        match self.fetch_interval_ms {
            Some(0) => Err(ConfigError::ZeroInterval),
            Some(ms) => Ok(Duration::from_millis(ms)),
            None => Ok(DEFAULT_FETCH_INTERVAL),
        }
    }

    /// Cache lifetimes with any overrides applied; `0` disables caching a kind
    pub fn cache_ttls(&self) -> CacheTtls {
        let defaults = CacheTtls::default();
        let ms = |value: Option<u64>, default: Option<Duration>| {
            value.map(Duration::from_millis).or(default)
        };
        CacheTtls {
            weather: ms(self.weather_cache_ms, defaults.weather),
            holidays: ms(self.holidays_cache_ms, defaults.holidays),
            temperature: ms(self.temperature_cache_ms, defaults.temperature),
        }
    }

    /// Builds the source set: devices first, then extra sources, in config order
    pub fn into_sources(&self) -> Result<Vec<Source>, ConfigError> {
        let mut seen = HashSet::new();
        let mut slotted = HashSet::new();
        let mut sources = Vec::with_capacity(self.devices.len() + self.sources.len());

        for device in &self.devices {
            let host = device.host.trim();
            if host.is_empty() {
                return Err(ConfigError::EmptyHost);
            }
            sources.push(Source::new(host, device.endpoint(), DataKind::Temperature));
        }
        for source in &self.sources {
            if source.url.trim().is_empty() {
                return Err(ConfigError::EmptyUrl(source.id.clone()));
            }
            if source.kind != DataKind::Temperature && !slotted.insert(source.kind) {
                return Err(ConfigError::SharedKindSlot(source.kind.as_str(), source.id.clone()));
            }
            sources.push(Source::new(source.id.clone(), source.url.clone(), source.kind));
        }

        for source in &sources {
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::DuplicateSource(source.id.clone()));
            }
        }
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const INIT: &str = r#"{
        "devices": [
            {"host": "192.168.1.20", "port": 8080, "name": "Living room"},
            {"host": "bedroom.local"}
        ],
        "sources": [
            {"id": "forecast", "url": "http://weather.local/forecast", "kind": "weather"}
        ],
        "units": "imperial",
        "fetchIntervalMs": 30000,
        "weatherCacheMs": 120000
    }"#;

    #[test]
    fn test_parse_init_payload() {
        let config = InitConfig::from_json(INIT).unwrap();

        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].name.as_deref(), Some("Living room"));
        assert_eq!(config.devices[1].port, 80);
        assert_eq!(config.units, UnitSystem::Imperial);
        assert_eq!(config.fetch_interval().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_into_sources() {
        let config = InitConfig::from_json(INIT).unwrap();
        let sources = config.into_sources().unwrap();

        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].id, "192.168.1.20");
        assert_eq!(sources[0].endpoint, "http://192.168.1.20:8080/temperature");
        assert_eq!(sources[0].kind, DataKind::Temperature);
        assert_eq!(sources[1].endpoint, "http://bedroom.local:80/temperature");
        assert_eq!(sources[2].id, "forecast");
        assert_eq!(sources[2].kind, DataKind::Weather);
    }

    #[test]
    fn test_defaults() {
        let config = InitConfig::from_json("{}").unwrap();

        assert!(config.devices.is_empty());
        assert_eq!(config.units, UnitSystem::Metric);
        assert_eq!(config.fetch_interval().unwrap(), DEFAULT_FETCH_INTERVAL);
        assert_eq!(config.cache_ttls(), CacheTtls::default());
        assert!(config.into_sources().unwrap().is_empty());
    }

    #[test]
    fn test_cache_overrides() {
        let config = InitConfig::from_json(INIT).unwrap();
        let ttls = config.cache_ttls();

        assert_eq!(ttls.weather, Some(Duration::from_secs(120)));
        assert_eq!(ttls.holidays, CacheTtls::default().holidays);
        assert_eq!(ttls.temperature, None);
    }

    #[test]
    fn test_duplicate_host_rejected() {
        let config = InitConfig::from_json(
            r#"{"devices": [{"host": "sensor", "port": 1}, {"host": "sensor", "port": 2}]}"#,
        )
        .unwrap();

        match config.into_sources() {
            Err(ConfigError::DuplicateSource(id)) => assert_eq!(id, "sensor"),
            other => panic!("Expected DuplicateSource, got {:?}", other),
        }
    }

    #[test]
    fn test_second_weather_source_rejected() {
        let config = InitConfig::from_json(
            r#"{"sources": [
                {"id": "home", "url": "http://weather.local/home", "kind": "weather"},
                {"id": "cabin", "url": "http://weather.local/cabin", "kind": "weather"},
                {"id": "stat", "url": "http://holidays.local/", "kind": "holidays"}
            ]}"#,
        )
        .unwrap();

        match config.into_sources() {
            Err(ConfigError::SharedKindSlot(kind, id)) => {
                assert_eq!(kind, "weather");
                assert_eq!(id, "cabin");
            }
            other => panic!("Expected SharedKindSlot, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_host_rejected() {
        let config = InitConfig::from_json(r#"{"devices": [{"host": "  "}]}"#).unwrap();
        assert!(matches!(config.into_sources(), Err(ConfigError::EmptyHost)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = InitConfig::from_json(r#"{"fetchIntervalMs": 0}"#).unwrap();
        assert!(matches!(
            config.fetch_interval(),
            Err(ConfigError::ZeroInterval)
        ));
    }

    #[test]
    fn test_invalid_units_rejected() {
        let result = InitConfig::from_json(r#"{"units": "kelvin"}"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_path() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(INIT.as_bytes()).unwrap();

        let config = InitConfig::from_path(file.path()).unwrap();
        assert_eq!(config.devices.len(), 2);
    }

    #[test]
    fn test_from_missing_path() {
        let result = InitConfig::from_path(Path::new("/nonexistent/init.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
