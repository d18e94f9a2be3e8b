//! Fetch aggregation across all configured sources
//!
//! One cycle fans out a fetch per source, concurrently. Each source runs its
//! own cache check, retried GET, and normalization; a failure anywhere in that
//! chain only turns that source's slot into an `ErrorRecord`.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use futures::future::join_all;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheManager, CacheTtls};
use crate::data::{
    normalize_temperature, normalize_weather, parse_holidays, round_two, DataKind, ErrorRecord,
    NormalizeError, Reading, Source, SourceData, UnitSystem, DEFAULT_HOLIDAY_CELLS,
};
use crate::retry::{retry, RetryPolicy, Retryable};

/// Timeout for a single remote request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur while fetching a source
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, DNS or body read failure
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// No complete response within the request timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-2xx response
    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),

    /// Response arrived but could not be normalized
    #[error(transparent)]
    Parse(#[from] NormalizeError),
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Parse(_))
    }
}

/// Aggregates derived across sources
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Derived {
    /// Mean of all available temperature readings
    pub average_temperature: Reading,
}

/// Everything one cycle produced
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateResult {
    /// One slot per configured source
    pub per_source: BTreeMap<String, SourceData>,
    /// Sources whose slot was served from the cache this cycle
    pub cached: BTreeSet<String>,
    /// Present when at least one source supports a derived aggregate
    pub derived: Option<Derived>,
}

impl AggregateResult {
    pub fn failed_count(&self) -> usize {
        self.per_source.values().filter(|d| d.is_error()).count()
    }
}

/// Settings shared by every fetch in a cycle
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub ttls: CacheTtls,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            request_timeout: REQUEST_TIMEOUT,
            ttls: CacheTtls::default(),
        }
    }
}

/// Runs fetch cycles against a fixed set of sources
#[derive(Debug, Clone)]
pub struct Aggregator {
    client: Client,
    cache: CacheManager<SourceData>,
    settings: FetchSettings,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(FetchSettings::default())
    }
}

impl Aggregator {
    pub fn new(settings: FetchSettings) -> Self {
        Self::with_client(Client::new(), settings)
    }

    /// Create an Aggregator with a custom HTTP client
    pub fn with_client(client: Client, settings: FetchSettings) -> Self {
        Self {
            client,
            cache: CacheManager::new(),
            settings,
        }
    }

    pub fn cache(&self) -> &CacheManager<SourceData> {
        &self.cache
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Runs one cycle over `sources`
    ///
    /// Every source gets exactly one slot in the result. All sources resolve
    /// before the average is computed.
    pub async fn run_cycle(&self, sources: &[Source], units: UnitSystem) -> AggregateResult {
        debug!(sources = sources.len(), "starting fetch cycle");

        let outcomes = join_all(
            sources
                .iter()
                .map(|source| self.fetch_source(source, units)),
        )
        .await;

        let mut result = AggregateResult::default();
        for (source, (data, cached)) in sources.iter().zip(outcomes) {
            if cached {
                result.cached.insert(source.id.clone());
            }
            result.per_source.insert(source.id.clone(), data);
        }

        if sources.iter().any(|s| s.kind.has_average()) {
            let averaged = sources
                .iter()
                .filter(|s| s.kind.has_average())
                .filter_map(|s| result.per_source.get(&s.id));
            result.derived = Some(Derived {
                average_temperature: average_temperature(averaged),
            });
        }

        info!(
            sources = sources.len(),
            failed = result.failed_count(),
            cached = result.cached.len(),
            "fetch cycle complete"
        );
        result
    }

    /// Resolves one source to its slot, and whether it came from the cache
    async fn fetch_source(&self, source: &Source, units: UnitSystem) -> (SourceData, bool) {
        let ttl = self.settings.ttls.for_kind(source.kind);
        let key = cache_key(source);

        if ttl.is_some() {
            if let Some(data) = self.cache.get_valid(&key) {
                debug!(source = %source.id, key = %key, "cache hit");
                return (data, true);
            }
            debug!(source = %source.id, key = %key, "cache miss");
        }

        match self.fetch_and_normalize(source, units).await {
            Ok(data) => {
                if let Some(ttl) = ttl {
                    self.cache.put(&key, data.clone(), ttl);
                }
                (data, false)
            }
            Err(err) => {
                warn!(source = %source.id, url = %source.endpoint, error = %err, "source unavailable");
                let record = ErrorRecord {
                    source_id: source.id.clone(),
                    reason: err.to_string(),
                };
                (SourceData::Error(record), false)
            }
        }
    }

    async fn fetch_and_normalize(
        &self,
        source: &Source,
        units: UnitSystem,
    ) -> Result<SourceData, FetchError> {
        let endpoint = source.endpoint.as_str();
        let body = retry(self.settings.retry, move || self.get_body(endpoint)).await?;
        Ok(normalize(source.kind, &body, units)?)
    }

    /// A single GET bounded by the request timeout
    async fn get_body(&self, url: &str) -> Result<String, FetchError> {
        let timeout = self.settings.request_timeout;
        let request = async {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status));
            }
            Ok::<_, FetchError>(response.text().await?)
        };

        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| FetchError::Timeout(timeout))?
    }
}

/// Weather and holidays share one slot per kind; per-device data is keyed by source
///
/// `InitConfig::into_sources` allows at most one weather and one holidays
/// source, so a kind slot never mixes two origins.
pub fn cache_key(source: &Source) -> String {
    match source.kind {
        DataKind::Temperature => format!("{}:{}", source.kind.as_str(), source.id),
        DataKind::Weather | DataKind::Holidays => source.kind.as_str().to_string(),
    }
}

/// Routes a raw body to the normalizer for its kind
pub fn normalize(kind: DataKind, body: &str, units: UnitSystem) -> Result<SourceData, NormalizeError> {
    match kind {
        DataKind::Temperature => normalize_temperature(body, units).map(SourceData::Temperature),
        DataKind::Weather => normalize_weather(body, units).map(SourceData::Weather),
        DataKind::Holidays => {
            parse_holidays(body, DEFAULT_HOLIDAY_CELLS).map(SourceData::Holidays)
        }
    }
}

/// Mean of the available temperatures, rounded; "not available" when there are none
pub fn average_temperature<'a>(data: impl IntoIterator<Item = &'a SourceData>) -> Reading {
    let values: Vec<f64> = data.into_iter().filter_map(SourceData::temperature).collect();
    if values.is_empty() {
        return Reading::NotAvailable;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Reading::Value(round_two(mean))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TemperatureRecord;
    use chrono::Utc;

    fn reading(temperature: Reading) -> SourceData {
        SourceData::Temperature(TemperatureRecord {
            temperature,
            humidity: Reading::NotAvailable,
            battery: Reading::NotAvailable,
            captured_at: Utc::now(),
        })
    }

    fn failed(id: &str) -> SourceData {
        SourceData::Error(ErrorRecord {
            source_id: id.to_string(),
            reason: "connection refused".to_string(),
        })
    }

    #[test]
    fn test_average_of_two_sources() {
        let data = [reading(Reading::Value(20.0)), reading(Reading::Value(22.0))];
        assert_eq!(average_temperature(&data), Reading::Value(21.0));
    }

    #[test]
    fn test_average_excludes_errors_and_sentinels() {
        let data = [
            reading(Reading::Value(19.0)),
            failed("b"),
            reading(Reading::NotAvailable),
            reading(Reading::Value(20.5)),
        ];
        assert_eq!(average_temperature(&data), Reading::Value(19.75));
    }

    #[test]
    fn test_average_without_values_is_not_available() {
        let data = [failed("a"), failed("b"), reading(Reading::NotAvailable)];
        assert_eq!(average_temperature(&data), Reading::NotAvailable);
        assert_eq!(average_temperature(std::iter::empty()), Reading::NotAvailable);
    }

    #[test]
    fn test_average_is_rounded() {
        let data = [
            reading(Reading::Value(20.0)),
            reading(Reading::Value(20.0)),
            reading(Reading::Value(21.0)),
        ];
        assert_eq!(average_temperature(&data), Reading::Value(20.33));
    }

    #[test]
    fn test_cache_keys() {
        let sensor = Source::new("kitchen", "http://kitchen:80/temperature", DataKind::Temperature);
        let weather = Source::new("forecast", "http://example.test/weather", DataKind::Weather);
        let holidays = Source::new("stat", "http://example.test/holidays", DataKind::Holidays);

        assert_eq!(cache_key(&sensor), "temperature:kitchen");
        assert_eq!(cache_key(&weather), "weather");
        assert_eq!(cache_key(&holidays), "holidays");
    }

    #[test]
    fn test_parse_errors_are_not_retryable() {
        assert!(!FetchError::Parse(NormalizeError::EmptyBody).is_retryable());
        assert!(!FetchError::Parse(NormalizeError::NotATable).is_retryable());
        assert!(FetchError::Status(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(FetchError::Timeout(REQUEST_TIMEOUT).is_retryable());
    }

    #[test]
    fn test_normalize_routes_by_kind() {
        let body = r#"{"temperature": 20}"#;
        let data = normalize(DataKind::Temperature, body, UnitSystem::Imperial).unwrap();
        assert_eq!(data.temperature(), Some(68.0));

        let result = normalize(DataKind::Holidays, body, UnitSystem::Metric);
        assert!(matches!(result, Err(NormalizeError::NotATable)));
    }

    #[tokio::test]
    async fn test_empty_source_set() {
        let aggregator = Aggregator::default();
        let result = aggregator.run_cycle(&[], UnitSystem::Metric).await;

        assert!(result.per_source.is_empty());
        assert!(result.derived.is_none());
    }
}
