//! Runtime configuration.
//!
//! Loaded from YAML, with durations written as human-readable strings
//! (`"30m"`, `"500ms"`), then adjusted by environment overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::providers::secrets::{ApiCredential, CredentialSource};
use crate::resilience::{CircuitBreakerConfig, RetryConfig};

/// Minutes a weather snapshot stays fresh.
pub const WEATHER_CACHE_TTL_ENV: &str = "SKYCAST_WEATHER_CACHE_TTL_MINUTES";
/// Mapbox access token. `MAPBOX_API_KEY` is accepted as a fallback.
pub const MAPBOX_API_KEY_ENV: &str = "SKYCAST_MAPBOX_API_KEY";
pub const MAPBOX_API_KEY_FALLBACK_ENV: &str = "MAPBOX_API_KEY";
pub const LOG_LEVEL_ENV: &str = "SKYCAST_LOG_LEVEL";

const MAPBOX_KEY_NAME: &str = "Mapbox access token";

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid environment override {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde adapter for human-readable durations.
///
/// Accepts `"1h 30m"`-style strings or a bare integer number of seconds.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => {
                humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom)
            }
        }
    }
}

/// Which geocoding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodingBackend {
    #[default]
    Mapbox,
    Nominatim,
}

/// Geocoding upstream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub backend: GeocodingBackend,

    /// Overrides the backend's default endpoint
    pub base_url: Option<String>,

    /// Mapbox access token; never serialized back out
    #[serde(
        skip_serializing,
        deserialize_with = "deserialize_credential"
    )]
    pub api_key: Option<ApiCredential>,

    #[serde(deserialize_with = "geocoding_retry")]
    pub retry: RetryConfig,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            backend: GeocodingBackend::default(),
            base_url: None,
            api_key: None,
            retry: RetryConfig::geocoding(),
        }
    }
}

fn deserialize_credential<'de, D>(deserializer: D) -> Result<Option<ApiCredential>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| !v.trim().is_empty())
        .map(|v| ApiCredential::new(v, CredentialSource::Config, MAPBOX_KEY_NAME)))
}

/// Layer a partial `retry` block over an upstream's preset.
fn overlay_retry<'de, D>(deserializer: D, preset: RetryConfig) -> Result<RetryConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;
    use serde_yaml::{Mapping, Value};

    let overrides = Option::<Mapping>::deserialize(deserializer)?.unwrap_or_default();
    let mut merged = match serde_yaml::to_value(&preset).map_err(D::Error::custom)? {
        Value::Mapping(map) => map,
        _ => Mapping::new(),
    };
    for (key, value) in overrides {
        merged.insert(key, value);
    }
    serde_yaml::from_value(Value::Mapping(merged)).map_err(D::Error::custom)
}

fn geocoding_retry<'de, D: serde::Deserializer<'de>>(d: D) -> Result<RetryConfig, D::Error> {
    overlay_retry(d, RetryConfig::geocoding())
}

fn timezone_retry<'de, D: serde::Deserializer<'de>>(d: D) -> Result<RetryConfig, D::Error> {
    overlay_retry(d, RetryConfig::timezone())
}

fn weather_retry<'de, D: serde::Deserializer<'de>>(d: D) -> Result<RetryConfig, D::Error> {
    overlay_retry(d, RetryConfig::weather())
}

/// IP-location upstream settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimezoneConfig {
    pub base_url: String,
    #[serde(deserialize_with = "timezone_retry")]
    pub retry: RetryConfig,
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        Self {
            base_url: crate::providers::ipinfo::DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::timezone(),
        }
    }
}

/// Weather upstream settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    #[serde(deserialize_with = "weather_retry")]
    pub retry: RetryConfig,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: crate::providers::open_meteo::DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::weather(),
        }
    }
}

/// Transport settings shared by every upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(with = "duration_str")]
    pub connect_timeout: Duration,

    #[serde(with = "duration_str")]
    pub request_timeout: Duration,

    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            user_agent: format!("skycast/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Logging settings, read by the binary when installing a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkycastConfig {
    pub geocoding: GeocodingConfig,
    pub timezone: TimezoneConfig,
    pub weather: WeatherConfig,
    pub cache: CacheConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

impl SkycastConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Load from an optional file, apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process env).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(WEATHER_CACHE_TTL_ENV) {
            let minutes: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: WEATHER_CACHE_TTL_ENV,
                reason: format!("expected whole minutes, got '{raw}'"),
            })?;
            let seconds = minutes.checked_mul(60).ok_or_else(|| ConfigError::InvalidEnv {
                name: WEATHER_CACHE_TTL_ENV,
                reason: format!("{minutes} minutes is out of range"),
            })?;
            self.cache.ttl = Duration::from_secs(seconds);
        }

        if self.geocoding.api_key.is_none() {
            self.geocoding.api_key = ApiCredential::first_set(
                &[MAPBOX_API_KEY_ENV, MAPBOX_API_KEY_FALLBACK_ENV],
                &lookup,
                MAPBOX_KEY_NAME,
            );
        }

        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|l| !l.trim().is_empty()) {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, retry) in [
            ("geocoding", &self.geocoding.retry),
            ("timezone", &self.timezone.retry),
            ("weather", &self.weather.retry),
        ] {
            if retry.max_tries == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name}.retry.max_tries must be at least 1"
                )));
            }
            if retry.base_interval > retry.max_interval {
                return Err(ConfigError::Invalid(format!(
                    "{name}.retry.base_interval exceeds max_interval"
                )));
            }
            if !(retry.multiplier >= 1.0 && retry.multiplier.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "{name}.retry.multiplier must be at least 1.0"
                )));
            }
        }

        let breaker = &self.circuit_breaker;
        if !(1..=100).contains(&breaker.error_threshold_percent) {
            return Err(ConfigError::Invalid(
                "circuit_breaker.error_threshold_percent must be between 1 and 100".to_string(),
            ));
        }
        if breaker.volume_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.volume_threshold must be at least 1".to_string(),
            ));
        }

        if self.cache.ttl.is_zero() {
            return Err(ConfigError::Invalid("cache.ttl must be positive".to_string()));
        }

        let urls = [
            ("geocoding.base_url", self.geocoding.base_url.as_deref()),
            ("timezone.base_url", Some(self.timezone.base_url.as_str())),
            ("weather.base_url", Some(self.weather.base_url.as_str())),
        ];
        for (name, url) in urls {
            if let Some(url) = url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ConfigError::Invalid(format!(
                        "{name} must start with http:// or https://"
                    )));
                }
            }
        }

        if self.geocoding.backend == GeocodingBackend::Mapbox
            && self.geocoding.api_key.as_ref().map_or(true, |k| k.is_blank())
        {
            return Err(ConfigError::Invalid(format!(
                "Mapbox geocoding requires an access token: set geocoding.api_key, \
                 {MAPBOX_API_KEY_ENV} or {MAPBOX_API_KEY_FALLBACK_ENV}"
            )));
        }

        Ok(())
    }

    /// The configuration as YAML, with secrets omitted.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    fn keyed() -> SkycastConfig {
        let mut config = SkycastConfig::default();
        config
            .apply_overrides(env(&[(MAPBOX_API_KEY_ENV, "pk.test")]))
            .unwrap();
        config
    }

    #[test]
    fn test_defaults() {
        let config = SkycastConfig::default();
        assert_eq!(config.cache.ttl, Duration::from_secs(1800));
        assert_eq!(config.geocoding.retry.max_tries, 3);
        assert_eq!(config.timezone.retry.max_tries, 2);
        assert_eq!(config.timezone.retry.max_interval, Duration::from_secs(1));
        assert_eq!(config.circuit_breaker.volume_threshold, 5);
        assert_eq!(config.http.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.http.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_yaml_sections_merge_with_defaults() {
        let yaml = r#"
geocoding:
  backend: nominatim
weather:
  retry:
    max_tries: 5
    base_interval: 1s
    max_interval: 4s
    multiplier: 2.0
cache:
  ttl: 10m
"#;
        let config = SkycastConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.geocoding.backend, GeocodingBackend::Nominatim);
        assert_eq!(config.weather.retry.max_tries, 5);
        assert_eq!(config.cache.ttl, Duration::from_secs(600));
        assert_eq!(config.cache.max_entries, 10_000);
        assert_eq!(config.timezone.retry.max_tries, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = SkycastConfig::from_yaml("").unwrap();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_cache_ttl_override() {
        let mut config = SkycastConfig::default();
        config
            .apply_overrides(env(&[(WEATHER_CACHE_TTL_ENV, "45")]))
            .unwrap();
        assert_eq!(config.cache.ttl, Duration::from_secs(45 * 60));

        let err = config
            .apply_overrides(env(&[(WEATHER_CACHE_TTL_ENV, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_cache_ttl_override_out_of_range() {
        let mut config = SkycastConfig::default();
        let huge = u64::MAX.to_string();
        let err = config
            .apply_overrides(env(&[(WEATHER_CACHE_TTL_ENV, huge.as_str())]))
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
        assert_eq!(config.cache.ttl, CacheConfig::default().ttl);
    }

    #[test]
    fn test_partial_retry_keeps_upstream_preset() {
        let yaml = r#"
timezone:
  retry:
    max_tries: 4
weather:
  retry:
    base_interval: 100ms
"#;
        let config = SkycastConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.timezone.retry.max_tries, 4);
        assert_eq!(config.timezone.retry.base_interval, Duration::from_millis(500));
        assert_eq!(config.timezone.retry.max_interval, Duration::from_secs(1));
        assert_eq!(config.weather.retry.max_tries, 3);
        assert_eq!(config.weather.retry.base_interval, Duration::from_millis(100));
        assert_eq!(config.weather.retry.max_interval, Duration::from_secs(2));
        assert_eq!(config.geocoding.retry, RetryConfig::geocoding());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mapbox_key_fallback_env() {
        let mut config = SkycastConfig::default();
        config
            .apply_overrides(env(&[(MAPBOX_API_KEY_FALLBACK_ENV, "pk.fallback")]))
            .unwrap();
        let key = config.geocoding.api_key.as_ref().unwrap();
        assert_eq!(key.expose(), "pk.fallback");
        assert_eq!(key.source(), CredentialSource::Environment);
    }

    #[test]
    fn test_config_key_wins_over_env() {
        let mut config = SkycastConfig::from_yaml("geocoding:\n  api_key: pk.file\n").unwrap();
        config
            .apply_overrides(env(&[(MAPBOX_API_KEY_ENV, "pk.env")]))
            .unwrap();
        let key = config.geocoding.api_key.as_ref().unwrap();
        assert_eq!(key.expose(), "pk.file");
        assert_eq!(key.source(), CredentialSource::Config);
    }

    #[test]
    fn test_mapbox_requires_key() {
        let err = SkycastConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("access token"));
        assert!(keyed().validate().is_ok());

        let mut nominatim = SkycastConfig::default();
        nominatim.geocoding.backend = GeocodingBackend::Nominatim;
        assert!(nominatim.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = keyed();
        config.weather.retry.max_tries = 0;
        assert!(config.validate().is_err());

        let mut config = keyed();
        config.geocoding.retry.base_interval = Duration::from_secs(5);
        assert!(config.validate().is_err());

        let mut config = keyed();
        config.circuit_breaker.error_threshold_percent = 0;
        assert!(config.validate().is_err());

        let mut config = keyed();
        config.weather.base_url = "api.open-meteo.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_output_omits_secret() {
        let yaml = keyed().to_yaml().unwrap();
        assert!(!yaml.contains("pk.test"));
        assert!(yaml.contains("30m"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", keyed());
        assert!(!debug.contains("pk.test"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_duration_accepts_seconds() {
        let config = SkycastConfig::from_yaml("http:\n  request_timeout: 8\n").unwrap();
        assert_eq!(config.http.request_timeout, Duration::from_secs(8));
    }
}
