//! Configuration types for Sentinel
//!
//! Every section has defaults matching the production behaviour, so an
//! empty JSON object `{}` is a valid configuration file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SentinelError};
use crate::geo::Coordinate;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Lifecycle timing and movement parameters
    pub dispatch: DispatchConfig,
    /// Road routing service
    pub routing: RoutingConfig,
    /// Facility discovery
    pub discovery: DiscoveryConfig,
    /// Alert links
    pub alert: AlertConfig,
    /// Phone number persistence
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl SentinelConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SentinelError::ConfigNotFound(path.display().to_string()),
            _ => SentinelError::from(e),
        })?;
        let config: SentinelConfig = serde_json::from_str(&raw)
            .map_err(|e| SentinelError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the lifecycle cannot run with
    pub fn validate(&self) -> Result<()> {
        let d = &self.dispatch;
        for (name, speed) in [
            ("dispatch.ambulance_speed_kmh", d.ambulance_speed_kmh),
            ("dispatch.facility_speed_kmh", d.facility_speed_kmh),
            ("dispatch.fallback_speed_kmh", d.fallback_speed_kmh),
            ("discovery.estimate_speed_kmh", self.discovery.estimate_speed_kmh),
        ] {
            if speed.is_nan() || speed <= 0.0 {
                return Err(SentinelError::InvalidConfig(format!(
                    "{name} must be positive, got {speed}"
                )));
            }
        }
        if d.ambulance_tick.is_zero() || d.tracking_tick.is_zero() {
            return Err(SentinelError::InvalidConfig(
                "dispatch tick intervals must be non-zero".into(),
            ));
        }
        if d.cursor_step == 0 {
            return Err(SentinelError::InvalidConfig(
                "dispatch.cursor_step must be at least 1".into(),
            ));
        }
        if d.dispatch_min_km <= 0.0 || d.dispatch_min_km >= d.dispatch_max_km {
            return Err(SentinelError::InvalidConfig(format!(
                "dispatch radius [{}, {}) is empty",
                d.dispatch_min_km, d.dispatch_max_km
            )));
        }
        if !d.default_location.is_valid() {
            return Err(SentinelError::InvalidCoordinate {
                lat: d.default_location.lat,
                lng: d.default_location.lng,
            });
        }
        if self.discovery.overpass_endpoints.is_empty() {
            return Err(SentinelError::InvalidConfig(
                "discovery.overpass_endpoints is empty".into(),
            ));
        }
        if self.discovery.max_results == 0 {
            return Err(SentinelError::InvalidConfig(
                "discovery.max_results must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle timing and movement parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Movement simulation interval for ambulance legs
    #[serde(with = "humantime_serde")]
    pub ambulance_tick: Duration,
    /// Position tracking interval for civilian navigation
    #[serde(with = "humantime_serde")]
    pub tracking_tick: Duration,
    /// Waypoints advanced per tick
    pub cursor_step: usize,
    /// Speed used for the dispatch → user leg ETA
    pub ambulance_speed_kmh: f64,
    /// Speed used for facility-bound leg ETAs
    pub facility_speed_kmh: f64,
    /// Speed used for straight-line fallback routes
    pub fallback_speed_kmh: f64,
    /// Dispatch origin distance range, in km
    pub dispatch_min_km: f64,
    pub dispatch_max_km: f64,
    /// Waypoints looked ahead for next-turn text
    pub turn_lookahead: usize,
    /// Used when geolocation fails
    pub default_location: Coordinate,
    #[serde(with = "humantime_serde")]
    pub geolocation_timeout: Duration,
    /// Pause between ambulance arrival at the user and the facility leg
    #[serde(with = "humantime_serde")]
    pub handover_pause: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            ambulance_tick: Duration::from_millis(800),
            tracking_tick: Duration::from_secs(3),
            cursor_step: 3,
            ambulance_speed_kmh: 50.0,
            facility_speed_kmh: 40.0,
            fallback_speed_kmh: 40.0,
            dispatch_min_km: 2.0,
            dispatch_max_km: 5.0,
            turn_lookahead: 5,
            default_location: Coordinate::new(12.9716, 77.5946),
            geolocation_timeout: Duration::from_secs(10),
            handover_pause: Duration::from_millis(1500),
        }
    }
}

/// Road routing service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// OSRM base URL
    pub base_url: String,
    /// OSRM profile
    pub profile: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.project-osrm.org".to_string(),
            profile: "driving".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Facility discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Overpass interpreter endpoints, tried in order
    pub overpass_endpoints: Vec<String>,
    pub radius_km: f64,
    pub max_results: usize,
    /// Number of facilities routed for road figures
    pub enrichment_limit: usize,
    /// Speed used for haversine duration estimates
    pub estimate_speed_kmh: f64,
    /// Per-endpoint timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Generative fallback, enabled when present
    pub gemini: Option<GeminiConfig>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            overpass_endpoints: vec![
                "https://overpass.private.coffee/api/interpreter".to_string(),
                "https://maps.mail.ru/osm/tools/overpass/api/interpreter".to_string(),
                "https://overpass-api.de/api/interpreter".to_string(),
            ],
            radius_km: 10.0,
            max_results: 20,
            enrichment_limit: 10,
            estimate_speed_kmh: 30.0,
            timeout: Duration::from_secs(15),
            gemini: None,
        }
    }
}

/// Gemini grounding fallback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    #[serde(default = "GeminiConfig::default_model")]
    pub model: String,
    #[serde(default = "GeminiConfig::default_base_url")]
    pub base_url: String,
}

impl GeminiConfig {
    fn default_model() -> String {
        "gemini-2.5-flash".to_string()
    }

    fn default_base_url() -> String {
        "https://generativelanguage.googleapis.com/v1beta".to_string()
    }

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: Self::default_model(),
            base_url: Self::default_base_url(),
        }
    }
}

/// Alert link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub base_url: String,
    pub maps_base_url: String,
    /// Prefixed to numbers entered without `+`
    pub default_country_code: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            base_url: "https://wa.me".to_string(),
            maps_base_url: "https://maps.google.com/maps".to_string(),
            default_country_code: "91".to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// sqlx connection string
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:sentinel.db?mode=rwc".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

/// Serde helper for Duration using humantime
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        s.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SentinelConfig::default();
        assert_eq!(config.dispatch.ambulance_tick, Duration::from_millis(800));
        assert_eq!(config.dispatch.tracking_tick, Duration::from_secs(3));
        assert_eq!(config.dispatch.cursor_step, 3);
        assert_eq!(config.discovery.overpass_endpoints.len(), 3);
        assert!(config.discovery.gemini.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = SentinelConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let recovered: SentinelConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.dispatch.ambulance_tick, recovered.dispatch.ambulance_tick);
        assert_eq!(config.routing.base_url, recovered.routing.base_url);
        assert_eq!(recovered.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SentinelConfig = serde_json::from_str(
            r#"{
                "dispatch": { "ambulance_tick": "250ms" },
                "discovery": { "gemini": { "api_key": "k" } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.dispatch.ambulance_tick, Duration::from_millis(250));
        assert_eq!(config.dispatch.cursor_step, 3);
        let gemini = config.discovery.gemini.unwrap();
        assert_eq!(gemini.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SentinelConfig::default();
        config.dispatch.cursor_step = 0;
        assert!(matches!(config.validate(), Err(SentinelError::InvalidConfig(_))));

        let mut config = SentinelConfig::default();
        config.dispatch.dispatch_min_km = 6.0;
        assert!(config.validate().is_err());

        let mut config = SentinelConfig::default();
        config.discovery.overpass_endpoints.clear();
        assert!(config.validate().is_err());

        let mut config = SentinelConfig::default();
        config.dispatch.facility_speed_kmh = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = SentinelConfig::from_file("/nonexistent/sentinel.json").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_NOT_FOUND");
    }
}
