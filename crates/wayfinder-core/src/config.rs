//! Engine configuration management.
//!
//! Handles loading, saving, and validating the engine configuration:
//! - Scan period and proximity-UUID filter
//! - Proximity bucket thresholds
//! - Positioning pipeline switches (window, distance filter, motion gate,
//!   snapping, outdoor fallback)
//! - Routing and ranging parameters
//!
//! Values are layered with the `config` crate: a TOML file first, then
//! `WAYFINDER__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::geo::FloorPolicy;

/// Minimum scan period in seconds.
pub const MIN_SCAN_PERIOD_SECS: f64 = 2.0;

/// Largest sliding window accepted by validation.
pub const MAX_SLIDING_WINDOW_SIZE: usize = 10;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "WAYFINDER";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration directory could be determined for this platform.
    #[error("Cannot determine configuration directory")]
    NoConfigDir,

    /// Reading the configuration file failed.
    #[error("Failed to read configuration from {path}: {source}")]
    ReadError {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Writing the configuration file failed.
    #[error("Failed to write configuration to {path}: {source}")]
    WriteError {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The layered sources could not be merged or deserialized.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] ::config::ConfigError),

    /// The configuration could not be serialized to TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field failed validation.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted field path, e.g. `scan.period_secs`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields failed validation.
    #[error("Configuration has {} validation errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Desired accuracy requested from the outdoor positioning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutdoorAccuracy {
    /// Highest available accuracy.
    #[default]
    Best,
    /// Within about ten meters.
    NearestTenMeters,
    /// Within about a hundred meters.
    HundredMeters,
    /// Within about a kilometer.
    Kilometer,
    /// Within about three kilometers.
    ThreeKilometers,
}

impl OutdoorAccuracy {
    /// Target accuracy radius in meters; `None` for [`OutdoorAccuracy::Best`].
    #[must_use]
    pub const fn meters(self) -> Option<f64> {
        match self {
            Self::Best => None,
            Self::NearestTenMeters => Some(10.0),
            Self::HundredMeters => Some(100.0),
            Self::Kilometer => Some(1_000.0),
            Self::ThreeKilometers => Some(3_000.0),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct EngineConfig {
    /// Scan cycle settings.
    pub scan: ScanConfig,
    /// Proximity bucket thresholds.
    pub proximity: ProximityConfig,
    /// Positioning pipeline.
    pub positioning: PositioningConfig,
    /// Routing.
    pub navigation: NavigationConfig,
    /// RSSI to distance conversion.
    pub ranging: RangingConfig,
}

/// Scan cycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ScanConfig {
    /// Seconds between cycles. Values below 2 are raised to 2.
    #[schema(example = 5.0)]
    pub period_secs: f64,

    /// Only accept beacons with these proximity UUIDs. Empty accepts all.
    pub proximity_uuids: Vec<Uuid>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            period_secs: 5.0,
            proximity_uuids: Vec::new(),
        }
    }
}

/// Distance thresholds in meters for the proximity buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ProximityConfig {
    /// Upper bound of `Immediate`.
    pub immediate_max_m: f64,
    /// Upper bound of `Near`.
    pub near_max_m: f64,
    /// Upper bound of `Far`. Anything further counts as not seen.
    pub far_max_m: f64,
    /// Consecutive cycles without a sample before a beacon is exited.
    pub exit_after_missed_cycles: u32,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            immediate_max_m: 0.5,
            near_max_m: 3.0,
            far_max_m: 30.0,
            exit_after_missed_cycles: 2,
        }
    }
}

/// Positioning pipeline switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PositioningConfig {
    /// Average the last few candidate fixes.
    pub sliding_window_enabled: bool,
    /// Number of candidates averaged by the sliding window.
    pub sliding_window_size: usize,
    /// Reject fixes implying impossible walking speed.
    pub limit_to_distance_filter_enabled: bool,
    /// Speed limit used by the distance filter.
    pub maximum_meters_per_second: f64,
    /// Hold the last location while the device is stationary.
    pub motion_detector_enabled: bool,
    /// Motion confidence below this counts as stationary.
    pub motion_detector_threshold: f64,
    /// Project fixes onto the waypoint graph.
    pub path_snapping_enabled: bool,
    /// Fall back to the outdoor positioning service.
    pub outdoor_positioning_enabled: bool,
    /// Accuracy requested from the outdoor positioning service.
    pub outdoor_positioning_accuracy: OutdoorAccuracy,
    /// Cycles without an indoor fix before falling back to outdoor.
    pub outdoor_fallback_after_cycles: u32,
}

impl Default for PositioningConfig {
    fn default() -> Self {
        Self {
            sliding_window_enabled: false,
            sliding_window_size: 3,
            limit_to_distance_filter_enabled: true,
            maximum_meters_per_second: 1.7,
            motion_detector_enabled: true,
            motion_detector_threshold: 0.025,
            path_snapping_enabled: false,
            outdoor_positioning_enabled: false,
            outdoor_positioning_accuracy: OutdoorAccuracy::Best,
            outdoor_fallback_after_cycles: 3,
        }
    }
}

/// Routing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct NavigationConfig {
    /// Meters added per floor when comparing positions on different floors.
    /// Unset means positions on different floors have no direct distance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor_change_penalty_m: Option<f64>,
}

impl NavigationConfig {
    /// The floor policy for direct indoor distances.
    #[must_use]
    pub fn floor_policy(&self) -> FloorPolicy {
        FloorPolicy::from_penalty(self.floor_change_penalty_m)
    }
}

/// RSSI to distance conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct RangingConfig {
    /// RSSI at one meter for beacons that do not advertise their own.
    pub default_measured_power: i8,
    /// Path-loss exponent of the log-distance model (2.0 = free space).
    pub path_loss_exponent: f64,
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            default_measured_power: -59,
            path_loss_exponent: 2.0,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `path` layered with environment overrides.
    ///
    /// A missing file is not an error; defaults are used for anything not set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or environment cannot be parsed.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Loads from `path`, falling back to defaults on any error.
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Using default configuration");
            Self::default()
        })
    }

    /// Writes the configuration to `path` as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let write_error = |source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_error)
    }

    /// Default configuration file path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] if no directory can be determined.
    pub fn default_path() -> ConfigResult<PathBuf> {
        // Deployed gateways: /etc/wayfinder/config.toml
        #[cfg(target_os = "linux")]
        {
            Ok(PathBuf::from("/etc/wayfinder/config.toml"))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "wayfinder")
                .ok_or(ConfigError::NoConfigDir)?;
            Ok(dirs.config_dir().join("config.toml"))
        }
    }

    /// Checks every field and reports all problems at once.
    ///
    /// A scan period below the minimum is not an error; see
    /// [`EngineConfig::normalized`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MultipleValidationErrors`] listing each invalid
    /// field.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError::ValidationError {
                    field: field.to_string(),
                    message: message.to_string(),
                });
            }
        };

        check(
            self.scan.period_secs.is_finite() && self.scan.period_secs > 0.0,
            "scan.period_secs",
            "must be a positive number of seconds",
        );

        let p = &self.proximity;
        check(
            p.immediate_max_m > 0.0 && p.immediate_max_m < p.near_max_m && p.near_max_m < p.far_max_m,
            "proximity",
            "thresholds must satisfy 0 < immediate_max_m < near_max_m < far_max_m",
        );
        check(
            p.exit_after_missed_cycles >= 1,
            "proximity.exit_after_missed_cycles",
            "must be at least 1",
        );

        let pos = &self.positioning;
        check(
            (1..=MAX_SLIDING_WINDOW_SIZE).contains(&pos.sliding_window_size),
            "positioning.sliding_window_size",
            "must be between 1 and 10",
        );
        check(
            pos.maximum_meters_per_second.is_finite() && pos.maximum_meters_per_second > 0.0,
            "positioning.maximum_meters_per_second",
            "must be positive",
        );
        check(
            pos.motion_detector_threshold.is_finite() && pos.motion_detector_threshold >= 0.0,
            "positioning.motion_detector_threshold",
            "must not be negative",
        );
        check(
            pos.outdoor_fallback_after_cycles >= 1,
            "positioning.outdoor_fallback_after_cycles",
            "must be at least 1",
        );

        check(
            self.navigation
                .floor_change_penalty_m
                .map_or(true, |m| m.is_finite() && m >= 0.0),
            "navigation.floor_change_penalty_m",
            "must not be negative",
        );
        check(
            self.ranging.path_loss_exponent.is_finite() && self.ranging.path_loss_exponent > 0.0,
            "ranging.path_loss_exponent",
            "must be positive",
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MultipleValidationErrors(errors))
        }
    }

    /// Returns a copy with values clamped to their supported ranges.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.scan.period_secs < MIN_SCAN_PERIOD_SECS {
            warn!(
                requested = self.scan.period_secs,
                minimum = MIN_SCAN_PERIOD_SECS,
                "Scan period below minimum, clamping"
            );
            self.scan.period_secs = MIN_SCAN_PERIOD_SECS;
        }
        self
    }
}
