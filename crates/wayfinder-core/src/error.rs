//! Unified error types for the wayfinder core library.
//!
//! [`WayfinderError`] covers every failure mode the engine surfaces. Each
//! module keeps its own error type (`GeoError`, `CatalogError`,
//! `NavigationError`, `ScanError`, `ConfigError`, `EngineError`) and converts
//! into this one at the boundary.
//!
//! Positioning never fails: it only withholds a location. It therefore has no
//! variants here.
//!
//! # Example
//!
//! ```rust
//! use wayfinder_core::error::{Result, WayfinderError};
//! use wayfinder_core::geo::Coordinate;
//!
//! fn check(c: Coordinate) -> Result<Coordinate> {
//!     Ok(c.validated()?)
//! }
//!
//! let err = check(Coordinate::new(120.0, 0.0)).unwrap_err();
//! assert_eq!(err.http_status_code(), 400);
//! ```

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::geo::GeoError;
use crate::navigation::NavigationError;
use crate::sources::ScanError;

/// The unified error type for all wayfinder operations.
#[derive(Debug, Error)]
pub enum WayfinderError {
    // =========================================================================
    // INPUT ERRORS
    // =========================================================================
    /// A coordinate is NaN or out of range.
    #[error("Invalid coordinate (latitude {latitude}, longitude {longitude})")]
    InvalidCoordinate {
        /// Offending latitude.
        latitude: f64,
        /// Offending longitude.
        longitude: f64,
    },

    /// Two positions on different floors were compared directly.
    #[error("No direct distance between floor {from} and floor {to}")]
    DifferentFloors {
        /// First floor.
        from: i32,
        /// Second floor.
        to: i32,
    },

    /// A beacon id string could not be parsed.
    #[error("Invalid beacon id '{0}'. Expected 'UUID:major:minor'.")]
    InvalidBeaconId(String),

    // =========================================================================
    // CONTENT ERRORS
    // =========================================================================
    /// A catalog was rejected during validation.
    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    /// The operation needs content that is not installed.
    #[error("Operation not allowed in the current state: {0}")]
    InvalidState(String),

    // =========================================================================
    // NAVIGATION ERRORS
    // =========================================================================
    /// The graph has no path between the requested floors.
    #[error("No route found from floor {from_floor} to floor {to_floor}")]
    NoRoute {
        /// Start floor.
        from_floor: i32,
        /// Destination floor.
        to_floor: i32,
    },

    /// No navigation data for the request.
    #[error("No navigation data: {0}")]
    NavigationNoData(String),

    /// Routing failed for another reason.
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    // =========================================================================
    // SCAN ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    BluetoothAdapterNotFound,

    /// The Bluetooth adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off. Run 'bluetoothctl power on' to enable.")]
    BluetoothAdapterPoweredOff,

    /// The scan source failed.
    #[error("Scan failed: {0}")]
    ScanFailed(String),

    /// The scan worker stopped unexpectedly.
    #[error("Scan worker failed: {0}")]
    WorkerFailed(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration could not be parsed or serialized.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// Reading or writing a file failed.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for wayfinder operations.
pub type Result<T> = std::result::Result<T, WayfinderError>;

/// Alias for [`WayfinderError`].
pub type Error = WayfinderError;

impl WayfinderError {
    /// Returns `true` if this error came from routing.
    #[inline]
    #[must_use]
    pub const fn is_navigation_error(&self) -> bool {
        matches!(
            self,
            Self::NoRoute { .. } | Self::NavigationNoData(_) | Self::NavigationFailed(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigParseError(_) | Self::ConfigValidationError(_))
    }

    /// Returns `true` if this error is related to the radio or scan worker.
    #[inline]
    #[must_use]
    pub const fn is_scan_error(&self) -> bool {
        matches!(
            self,
            Self::BluetoothAdapterNotFound
                | Self::BluetoothAdapterPoweredOff
                | Self::ScanFailed(_)
                | Self::WorkerFailed(_)
        )
    }

    /// Returns `true` if the caller supplied malformed input.
    #[inline]
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCoordinate { .. } | Self::DifferentFloors { .. } | Self::InvalidBeaconId(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns `true` for outcomes that are answers rather than failures.
    ///
    /// An unreachable destination is a valid routing result.
    #[inline]
    #[must_use]
    pub const fn is_expected_state(&self) -> bool {
        matches!(self, Self::NoRoute { .. })
    }

    /// Returns `true` if retrying later may succeed without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::ScanFailed(_) | Self::NavigationNoData(_))
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidCoordinate { .. } | Self::DifferentFloors { .. } | Self::InvalidBeaconId(_) => 400,

            // 404 Not Found
            Self::NoRoute { .. } | Self::NavigationNoData(_) => 404,

            // 409 Conflict - wrong engine state
            Self::InvalidState(_) => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::InvalidCatalog(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error
            Self::NavigationFailed(_)
            | Self::WorkerFailed(_)
            | Self::PersistenceError(_)
            | Self::IoError(_) => 500,

            // 503 Service Unavailable - radio issues
            Self::BluetoothAdapterNotFound | Self::BluetoothAdapterPoweredOff | Self::ScanFailed(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCoordinate { .. } => "INVALID_COORDINATE",
            Self::DifferentFloors { .. } => "DIFFERENT_FLOORS",
            Self::InvalidBeaconId(_) => "INVALID_BEACON_ID",
            Self::InvalidCatalog(_) => "INVALID_CATALOG",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::NoRoute { .. } => "NAVIGATION_NO_PATH",
            Self::NavigationNoData(_) => "NAVIGATION_NO_DATA",
            Self::NavigationFailed(_) => "NAVIGATION_FAILED",
            Self::BluetoothAdapterNotFound => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::BluetoothAdapterPoweredOff => "BLUETOOTH_ADAPTER_POWERED_OFF",
            Self::ScanFailed(_) => "SCAN_FAILED",
            Self::WorkerFailed(_) => "WORKER_FAILED",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<GeoError> for WayfinderError {
    fn from(err: GeoError) -> Self {
        match err {
            GeoError::InvalidInput {
                latitude,
                longitude,
            } => Self::InvalidCoordinate {
                latitude,
                longitude,
            },
            GeoError::DifferentFloors { from, to } => Self::DifferentFloors { from, to },
        }
    }
}

impl From<CatalogError> for WayfinderError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidBeaconId(id) => Self::InvalidBeaconId(id),
            other => Self::InvalidCatalog(other.to_string()),
        }
    }
}

impl From<NavigationError> for WayfinderError {
    fn from(err: NavigationError) -> Self {
        match err {
            NavigationError::NoPath {
                from_floor,
                to_floor,
            } => Self::NoRoute {
                from_floor,
                to_floor,
            },
            NavigationError::NoData(message) => Self::NavigationNoData(message),
            NavigationError::InvalidState(message) => Self::InvalidState(message),
            NavigationError::Other(message) => Self::NavigationFailed(message),
        }
    }
}

impl From<ScanError> for WayfinderError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::AdapterNotFound => Self::BluetoothAdapterNotFound,
            ScanError::AdapterPoweredOff => Self::BluetoothAdapterPoweredOff,
            ScanError::Closed => Self::ScanFailed("scan source closed".to_string()),
            ScanError::Inactive => Self::InvalidState("no scanning session is running".to_string()),
            ScanError::QueueFull => Self::ScanFailed("sample queue is full".to_string()),
            ScanError::Failed(message) => Self::ScanFailed(message),
        }
    }
}

impl From<ConfigError> for WayfinderError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoConfigDir => {
                Self::PersistenceError("Cannot determine configuration directory".to_string())
            }
            ConfigError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {path}: {source}"))
            }
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {path}: {source}"))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<EngineError> for WayfinderError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidState(state) => Self::InvalidState(format!("{state:?}")),
            EngineError::Catalog(e) => e.into(),
            EngineError::Config(e) => e.into(),
            EngineError::Scan(e) => e.into(),
            EngineError::Worker(message) => Self::WorkerFailed(message),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BeaconId;
    use crate::engine::EngineState;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_navigation_error_classification() {
        assert!(WayfinderError::NoRoute {
            from_floor: 0,
            to_floor: 1
        }
        .is_navigation_error());
        assert!(WayfinderError::NavigationNoData("empty".into()).is_navigation_error());
        assert!(WayfinderError::NavigationFailed("boom".into()).is_navigation_error());

        assert!(!WayfinderError::BluetoothAdapterNotFound.is_navigation_error());
    }

    #[test]
    fn test_config_error_classification() {
        assert!(WayfinderError::ConfigParseError("syntax error".into()).is_config_error());
        assert!(WayfinderError::ConfigValidationError("invalid value".into()).is_config_error());

        assert!(!WayfinderError::ScanFailed("x".into()).is_config_error());
    }

    #[test]
    fn test_scan_and_input_classification() {
        assert!(WayfinderError::BluetoothAdapterPoweredOff.is_scan_error());
        assert!(WayfinderError::WorkerFailed("panic".into()).is_scan_error());
        assert!(WayfinderError::InvalidBeaconId("x".into()).is_input_error());
        assert!(!WayfinderError::InvalidCatalog("x".into()).is_input_error());
    }

    #[test]
    fn test_io_error_classification() {
        assert!(WayfinderError::PersistenceError("disk full".into()).is_io_error());
        assert!(WayfinderError::IoError(IoErr::new(ErrorKind::NotFound, "test")).is_io_error());

        assert!(!WayfinderError::BluetoothAdapterNotFound.is_io_error());
    }

    #[test]
    fn test_expected_state_and_recoverable() {
        let no_route = WayfinderError::NoRoute {
            from_floor: 0,
            to_floor: 3,
        };
        assert!(no_route.is_expected_state());
        assert!(!no_route.is_recoverable());
        assert!(WayfinderError::ScanFailed("timeout".into()).is_recoverable());
        assert!(!WayfinderError::BluetoothAdapterNotFound.is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(
            WayfinderError::InvalidCoordinate {
                latitude: 91.0,
                longitude: 0.0
            }
            .http_status_code(),
            400
        );
        assert_eq!(
            WayfinderError::NoRoute {
                from_floor: 0,
                to_floor: 1
            }
            .http_status_code(),
            404
        );
        assert_eq!(WayfinderError::InvalidState("None".into()).http_status_code(), 409);
        assert_eq!(WayfinderError::InvalidCatalog("dup".into()).http_status_code(), 422);
        assert_eq!(WayfinderError::PersistenceError("error".into()).http_status_code(), 500);
        assert_eq!(WayfinderError::BluetoothAdapterNotFound.http_status_code(), 503);
    }

    #[test]
    fn test_error_codes_match_navigation_codes() {
        for err in [
            NavigationError::NoPath {
                from_floor: 1,
                to_floor: 2,
            },
            NavigationError::NoData("x".into()),
            NavigationError::Other("x".into()),
        ] {
            let code = err.error_code();
            assert_eq!(WayfinderError::from(err).error_code(), code);
        }
    }

    #[test]
    fn test_from_module_errors() {
        let err: WayfinderError = GeoError::InvalidInput {
            latitude: f64::NAN,
            longitude: 0.0,
        }
        .into();
        assert!(err.is_input_error());

        let err: WayfinderError = CatalogError::DuplicateBeacon(BeaconId::new(uuid::Uuid::nil(), 1, 1)).into();
        assert!(matches!(err, WayfinderError::InvalidCatalog(ref m) if m.contains("Duplicate")));

        let err: WayfinderError = EngineError::InvalidState(EngineState::None).into();
        assert_eq!(err.error_code(), "INVALID_STATE");

        let err: WayfinderError = EngineError::Scan(ScanError::AdapterPoweredOff).into();
        assert!(matches!(err, WayfinderError::BluetoothAdapterPoweredOff));

        let err: WayfinderError = ScanError::Inactive.into();
        assert_eq!(err.http_status_code(), 409);
        let err: WayfinderError = ScanError::QueueFull.into();
        assert_eq!(err.http_status_code(), 503);

        let err: WayfinderError = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "a".into(),
                message: "bad".into(),
            },
            ConfigError::ValidationError {
                field: "b".into(),
                message: "worse".into(),
            },
        ])
        .into();
        assert!(err.to_string().contains("'a'"));
        assert!(err.to_string().contains("; "));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoErr::new(ErrorKind::NotFound, "file not found");
        let err: WayfinderError = io_err.into();
        assert!(matches!(err, WayfinderError::IoError(_)));
        assert!(err.is_io_error());
    }

    #[test]
    fn test_error_display_messages() {
        let err = WayfinderError::BluetoothAdapterNotFound;
        assert!(err.to_string().contains("No Bluetooth adapter found"));

        let err = WayfinderError::NoRoute {
            from_floor: 2,
            to_floor: 5,
        };
        assert!(err.to_string().contains("floor 5"));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }

        fn returns_error() -> Result<i32> {
            Err(WayfinderError::InvalidState("None".into()))
        }

        assert_eq!(returns_result().unwrap(), 42);
        assert!(returns_error().is_err());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<WayfinderError>();
        assert_sync::<WayfinderError>();
    }
}
