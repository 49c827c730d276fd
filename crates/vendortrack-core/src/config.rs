//! Application configuration management.
//!
//! Handles loading and validating the tracker configuration:
//! - Bluetooth beacon to connect to and scan window
//! - PostgreSQL/PostGIS connection parameters
//! - Vendor name, write interval and the fixed location reading
//! - Logging mode
//!
//! Sources are layered, later ones overriding earlier ones:
//! built-in defaults, a TOML file, then `VENDORTRACK_*` environment variables
//! (nested keys joined with `__`, e.g. `VENDORTRACK_DATABASE__PASSWORD`).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "VENDORTRACK_CONFIG";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "VENDORTRACK";

/// Placeholder address used until a real beacon is configured.
pub const PLACEHOLDER_ADDRESS: &str = "00:00:00:00:00:00";

static MAC_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").expect("valid MAC regex")
});

static TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid table regex")
});

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// A single field holds an invalid value.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// More than one field is invalid.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Returns `true` for a colon-separated 48-bit address such as `AA:BB:CC:DD:EE:FF`.
#[must_use]
pub fn is_valid_mac_address(address: &str) -> bool {
    MAC_ADDRESS_RE.is_match(address)
}

/// Returns `true` for a plain, optionally schema-qualified, SQL identifier.
#[must_use]
pub fn is_valid_table_name(name: &str) -> bool {
    TABLE_NAME_RE.is_match(name)
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Beacon discovery settings.
    pub bluetooth: BluetoothConfig,

    /// Location store connection settings.
    pub database: DatabaseConfig,

    /// Tracking loop settings.
    pub tracking: TrackingConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Bluetooth beacon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Adapter name (e.g. `hci0`). `None` selects the system default adapter.
    pub adapter: Option<String>,

    /// Hardware address of the beacon to connect to.
    pub target_address: String,

    /// How long to scan for advertising peers.
    pub scan_timeout_secs: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            target_address: PLACEHOLDER_ADDRESS.to_string(),
            scan_timeout_secs: 10,
        }
    }
}

impl BluetoothConfig {
    /// Scan window as a [`Duration`].
    #[must_use]
    pub const fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    /// Whether a real beacon has been configured (not placeholder).
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.target_address != PLACEHOLDER_ADDRESS
    }
}

/// PostgreSQL connection configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,

    /// Database port.
    pub port: u16,

    /// Login role.
    pub user: String,

    /// Login password.
    #[serde(skip_serializing)]
    pub password: String,

    /// Database name.
    pub dbname: String,

    /// libpq-style SSL mode (`disable`, `prefer`, `require`, ...).
    pub ssl_mode: String,

    /// Upper bound on pooled connections.
    pub max_connections: u32,

    /// Table receiving the location rows.
    pub table: String,

    /// Create the PostGIS extension and table on startup if missing.
    pub create_table: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "youruser".to_string(),
            password: "yourpassword".to_string(),
            dbname: "streetfood".to_string(),
            ssl_mode: "disable".to_string(),
            max_connections: 5,
            table: "street_food_vendors".to_string(),
            create_table: false,
        }
    }
}

// Hand-written so the password never reaches a log line.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("dbname", &self.dbname)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .field("table", &self.table)
            .field("create_table", &self.create_table)
            .finish()
    }
}

/// Tracking loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Name stored alongside each location row.
    pub vendor_name: String,

    /// Pause between two writes.
    pub interval_secs: u64,

    /// Coordinates reported until payload decoding exists.
    pub fixed_location: FixedLocation,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            vendor_name: "Vendor Name".to_string(),
            interval_secs: 10,
            fixed_location: FixedLocation::default(),
        }
    }
}

impl TrackingConfig {
    /// Write interval as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// A configured coordinate pair in WGS-84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedLocation {
    /// Latitude in degrees, -90 to 90.
    pub latitude: f64,
    /// Longitude in degrees, -180 to 180.
    pub longitude: f64,
}

impl Default for FixedLocation {
    // New York City.
    fn default() -> Self {
        Self {
            latitude: 40.7128,
            longitude: -74.0060,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    pub level: String,

    /// JSON file logs plus compact stdout instead of pretty stdout.
    pub production: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            production: false,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from the default location plus environment overrides.
    ///
    /// The file path comes from `VENDORTRACK_CONFIG` when set. A missing file
    /// is not an error; defaults and environment variables still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if a source exists but cannot be parsed.
    pub fn load() -> ConfigResult<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map_or_else(Self::config_path, PathBuf::from);
        Self::load_from(&path)
    }

    /// Load configuration from `path` plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if an
    /// environment override has the wrong type.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let layered = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Self::default())?)
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(layered.try_deserialize()?)
    }

    /// Check every field, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a single problem or
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: &'static str, message: String| {
            errors.push(ConfigError::ValidationError { field, message });
        };

        let bt = &self.bluetooth;
        if !bt.is_configured() {
            invalid(
                "bluetooth.target_address",
                "no beacon configured; set the beacon's hardware address".to_string(),
            );
        } else if !is_valid_mac_address(&bt.target_address) {
            invalid(
                "bluetooth.target_address",
                format!(
                    "'{}' is not in XX:XX:XX:XX:XX:XX format",
                    bt.target_address
                ),
            );
        }
        if bt.scan_timeout_secs == 0 {
            invalid("bluetooth.scan_timeout_secs", "must be greater than 0".to_string());
        }

        let db = &self.database;
        if db.max_connections == 0 {
            invalid("database.max_connections", "must be greater than 0".to_string());
        }
        if db.ssl_mode.parse::<sqlx::postgres::PgSslMode>().is_err() {
            invalid(
                "database.ssl_mode",
                format!("unknown ssl mode '{}'", db.ssl_mode),
            );
        }
        if !is_valid_table_name(&db.table) {
            invalid(
                "database.table",
                format!("'{}' is not a plain SQL identifier", db.table),
            );
        }

        let tracking = &self.tracking;
        if tracking.vendor_name.trim().is_empty() {
            invalid("tracking.vendor_name", "cannot be empty".to_string());
        }
        if tracking.interval_secs == 0 {
            invalid("tracking.interval_secs", "must be greater than 0".to_string());
        }
        let FixedLocation {
            latitude,
            longitude,
        } = tracking.fixed_location;
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            invalid(
                "tracking.fixed_location.latitude",
                format!("{latitude} is outside -90..=90"),
            );
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            invalid(
                "tracking.fixed_location.longitude",
                format!("{longitude} is outside -180..=180"),
            );
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        // On the tracker host: /etc/vendortrack/config.toml
        // For development: ~/.config/vendortrack/config.toml
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/vendortrack/config.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "vendortrack").map_or_else(
                || PathBuf::from("vendortrack.toml"),
                |dirs| dirs.config_dir().join("config.toml"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn configured() -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.bluetooth.target_address = "AA:BB:CC:DD:EE:FF".to_string();
        config
    }

    #[test]
    fn test_defaults_match_original_constants() {
        let config = TrackerConfig::default();
        assert_eq!(config.bluetooth.scan_timeout(), Duration::from_secs(10));
        assert_eq!(config.tracking.interval(), Duration::from_secs(10));
        assert_eq!(config.tracking.vendor_name, "Vendor Name");
        assert!((config.tracking.fixed_location.latitude - 40.7128).abs() < f64::EPSILON);
        assert!((config.tracking.fixed_location.longitude + 74.0060).abs() < f64::EPSILON);
        assert_eq!(config.database.table, "street_food_vendors");
        assert_eq!(config.database.ssl_mode, "disable");
    }

    #[test]
    fn test_mac_address_validation() {
        assert!(is_valid_mac_address("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac_address("aa:bb:cc:dd:ee:ff"));
        assert!(!is_valid_mac_address("AA:BB"));
        assert!(!is_valid_mac_address("MAC_ADDRESS"));
        assert!(!is_valid_mac_address("AA-BB-CC-DD-EE-FF"));
    }

    #[test]
    fn test_table_name_validation() {
        assert!(is_valid_table_name("street_food_vendors"));
        assert!(is_valid_table_name("public.street_food_vendors"));
        assert!(!is_valid_table_name("vendors; DROP TABLE x"));
        assert!(!is_valid_table_name("1vendors"));
        assert!(!is_valid_table_name(""));
    }

    #[test]
    fn test_validate_accepts_configured_defaults() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_placeholder_address() {
        let err = TrackerConfig::default().validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ValidationError {
                field: "bluetooth.target_address",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = configured();
        config.tracking.interval_secs = 0;
        config.tracking.fixed_location.latitude = 91.0;
        config.database.ssl_mode = "sometimes".to_string();

        match config.validate().unwrap_err() {
            ConfigError::MultipleValidationErrors(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_non_finite_longitude() {
        let mut config = configured();
        config.tracking.fixed_location.longitude = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.bluetooth.target_address, PLACEHOLDER_ADDRESS);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[bluetooth]
target_address = "11:22:33:44:55:66"

[database]
host = "db.internal"
port = 6543

[tracking]
vendor_name = "Taco Cart"
fixed_location = {{ latitude = 34.05, longitude = -118.25 }}
"#
        )
        .unwrap();

        let config = TrackerConfig::load_from(file.path()).unwrap();
        assert_eq!(config.bluetooth.target_address, "11:22:33:44:55:66");
        assert_eq!(config.bluetooth.scan_timeout_secs, 10);
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.dbname, "streetfood");
        assert_eq!(config.tracking.vendor_name, "Taco Cart");
        assert!((config.tracking.fixed_location.latitude - 34.05).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_malformed_file_fails() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[bluetooth\ntarget_address = ").unwrap();
        assert!(matches!(
            TrackerConfig::load_from(file.path()),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", DatabaseConfig::default());
        assert!(!rendered.contains("yourpassword"));
        assert!(rendered.contains("<redacted>"));
    }
}
