//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use presensi_core::machine::DEFAULT_LATE_CUTOFF_HOUR;
use presensi_core::{AttendanceConfig, Coordinate, Geofence, DEFAULT_RADIUS_METERS};
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: String,
    pub session_ttl_days: i64,
    pub office: Option<Coordinate>,
    pub office_radius_meters: f64,
    pub enforce_geofence: bool,
    pub late_cutoff_hour: u32,
    pub require_photo: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Load Server and Database Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());
        let session_ttl_days = parse_or(&lookup, "SESSION_TTL_DAYS", 30i64)?;
        if session_ttl_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_DAYS".to_string(),
                "must be positive".to_string(),
            ));
        }

        // --- Load Attendance Rules ---
        let office = match (lookup("OFFICE_LAT"), lookup("OFFICE_LNG")) {
            (Some(lat), Some(lng)) => {
                let lat = parse_coordinate("OFFICE_LAT", &lat, 90.0)?;
                let lng = parse_coordinate("OFFICE_LNG", &lng, 180.0)?;
                Some(Coordinate::new(lat, lng))
            }
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingVar("OFFICE_LNG".to_string())),
            (None, Some(_)) => return Err(ConfigError::MissingVar("OFFICE_LAT".to_string())),
        };

        let office_radius_meters =
            parse_or(&lookup, "OFFICE_RADIUS_METERS", DEFAULT_RADIUS_METERS)?;
        if !office_radius_meters.is_finite() || office_radius_meters < 0.0 {
            return Err(ConfigError::InvalidValue(
                "OFFICE_RADIUS_METERS".to_string(),
                format!("'{}' is not a non-negative distance", office_radius_meters),
            ));
        }

        let enforce_geofence = parse_or(&lookup, "ENFORCE_GEOFENCE", false)?;
        if enforce_geofence && office.is_none() {
            return Err(ConfigError::InvalidValue(
                "ENFORCE_GEOFENCE".to_string(),
                "requires OFFICE_LAT and OFFICE_LNG".to_string(),
            ));
        }

        let late_cutoff_hour = parse_or(&lookup, "LATE_CUTOFF_HOUR", DEFAULT_LATE_CUTOFF_HOUR)?;
        if late_cutoff_hour > 23 {
            return Err(ConfigError::InvalidValue(
                "LATE_CUTOFF_HOUR".to_string(),
                format!("{} is not an hour of the day", late_cutoff_hour),
            ));
        }

        let require_photo = parse_or(&lookup, "REQUIRE_PHOTO", false)?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            session_ttl_days,
            office,
            office_radius_meters,
            enforce_geofence,
            late_cutoff_hour,
            require_photo,
        })
    }

    /// The rules handed to every attendance state machine.
    pub fn attendance_config(&self) -> AttendanceConfig {
        AttendanceConfig {
            late_cutoff_hour: self.late_cutoff_hour,
            geofence: self
                .office
                .map(|office| Geofence::new(office).with_radius(self.office_radius_meters)),
            enforce_geofence: self.enforce_geofence,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn parse_coordinate(key: &str, raw: &str, limit: f64) -> Result<f64, ConfigError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))?;
    if !value.is_finite() || value.abs() > limit {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("{} is outside -{limit}..={limit}", value),
        ));
    }
    Ok(value)
}
