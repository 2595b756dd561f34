//! services/api/src/error.rs
//!
//! Defines the primary error type for the API service, and the mapping from
//! attendance failures onto HTTP responses.

use crate::config::ConfigError;
use axum::http::StatusCode;
use presensi_core::ports::PortError;
use presensi_core::AttendanceError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure while applying the embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Maps a rejected check-in/check-out to the status code and message sent to the client.
pub fn attendance_failure(e: &AttendanceError) -> (StatusCode, String) {
    let status = match e {
        AttendanceError::AlreadyCheckedIn | AttendanceError::AlreadyCheckedOut => {
            StatusCode::CONFLICT
        }
        AttendanceError::NotCheckedIn
        | AttendanceError::InvalidCoordinate(_)
        | AttendanceError::LocationUnavailable(_)
        | AttendanceError::LocationDenied
        | AttendanceError::CameraUnavailable(_)
        | AttendanceError::PermissionDenied => StatusCode::BAD_REQUEST,
        AttendanceError::OutsideGeofence { .. } => StatusCode::FORBIDDEN,
        AttendanceError::Persistence(PortError::NotFound(_)) => StatusCode::NOT_FOUND,
        AttendanceError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let message = match e {
        // Backend details stay in the logs.
        AttendanceError::Persistence(PortError::NotFound(_)) => {
            "Attendance record not found".to_string()
        }
        AttendanceError::Persistence(_) => {
            "Attendance storage is unavailable, please retry".to_string()
        }
        other => other.to_string(),
    };
    (status, message)
}
