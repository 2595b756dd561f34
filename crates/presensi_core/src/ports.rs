//! crates/presensi_core/src/ports.rs
//!
//! Defines the service contracts (traits) the attendance core depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the database, the device APIs, and the system clock.

use crate::domain::{
    AttendanceRecord, CheckOutPatch, Coordinate, LocalNow, NewAttendance, PhotoRef, Profile,
    ProfileCredentials, RecordFilter,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

//=========================================================================================
// Port Error and Result Types
//=========================================================================================

/// A generic error type for storage port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The backend could not be reached. Safe to retry.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Failures reported by the location and camera ports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),
    #[error("Location permission denied")]
    LocationDenied,
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("Camera permission denied")]
    PermissionDenied,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable storage for attendance records.
///
/// Implementations must enforce one record per `(user_id, date)` and reject a
/// duplicate `insert` with `PortError::Conflict`.
#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    async fn find_by_user_and_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Option<AttendanceRecord>>;

    async fn insert(&self, record: NewAttendance) -> PortResult<AttendanceRecord>;

    async fn update(&self, id: Uuid, patch: CheckOutPatch) -> PortResult<AttendanceRecord>;

    /// Administrative removal. `NotFound` if no record has this id.
    async fn delete(&self, id: Uuid) -> PortResult<()>;

    /// Records matching `filter`, newest date first.
    async fn list(&self, filter: &RecordFilter) -> PortResult<Vec<AttendanceRecord>>;
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Resolves the device's current position.
    async fn current_location(&self) -> Result<Coordinate, DeviceError>;
}

#[async_trait]
pub trait PhotoCapture: Send + Sync {
    /// Takes a photo and returns a reference to it.
    async fn capture(&self) -> Result<PhotoRef, DeviceError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> LocalNow;
}

#[async_trait]
pub trait AccountService: Send + Sync {
    // --- Profiles ---
    async fn create_profile(
        &self,
        email: &str,
        name: &str,
        hashed_password: &str,
    ) -> PortResult<Profile>;

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<ProfileCredentials>;

    /// Renames the profile. `NotFound` if `user_id` has no profile.
    async fn update_profile(&self, user_id: Uuid, name: &str) -> PortResult<Profile>;

    /// Every profile, ordered by name.
    async fn list_profiles(&self) -> PortResult<Vec<Profile>>;

    // --- Auth sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: chrono::DateTime<chrono::Utc>,
    ) -> PortResult<()>;

    /// Returns the owner of a live session, or `Unauthorized`.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Profile>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}
