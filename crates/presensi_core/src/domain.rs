//! crates/presensi_core/src/domain.rs
//!
//! Defines the pure, core data structures for the attendance application.
//! These structs are independent of any database or transport format.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// A reference to a captured photo. Usually a data URL or a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoRef(pub String);

impl PhotoRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One side of an attendance day: when, where, and optionally a photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Punch {
    pub time: NaiveTime,
    pub location: Coordinate,
    pub photo: Option<PhotoRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Late => "late",
            Self::Absent => "absent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "present" => Some(Self::Present),
            "late" => Some(Self::Late),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }
}

/// Where a (user, date) pair sits in the check-in/check-out lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceState {
    NotCheckedIn,
    CheckedIn,
    CheckedOut,
}

impl AttendanceState {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::CheckedOut)
    }
}

/// One user's attendance for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub check_in: Option<Punch>,
    pub check_out: Option<Punch>,
    pub status: AttendanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceRecord {
    /// Derives the lifecycle state from the punches the record carries.
    pub fn state(&self) -> AttendanceState {
        match (&self.check_in, &self.check_out) {
            (_, Some(_)) => AttendanceState::CheckedOut,
            (Some(_), None) => AttendanceState::CheckedIn,
            (None, None) => AttendanceState::NotCheckedIn,
        }
    }
}

/// The data needed to create a record. The repository assigns `id` and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttendance {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub check_in: Punch,
    pub status: AttendanceStatus,
}

/// The only mutation a record ever receives after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutPatch {
    pub check_out: Punch,
}

/// Narrows a record listing. Both `start` and `end` must be set for the
/// date range to apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub user_id: Option<Uuid>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl RecordFilter {
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        if let Some(user_id) = self.user_id {
            if record.user_id != user_id {
                return false;
            }
        }
        match self.date_range() {
            Some((start, end)) => record.date >= start && record.date <= end,
            None => true,
        }
    }
}

/// The wall-clock reading supplied by a `Clock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalNow {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Employee => "employee",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "employee" => Some(Self::Employee),
            _ => None,
        }
    }
}

// Represents a user account - used throughout the app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct ProfileCredentials {
    pub profile: Profile,
    pub hashed_password: String,
}
