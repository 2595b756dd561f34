//! crates/presensi_core/src/machine.rs
//!
//! The check-in/check-out lifecycle for one user's attendance days.
//!
//! Each (user, date) moves `NotCheckedIn -> CheckedIn -> CheckedOut` and never
//! leaves `CheckedOut`. The in-memory copy of a record is only touched after the
//! repository has confirmed the write, so a failed round trip leaves both sides
//! exactly as they were.
//!
//! Storage stays the authority. Check-ins and state queries always re-read the
//! day; only check-out starts from the cached copy, and the conditional update
//! behind it rejects a stale one. The cache holds a single date at a time.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Timelike};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    AttendanceRecord, AttendanceState, AttendanceStatus, CheckOutPatch, Coordinate, LocalNow,
    NewAttendance, PhotoRef, Punch,
};
use crate::geo::{Geofence, InvalidCoordinate};
use crate::ports::{
    AttendanceRepository, Clock, DeviceError, LocationProvider, PhotoCapture, PortError,
};

/// Check-ins after this hour of the day are late.
pub const DEFAULT_LATE_CUTOFF_HOUR: u32 = 9;

//=========================================================================================
// Errors
//=========================================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttendanceError {
    #[error(transparent)]
    InvalidCoordinate(#[from] InvalidCoordinate),

    #[error("Already checked in for this day")]
    AlreadyCheckedIn,

    #[error("Already checked out for this day")]
    AlreadyCheckedOut,

    #[error("No check-in found for this day")]
    NotCheckedIn,

    #[error(
        "Outside the office geofence: {distance_meters:.1} m away (limit {radius_meters:.1} m)"
    )]
    OutsideGeofence { distance_meters: f64, radius_meters: f64 },

    /// A storage fault. The caller may retry with the same inputs.
    #[error("Persistence error: {0}")]
    Persistence(#[source] PortError),

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Location permission denied")]
    LocationDenied,

    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("Camera permission denied")]
    PermissionDenied,
}

impl AttendanceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

impl From<DeviceError> for AttendanceError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::LocationUnavailable(msg) => Self::LocationUnavailable(msg),
            DeviceError::LocationDenied => Self::LocationDenied,
            DeviceError::CameraUnavailable(msg) => Self::CameraUnavailable(msg),
            DeviceError::PermissionDenied => Self::PermissionDenied,
        }
    }
}

pub type AttendanceResult<T> = Result<T, AttendanceError>;

//=========================================================================================
// Configuration
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceConfig {
    /// Hour of day (0-23). A check-in whose hour is strictly greater is late.
    /// Minutes are ignored, so 09:59 still counts as on time.
    pub late_cutoff_hour: u32,
    pub geofence: Option<Geofence>,
    /// Reject punches outside `geofence`. Without it the distance is only logged.
    pub enforce_geofence: bool,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            late_cutoff_hour: DEFAULT_LATE_CUTOFF_HOUR,
            geofence: None,
            enforce_geofence: false,
        }
    }
}

/// Status assigned at check-in. Computed once and never revisited.
pub fn status_for(time: NaiveTime, late_cutoff_hour: u32) -> AttendanceStatus {
    if time.hour() > late_cutoff_hour {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    }
}

//=========================================================================================
// The State Machine
//=========================================================================================

pub struct AttendanceStateMachine {
    repo: Arc<dyn AttendanceRepository>,
    clock: Arc<dyn Clock>,
    config: AttendanceConfig,
    records: HashMap<(Uuid, NaiveDate), AttendanceRecord>,
}

impl AttendanceStateMachine {
    pub fn new(
        repo: Arc<dyn AttendanceRepository>,
        clock: Arc<dyn Clock>,
        config: AttendanceConfig,
    ) -> Self {
        Self {
            repo,
            clock,
            config,
            records: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AttendanceConfig {
        &self.config
    }

    /// Creates the day's record. Fails with `AlreadyCheckedIn` if one exists,
    /// including when a racing insert wins at the storage layer.
    pub async fn check_in(
        &mut self,
        user_id: Uuid,
        date: NaiveDate,
        location: Coordinate,
        photo: Option<PhotoRef>,
    ) -> AttendanceResult<AttendanceRecord> {
        let time = self.clock.now().time;
        self.check_in_at(user_id, LocalNow { date, time }, location, photo).await
    }

    async fn check_in_at(
        &mut self,
        user_id: Uuid,
        now: LocalNow,
        location: Coordinate,
        photo: Option<PhotoRef>,
    ) -> AttendanceResult<AttendanceRecord> {
        let date = now.date;
        if self.refresh(user_id, date).await?.is_some() {
            return Err(AttendanceError::AlreadyCheckedIn);
        }
        self.check_location(location)?;

        let status = status_for(now.time, self.config.late_cutoff_hour);
        let new = NewAttendance {
            user_id,
            date,
            check_in: Punch {
                time: now.time,
                location,
                photo,
            },
            status,
        };

        let record = self.repo.insert(new).await.map_err(|e| match e {
            PortError::Conflict(msg) => {
                warn!(%user_id, %date, "Duplicate check-in rejected by storage: {}", msg);
                AttendanceError::AlreadyCheckedIn
            }
            other => AttendanceError::Persistence(other),
        })?;

        info!(%user_id, %date, status = status.as_str(), "Checked in");
        self.remember(&record);
        Ok(record)
    }

    /// Completes the day's record. Requires a prior check-in; a second
    /// check-out is rejected rather than overwriting the first.
    pub async fn check_out(
        &mut self,
        user_id: Uuid,
        date: NaiveDate,
        location: Coordinate,
        photo: Option<PhotoRef>,
    ) -> AttendanceResult<AttendanceRecord> {
        let time = self.clock.now().time;
        self.check_out_at(user_id, LocalNow { date, time }, location, photo).await
    }

    async fn check_out_at(
        &mut self,
        user_id: Uuid,
        now: LocalNow,
        location: Coordinate,
        photo: Option<PhotoRef>,
    ) -> AttendanceResult<AttendanceRecord> {
        let date = now.date;
        let existing = self
            .load(user_id, date)
            .await?
            .ok_or(AttendanceError::NotCheckedIn)?;
        match existing.state() {
            AttendanceState::NotCheckedIn => return Err(AttendanceError::NotCheckedIn),
            AttendanceState::CheckedOut => return Err(AttendanceError::AlreadyCheckedOut),
            AttendanceState::CheckedIn => {}
        }
        self.check_location(location)?;

        let patch = CheckOutPatch {
            check_out: Punch {
                time: now.time,
                location,
                photo,
            },
        };

        let record = match self.repo.update(existing.id, patch).await {
            Ok(record) => record,
            Err(PortError::Conflict(_)) => {
                // Closed by another session; reload on next use.
                self.records.remove(&(user_id, date));
                return Err(AttendanceError::AlreadyCheckedOut);
            }
            Err(PortError::NotFound(_)) => {
                // Deleted behind our back.
                self.records.remove(&(user_id, date));
                return Err(AttendanceError::NotCheckedIn);
            }
            Err(e) => return Err(AttendanceError::Persistence(e)),
        };

        info!(%user_id, %date, "Checked out");
        self.remember(&record);
        Ok(record)
    }

    /// Gathers location, then photo, then reads the clock, and only then checks in.
    /// A device failure returns before anything is persisted. The clock is read
    /// once, so date, time, and status all describe the same instant.
    pub async fn check_in_with(
        &mut self,
        user_id: Uuid,
        location: &dyn LocationProvider,
        camera: Option<&dyn PhotoCapture>,
    ) -> AttendanceResult<AttendanceRecord> {
        let (coordinate, photo) = gather(location, camera).await?;
        let now = self.clock.now();
        self.check_in_at(user_id, now, coordinate, photo).await
    }

    pub async fn check_out_with(
        &mut self,
        user_id: Uuid,
        location: &dyn LocationProvider,
        camera: Option<&dyn PhotoCapture>,
    ) -> AttendanceResult<AttendanceRecord> {
        let (coordinate, photo) = gather(location, camera).await?;
        let now = self.clock.now();
        self.check_out_at(user_id, now, coordinate, photo).await
    }

    /// The record for the clock's current date, if any.
    pub async fn today(&mut self, user_id: Uuid) -> AttendanceResult<Option<AttendanceRecord>> {
        let date = self.clock.now().date;
        self.refresh(user_id, date).await
    }

    pub async fn state_of(
        &mut self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> AttendanceResult<AttendanceState> {
        Ok(self
            .refresh(user_id, date)
            .await?
            .map(|r| r.state())
            .unwrap_or(AttendanceState::NotCheckedIn))
    }

    /// Administrative delete. The only path that removes a record.
    pub async fn delete_record(&mut self, id: Uuid) -> AttendanceResult<()> {
        self.repo.delete(id).await.map_err(AttendanceError::Persistence)?;
        self.evict(id);
        info!(record_id = %id, "Attendance record deleted");
        Ok(())
    }

    /// Forgets a cached record without touching storage.
    pub fn evict(&mut self, record_id: Uuid) {
        self.records.retain(|_, r| r.id != record_id);
    }

    /// Number of records currently held in memory.
    pub fn cached_len(&self) -> usize {
        self.records.len()
    }

    /// Cache-first read, used where a later conditional write revalidates it.
    async fn load(
        &mut self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> AttendanceResult<Option<AttendanceRecord>> {
        if let Some(record) = self.records.get(&(user_id, date)) {
            return Ok(Some(record.clone()));
        }
        self.refresh(user_id, date).await
    }

    /// Re-reads the day from storage and brings the cache in line with it.
    async fn refresh(
        &mut self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> AttendanceResult<Option<AttendanceRecord>> {
        let found = self
            .repo
            .find_by_user_and_date(user_id, date)
            .await
            .map_err(AttendanceError::Persistence)?;
        match &found {
            Some(record) => self.remember(record),
            None => {
                self.records.remove(&(user_id, date));
            }
        }
        Ok(found)
    }

    /// Caches `record`, dropping any other day's entries.
    fn remember(&mut self, record: &AttendanceRecord) {
        self.records.retain(|&(_, date), _| date == record.date);
        self.records.insert((record.user_id, record.date), record.clone());
    }

    fn check_location(&self, location: Coordinate) -> AttendanceResult<()> {
        if !location.is_finite() {
            return Err(InvalidCoordinate {
                lat: location.lat,
                lng: location.lng,
            }
            .into());
        }
        let Some(fence) = self.config.geofence else {
            return Ok(());
        };
        let distance = fence.distance_from_office(location)?;
        if distance <= fence.radius_meters {
            return Ok(());
        }
        if self.config.enforce_geofence {
            return Err(AttendanceError::OutsideGeofence {
                distance_meters: distance,
                radius_meters: fence.radius_meters,
            });
        }
        debug!(
            distance,
            radius = fence.radius_meters,
            "Punch recorded outside the office radius"
        );
        Ok(())
    }
}

async fn gather(
    location: &dyn LocationProvider,
    camera: Option<&dyn PhotoCapture>,
) -> AttendanceResult<(Coordinate, Option<PhotoRef>)> {
    let coordinate = location.current_location().await?;
    let photo = match camera {
        Some(camera) => Some(camera.capture().await?),
        None => None,
    };
    Ok((coordinate, photo))
}
