//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the attendance REST endpoints and the master
//! definition for the OpenAPI specification.

use crate::adapters::{SubmittedLocation, SubmittedPhoto};
use crate::error::attendance_failure;
use crate::web::auth::{self, AuthResponse, LoginRequest, SignupRequest, UpdateProfileRequest};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use presensi_core::ports::PhotoCapture;
use presensi_core::{AttendanceRecord, AttendanceState, Coordinate, Profile, Punch, RecordFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        auth::update_me_handler,
        auth::list_profiles_handler,
        check_in_handler,
        check_out_handler,
        today_handler,
        list_records_handler,
        delete_record_handler,
    ),
    components(
        schemas(
            SignupRequest,
            LoginRequest,
            UpdateProfileRequest,
            AuthResponse,
            LocationDto,
            PunchRequest,
            PunchDto,
            RecordResponse,
            TodayResponse,
        )
    ),
    tags(
        (name = "Presensi API", description = "Attendance check-in, check-out and reports.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, Deserialize, ToSchema, Clone, Copy, Debug)]
pub struct LocationDto {
    pub lat: f64,
    pub lng: f64,
}

impl From<LocationDto> for Coordinate {
    fn from(l: LocationDto) -> Self {
        Coordinate::new(l.lat, l.lng)
    }
}

impl From<Coordinate> for LocationDto {
    fn from(c: Coordinate) -> Self {
        Self { lat: c.lat, lng: c.lng }
    }
}

/// Body of a check-in or check-out. The browser reads both from the device.
#[derive(Deserialize, ToSchema, Default)]
pub struct PunchRequest {
    pub location: Option<LocationDto>,
    /// A data URL or storage key for the captured photo.
    pub photo: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PunchDto {
    pub time: NaiveTime,
    pub location: LocationDto,
    pub photo: Option<String>,
}

impl From<Punch> for PunchDto {
    fn from(p: Punch) -> Self {
        Self {
            time: p.time,
            location: p.location.into(),
            photo: p.photo.map(|p| p.0),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RecordResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    /// The owner's display name. Filled in on listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub date: NaiveDate,
    pub check_in: Option<PunchDto>,
    pub check_out: Option<PunchDto>,
    /// `present`, `late`, or `absent`.
    pub status: String,
    /// `not_checked_in`, `checked_in`, or `checked_out`.
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn state_name(state: AttendanceState) -> &'static str {
    match state {
        AttendanceState::NotCheckedIn => "not_checked_in",
        AttendanceState::CheckedIn => "checked_in",
        AttendanceState::CheckedOut => "checked_out",
    }
}

impl From<AttendanceRecord> for RecordResponse {
    fn from(r: AttendanceRecord) -> Self {
        let state = state_name(r.state()).to_string();
        Self {
            id: r.id,
            user_id: r.user_id,
            user_name: None,
            date: r.date,
            check_in: r.check_in.map(PunchDto::from),
            check_out: r.check_out.map(PunchDto::from),
            status: r.status.as_str().to_string(),
            state,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct TodayResponse {
    pub state: String,
    pub record: Option<RecordResponse>,
}

#[derive(Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// First day of the range (inclusive). Applied only together with `end`.
    pub start: Option<NaiveDate>,
    /// Last day of the range (inclusive). Applied only together with `start`.
    pub end: Option<NaiveDate>,
    /// Admins only: restrict to one user.
    pub user_id: Option<Uuid>,
}

//=========================================================================================
// Helpers
//=========================================================================================

enum PunchKind {
    In,
    Out,
}

async fn punch(
    state: &AppState,
    profile: &Profile,
    req: PunchRequest,
    kind: PunchKind,
) -> Result<AttendanceRecord, (StatusCode, String)> {
    // Every input is in hand before the machine is asked to persist anything.
    let location = SubmittedLocation::new(req.location.map(Coordinate::from));
    let photo = SubmittedPhoto::new(req.photo);
    let camera: Option<&dyn PhotoCapture> = if photo.is_present() || state.config.require_photo {
        Some(&photo)
    } else {
        None
    };

    let machine = state.machine_for(profile.id).await;
    let mut machine = machine.lock().await;
    let result = match kind {
        PunchKind::In => machine.check_in_with(profile.id, &location, camera).await,
        PunchKind::Out => machine.check_out_with(profile.id, &location, camera).await,
    };

    result.map_err(|e| {
        if e.is_retryable() {
            error!(user_id = %profile.id, "Attendance storage failure: {:?}", e);
        } else {
            info!(user_id = %profile.id, "Attendance request rejected: {}", e);
        }
        attendance_failure(&e)
    })
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Check in for today.
///
/// Status is fixed at this moment: after the configured cutoff hour the day is `late`.
#[utoipa::path(
    post,
    path = "/presensi/check-in",
    request_body = PunchRequest,
    responses(
        (status = 201, description = "Checked in", body = RecordResponse),
        (status = 400, description = "Missing or invalid location or photo"),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Outside the office geofence"),
        (status = 409, description = "Already checked in today"),
        (status = 503, description = "Storage unavailable, retry")
    )
)]
pub async fn check_in_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<Profile>,
    Json(req): Json<PunchRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let record = punch(&state, &profile, req, PunchKind::In).await?;
    Ok((StatusCode::CREATED, Json(RecordResponse::from(record))))
}

/// Check out for today.
#[utoipa::path(
    post,
    path = "/presensi/check-out",
    request_body = PunchRequest,
    responses(
        (status = 200, description = "Checked out", body = RecordResponse),
        (status = 400, description = "Not checked in, or missing location or photo"),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Outside the office geofence"),
        (status = 409, description = "Already checked out today"),
        (status = 503, description = "Storage unavailable, retry")
    )
)]
pub async fn check_out_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<Profile>,
    Json(req): Json<PunchRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let record = punch(&state, &profile, req, PunchKind::Out).await?;
    Ok((StatusCode::OK, Json(RecordResponse::from(record))))
}

/// Today's record for the logged-in user, if any.
#[utoipa::path(
    get,
    path = "/presensi/today",
    responses(
        (status = 200, description = "Today's state", body = TodayResponse),
        (status = 401, description = "Not logged in"),
        (status = 503, description = "Storage unavailable, retry")
    )
)]
pub async fn today_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<Profile>,
) -> Result<Json<TodayResponse>, (StatusCode, String)> {
    let machine = state.machine_for(profile.id).await;
    let record = machine.lock().await.today(profile.id).await.map_err(|e| {
        error!(user_id = %profile.id, "Failed to load today's record: {:?}", e);
        attendance_failure(&e)
    })?;

    let current = record
        .as_ref()
        .map(|r| r.state())
        .unwrap_or(AttendanceState::NotCheckedIn);
    Ok(Json(TodayResponse {
        state: state_name(current).to_string(),
        record: record.map(RecordResponse::from),
    }))
}

/// List attendance records, newest first.
///
/// Employees always see only their own records. Admins see everyone's unless
/// `user_id` is given.
#[utoipa::path(
    get,
    path = "/presensi",
    params(ListQuery),
    responses(
        (status = 200, description = "Matching records", body = [RecordResponse]),
        (status = 400, description = "start is after end"),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Listing another user's records"),
        (status = 503, description = "Storage unavailable, retry")
    )
)]
pub async fn list_records_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<Profile>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RecordResponse>>, (StatusCode, String)> {
    if let (Some(start), Some(end)) = (query.start, query.end) {
        if start > end {
            return Err((StatusCode::BAD_REQUEST, "start must not be after end".to_string()));
        }
    }

    let user_id = if profile.is_admin() {
        query.user_id
    } else {
        match query.user_id {
            Some(other) if other != profile.id => {
                return Err((
                    StatusCode::FORBIDDEN,
                    "Cannot view other users' records".to_string(),
                ))
            }
            _ => Some(profile.id),
        }
    };

    let filter = RecordFilter {
        user_id,
        start: query.start,
        end: query.end,
    };
    let records = state.attendance.list(&filter).await.map_err(|e| {
        error!("Failed to list attendance records: {:?}", e);
        (StatusCode::SERVICE_UNAVAILABLE, "Failed to load attendance records".to_string())
    })?;

    let names: HashMap<Uuid, String> = if profile.is_admin() {
        let profiles = state.accounts.list_profiles().await.map_err(|e| {
            error!("Failed to load profiles for listing: {:?}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Failed to load attendance records".to_string())
        })?;
        profiles.into_iter().map(|p| (p.id, p.name)).collect()
    } else {
        HashMap::from([(profile.id, profile.name.clone())])
    };

    let body = records
        .into_iter()
        .map(|record| {
            let user_name = names.get(&record.user_id).cloned();
            RecordResponse {
                user_name,
                ..RecordResponse::from(record)
            }
        })
        .collect();
    Ok(Json(body))
}

/// Delete an attendance record. Admins only.
#[utoipa::path(
    delete,
    path = "/presensi/{id}",
    params(
        ("id" = Uuid, Path, description = "The record to delete.")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "No such record"),
        (status = 503, description = "Storage unavailable, retry")
    )
)]
pub async fn delete_record_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<Profile>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if !profile.is_admin() {
        return Err((StatusCode::FORBIDDEN, "Only admins can delete records".to_string()));
    }

    {
        let machine = state.machine_for(profile.id).await;
        let mut machine = machine.lock().await;
        machine.delete_record(id).await.map_err(|e| {
            error!(record_id = %id, "Failed to delete attendance record: {:?}", e);
            attendance_failure(&e)
        })?;
    }
    state.evict_record(id).await;
    info!(record_id = %id, admin_id = %profile.id, "Record deleted by admin");

    Ok(StatusCode::NO_CONTENT)
}
