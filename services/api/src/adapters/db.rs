//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `AttendanceRepository` and `AccountService` ports from the `core` crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use presensi_core::domain::{
    AttendanceRecord, AttendanceStatus, CheckOutPatch, Coordinate, NewAttendance, PhotoRef,
    Profile, ProfileCredentials, Punch, RecordFilter, Role,
};
use presensi_core::ports::{AccountService, AttendanceRepository, PortError, PortResult};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

const PRESENSI_COLUMNS: &str = "id, user_id, date, \
    check_in_time, check_in_location, check_in_photo, \
    check_out_time, check_out_location, check_out_photo, \
    status, created_at, updated_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the storage ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Translates driver errors into port errors. Connection-level faults become
/// `Unavailable` so callers know a retry may succeed.
fn port_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound("row not found".to_string()),
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            PortError::Conflict(db.message().to_string())
        }
        transient @ (sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed) => PortError::Unavailable(transient.to_string()),
        other => PortError::Unexpected(other.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct PresensiRow {
    id: Uuid,
    user_id: Uuid,
    date: NaiveDate,
    check_in_time: Option<NaiveTime>,
    check_in_location: Option<Json<Coordinate>>,
    check_in_photo: Option<String>,
    check_out_time: Option<NaiveTime>,
    check_out_location: Option<Json<Coordinate>>,
    check_out_photo: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn punch(
    time: Option<NaiveTime>,
    location: Option<Json<Coordinate>>,
    photo: Option<String>,
) -> Option<Punch> {
    match (time, location) {
        (Some(time), Some(Json(location))) => Some(Punch {
            time,
            location,
            photo: photo.map(PhotoRef),
        }),
        _ => None,
    }
}

impl PresensiRow {
    fn to_domain(self) -> PortResult<AttendanceRecord> {
        let status = AttendanceStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown attendance status '{}'", self.status))
        })?;
        Ok(AttendanceRecord {
            id: self.id,
            user_id: self.user_id,
            date: self.date,
            check_in: punch(self.check_in_time, self.check_in_location, self.check_in_photo),
            check_out: punch(self.check_out_time, self.check_out_location, self.check_out_photo),
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ProfileRow {
    id: Uuid,
    email: String,
    name: String,
    role: String,
}
impl ProfileRow {
    fn to_domain(self) -> PortResult<Profile> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| PortError::Unexpected(format!("Unknown role '{}'", self.role)))?;
        Ok(Profile {
            id: self.id,
            email: self.email,
            name: self.name,
            role,
        })
    }
}

#[derive(FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    profile: ProfileRow,
    hashed_password: String,
}

//=========================================================================================
// `AttendanceRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl AttendanceRepository for DbAdapter {
    async fn find_by_user_and_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Option<AttendanceRecord>> {
        let sql =
            format!("SELECT {PRESENSI_COLUMNS} FROM presensi WHERE user_id = $1 AND date = $2");
        let row = sqlx::query_as::<_, PresensiRow>(&sql)
            .bind(user_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?;
        row.map(PresensiRow::to_domain).transpose()
    }

    async fn insert(&self, new: NewAttendance) -> PortResult<AttendanceRecord> {
        let sql = format!(
            "INSERT INTO presensi \
             (user_id, date, check_in_time, check_in_location, check_in_photo, status) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {PRESENSI_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PresensiRow>(&sql)
            .bind(new.user_id)
            .bind(new.date)
            .bind(new.check_in.time)
            .bind(Json(new.check_in.location))
            .bind(new.check_in.photo.map(|p| p.0))
            .bind(new.status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(port_error)?;
        row.to_domain()
    }

    async fn update(&self, id: Uuid, patch: CheckOutPatch) -> PortResult<AttendanceRecord> {
        // Only an open record may be closed; a second checkout finds no row.
        let sql = format!(
            "UPDATE presensi \
             SET check_out_time = $2, check_out_location = $3, check_out_photo = $4 \
             WHERE id = $1 AND check_out_time IS NULL RETURNING {PRESENSI_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PresensiRow>(&sql)
            .bind(id)
            .bind(patch.check_out.time)
            .bind(Json(patch.check_out.location))
            .bind(patch.check_out.photo.map(|p| p.0))
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?;

        match row {
            Some(row) => row.to_domain(),
            None => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM presensi WHERE id = $1)")
                        .bind(id)
                        .fetch_one(&self.pool)
                        .await
                        .map_err(port_error)?;
                if exists {
                    Err(PortError::Conflict(format!(
                        "Attendance record {} already checked out",
                        id
                    )))
                } else {
                    Err(PortError::NotFound(format!("Attendance record {} not found", id)))
                }
            }
        }
    }

    async fn delete(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM presensi WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(port_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Attendance record {} not found", id)));
        }
        Ok(())
    }

    async fn list(&self, filter: &RecordFilter) -> PortResult<Vec<AttendanceRecord>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {PRESENSI_COLUMNS} FROM presensi WHERE TRUE"));
        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some((start, end)) = filter.date_range() {
            query.push(" AND date >= ").push_bind(start);
            query.push(" AND date <= ").push_bind(end);
        }
        query.push(" ORDER BY date DESC, created_at DESC");

        let rows = query
            .build_query_as::<PresensiRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(port_error)?;
        rows.into_iter().map(PresensiRow::to_domain).collect()
    }
}

//=========================================================================================
// `AccountService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountService for DbAdapter {
    async fn create_profile(
        &self,
        email: &str,
        name: &str,
        hashed_password: &str,
    ) -> PortResult<Profile> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "INSERT INTO profiles (email, name, role, hashed_password) VALUES ($1, $2, $3, $4) \
             RETURNING id, email, name, role",
        )
        .bind(email)
        .bind(name)
        .bind(Role::Employee.as_str())
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(port_error)?;
        row.to_domain()
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<ProfileCredentials> {
        let row = sqlx::query_as::<_, CredentialsRow>(
            "SELECT id, email, name, role, hashed_password FROM profiles WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            other => port_error(other),
        })?;
        Ok(ProfileCredentials {
            profile: row.profile.to_domain()?,
            hashed_password: row.hashed_password,
        })
    }

    async fn update_profile(&self, user_id: Uuid, name: &str) -> PortResult<Profile> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "UPDATE profiles SET name = $2 WHERE id = $1 RETURNING id, email, name, role",
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;
        row.ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?
            .to_domain()
    }

    async fn list_profiles(&self) -> PortResult<Vec<Profile>> {
        let rows = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, email, name, role FROM profiles ORDER BY name, email",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(port_error)?;
        rows.into_iter().map(ProfileRow::to_domain).collect()
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Profile> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT p.id, p.email, p.name, p.role FROM auth_sessions s \
             JOIN profiles p ON p.id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(port_error)?;
        row.ok_or(PortError::Unauthorized)?.to_domain()
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(())
    }
}
