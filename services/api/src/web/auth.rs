//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, logout, and the current profile.

use crate::web::middleware::{session_id_from, SESSION_COOKIE};
use crate::web::state::AppState;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{Duration, Utc};
use presensi_core::ports::PortError;
use presensi_core::Profile;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub name: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    /// `admin` or `employee`.
    pub role: String,
}

impl From<Profile> for AuthResponse {
    fn from(p: Profile) -> Self {
        Self {
            user_id: p.id,
            email: p.email,
            name: p.name,
            role: p.role.as_str().to_string(),
        }
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

fn session_cookie(session_id: &str, ttl: Duration) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        session_id,
        ttl.num_seconds()
    )
}

async fn start_session(
    state: &AppState,
    user_id: Uuid,
) -> Result<String, (StatusCode, String)> {
    let ttl = Duration::days(state.config.session_ttl_days);
    let auth_session_id = Uuid::new_v4().to_string();
    state
        .accounts
        .create_auth_session(&auth_session_id, user_id, Utc::now() + ttl)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session".to_string())
        })?;
    Ok(session_cookie(&auth_session_id, ttl))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new employee account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err((StatusCode::BAD_REQUEST, "A valid email is required".to_string()));
    }
    if req.password.len() < 6 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Password must be at least 6 characters".to_string(),
        ));
    }
    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("User")
        .to_string();

    // 1. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash password".to_string())
        })?
        .to_string();

    // 2. Create the profile. New accounts are always employees.
    let profile = state
        .accounts
        .create_profile(&email, &name, &password_hash)
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => {
                (StatusCode::CONFLICT, "Email already registered".to_string())
            }
            other => {
                error!("Failed to create user: {:?}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create user".to_string())
            }
        })?;

    // 3. Open an auth session and hand back the cookie
    let cookie = start_session(&state, profile.id).await?;
    info!(user_id = %profile.id, "New account registered");

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse::from(profile)),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let email = req.email.trim().to_lowercase();

    // 1. Get credentials by email
    let creds = state
        .accounts
        .get_credentials_by_email(&email)
        .await
        .map_err(|e| {
            error!("Failed to get user: {:?}", e);
            (StatusCode::UNAUTHORIZED, "Invalid email or password".to_string())
        })?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error".to_string())
    })?;

    let valid = Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_ok();

    if !valid {
        return Err((StatusCode::UNAUTHORIZED, "Invalid email or password".to_string()));
    }

    // 3. Open an auth session
    let cookie = start_session(&state, creds.profile.id).await?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse::from(creds.profile)),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let auth_session_id = session_id_from(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .accounts
        .delete_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout".to_string())
        })?;

    Ok((StatusCode::OK, [(header::SET_COOKIE, session_cookie("", Duration::zero()))]))
}

/// GET /me - The profile behind the current session
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current user", body = AuthResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn me_handler(Extension(profile): Extension<Profile>) -> Json<AuthResponse> {
    Json(AuthResponse::from(profile))
}

/// PATCH /me - Update the current user's own profile
#[utoipa::path(
    patch,
    path = "/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = AuthResponse),
        (status = 400, description = "Name is empty"),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_me_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<Profile>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Name must not be empty".to_string()));
    }

    let updated = state
        .accounts
        .update_profile(profile.id, name)
        .await
        .map_err(|e| {
            error!(user_id = %profile.id, "Failed to update profile: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to update profile".to_string())
        })?;

    info!(user_id = %profile.id, "Profile updated");
    Ok(Json(AuthResponse::from(updated)))
}

/// GET /profiles - Every account. Admins only.
#[utoipa::path(
    get,
    path = "/profiles",
    responses(
        (status = 200, description = "All profiles", body = [AuthResponse]),
        (status = 401, description = "Not logged in"),
        (status = 403, description = "Not an admin"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_profiles_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<Profile>,
) -> Result<Json<Vec<AuthResponse>>, (StatusCode, String)> {
    if !profile.is_admin() {
        return Err((StatusCode::FORBIDDEN, "Only admins can list profiles".to_string()));
    }

    let profiles = state.accounts.list_profiles().await.map_err(|e| {
        error!("Failed to list profiles: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load profiles".to_string())
    })?;

    Ok(Json(profiles.into_iter().map(AuthResponse::from).collect()))
}
