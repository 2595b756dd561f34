// HTTP-level tests: the real router over the in-memory attendance repository,
// a fixed clock, and a scripted account service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use presensi_api::config::Config;
use presensi_api::web::rest::{RecordResponse, TodayResponse};
use presensi_api::web::{self, state::AppState};
use presensi_core::memory::Operation;
use presensi_core::{
    AccountService, Clock, InMemoryAttendanceRepository, LocalNow, PortError, PortResult, Profile,
    ProfileCredentials, Role,
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct FixedClock(LocalNow);

impl Clock for FixedClock {
    fn now(&self) -> LocalNow {
        self.0
    }
}

/// Session token -> profile. Nothing else is needed by the protected routes.
struct StaticAccounts(Mutex<HashMap<String, Profile>>);

#[async_trait]
impl AccountService for StaticAccounts {
    async fn create_profile(&self, _: &str, _: &str, _: &str) -> PortResult<Profile> {
        Err(PortError::Unexpected("not used".into()))
    }
    async fn get_credentials_by_email(&self, _: &str) -> PortResult<ProfileCredentials> {
        Err(PortError::NotFound("not used".into()))
    }
    async fn update_profile(&self, user_id: Uuid, name: &str) -> PortResult<Profile> {
        let mut profiles = self.0.lock().unwrap();
        let profile = profiles
            .values_mut()
            .find(|p| p.id == user_id)
            .ok_or_else(|| PortError::NotFound(user_id.to_string()))?;
        profile.name = name.to_string();
        Ok(profile.clone())
    }
    async fn list_profiles(&self) -> PortResult<Vec<Profile>> {
        let mut all: Vec<Profile> = self.0.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
    async fn create_auth_session(&self, _: &str, _: Uuid, _: DateTime<Utc>) -> PortResult<()> {
        Ok(())
    }
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Profile> {
        self.0.lock().unwrap().get(session_id).cloned().ok_or(PortError::Unauthorized)
    }
    async fn delete_auth_session(&self, _: &str) -> PortResult<()> {
        Ok(())
    }
}

struct Harness {
    app: Router,
    state: Arc<AppState>,
    repo: Arc<InMemoryAttendanceRepository>,
    employee: Profile,
    admin: Profile,
}

fn profile(name: &str, role: Role) -> Profile {
    Profile {
        id: Uuid::new_v4(),
        email: format!("{name}@example.com"),
        name: name.to_string(),
        role,
    }
}

fn harness_with(env: &[(&str, &str)], hour: u32) -> Harness {
    let mut vars: HashMap<String, String> =
        env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    vars.insert("DATABASE_URL".into(), "postgres://unused".into());
    let config = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();

    let employee = profile("budi", Role::Employee);
    let admin = profile("siti", Role::Admin);
    let accounts = StaticAccounts(Mutex::new(HashMap::from([
        ("emp".to_string(), employee.clone()),
        ("adm".to_string(), admin.clone()),
    ])));

    let repo = Arc::new(InMemoryAttendanceRepository::new());
    let clock = FixedClock(LocalNow {
        date: NaiveDate::from_ymd_opt(2024, 7, 15).unwrap(),
        time: NaiveTime::from_hms_opt(hour, 5, 0).unwrap(),
    });
    let state = Arc::new(AppState::new(
        repo.clone(),
        Arc::new(accounts),
        Arc::new(clock),
        Arc::new(config),
    ));

    Harness {
        app: web::router(state.clone()),
        state,
        repo,
        employee,
        admin,
    }
}

fn harness() -> Harness {
    harness_with(&[], 8)
}

fn post(uri: &str, session: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("cookie", format!("session={session}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn patch(uri: &str, session: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header("content-type", "application/json")
        .header("cookie", format!("session={session}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, session: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("cookie", format!("session={session}"))
        .body(Body::empty())
        .unwrap()
}

fn office_punch() -> serde_json::Value {
    json!({
        "location": { "lat": -6.2005, "lng": 106.8167 },
        "photo": "data:image/jpeg;base64,AAAA"
    })
}

async fn json_body<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn protected_routes_need_a_session() {
    let h = harness();
    let resp = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/presensi/today").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = h.app.oneshot(get("/presensi/today", "bogus")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_returns_the_session_profile() {
    let h = harness();
    let resp = h.app.oneshot(get("/me", "adm")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = json_body(resp).await;
    assert_eq!(body["role"], "admin");
    assert_eq!(body["user_id"], h.admin.id.to_string());
}

// ---------------------------------------------------------------------------
// Check-in / check-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn check_in_then_out() {
    let h = harness();

    let resp = h
        .app
        .clone()
        .oneshot(post("/presensi/check-in", "emp", office_punch()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let rec: RecordResponse = json_body(resp).await;
    assert_eq!(rec.status, "present");
    assert_eq!(rec.state, "checked_in");
    assert_eq!(rec.user_id, h.employee.id);
    assert_eq!(
        rec.check_in.as_ref().unwrap().photo.as_deref(),
        Some("data:image/jpeg;base64,AAAA")
    );

    let resp = h
        .app
        .clone()
        .oneshot(post("/presensi/check-in", "emp", office_punch()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = h
        .app
        .clone()
        .oneshot(post("/presensi/check-out", "emp", office_punch()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let out: RecordResponse = json_body(resp).await;
    assert_eq!(out.id, rec.id);
    assert_eq!(out.state, "checked_out");

    let resp = h
        .app
        .clone()
        .oneshot(post("/presensi/check-out", "emp", office_punch()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = h.app.oneshot(get("/presensi/today", "emp")).await.unwrap();
    let today: TodayResponse = json_body(resp).await;
    assert_eq!(today.state, "checked_out");
    assert_eq!(today.record.unwrap().id, rec.id);
}

#[tokio::test]
async fn late_check_in_is_marked_late() {
    let h = harness_with(&[], 10);
    let resp = h.app.oneshot(post("/presensi/check-in", "emp", office_punch())).await.unwrap();
    let rec: RecordResponse = json_body(resp).await;
    assert_eq!(rec.status, "late");
}

#[tokio::test]
async fn check_out_without_check_in_is_a_bad_request() {
    let h = harness();
    let resp = h.app.oneshot(post("/presensi/check-out", "emp", office_punch())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(h.repo.is_empty().await);
}

#[tokio::test]
async fn missing_location_is_rejected_without_writing() {
    let h = harness();
    let resp = h
        .app
        .oneshot(post("/presensi/check-in", "emp", json!({ "photo": "x" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(h.repo.is_empty().await);
}

#[tokio::test]
async fn required_photo_is_enforced() {
    let h = harness_with(&[("REQUIRE_PHOTO", "true")], 8);
    let resp = h
        .app
        .oneshot(post(
            "/presensi/check-in",
            "emp",
            json!({ "location": { "lat": -6.2, "lng": 106.8 } }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(h.repo.is_empty().await);
}

#[tokio::test]
async fn enforced_geofence_returns_forbidden() {
    let h = harness_with(
        &[
            ("OFFICE_LAT", "-6.2"),
            ("OFFICE_LNG", "106.816666"),
            ("ENFORCE_GEOFENCE", "true"),
        ],
        8,
    );
    let far = json!({ "location": { "lat": -6.3, "lng": 106.816666 } });
    let resp = h.app.clone().oneshot(post("/presensi/check-in", "emp", far)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = h.app.oneshot(post("/presensi/check-in", "emp", office_punch())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn storage_outage_is_retryable() {
    let h = harness();
    h.repo
        .fail_next(Operation::Insert, PortError::Unavailable("connection reset".into()))
        .await;

    let resp = h
        .app
        .clone()
        .oneshot(post("/presensi/check-in", "emp", office_punch()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let resp = h.app.oneshot(post("/presensi/check-in", "emp", office_punch())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(h.repo.len().await, 1);
}

// ---------------------------------------------------------------------------
// Listing and admin delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn employees_only_list_their_own_records() {
    let h = harness();
    for session in ["emp", "adm"] {
        let resp = h
            .app
            .clone()
            .oneshot(post("/presensi/check-in", session, office_punch()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let resp = h.app.clone().oneshot(get("/presensi", "emp")).await.unwrap();
    let mine: Vec<RecordResponse> = json_body(resp).await;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].user_id, h.employee.id);

    let uri = format!("/presensi?user_id={}", h.admin.id);
    let resp = h.app.clone().oneshot(get(&uri, "emp")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = h.app.clone().oneshot(get("/presensi", "adm")).await.unwrap();
    let all: Vec<RecordResponse> = json_body(resp).await;
    assert_eq!(all.len(), 2);

    let resp = h
        .app
        .clone()
        .oneshot(get("/presensi?start=2024-07-16&end=2024-07-31", "adm"))
        .await
        .unwrap();
    let none: Vec<RecordResponse> = json_body(resp).await;
    assert!(none.is_empty());

    let resp = h
        .app
        .oneshot(get("/presensi?start=2024-07-31&end=2024-07-01", "adm"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_admins_delete_and_the_day_resets() {
    let h = harness();
    let resp = h
        .app
        .clone()
        .oneshot(post("/presensi/check-in", "emp", office_punch()))
        .await
        .unwrap();
    let rec: RecordResponse = json_body(resp).await;
    let uri = format!("/presensi/{}", rec.id);

    let delete = |session: &str| {
        Request::builder()
            .method("DELETE")
            .uri(&uri)
            .header("cookie", format!("session={session}"))
            .body(Body::empty())
            .unwrap()
    };

    let resp = h.app.clone().oneshot(delete("emp")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = h.app.clone().oneshot(delete("adm")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(h.repo.is_empty().await);

    let resp = h.app.clone().oneshot(delete("adm")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // The employee's cached day was evicted, so they can check in again.
    let resp = h.app.clone().oneshot(get("/presensi/today", "emp")).await.unwrap();
    let today: TodayResponse = json_body(resp).await;
    assert_eq!(today.state, "not_checked_in");

    let resp = h.app.oneshot(post("/presensi/check-in", "emp", office_punch())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn admin_listing_names_each_employee() {
    let h = harness();
    for session in ["emp", "adm"] {
        let resp = h
            .app
            .clone()
            .oneshot(post("/presensi/check-in", session, office_punch()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let resp = h.app.clone().oneshot(get("/presensi", "adm")).await.unwrap();
    let all: Vec<RecordResponse> = json_body(resp).await;
    let names: HashMap<Uuid, Option<String>> =
        all.into_iter().map(|r| (r.user_id, r.user_name)).collect();
    assert_eq!(names[&h.employee.id].as_deref(), Some("budi"));
    assert_eq!(names[&h.admin.id].as_deref(), Some("siti"));

    let resp = h.app.oneshot(get("/presensi", "emp")).await.unwrap();
    let mine: Vec<RecordResponse> = json_body(resp).await;
    assert_eq!(mine[0].user_name.as_deref(), Some("budi"));
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn users_rename_their_own_profile() {
    let h = harness();
    let resp = h
        .app
        .clone()
        .oneshot(patch("/me", "emp", json!({ "name": "  Budi Santoso " })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = json_body(resp).await;
    assert_eq!(body["name"], "Budi Santoso");

    let resp = h.app.clone().oneshot(get("/me", "emp")).await.unwrap();
    let body: serde_json::Value = json_body(resp).await;
    assert_eq!(body["name"], "Budi Santoso");
    assert_eq!(body["user_id"], h.employee.id.to_string());

    let resp = h.app.oneshot(patch("/me", "emp", json!({ "name": "   " }))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_admins_list_profiles() {
    let h = harness();
    let resp = h.app.clone().oneshot(get("/profiles", "emp")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = h.app.oneshot(get("/profiles", "adm")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Vec<serde_json::Value> = json_body(resp).await;
    let names: Vec<&str> = body.iter().map(|p| p["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["budi", "siti"]);
}

// ---------------------------------------------------------------------------
// Per-user sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn idle_sessions_are_pruned_but_busy_ones_kept() {
    let h = harness();
    let resp = h
        .app
        .clone()
        .oneshot(post("/presensi/check-in", "emp", office_punch()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(h.state.session_count().await, 1);

    assert_eq!(h.state.prune_idle(Duration::from_secs(3600)).await, 0);

    // A machine some request still holds survives even a zero idle limit.
    let held = h.state.machine_for(h.admin.id).await;
    assert_eq!(h.state.prune_idle(Duration::ZERO).await, 1);
    assert_eq!(h.state.session_count().await, 1);
    drop(held);
    assert_eq!(h.state.prune_idle(Duration::ZERO).await, 1);
    assert_eq!(h.state.session_count().await, 0);

    // The day is reloaded from storage on the next request.
    let resp = h.app.oneshot(get("/presensi/today", "emp")).await.unwrap();
    let today: TodayResponse = json_body(resp).await;
    assert_eq!(today.state, "checked_in");
}

#[tokio::test]
async fn record_eviction_does_not_block_other_users() {
    let h = harness();
    let busy = h.state.machine_for(h.employee.id).await;
    let guard = busy.lock().await;

    let state = h.state.clone();
    let eviction = tokio::spawn(async move { state.evict_record(Uuid::new_v4()).await });
    // Let the eviction run until it waits on the busy user's machine.
    tokio::task::yield_now().await;

    let other = h.state.machine_for(h.admin.id);
    assert!(tokio::time::timeout(Duration::from_secs(1), other).await.is_ok());

    drop(guard);
    eviction.await.unwrap();
}
