//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-user attendance sessions.

use crate::config::Config;
use presensi_core::ports::{AccountService, AttendanceRepository, Clock};
use presensi_core::AttendanceStateMachine;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// A user's machine is dropped after this long without a request.
pub const IDLE_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

struct UserSession {
    machine: Arc<Mutex<AttendanceStateMachine>>,
    last_used: Instant,
}

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub attendance: Arc<dyn AttendanceRepository>,
    pub accounts: Arc<dyn AccountService>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
    sessions: Mutex<HashMap<Uuid, UserSession>>,
}

impl AppState {
    pub fn new(
        attendance: Arc<dyn AttendanceRepository>,
        accounts: Arc<dyn AccountService>,
        clock: Arc<dyn Clock>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            attendance,
            accounts,
            clock,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The state machine for one user. Holding its lock serializes that user's
    /// check-in and check-out requests; other users are unaffected.
    pub async fn machine_for(&self, user_id: Uuid) -> Arc<Mutex<AttendanceStateMachine>> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(user_id).or_insert_with(|| UserSession {
            machine: Arc::new(Mutex::new(AttendanceStateMachine::new(
                self.attendance.clone(),
                self.clock.clone(),
                self.config.attendance_config(),
            ))),
            last_used: Instant::now(),
        });
        session.last_used = Instant::now();
        session.machine.clone()
    }

    /// Removes a deleted record from every user's cached day.
    pub async fn evict_record(&self, record_id: Uuid) {
        let machines: Vec<_> = {
            let sessions = self.sessions.lock().await;
            sessions.values().map(|s| s.machine.clone()).collect()
        };
        for machine in machines {
            machine.lock().await.evict(record_id);
        }
    }

    /// Drops machines unused for at least `idle` that no request is holding.
    /// Returns how many were dropped.
    pub async fn prune_idle(&self, idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_used.elapsed() < idle || Arc::strong_count(&s.machine) > 1);
        let pruned = before - sessions.len();
        if pruned > 0 {
            debug!(pruned, remaining = sessions.len(), "Pruned idle attendance sessions");
        }
        pruned
    }

    /// Number of users with a live state machine.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
