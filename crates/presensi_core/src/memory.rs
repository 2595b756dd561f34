//! crates/presensi_core/src/memory.rs
//!
//! An in-process `AttendanceRepository`. It honours the same contract as the
//! database adapter (one record per user and day, conflicts on duplicates) and can
//! be told to fail upcoming calls, which is how the retry paths are exercised.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{AttendanceRecord, CheckOutPatch, NewAttendance, RecordFilter};
use crate::ports::{AttendanceRepository, PortError, PortResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Find,
    Insert,
    Update,
    Delete,
    List,
}

#[derive(Default)]
struct Inner {
    records: HashMap<Uuid, AttendanceRecord>,
    faults: HashMap<Operation, VecDeque<PortError>>,
}

impl Inner {
    fn take_fault(&mut self, op: Operation) -> PortResult<()> {
        match self.faults.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct InMemoryAttendanceRepository {
    inner: Mutex<Inner>,
}

impl InMemoryAttendanceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call to `op` return `error` instead of running.
    pub async fn fail_next(&self, op: Operation, error: PortError) {
        self.inner
            .lock()
            .await
            .faults
            .entry(op)
            .or_default()
            .push_back(error);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AttendanceRepository for InMemoryAttendanceRepository {
    async fn find_by_user_and_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Option<AttendanceRecord>> {
        let mut inner = self.inner.lock().await;
        inner.take_fault(Operation::Find)?;
        Ok(inner
            .records
            .values()
            .find(|r| r.user_id == user_id && r.date == date)
            .cloned())
    }

    async fn insert(&self, new: NewAttendance) -> PortResult<AttendanceRecord> {
        let mut inner = self.inner.lock().await;
        inner.take_fault(Operation::Insert)?;
        if inner
            .records
            .values()
            .any(|r| r.user_id == new.user_id && r.date == new.date)
        {
            return Err(PortError::Conflict(format!(
                "attendance for user {} on {} already exists",
                new.user_id, new.date
            )));
        }

        let now = Utc::now();
        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            date: new.date,
            check_in: Some(new.check_in),
            check_out: None,
            status: new.status,
            created_at: now,
            updated_at: now,
        };
        inner.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: Uuid, patch: CheckOutPatch) -> PortResult<AttendanceRecord> {
        let mut inner = self.inner.lock().await;
        inner.take_fault(Operation::Update)?;
        let record = inner
            .records
            .get_mut(&id)
            .ok_or_else(|| PortError::NotFound(format!("Attendance record {} not found", id)))?;
        if record.check_out.is_some() {
            return Err(PortError::Conflict(format!(
                "Attendance record {} already checked out",
                id
            )));
        }
        record.check_out = Some(patch.check_out);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete(&self, id: Uuid) -> PortResult<()> {
        let mut inner = self.inner.lock().await;
        inner.take_fault(Operation::Delete)?;
        inner
            .records
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("Attendance record {} not found", id)))
    }

    async fn list(&self, filter: &RecordFilter) -> PortResult<Vec<AttendanceRecord>> {
        let mut inner = self.inner.lock().await;
        inner.take_fault(Operation::List)?;
        let mut out: Vec<AttendanceRecord> = inner
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AttendanceStatus, Coordinate, Punch};
    use chrono::NaiveTime;

    fn new_attendance(user_id: Uuid, day: u32) -> NewAttendance {
        NewAttendance {
            user_id,
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            check_in: Punch {
                time: NaiveTime::from_hms_opt(8, 15, 0).unwrap(),
                location: Coordinate::new(-6.2, 106.8),
                photo: None,
            },
            status: AttendanceStatus::Present,
        }
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_conflict() {
        let repo = InMemoryAttendanceRepository::new();
        let user = Uuid::new_v4();
        repo.insert(new_attendance(user, 1)).await.unwrap();
        let err = repo.insert(new_attendance(user, 1)).await.unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_filtered() {
        let repo = InMemoryAttendanceRepository::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        for day in [3, 1, 2] {
            repo.insert(new_attendance(alice, day)).await.unwrap();
        }
        repo.insert(new_attendance(bob, 2)).await.unwrap();

        let all_alice = repo
            .list(&RecordFilter {
                user_id: Some(alice),
                ..Default::default()
            })
            .await
            .unwrap();
        let days: Vec<u32> = all_alice.iter().map(|r| chrono::Datelike::day(&r.date)).collect();
        assert_eq!(days, vec![3, 2, 1]);

        let second = repo
            .list(&RecordFilter {
                user_id: None,
                start: NaiveDate::from_ymd_opt(2024, 5, 2),
                end: NaiveDate::from_ymd_opt(2024, 5, 2),
            })
            .await
            .unwrap();
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn injected_fault_fires_once() {
        let repo = InMemoryAttendanceRepository::new();
        repo.fail_next(Operation::Delete, PortError::Unavailable("down".into()))
            .await;
        let id = Uuid::new_v4();
        assert!(matches!(repo.delete(id).await, Err(PortError::Unavailable(_))));
        assert!(matches!(repo.delete(id).await, Err(PortError::NotFound(_))));
    }
}
