//! Storage seams for the progression engine.
//!
//! The engine only needs to read the task snapshot and to read/write one
//! journey record atomically. [`Database`](super::Database) implements both
//! traits on SQLite; [`MemoryStore`] backs tests and embedders that persist
//! elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use uuid::Uuid;

use crate::error::StoreError;
use crate::journey::ProgressionState;
use crate::task::TaskRecord;

/// Everything persisted about the current journey.
///
/// `version` is the optimistic-concurrency token: every committed write
/// bumps it, and writers must present the version they read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyRecord {
    pub journey_id: Uuid,
    pub version: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub plan_generated_at: Option<DateTime<Utc>>,
    pub state: ProgressionState,
}

/// Persistence of the journey record.
pub trait ProgressionStore {
    /// Current journey, if one was ever committed.
    fn read_journey(&self) -> Result<Option<JourneyRecord>, StoreError>;

    /// Atomically replace the journey record.
    ///
    /// `expected_version` must match the stored version (`None` when no
    /// journey exists yet). Returns the newly committed version; the
    /// `version` field of `record` is ignored.
    fn write_journey(
        &self,
        record: &JourneyRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;

    /// Whether plan generation left the one-shot "freshly created" flag.
    fn creation_flag(&self) -> Result<bool, StoreError>;

    fn set_creation_flag(&self, raised: bool) -> Result<(), StoreError>;
}

/// Read access to the task snapshot.
pub trait TaskSource {
    fn task_records(&self) -> Result<Vec<TaskRecord>, StoreError>;
}

/// In-memory store with switchable failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    journey: RefCell<Option<JourneyRecord>>,
    tasks: RefCell<Vec<TaskRecord>>,
    creation_flag: Cell<bool>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<TaskRecord>) -> Self {
        let store = Self::new();
        store.replace_tasks(tasks);
        store
    }

    pub fn replace_tasks(&self, tasks: Vec<TaskRecord>) {
        *self.tasks.borrow_mut() = tasks;
    }

    /// Overwrite the journey without a version check, as another device would.
    pub fn put_journey(&self, record: JourneyRecord) {
        *self.journey.borrow_mut() = Some(record);
    }

    pub fn journey(&self) -> Option<JourneyRecord> {
        self.journey.borrow().clone()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.get() {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl ProgressionStore for MemoryStore {
    fn read_journey(&self) -> Result<Option<JourneyRecord>, StoreError> {
        self.check_read()?;
        Ok(self.journey())
    }

    fn write_journey(
        &self,
        record: &JourneyRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        self.check_write()?;
        let mut slot = self.journey.borrow_mut();
        let found = slot.as_ref().map(|r| r.version);
        if found != expected_version {
            return Err(StoreError::Conflict {
                expected: expected_version,
                found,
            });
        }
        let version = found.map_or(1, |v| v + 1);
        *slot = Some(JourneyRecord {
            version,
            ..record.clone()
        });
        Ok(version)
    }

    fn creation_flag(&self) -> Result<bool, StoreError> {
        self.check_read()?;
        Ok(self.creation_flag.get())
    }

    fn set_creation_flag(&self, raised: bool) -> Result<(), StoreError> {
        self.check_write()?;
        self.creation_flag.set(raised);
        Ok(())
    }
}

impl TaskSource for MemoryStore {
    fn task_records(&self) -> Result<Vec<TaskRecord>, StoreError> {
        self.check_read()?;
        Ok(self.tasks.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JourneyRecord {
        let now = Utc::now();
        JourneyRecord {
            journey_id: Uuid::new_v4(),
            version: 0,
            started_at: Some(now),
            plan_generated_at: Some(now),
            state: ProgressionState::fresh(now),
        }
    }

    #[test]
    fn versions_increase_per_write() {
        let store = MemoryStore::new();
        let v1 = store.write_journey(&record(), None).unwrap();
        let v2 = store.write_journey(&record(), Some(v1)).unwrap();
        assert_eq!((v1, v2), (1, 2));
        assert_eq!(store.read_journey().unwrap().unwrap().version, 2);
    }

    #[test]
    fn stale_version_conflicts() {
        let store = MemoryStore::new();
        store.write_journey(&record(), None).unwrap();
        let err = store.write_journey(&record(), None).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: None,
                found: Some(1)
            }
        ));
    }

    #[test]
    fn failed_write_leaves_record_untouched() {
        let store = MemoryStore::new();
        store.write_journey(&record(), None).unwrap();
        store.set_fail_writes(true);
        assert!(store.write_journey(&record(), Some(1)).is_err());
        store.set_fail_writes(false);
        assert_eq!(store.read_journey().unwrap().unwrap().version, 1);
    }
}
