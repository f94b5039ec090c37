//! SQLite-based journey storage.
//!
//! Provides persistent storage for:
//! - The single current journey record (versioned)
//! - The task snapshot the progression is derived from
//! - Key-value store for session state (creation flag, interaction count)

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

use super::data_dir;
use super::store::{JourneyRecord, ProgressionStore, TaskSource};
use crate::error::{DatabaseError, StoreError};
use crate::journey::ProgressionState;
use crate::task::TaskRecord;

const CREATION_FLAG_KEY: &str = "journey.creation_flag";
const INTERACTIONS_KEY: &str = "session.interactions";

/// SQLite database for journey storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/trailhead/trailhead.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let dir = data_dir().map_err(DatabaseError::DataDir)?;
        Self::open_at(&dir.join("trailhead.db"))
    }

    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS journey (
                    slot              INTEGER PRIMARY KEY CHECK (slot = 1),
                    journey_id        TEXT NOT NULL,
                    version           INTEGER NOT NULL,
                    started_at        TEXT,
                    plan_generated_at TEXT,
                    current_day       INTEGER NOT NULL,
                    streak            INTEGER NOT NULL,
                    xp                INTEGER NOT NULL,
                    last_updated      TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id       TEXT PRIMARY KEY,
                    position INTEGER NOT NULL,
                    payload  TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_tasks_position ON tasks(position);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    /// Replace the whole task snapshot. Later duplicates of an id win.
    ///
    /// # Errors
    /// Returns an error if a record cannot be serialized or the write fails.
    pub fn replace_tasks(&self, tasks: &[TaskRecord]) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM tasks", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO tasks (id, position, payload) VALUES (?1, ?2, ?3)",
            )?;
            for (position, task) in tasks.iter().enumerate() {
                let payload = serde_json::to_string(task)
                    .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
                stmt.execute(params![task.id, position as i64, payload])?;
            }
        }
        tx.commit()?;
        debug!(count = tasks.len(), "replaced task snapshot");
        Ok(())
    }

    /// Bump and return the interaction counter for the current data dir.
    ///
    /// # Errors
    /// Returns an error if the kv store cannot be read or written.
    pub fn record_interaction(&self) -> Result<u32, DatabaseError> {
        let count = self
            .kv_get(INTERACTIONS_KEY)?
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0)
            .saturating_add(1);
        self.kv_set(INTERACTIONS_KEY, &count.to_string())?;
        Ok(count)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn stored_version(conn: &Connection) -> Result<Option<u64>, rusqlite::Error> {
        conn.query_row("SELECT version FROM journey WHERE slot = 1", [], |row| {
            row.get::<_, i64>(0)
        })
        .optional()
        .map(|v| v.map(|v| v as u64))
    }
}

fn parse_time(field: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{field}: {e}")))
}

fn parse_optional_time(field: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.map(|v| parse_time(field, &v)).transpose()
}

struct JourneyRow {
    journey_id: String,
    version: i64,
    started_at: Option<String>,
    plan_generated_at: Option<String>,
    current_day: i64,
    streak: i64,
    xp: i64,
    last_updated: String,
}

impl JourneyRow {
    fn into_record(self) -> Result<JourneyRecord, StoreError> {
        let journey_id = Uuid::parse_str(&self.journey_id)
            .map_err(|e| StoreError::Corrupt(format!("journey_id: {e}")))?;
        let counter = |field: &str, value: i64| {
            u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field}: {value}")))
        };
        Ok(JourneyRecord {
            journey_id,
            version: self.version as u64,
            started_at: parse_optional_time("started_at", self.started_at)?,
            plan_generated_at: parse_optional_time("plan_generated_at", self.plan_generated_at)?,
            state: ProgressionState {
                current_day: counter("current_day", self.current_day)?,
                streak: counter("streak", self.streak)?,
                xp: counter("xp", self.xp)?,
                last_updated: parse_time("last_updated", &self.last_updated)?,
            },
        })
    }
}

impl ProgressionStore for Database {
    fn read_journey(&self) -> Result<Option<JourneyRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT journey_id, version, started_at, plan_generated_at,
                        current_day, streak, xp, last_updated
                 FROM journey WHERE slot = 1",
                [],
                |row| {
                    Ok(JourneyRow {
                        journey_id: row.get(0)?,
                        version: row.get(1)?,
                        started_at: row.get(2)?,
                        plan_generated_at: row.get(3)?,
                        current_day: row.get(4)?,
                        streak: row.get(5)?,
                        xp: row.get(6)?,
                        last_updated: row.get(7)?,
                    })
                },
            )
            .optional()?;
        row.map(JourneyRow::into_record).transpose()
    }

    fn write_journey(
        &self,
        record: &JourneyRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let found = Self::stored_version(&tx)?;
        if found != expected_version {
            return Err(StoreError::Conflict {
                expected: expected_version,
                found,
            });
        }
        let version = found.map_or(1, |v| v + 1);
        let state = &record.state;
        tx.execute(
            "INSERT OR REPLACE INTO journey
                (slot, journey_id, version, started_at, plan_generated_at,
                 current_day, streak, xp, last_updated)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.journey_id.to_string(),
                version as i64,
                record.started_at.map(|t| t.to_rfc3339()),
                record.plan_generated_at.map(|t| t.to_rfc3339()),
                state.current_day,
                state.streak,
                state.xp,
                state.last_updated.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        debug!(version, day = state.current_day, "committed journey record");
        Ok(version)
    }

    fn creation_flag(&self) -> Result<bool, StoreError> {
        Ok(self.kv_get(CREATION_FLAG_KEY)?.as_deref() == Some("1"))
    }

    fn set_creation_flag(&self, raised: bool) -> Result<(), StoreError> {
        if raised {
            self.kv_set(CREATION_FLAG_KEY, "1")?;
        } else {
            self.conn
                .execute("DELETE FROM kv WHERE key = ?1", params![CREATION_FLAG_KEY])?;
        }
        Ok(())
    }
}

impl TaskSource for Database {
    fn task_records(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM tasks ORDER BY position")?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(|e| StoreError::Corrupt(e.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{CompletionState, RawDay};

    fn record(day: u32) -> JourneyRecord {
        let now = Utc::now();
        JourneyRecord {
            journey_id: Uuid::new_v4(),
            version: 0,
            started_at: Some(now),
            plan_generated_at: None,
            state: ProgressionState {
                current_day: day,
                streak: day - 1,
                xp: (day - 1) * 10,
                last_updated: now,
            },
        }
    }

    #[test]
    fn journey_round_trips_through_sqlite() {
        let db = Database::open_memory().unwrap();
        assert!(db.read_journey().unwrap().is_none());

        let rec = record(4);
        assert_eq!(db.write_journey(&rec, None).unwrap(), 1);
        let stored = db.read_journey().unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.journey_id, rec.journey_id);
        assert_eq!(stored.state.current_day, 4);
        assert_eq!(stored.plan_generated_at, None);
        // RFC 3339 keeps sub-second precision
        assert_eq!(stored.state.last_updated, rec.state.last_updated);
    }

    #[test]
    fn stale_writer_gets_conflict() {
        let db = Database::open_memory().unwrap();
        db.write_journey(&record(1), None).unwrap();
        db.write_journey(&record(2), Some(1)).unwrap();
        let err = db.write_journey(&record(3), Some(1)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: Some(1),
                found: Some(2)
            }
        ));
        assert_eq!(db.read_journey().unwrap().unwrap().state.current_day, 2);
    }

    #[test]
    fn tasks_keep_their_order() {
        let db = Database::open_memory().unwrap();
        let tasks = vec![
            TaskRecord::new("b", "Second").with_day(RawDay::from("Tue")),
            TaskRecord::new("a", "First")
                .with_day(RawDay::from(1_i64))
                .with_state(CompletionState::Completed),
        ];
        db.replace_tasks(&tasks).unwrap();
        assert_eq!(db.task_records().unwrap(), tasks);

        db.replace_tasks(&tasks[..1]).unwrap();
        assert_eq!(db.task_records().unwrap().len(), 1);
    }

    #[test]
    fn creation_flag_toggles() {
        let db = Database::open_memory().unwrap();
        assert!(!db.creation_flag().unwrap());
        db.set_creation_flag(true).unwrap();
        assert!(db.creation_flag().unwrap());
        db.set_creation_flag(false).unwrap();
        assert!(!db.creation_flag().unwrap());
    }

    #[test]
    fn interactions_accumulate() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.record_interaction().unwrap(), 1);
        assert_eq!(db.record_interaction().unwrap(), 2);
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
    }

    #[test]
    fn corrupt_row_is_reported() {
        let db = Database::open_memory().unwrap();
        db.write_journey(&record(2), None).unwrap();
        db.conn()
            .execute("UPDATE journey SET journey_id = 'nope'", [])
            .unwrap();
        assert!(matches!(db.read_journey(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.write_journey(&record(6), None).unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.read_journey().unwrap().unwrap().state.current_day, 6);
    }
}
