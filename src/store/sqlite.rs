//! Durable run store on SQLite.
//!
//! Records are stored as JSON documents in a single `runs` table, with
//! the status denormalized for cheap dashboard queries. `apply` performs
//! the read-modify-write inside one transaction, so a concurrent reader
//! never observes a half-merged record and progress survives process
//! restarts.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::pipeline::types::{RunPatch, RunRecord};

use super::{RunStore, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id         TEXT PRIMARY KEY,
    status     TEXT NOT NULL,
    record     TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status);
";

pub struct SqliteRunStore {
    conn: Mutex<Connection>,
}

impl SqliteRunStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Ephemeral store for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("sqlite connection lock poisoned".into()))
    }
}

impl RunStore for SqliteRunStore {
    fn create(&self, record: RunRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let json = serde_json::to_string(&record)?;
        let result = conn.execute(
            "INSERT INTO runs (id, status, record, updated_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                record.id.to_string(),
                record.status.as_str(),
                json,
                record.updated_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict(record.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: &Uuid) -> Result<RunRecord, StoreError> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT record FROM runs WHERE id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let json = json.ok_or(StoreError::NotFound(*id))?;
        Ok(serde_json::from_str(&json)?)
    }

    fn apply(&self, id: &Uuid, patch: RunPatch) -> Result<RunRecord, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let json: Option<String> = tx
            .query_row(
                "SELECT record FROM runs WHERE id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let json = json.ok_or(StoreError::NotFound(*id))?;

        let mut record: RunRecord = serde_json::from_str(&json)?;
        record.apply(patch, Utc::now());

        tx.execute(
            "UPDATE runs SET status = ?2, record = ?3, updated_at = ?4 WHERE id = ?1",
            rusqlite::params![
                id.to_string(),
                record.status.as_str(),
                serde_json::to_string(&record)?,
                record.updated_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{RunInput, RunStatus, StageName, StageStatus};

    fn seed(store: &SqliteRunStore) -> Uuid {
        let id = Uuid::new_v4();
        let record = RunRecord::new(
            id,
            RunInput {
                doc_uri: "https://example.org/a.pdf".into(),
                metadata: serde_json::Map::new(),
            },
            Utc::now(),
        );
        store.create(record).unwrap();
        id
    }

    #[test]
    fn create_then_get_roundtrips() {
        let store = SqliteRunStore::in_memory().unwrap();
        let id = seed(&store);
        let record = store.get(&id).unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.status, RunStatus::Pending);
        assert_eq!(record.stages.len(), 4);
    }

    #[test]
    fn duplicate_id_conflicts() {
        let store = SqliteRunStore::in_memory().unwrap();
        let id = seed(&store);
        let dup = RunRecord::new(
            id,
            RunInput {
                doc_uri: "other".into(),
                metadata: serde_json::Map::new(),
            },
            Utc::now(),
        );
        assert!(matches!(store.create(dup), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = SqliteRunStore::in_memory().unwrap();
        let missing = Uuid::new_v4();
        assert!(matches!(
            store.get(&missing),
            Err(StoreError::NotFound(id)) if id == missing
        ));
        assert!(matches!(
            store.apply(&missing, RunPatch::new().log("x")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn apply_persists_merged_state() {
        let store = SqliteRunStore::in_memory().unwrap();
        let id = seed(&store);

        store
            .apply(
                &id,
                RunPatch::new()
                    .run_status(RunStatus::Running)
                    .stage(StageName::Ingestion, StageStatus::Running)
                    .log("pipeline started"),
            )
            .unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, RunStatus::Running);
        assert_eq!(
            record.stage_status(StageName::Ingestion),
            StageStatus::Running
        );
        assert_eq!(record.logs, vec!["pipeline started".to_string()]);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.db");
        let id;
        {
            let store = SqliteRunStore::open(&path).unwrap();
            id = seed(&store);
            store
                .apply(
                    &id,
                    RunPatch::new()
                        .run_status(RunStatus::Running)
                        .stage(StageName::Ingestion, StageStatus::Running),
                )
                .unwrap();
        }
        // Reopen: the in-flight stage is still visible, so a crashed
        // process leaves a usable "what was running" diagnostic.
        let store = SqliteRunStore::open(&path).unwrap();
        let record = store.get(&id).unwrap();
        assert_eq!(record.status, RunStatus::Running);
        assert_eq!(
            record.stage_status(StageName::Ingestion),
            StageStatus::Running
        );
    }

    #[test]
    fn summary_matches_record_projection() {
        let store = SqliteRunStore::in_memory().unwrap();
        let id = seed(&store);
        let summary = store.summary(&id).unwrap();
        assert_eq!(summary, store.get(&id).unwrap().summary());
    }
}
