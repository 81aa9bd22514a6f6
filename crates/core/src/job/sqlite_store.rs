//! SQLite-backed job store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    apply_transition, CreateJobRequest, Job, JobFilter, JobPatch, JobStatus, JobStore, StoreError,
};

const SELECT_BODY: &str = "SELECT body FROM jobs";

/// SQLite-backed job store.
///
/// The full job lives in a JSON `body` column; `status`, `queue_seq` and
/// `remote_path` are duplicated into indexed columns for queue queries.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                remote_path TEXT NOT NULL,
                status TEXT NOT NULL,
                queue_seq INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                body TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status_seq ON jobs(status, queue_seq);
            CREATE INDEX IF NOT EXISTS idx_jobs_remote_path ON jobs(remote_path);
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn build_where_clause(filter: &JobFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !filter.statuses.is_empty() {
            let placeholders = vec!["?"; filter.statuses.len()].join(", ");
            conditions.push(format!("status IN ({})", placeholders));
            for status in &filter.statuses {
                params.push(Box::new(status.as_str()));
            }
        }

        if let Some(ref remote_path) = filter.remote_path {
            conditions.push("remote_path = ?".to_string());
            params.push(Box::new(remote_path.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let body: String = row.get(0)?;
        serde_json::from_str(&body).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Job, StoreError> {
        conn.query_row(
            &format!("{} WHERE id = ?", SELECT_BODY),
            params![id],
            Self::row_to_job,
        )
        .optional()
        .map_err(|e| StoreError::Database(e.to_string()))?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn next_seq(conn: &Connection) -> Result<i64, StoreError> {
        conn.query_row(
            "SELECT COALESCE(MAX(queue_seq), 0) + 1 FROM jobs",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Write `job` back, guarded on the row still being in `expected`.
    fn write(conn: &Connection, job: &Job, expected: JobStatus) -> Result<(), StoreError> {
        let body = serde_json::to_string(job).map_err(|e| StoreError::Database(e.to_string()))?;
        let changed = conn
            .execute(
                "UPDATE jobs SET status = ?, queue_seq = ?, updated_at = ?, body = ? WHERE id = ? AND status = ?",
                params![
                    job.status.as_str(),
                    job.queue_seq,
                    job.updated_at.to_rfc3339(),
                    body,
                    job.id,
                    expected.as_str(),
                ],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(StoreError::InvalidTransition {
                job_id: job.id.clone(),
                from: expected,
                to: job.status,
            });
        }
        Ok(())
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, request: CreateJobRequest) -> Result<Job, StoreError> {
        let conn = self.lock()?;

        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM jobs WHERE remote_path = ? AND status != ? LIMIT 1",
                params![request.remote_path, JobStatus::Completed.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if let Some(job_id) = existing {
            return Err(StoreError::Duplicate {
                remote_path: request.remote_path,
                job_id,
            });
        }

        let job = Job::new(request, Self::next_seq(&conn)?);
        let body = serde_json::to_string(&job).map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO jobs (id, remote_path, status, queue_seq, created_at, updated_at, body) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                job.id,
                job.remote_path,
                job.status.as_str(),
                job.queue_seq,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
                body,
            ],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(job)
    }

    fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let conn = self.lock()?;
        match Self::fetch(&conn, id) {
            Ok(job) => Ok(Some(job)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "{} {} ORDER BY queue_seq ASC, created_at ASC LIMIT ? OFFSET ?",
            SELECT_BODY, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_job)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let jobs = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(jobs)
    }

    fn count(&self, filter: &JobFilter) -> Result<i64, StoreError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn transition(
        &self,
        id: &str,
        expected: JobStatus,
        to: JobStatus,
        patch: JobPatch,
    ) -> Result<Job, StoreError> {
        let conn = self.lock()?;

        let current = Self::fetch(&conn, id)?;
        if current.status != expected {
            return Err(StoreError::InvalidTransition {
                job_id: id.to_string(),
                from: current.status,
                to,
            });
        }

        let next = apply_transition(&current, to, patch, Self::next_seq(&conn)?, Utc::now())?;
        Self::write(&conn, &next, expected)?;
        Ok(next)
    }

    fn set_pause_requested(
        &self,
        id: &str,
        expected: JobStatus,
        requested: bool,
    ) -> Result<Job, StoreError> {
        let conn = self.lock()?;

        let mut job = Self::fetch(&conn, id)?;
        if job.status != expected {
            return Err(StoreError::InvalidOperation {
                job_id: id.to_string(),
                status: job.status,
                operation: "pause".to_string(),
            });
        }

        job.pause_requested = requested;
        job.updated_at = Utc::now();
        Self::write(&conn, &job, expected)?;
        Ok(job)
    }

    fn delete(&self, id: &str) -> Result<Job, StoreError> {
        let conn = self.lock()?;

        let job = Self::fetch(&conn, id)?;
        if !job.status.is_deletable() {
            return Err(StoreError::InvalidOperation {
                job_id: id.to_string(),
                status: job.status,
                operation: "delete".to_string(),
            });
        }

        conn.execute(
            "DELETE FROM jobs WHERE id = ? AND status = ?",
            params![id, job.status.as_str()],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(job)
    }
}
