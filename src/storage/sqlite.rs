//! SQLite run history
//!
//! This module provides a SQLite-based implementation of the RunHistory trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{HistoryError, HistoryResult, RunHistory};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, status, identifier, message";

/// SQLite run history backend
pub struct SqliteRunHistory {
    conn: Connection,
}

impl SqliteRunHistory {
    /// Opens or creates the history database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteRunHistory)` - Successfully opened/created database
    /// * `Err(HistoryError)` - Failed to open database
    pub fn new(path: &Path) -> HistoryResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> HistoryResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Interrupted),
        identifier: row.get(5)?,
        message: row.get(6)?,
    })
}

impl RunHistory for SqliteRunHistory {
    fn start_run(&mut self, config_hash: &str) -> HistoryResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        identifier: Option<&str>,
        message: Option<&str>,
    ) -> HistoryResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, identifier = ?3, message = ?4
             WHERE id = ?5",
            params![status.to_db_string(), now, identifier, message, run_id],
        )?;
        if changed == 0 {
            return Err(HistoryError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn mark_interrupted(&mut self) -> HistoryResult<usize> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE status = ?3",
            params![
                RunStatus::Interrupted.to_db_string(),
                now,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(changed)
    }

    fn get_run(&self, run_id: i64) -> HistoryResult<RunRecord> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1");
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(HistoryError::RunNotFound(run_id))
    }

    fn latest_run(&self) -> HistoryResult<Option<RunRecord>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY id DESC LIMIT 1");
        Ok(self.conn.query_row(&sql, [], run_from_row).optional()?)
    }

    fn recent_runs(&self, limit: usize) -> HistoryResult<Vec<RunRecord>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY id DESC LIMIT ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn count_by_status(&self) -> HistoryResult<HashMap<RunStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM runs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (status, count) = row?;
            if let Some(status) = RunStatus::from_db_string(&status) {
                *counts.entry(status).or_insert(0) += count as u64;
            }
        }
        Ok(counts)
    }
}
