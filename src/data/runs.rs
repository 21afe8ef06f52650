//! Run rows

use rusqlite::{params, OptionalExtension, Row};

use crate::event::{RunEnd, RunStart};

use super::database::{is_constraint_violation, Db, StorageError};
use super::models::{format_timestamp, parse_json, parse_timestamp, Run, SortOrder};

const RUN_COLUMNS: &str =
    "id, cwd, description, start_time, end_time, error_message, traceback, stats";

impl Db {
    /// Record the beginning of a run.
    pub fn start_run(&self, run: &RunStart) -> Result<(), StorageError> {
        let description = serde_json::to_string(&run.description)?;
        let result = self.execute_buffered(
            "INSERT INTO run (id, cwd, description, start_time) VALUES (?1, ?2, ?3, ?4)",
            params![
                run.run_id,
                run.cwd,
                description,
                format_timestamp(&run.start_time)
            ],
        );
        match result {
            Err(StorageError::Sqlite(e)) if is_constraint_violation(&e) => {
                Err(StorageError::DuplicateRun(run.run_id.clone()))
            }
            other => other.map(|_| ()),
        }
    }

    /// Record the end of a run and commit.
    ///
    /// Has no effect if the run was never started.
    pub fn end_run(&self, run: &RunEnd) -> Result<(), StorageError> {
        let traceback = run
            .traceback
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let updated = self.execute_buffered(
            "UPDATE run SET end_time = ?2, error_message = ?3, traceback = ?4, stats = ?5 WHERE id = ?1",
            params![
                run.run_id,
                format_timestamp(&run.end_time),
                run.message,
                traceback,
                run.stats
            ],
        )?;
        if updated == 0 {
            tracing::debug!(run_id = %run.run_id, "end_run for unknown run");
        }
        self.flush()
    }

    pub fn get_runs(&self, only_errors: bool, sort_order: SortOrder) -> Result<Vec<Run>, StorageError> {
        let filter = if only_errors {
            "WHERE error_message IS NOT NULL"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM run {filter} ORDER BY start_time {}, rowid {}",
            sort_order.as_sql(),
            sort_order.as_sql()
        );
        let conn = self.reader()?;
        let mut stmt = conn.prepare(&sql)?;
        let runs = stmt
            .query_map([], row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    /// Fetch one run. Fails with [`StorageError::NoSuchRun`] if absent.
    pub fn get_run(&self, run_id: &str) -> Result<Run, StorageError> {
        let conn = self.reader()?;
        conn.query_row(
            &format!("SELECT {RUN_COLUMNS} FROM run WHERE id = ?1"),
            [run_id],
            row_to_run,
        )
        .optional()?
        .ok_or_else(|| StorageError::NoSuchRun(run_id.to_string()))
    }

    /// Remove a run with its trace events and file associations.
    ///
    /// Cached files no other run refers to are removed too.
    pub fn delete_run(&self, run_id: &str) -> Result<(), StorageError> {
        self.get_run(run_id)?;

        let conn = self.reader()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM trace WHERE run_id = ?1", [run_id])?;
        tx.execute("DELETE FROM run_file WHERE run_id = ?1", [run_id])?;
        tx.execute("DELETE FROM run WHERE id = ?1", [run_id])?;
        let orphans = tx.execute(
            "DELETE FROM file WHERE signature NOT IN (SELECT signature FROM run_file)",
            [],
        )?;
        tx.commit()?;

        tracing::debug!(run_id = %run_id, orphaned_files = orphans, "Deleted run");
        Ok(())
    }
}

fn row_to_run(row: &Row) -> rusqlite::Result<Run> {
    let description: String = row.get(2)?;
    let start_time: String = row.get(3)?;
    let end_time: Option<String> = row.get(4)?;
    let traceback: Option<String> = row.get(6)?;

    Ok(Run {
        id: row.get(0)?,
        cwd: row.get(1)?,
        description: parse_json(2, &description)?,
        start_time: parse_timestamp(3, &start_time)?,
        end_time: end_time
            .as_deref()
            .map(|text| parse_timestamp(4, text))
            .transpose()?,
        error_message: row.get(5)?,
        traceback: traceback
            .as_deref()
            .map(|text| parse_json(6, text))
            .transpose()?,
        stats: row.get(7)?,
    })
}
