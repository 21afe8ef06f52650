//! Trace event rows

use rusqlite::{params, Row};

use crate::event::{EventKind, TracePayload};

use super::database::{Db, StorageError};
use super::models::{format_timestamp, parse_json, parse_timestamp, ThreadSummary, TraceEvent};

const TRACE_COLUMNS: &str = "id, run_id, thread_id, call_id, event, func_name, line_no, filename, trace_arg, local_vars, timestamp";

impl Db {
    /// Append one execution step to a run.
    pub fn trace(&self, event: &TracePayload) -> Result<(), StorageError> {
        let trace_arg = serde_json::to_string(&event.trace_arg)?;
        let local_vars = serde_json::to_string(&event.local_vars)?;
        self.execute_buffered(
            "INSERT INTO trace (run_id, thread_id, call_id, event, func_name, line_no, filename, trace_arg, local_vars, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.run_id,
                event.thread_id,
                event.call_id,
                event.event.as_str(),
                event.func_name,
                event.line_no,
                event.filename,
                trace_arg,
                local_vars,
                format_timestamp(&event.timestamp),
            ],
        )?;
        Ok(())
    }

    /// Events of a run in insertion order, optionally for one thread only.
    pub fn get_trace(&self, run_id: &str, thread_id: Option<&str>) -> Result<Vec<TraceEvent>, StorageError> {
        let conn = self.reader()?;
        let events = match thread_id {
            Some(thread_id) => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {TRACE_COLUMNS} FROM trace WHERE run_id = ?1 AND thread_id = ?2 ORDER BY id"
                ))?;
                let rows = stmt.query_map([run_id, thread_id], row_to_event)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {TRACE_COLUMNS} FROM trace WHERE run_id = ?1 ORDER BY id"
                ))?;
                let rows = stmt.query_map([run_id], row_to_event)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(events)
    }

    /// One summary per thread seen in the run, in order of first activity.
    pub fn get_thread_details(&self, run_id: &str) -> Result<Vec<ThreadSummary>, StorageError> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare_cached(
            "SELECT thread_id,
                    MIN(timestamp),
                    MAX(timestamp),
                    COUNT(id),
                    COUNT(DISTINCT filename || ':' || line_no)
             FROM trace
             WHERE run_id = ?1
             GROUP BY thread_id
             ORDER BY MIN(id)",
        )?;
        let threads = stmt
            .query_map([run_id], |row| {
                let start: String = row.get(1)?;
                let end: String = row.get(2)?;
                Ok(ThreadSummary {
                    thread_id: row.get(0)?,
                    start_time: parse_timestamp(1, &start)?,
                    end_time: parse_timestamp(2, &end)?,
                    num_events: row.get::<_, i64>(3)? as u64,
                    num_locations: row.get::<_, i64>(4)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(threads)
    }
}

fn row_to_event(row: &Row) -> rusqlite::Result<TraceEvent> {
    let event: String = row.get(4)?;
    let trace_arg: String = row.get(8)?;
    let local_vars: String = row.get(9)?;
    let timestamp: String = row.get(10)?;

    Ok(TraceEvent {
        id: row.get(0)?,
        run_id: row.get(1)?,
        thread_id: row.get(2)?,
        call_id: row.get(3)?,
        event: event.parse::<EventKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        func_name: row.get(5)?,
        line_no: row.get(6)?,
        filename: row.get(7)?,
        trace_arg: parse_json(8, &trace_arg)?,
        local_vars: parse_json(9, &local_vars)?,
        timestamp: parse_timestamp(10, &timestamp)?,
    })
}
