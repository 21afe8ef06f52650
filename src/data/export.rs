//! Moving a single run between stores

use crate::event::{RunEnd, RunStart, TracePayload};

use super::database::{Db, StorageError};
use super::models::TraceEvent;

impl From<TraceEvent> for TracePayload {
    fn from(event: TraceEvent) -> Self {
        Self {
            run_id: event.run_id,
            thread_id: event.thread_id,
            call_id: event.call_id,
            event: event.event,
            func_name: event.func_name,
            line_no: event.line_no,
            filename: event.filename,
            trace_arg: event.trace_arg,
            local_vars: event.local_vars,
            timestamp: event.timestamp,
        }
    }
}

/// Copy one run with its events, cached files and outcome from `src` to `dst`.
///
/// Fails with [`StorageError::NoSuchRun`] if `src` lacks the run and with
/// [`StorageError::DuplicateRun`] if `dst` already has it.
pub fn copy_run(src: &Db, dst: &Db, run_id: &str) -> Result<(), StorageError> {
    let run = src.get_run(run_id)?;
    dst.start_run(&RunStart {
        run_id: run.id.clone(),
        cwd: run.cwd.clone(),
        description: run.description.clone(),
        start_time: run.start_time,
    })?;

    let events = src.get_trace(run_id, None)?;
    tracing::debug!(run_id = %run_id, events = events.len(), "Copying trace data");
    for event in events {
        dst.trace(&TracePayload::from(event))?;
    }

    for file in src.get_files_for_run(run_id)? {
        let (name, body) = src.get_cached_file_by_id(run_id, &file.signature)?;
        tracing::debug!(run_id = %run_id, file = %name, "Copying cached file");
        dst.cache_file_for_run(run_id, &name, &body)?;
    }

    match run.end_time {
        Some(end_time) => dst.end_run(&RunEnd {
            run_id: run.id,
            end_time,
            message: run.error_message,
            traceback: run.traceback,
            stats: run.stats,
        }),
        None => dst.flush(),
    }
}
