//! Collector side: writes received messages into a run store

use std::collections::HashSet;

use crate::data::{read_source, Db};
use crate::event::{EventKind, RunEnd, RunStart, SinkError, TracePayload};

use super::WireMessage;

/// Replays transport messages into a [`Db`].
///
/// Source files referenced by a run are read from the collector's
/// filesystem and cached the first time each one is seen.
pub struct Recorder {
    db: Db,
    seen_files: HashSet<(String, String)>,
}

impl Recorder {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            seen_files: HashSet::new(),
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn into_db(self) -> Db {
        self.db
    }

    pub fn handle(&mut self, message: WireMessage) -> Result<(), SinkError> {
        match message.kind {
            EventKind::StartRun => {
                let run: RunStart = message.payload_as()?;
                tracing::info!(
                    run_id = %run.run_id,
                    command_line = %run.description.join(" "),
                    "Starting new run"
                );
                self.seen_files.retain(|(run_id, _)| run_id != &run.run_id);
                self.db.start_run(&run)?;
            }
            EventKind::EndRun => {
                let run: RunEnd = message.payload_as()?;
                match &run.message {
                    Some(error) => tracing::info!(run_id = %run.run_id, error = %error, "Run failed"),
                    None => tracing::info!(run_id = %run.run_id, "Finished run"),
                }
                self.db.end_run(&run)?;
                self.seen_files.retain(|(run_id, _)| run_id != &run.run_id);
            }
            _ => {
                let event: TracePayload = message.payload_as()?;
                tracing::trace!(
                    run_id = %event.run_id,
                    event = %event.event,
                    file = %event.filename,
                    line = event.line_no,
                    "Trace event"
                );
                self.db.trace(&event)?;
                self.cache_source(&event)?;
            }
        }
        Ok(())
    }

    fn cache_source(&mut self, event: &TracePayload) -> Result<(), SinkError> {
        if event.filename.is_empty() {
            return Ok(());
        }
        let key = (event.run_id.clone(), event.filename.clone());
        if self.seen_files.insert(key) {
            let body = read_source(&event.filename);
            self.db
                .cache_file_for_run(&event.run_id, &event.filename, &body)?;
        }
        Ok(())
    }
}
