//! Run store
//!
//! SQLite persistence for runs, their trace events and the source files they
//! touched, plus the write-offload adapter that lets many tracer threads share
//! one store handle.

mod database;
mod export;
mod files;
mod line_cache;
mod local_publisher;
mod migrations;
mod models;
mod runs;
mod traces;

pub use database::{Db, StorageError, DEFAULT_COMMIT_BATCH_SIZE};
pub use export::copy_run;
pub use files::file_signature;
pub use line_cache::DbLineCache;
pub use local_publisher::LocalPublisher;
pub(crate) use local_publisher::read_source;
pub use models::{CachedFile, Run, SortOrder, ThreadSummary, TraceEvent};

use crate::event::{EventSink, RunEnd, RunStart, SinkError, TraceRecord};

/// Direct, same-thread writes. Use [`LocalPublisher`] to share a store
/// across threads.
impl EventSink for Db {
    fn start_run(&self, run: &RunStart) -> Result<(), SinkError> {
        Db::start_run(self, run).map_err(SinkError::from)
    }

    fn end_run(&self, run: &RunEnd) -> Result<(), SinkError> {
        Db::end_run(self, run).map_err(SinkError::from)
    }

    fn trace(&self, record: &TraceRecord) -> Result<(), SinkError> {
        Db::trace(self, &record.encode()).map_err(SinkError::from)
    }
}
