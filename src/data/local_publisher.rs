//! Write offload: one worker thread owns the store, tracer threads enqueue

use std::collections::HashSet;
use std::path::Path;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::event::{EventSink, RunEnd, RunStart, SinkError, TracePayload, TraceRecord};

use super::database::{Db, StorageError};

/// One queued store operation
#[derive(Debug)]
pub(crate) enum WriteOp {
    Start(RunStart),
    End(RunEnd),
    Trace(TracePayload),
    File {
        run_id: String,
        name: String,
        body: String,
    },
    Stop,
}

/// [`EventSink`] that hands every write to a dedicated store thread.
///
/// The first time a run references a source file, the file is read and
/// queued for caching right after the event that referenced it.
pub struct LocalPublisher {
    sender: Mutex<Option<mpsc::UnboundedSender<WriteOp>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    seen_files: Mutex<HashSet<String>>,
}

impl LocalPublisher {
    /// Open the store at `path` and start the writer thread that owns it.
    pub fn open(path: impl AsRef<Path>, batch_size: usize) -> Result<Self, StorageError> {
        Self::new(Db::open(path)?.with_batch_size(batch_size))
    }

    pub fn new(db: Db) -> Result<Self, StorageError> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<WriteOp>();
        let worker = std::thread::Builder::new()
            .name("stepwise-writer".to_string())
            .spawn(move || {
                while let Some(op) = receiver.blocking_recv() {
                    if matches!(op, WriteOp::Stop) {
                        break;
                    }
                    if let Err(e) = dispatch_one(&db, op) {
                        tracing::error!(error = %e, "Error processing queued write");
                    }
                }
                if let Err(e) = db.flush() {
                    tracing::error!(error = %e, "Failed to flush run store");
                }
                tracing::debug!("Writer thread stopped");
            })
            .map_err(StorageError::Worker)?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            seen_files: Mutex::new(HashSet::new()),
        })
    }

    fn enqueue(&self, op: WriteOp) -> Result<(), SinkError> {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(SinkError::Closed)?;
        sender.send(op).map_err(|_| SinkError::Closed)
    }

    /// Drain everything queued so far, then stop the writer thread.
    ///
    /// Blocks until the worker exits. Later writes fail with
    /// [`SinkError::Closed`].
    pub fn stop(&self) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(WriteOp::Stop);
        }
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("Writer thread panicked");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.lock().is_none()
    }
}

pub(crate) fn dispatch_one(db: &Db, op: WriteOp) -> Result<(), StorageError> {
    match op {
        WriteOp::Start(run) => db.start_run(&run),
        WriteOp::End(run) => db.end_run(&run),
        WriteOp::Trace(event) => db.trace(&event),
        WriteOp::File { run_id, name, body } => db.cache_file_for_run(&run_id, &name, &body).map(|_| ()),
        WriteOp::Stop => Ok(()),
    }
}

/// Current contents of a source file, decoded lossily; unreadable reads empty.
pub(crate) fn read_source(filename: &str) -> String {
    match std::fs::read(filename) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::debug!(file = %filename, error = %e, "Could not read source file");
            String::new()
        }
    }
}

impl EventSink for LocalPublisher {
    fn start_run(&self, run: &RunStart) -> Result<(), SinkError> {
        self.seen_files.lock().clear();
        self.enqueue(WriteOp::Start(run.clone()))
    }

    fn end_run(&self, run: &RunEnd) -> Result<(), SinkError> {
        self.enqueue(WriteOp::End(run.clone()))?;
        self.stop();
        Ok(())
    }

    fn trace(&self, record: &TraceRecord) -> Result<(), SinkError> {
        let payload = record.encode();
        let filename = payload.filename.clone();
        self.enqueue(WriteOp::Trace(payload))?;

        if !filename.is_empty() && self.seen_files.lock().insert(filename.clone()) {
            let body = read_source(&filename);
            self.enqueue(WriteOp::File {
                run_id: record.run_id.clone(),
                name: filename,
                body,
            })?;
        }
        Ok(())
    }
}

impl Drop for LocalPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}
