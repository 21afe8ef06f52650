use thiserror::Error;

use crate::data::StorageError;
use crate::transport::TransportError;

use super::{RunEnd, RunStart, TraceRecord};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Event sink is closed")]
    Closed,
}

/// Destination for tracer output.
///
/// Implemented by the run store itself, by the write-offload adapter that
/// owns a store on a worker thread, and by the transport publisher.
pub trait EventSink {
    fn start_run(&self, run: &RunStart) -> Result<(), SinkError>;

    fn end_run(&self, run: &RunEnd) -> Result<(), SinkError>;

    fn trace(&self, record: &TraceRecord) -> Result<(), SinkError>;
}
