pub mod collapse;
pub mod config;
pub mod data;
pub mod event;
pub mod tracer;
pub mod transport;
pub mod util;
pub mod value;

pub use collapse::{collapse_trace, variable_changes, CollapsedEvent};
pub use config::Config;
pub use data::{
    copy_run, CachedFile, Db, DbLineCache, LocalPublisher, Run, SortOrder, StorageError,
    ThreadSummary, TraceEvent,
};
pub use event::{EventKind, EventSink, RunEnd, RunStart, SinkError, TracePayload, TraceRecord};
pub use tracer::{ExecutionTracer, FilterConfig, RunOutcome, RunState, Runtime, TracerError};
pub use transport::{Listener, Publisher, Recorder, TransportError, WireMessage};
pub use value::Value;
