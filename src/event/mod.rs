//! Event records shared by the tracer, the transport and the run store

mod sink;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::tracer::suspend_hooks;
use crate::value::{encode, encode_locals, TracebackFrame, Value};

pub use sink::{EventSink, SinkError};

/// Kind of an observed step, plus the two run-boundary pseudo-kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Call,
    Line,
    Return,
    Exception,
    StartRun,
    EndRun,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Call => "call",
            EventKind::Line => "line",
            EventKind::Return => "return",
            EventKind::Exception => "exception",
            EventKind::StartRun => "start_run",
            EventKind::EndRun => "end_run",
        }
    }

    /// Whether this kind is an execution step rather than a run boundary
    pub fn is_step(&self) -> bool {
        !matches!(self, EventKind::StartRun | EventKind::EndRun)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind(pub String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event kind {:?}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call" => Ok(EventKind::Call),
            "line" => Ok(EventKind::Line),
            "return" => Ok(EventKind::Return),
            "exception" => Ok(EventKind::Exception),
            "start_run" => Ok(EventKind::StartRun),
            "end_run" => Ok(EventKind::EndRun),
            other => Err(UnknownEventKind(other.to_string())),
        }
    }
}

/// Beginning of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStart {
    pub run_id: String,
    pub cwd: String,
    #[serde(rename = "command_line")]
    pub description: Vec<String>,
    #[serde(rename = "timestamp")]
    pub start_time: DateTime<Utc>,
}

/// The single terminating update of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEnd {
    pub run_id: String,
    #[serde(rename = "timestamp")]
    pub end_time: DateTime<Utc>,
    pub message: Option<String>,
    pub traceback: Option<Vec<TracebackFrame>>,
    #[serde(with = "blob_base64", default)]
    pub stats: Option<Vec<u8>>,
}

/// One execution step as captured from a live frame
#[derive(Debug, Clone)]
pub struct TraceRecord {
    pub run_id: String,
    pub thread_id: String,
    pub call_id: Option<String>,
    pub event: EventKind,
    pub func_name: String,
    pub line_no: u32,
    pub filename: String,
    pub trace_arg: Value,
    pub local_vars: Vec<(String, Value)>,
    pub timestamp: DateTime<Utc>,
}

impl TraceRecord {
    /// Snapshot the live values into their transportable form.
    ///
    /// Execution hooks are suspended on this thread while encoding so that
    /// anything the encoder touches is not traced itself.
    pub fn encode(&self) -> TracePayload {
        let _guard = suspend_hooks();
        TracePayload {
            run_id: self.run_id.clone(),
            thread_id: self.thread_id.clone(),
            call_id: self.call_id.clone(),
            event: self.event,
            func_name: self.func_name.clone(),
            line_no: self.line_no,
            filename: self.filename.clone(),
            trace_arg: encode(&self.trace_arg),
            local_vars: encode_locals(&self.local_vars),
            timestamp: self.timestamp,
        }
    }
}

/// One execution step in transportable form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracePayload {
    pub run_id: String,
    pub thread_id: String,
    pub call_id: Option<String>,
    pub event: EventKind,
    pub func_name: String,
    pub line_no: u32,
    pub filename: String,
    #[serde(rename = "arg", default)]
    pub trace_arg: JsonValue,
    #[serde(default)]
    pub local_vars: Map<String, JsonValue>,
    pub timestamp: DateTime<Utc>,
}

mod blob_base64 {
    use base64::engine::general_purpose;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(blob: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match blob {
            Some(bytes) => serializer.serialize_some(&general_purpose::STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|text| {
                general_purpose::STANDARD
                    .decode(text)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}
