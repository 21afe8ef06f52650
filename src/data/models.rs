//! Rows of the run store

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::event::EventKind;
use crate::tracer::ProfileStats;
use crate::value::TracebackFrame;

/// One execution of a traced program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub cwd: String,
    /// Command line the program was started with
    pub description: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub traceback: Option<Vec<TracebackFrame>>,
    /// Encoded [`ProfileStats`]
    pub stats: Option<Vec<u8>>,
}

impl Run {
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn failed(&self) -> bool {
        self.error_message.is_some()
    }

    /// Decode the stats blob, if the run recorded one.
    pub fn profile_stats(&self) -> Result<Option<ProfileStats>, serde_json::Error> {
        self.stats
            .as_deref()
            .filter(|blob| !blob.is_empty())
            .map(ProfileStats::from_blob)
            .transpose()
    }
}

/// One stored execution step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Insertion order within the store
    pub id: i64,
    pub run_id: String,
    pub thread_id: String,
    pub call_id: Option<String>,
    pub event: EventKind,
    pub func_name: String,
    pub line_no: u32,
    pub filename: String,
    pub trace_arg: JsonValue,
    pub local_vars: Map<String, JsonValue>,
    pub timestamp: DateTime<Utc>,
}

/// A source file cached for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub name: String,
    pub signature: String,
    pub run_id: String,
}

/// Activity of one thread within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub num_events: u64,
    /// Distinct (filename, line) pairs visited
    pub num_locations: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// Fixed-width UTC form, so text order matches time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, text: &str) -> rusqlite::Result<T> {
    serde_json::from_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
