//! Fixtures for runs, payloads and on-disk sources

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value as JsonValue};
use stepwise::tracer::RuntimeLayout;
use stepwise::{EventKind, RunEnd, RunStart, TracePayload};
use tempfile::TempDir;

/// A temporary directory of source files with a resolved root
pub struct SourceTree {
    dir: TempDir,
    root: PathBuf,
}

impl SourceTree {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir
            .path()
            .canonicalize()
            .expect("Failed to resolve temp dir");
        Self { dir, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `body` to `name` under the tree and return its path as text.
    pub fn write(&self, name: &str, body: &str) -> String {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create source dir");
        }
        std::fs::write(&path, body).expect("Failed to write source");
        path.display().to_string()
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("runs.db")
    }
}

/// A runtime layout whose library roots never overlap a [`SourceTree`]
pub fn runtime_layout() -> RuntimeLayout {
    RuntimeLayout {
        stdlib_dirs: vec!["/opt/runtime/lib".into()],
        site_packages_dir: Some("/opt/runtime/lib/site-packages".into()),
        instrumentation_dirs: vec!["/opt/stepwise".into()],
        ..Default::default()
    }
}

pub fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp")
}

pub fn run_start(run_id: &str, offset_secs: i64) -> RunStart {
    RunStart {
        run_id: run_id.to_string(),
        cwd: "/work".to_string(),
        description: vec!["app.py".to_string()],
        start_time: base_time() + Duration::seconds(offset_secs),
    }
}

pub fn run_end(run_id: &str, message: Option<&str>) -> RunEnd {
    RunEnd {
        run_id: run_id.to_string(),
        end_time: base_time() + Duration::seconds(60),
        message: message.map(str::to_string),
        traceback: None,
        stats: None,
    }
}

pub fn trace_payload(
    run_id: &str,
    thread_id: &str,
    kind: EventKind,
    filename: &str,
    line_no: u32,
) -> TracePayload {
    TracePayload {
        run_id: run_id.to_string(),
        thread_id: thread_id.to_string(),
        call_id: None,
        event: kind,
        func_name: "main".to_string(),
        line_no,
        filename: filename.to_string(),
        trace_arg: JsonValue::Null,
        local_vars: Map::new(),
        timestamp: base_time(),
    }
}
