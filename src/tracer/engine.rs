//! The execution tracer: turns runtime notifications into trace records

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use uuid::Uuid;

use crate::event::{EventKind, EventSink, RunEnd, RunStart, SinkError, TraceRecord};
use crate::value::Value;

use super::correlator::CallCorrelator;
use super::filter::{canonicalize, FilterConfig, PathFilter};
use super::locals::interesting_locals;
use super::profile::Profiler;
use super::runtime::{ExecutionHook, FrameView, HookControl, LaunchError, Runtime, TargetProgram};
use super::suspend::{hooks_suspended, suspend_hooks};

#[derive(Error, Debug)]
pub enum TracerError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("A run is already in progress")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: String,
    pub state: RunState,
}

/// Runs a target program under observation and reports every step to a sink.
#[derive(Clone)]
pub struct ExecutionTracer {
    inner: Arc<TracerInner>,
}

struct TracerInner {
    sink: Arc<dyn EventSink + Send + Sync>,
    filter: PathFilter,
    correlators: Mutex<HashMap<ThreadId, CallCorrelator>>,
    /// Raw filename to canonical filename, `None` when filtered out
    filenames: Mutex<HashMap<String, Option<String>>>,
    profiler: Profiler,
    state: Mutex<RunState>,
    run_id: RwLock<String>,
}

impl ExecutionTracer {
    pub fn new(sink: Arc<dyn EventSink + Send + Sync>, filter: PathFilter) -> Self {
        Self {
            inner: Arc::new(TracerInner {
                sink,
                filter,
                correlators: Mutex::new(HashMap::new()),
                filenames: Mutex::new(HashMap::new()),
                profiler: Profiler::new(),
                state: Mutex::new(RunState::Idle),
                run_id: RwLock::new(String::new()),
            }),
        }
    }

    /// Build a tracer whose filter is resolved against the runtime's layout.
    pub fn for_runtime(
        sink: Arc<dyn EventSink + Send + Sync>,
        config: &FilterConfig,
        runtime: &dyn Runtime,
    ) -> Self {
        Self::new(sink, PathFilter::new(config, &runtime.layout()))
    }

    pub fn state(&self) -> RunState {
        *self.inner.state.lock()
    }

    /// Load and execute `command_line` under the hook.
    ///
    /// A launch failure is returned before any run is started. A failure of
    /// the target itself is recorded on the run and reported as
    /// [`RunState::Failed`].
    pub fn run(&self, runtime: &dyn Runtime, command_line: &[String]) -> Result<RunOutcome, TracerError> {
        let previous = {
            let mut state = self.inner.state.lock();
            if *state == RunState::Running {
                return Err(TracerError::AlreadyRunning);
            }
            std::mem::replace(&mut *state, RunState::Running)
        };

        let (run_id, program) = match self.launch(runtime, command_line) {
            Ok(launched) => launched,
            Err(e) => {
                *self.inner.state.lock() = previous;
                return Err(e);
            }
        };

        self.inner.profiler.enable();
        runtime.register_hook(self.inner.clone());

        let result = program.execute();

        runtime.deregister_hook();
        self.inner.profiler.disable();

        let (state, message, traceback) = match result {
            Ok(()) => (RunState::Completed, None, None),
            Err(failure) => {
                tracing::info!(run_id = %run_id, error = %failure.message, "Target raised");
                (RunState::Failed, Some(failure.message), Some(failure.traceback))
            }
        };
        *self.inner.state.lock() = state;

        let stats = match self.inner.profiler.stats().to_blob() {
            Ok(blob) => Some(blob),
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "Failed to encode profile stats");
                None
            }
        };

        self.inner.sink.end_run(&RunEnd {
            run_id: run_id.clone(),
            end_time: Utc::now(),
            message,
            traceback,
            stats,
        })?;
        tracing::info!(run_id = %run_id, state = ?state, "Run finished");

        Ok(RunOutcome { run_id, state })
    }

    /// Load the target and announce the run. The caller holds the
    /// `Running` state while this executes.
    fn launch(
        &self,
        runtime: &dyn Runtime,
        command_line: &[String],
    ) -> Result<(String, Box<dyn TargetProgram>), TracerError> {
        let program = runtime.load(command_line)?;

        let run_id = Uuid::new_v4().to_string();
        *self.inner.run_id.write() = run_id.clone();
        self.inner.correlators.lock().clear();

        let cwd = std::env::current_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();
        self.inner.sink.start_run(&RunStart {
            run_id: run_id.clone(),
            cwd,
            description: command_line.to_vec(),
            start_time: Utc::now(),
        })?;
        tracing::info!(run_id = %run_id, program = ?command_line.first(), "Run started");

        Ok((run_id, program))
    }
}

impl TracerInner {
    fn traced_filename(&self, filename: &str) -> Option<String> {
        if let Some(cached) = self.filenames.lock().get(filename) {
            return cached.clone();
        }
        let resolved = if self.filter.should_ignore(filename) {
            None
        } else {
            Some(canonicalize(std::path::Path::new(filename)).display().to_string())
        };
        self.filenames
            .lock()
            .insert(filename.to_string(), resolved.clone());
        resolved
    }

    /// Call id for an event on `thread`. An unbalanced return has none.
    fn call_id(&self, thread: ThreadId, kind: EventKind) -> Option<String> {
        let mut correlators = self.correlators.lock();
        let stack = correlators.entry(thread).or_default();
        match kind {
            EventKind::Call => Some(stack.push()),
            EventKind::Return => match stack.pop() {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::error!(
                        run_id = %self.run_id.read(),
                        thread = ?thread,
                        error = %e,
                        "Call stack out of balance"
                    );
                    None
                }
            },
            _ => stack.top().map(str::to_string),
        }
    }
}

fn thread_label() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", current.id()),
    }
}

impl ExecutionHook for TracerInner {
    fn on_event(&self, frame: &dyn FrameView, kind: EventKind, arg: &Value) -> HookControl {
        if hooks_suspended() {
            return HookControl::Continue;
        }
        if *self.state.lock() != RunState::Running {
            return HookControl::Detach;
        }

        match kind {
            EventKind::Call => {
                self.profiler
                    .record_call(frame.filename(), frame.line_no(), frame.func_name())
            }
            EventKind::Return => self.profiler.record_return(),
            _ => {}
        }

        let Some(filename) = self.traced_filename(frame.filename()) else {
            return HookControl::Continue;
        };

        let thread = std::thread::current().id();
        let call_id = self.call_id(thread, kind);

        let record = TraceRecord {
            run_id: self.run_id.read().clone(),
            thread_id: thread_label(),
            call_id,
            event: kind,
            func_name: frame.func_name().to_string(),
            line_no: frame.line_no(),
            filename,
            trace_arg: arg.clone(),
            local_vars: interesting_locals(frame.locals()),
            timestamp: Utc::now(),
        };

        let _guard = suspend_hooks();
        if let Err(e) = self.sink.trace(&record) {
            tracing::debug!(run_id = %record.run_id, error = %e, "Dropped trace record");
        }
        HookControl::Continue
    }
}
