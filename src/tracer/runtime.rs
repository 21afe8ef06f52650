//! Capability interface to the interpreter being observed
//!
//! The tracer never talks to an interpreter directly. A [`Runtime`] loads the
//! target program, accepts one execution hook, and describes where its own
//! library code lives so the path filter can skip it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::event::EventKind;
use crate::value::{TracebackFrame, Value};

/// View of the frame that produced a notification
pub trait FrameView {
    fn filename(&self) -> &str;

    fn line_no(&self) -> u32;

    fn func_name(&self) -> &str;

    fn locals(&self) -> Vec<(String, Value)>;
}

/// What the runtime should do with the hook after a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookControl {
    /// Keep delivering notifications for nested scopes
    Continue,
    /// Stop delivering notifications on this thread
    Detach,
}

/// Callback invoked inline, on the traced thread, for every execution step
pub trait ExecutionHook: Send + Sync {
    fn on_event(&self, frame: &dyn FrameView, kind: EventKind, arg: &Value) -> HookControl;
}

/// An uncaught exception that escaped the target program
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramFailure {
    pub message: String,
    pub traceback: Vec<TracebackFrame>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("Empty command line")]
    EmptyCommand,
    #[error("No such program: {0}")]
    NotFound(String),
    #[error("Failed to load {program}: {reason}")]
    Load { program: String, reason: String },
}

/// A loaded program, ready to run under the registered hook
pub trait TargetProgram: Send {
    fn execute(self: Box<Self>) -> Result<(), ProgramFailure>;
}

/// Installation directories reported by the runtime
#[derive(Debug, Clone, Default)]
pub struct RuntimeLayout {
    /// Roots of the runtime's own standard library
    pub stdlib_dirs: Vec<PathBuf>,
    /// Root that third-party packages are installed under
    pub site_packages_dir: Option<PathBuf>,
    /// Instrumentation code that must never be traced
    pub instrumentation_dirs: Vec<PathBuf>,
    /// Package name to directory, for resolving explicit includes
    pub packages: HashMap<String, PathBuf>,
}

impl RuntimeLayout {
    pub fn find_package(&self, name: &str) -> Option<&PathBuf> {
        self.packages.get(name)
    }
}

pub trait Runtime: Send + Sync {
    fn register_hook(&self, hook: Arc<dyn ExecutionHook>);

    fn deregister_hook(&self);

    fn load(&self, command_line: &[String]) -> Result<Box<dyn TargetProgram>, LaunchError>;

    fn layout(&self) -> RuntimeLayout;
}
