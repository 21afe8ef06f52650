//! A runtime that replays prepared frames instead of running real code
//!
//! Each program is a set of named threads, each a list of steps. Executing a
//! program spawns one OS thread per scripted thread and feeds its steps to
//! the registered hook, honouring [`HookControl::Detach`] per thread.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::event::EventKind;
use crate::value::Value;

use super::runtime::{
    ExecutionHook, FrameView, HookControl, LaunchError, ProgramFailure, Runtime, RuntimeLayout,
    TargetProgram,
};

type HookSlot = Arc<RwLock<Option<Arc<dyn ExecutionHook>>>>;

#[derive(Debug, Clone)]
pub struct ScriptedFrame {
    pub filename: String,
    pub line_no: u32,
    pub func_name: String,
    pub locals: Vec<(String, Value)>,
}

impl ScriptedFrame {
    pub fn new(filename: impl Into<String>, line_no: u32, func_name: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            line_no,
            func_name: func_name.into(),
            locals: Vec::new(),
        }
    }

    pub fn with_local(mut self, name: impl Into<String>, value: Value) -> Self {
        self.locals.push((name.into(), value));
        self
    }
}

impl FrameView for ScriptedFrame {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn line_no(&self) -> u32 {
        self.line_no
    }

    fn func_name(&self) -> &str {
        &self.func_name
    }

    fn locals(&self) -> Vec<(String, Value)> {
        self.locals.clone()
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedStep {
    pub frame: ScriptedFrame,
    pub kind: EventKind,
    pub arg: Value,
}

#[derive(Debug, Clone)]
pub struct ScriptedThread {
    pub name: String,
    pub steps: Vec<ScriptedStep>,
}

impl ScriptedThread {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, kind: EventKind, frame: ScriptedFrame, arg: Value) -> Self {
        self.steps.push(ScriptedStep { frame, kind, arg });
        self
    }

    pub fn call(self, frame: ScriptedFrame) -> Self {
        self.step(EventKind::Call, frame, Value::None)
    }

    pub fn line(self, frame: ScriptedFrame) -> Self {
        self.step(EventKind::Line, frame, Value::None)
    }

    pub fn ret(self, frame: ScriptedFrame, value: Value) -> Self {
        self.step(EventKind::Return, frame, value)
    }

    pub fn exception(self, frame: ScriptedFrame, exc: Value) -> Self {
        self.step(EventKind::Exception, frame, exc)
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedProgram {
    threads: Vec<ScriptedThread>,
    failure: Option<ProgramFailure>,
}

impl ScriptedProgram {
    pub fn new(threads: Vec<ScriptedThread>) -> Self {
        Self {
            threads,
            failure: None,
        }
    }

    /// Make the program end with an uncaught exception.
    pub fn failing_with(mut self, failure: ProgramFailure) -> Self {
        self.failure = Some(failure);
        self
    }
}

/// In-memory [`Runtime`] over a table of scripted programs
pub struct ScriptedRuntime {
    layout: RuntimeLayout,
    programs: HashMap<String, ScriptedProgram>,
    hook: HookSlot,
}

impl ScriptedRuntime {
    pub fn new(layout: RuntimeLayout) -> Self {
        Self {
            layout,
            programs: HashMap::new(),
            hook: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_program(mut self, name: impl Into<String>, program: ScriptedProgram) -> Self {
        self.programs.insert(name.into(), program);
        self
    }

    pub fn has_hook(&self) -> bool {
        self.hook.read().is_some()
    }
}

impl Runtime for ScriptedRuntime {
    fn register_hook(&self, hook: Arc<dyn ExecutionHook>) {
        *self.hook.write() = Some(hook);
    }

    fn deregister_hook(&self) {
        *self.hook.write() = None;
    }

    fn load(&self, command_line: &[String]) -> Result<Box<dyn TargetProgram>, LaunchError> {
        let name = command_line.first().ok_or(LaunchError::EmptyCommand)?;
        let program = self
            .programs
            .get(name)
            .cloned()
            .ok_or_else(|| LaunchError::NotFound(name.clone()))?;
        Ok(Box::new(ScriptedExecution {
            program,
            hook: self.hook.clone(),
        }))
    }

    fn layout(&self) -> RuntimeLayout {
        self.layout.clone()
    }
}

struct ScriptedExecution {
    program: ScriptedProgram,
    hook: HookSlot,
}

impl TargetProgram for ScriptedExecution {
    fn execute(self: Box<Self>) -> Result<(), ProgramFailure> {
        let ScriptedExecution { program, hook } = *self;

        let mut handles = Vec::with_capacity(program.threads.len());
        for thread in program.threads {
            let hook = hook.clone();
            let name = thread.name.clone();
            let spawned = std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || replay(&thread.steps, &hook));
            match spawned {
                Ok(handle) => handles.push((name, handle)),
                Err(e) => {
                    return Err(ProgramFailure {
                        message: format!("failed to start thread {name}: {e}"),
                        traceback: Vec::new(),
                    })
                }
            }
        }

        for (name, handle) in handles {
            if handle.join().is_err() {
                return Err(ProgramFailure {
                    message: format!("thread {name} panicked"),
                    traceback: Vec::new(),
                });
            }
        }

        match program.failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

fn replay(steps: &[ScriptedStep], hook: &HookSlot) {
    for step in steps {
        let current = hook.read().clone();
        let Some(current) = current else {
            return;
        };
        if current.on_event(&step.frame, step.kind, &step.arg) == HookControl::Detach {
            return;
        }
    }
}
