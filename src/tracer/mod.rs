//! Execution capture: hooks a runtime and reports every traced step
//!
//! The engine decides per notification whether the location is recorded,
//! correlates calls with their returns, and hands records to an
//! [`EventSink`](crate::event::EventSink).

mod correlator;
mod engine;
mod filter;
mod locals;
mod profile;
mod runtime;
pub mod scripted;
mod suspend;

pub use correlator::{CallCorrelator, CorrelationError};
pub use engine::{ExecutionTracer, RunOutcome, RunState, TracerError};
pub use filter::{canonicalize, is_synthetic, FilterConfig, PathFilter};
pub use locals::{interesting_locals, BOOTSTRAP_NAMESPACE};
pub use profile::{FunctionStats, ProfileStats, Profiler};
pub use runtime::{
    ExecutionHook, FrameView, HookControl, LaunchError, ProgramFailure, Runtime, RuntimeLayout,
    TargetProgram,
};
pub use scripted::{ScriptedFrame, ScriptedProgram, ScriptedRuntime, ScriptedThread};
pub use suspend::{hooks_suspended, suspend_hooks, HookSuspension};
