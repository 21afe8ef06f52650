//! Per-function call counts and cumulative time for one run

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FunctionKey {
    filename: String,
    line_no: u32,
    func_name: String,
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    call_count: u64,
    total_time_us: u64,
}

/// Accumulates timings while enabled. Sees every call, filtered or not.
#[derive(Debug, Default)]
pub struct Profiler {
    enabled: AtomicBool,
    stacks: Mutex<HashMap<ThreadId, Vec<(FunctionKey, Instant)>>>,
    totals: Mutex<HashMap<FunctionKey, Totals>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self) {
        self.stacks.lock().clear();
        self.totals.lock().clear();
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn record_call(&self, filename: &str, line_no: u32, func_name: &str) {
        if !self.is_enabled() {
            return;
        }
        let key = FunctionKey {
            filename: filename.to_string(),
            line_no,
            func_name: func_name.to_string(),
        };
        let thread = std::thread::current().id();
        self.stacks
            .lock()
            .entry(thread)
            .or_default()
            .push((key, Instant::now()));
    }

    pub fn record_return(&self) {
        if !self.is_enabled() {
            return;
        }
        let thread = std::thread::current().id();
        let entry = self.stacks.lock().get_mut(&thread).and_then(Vec::pop);
        let Some((key, started)) = entry else {
            return;
        };
        let elapsed = started.elapsed().as_micros() as u64;
        let mut totals = self.totals.lock();
        let slot = totals.entry(key).or_default();
        slot.call_count += 1;
        slot.total_time_us += elapsed;
    }

    /// Snapshot of everything recorded so far, slowest functions first.
    pub fn stats(&self) -> ProfileStats {
        let mut functions: Vec<FunctionStats> = self
            .totals
            .lock()
            .iter()
            .map(|(key, totals)| FunctionStats {
                filename: key.filename.clone(),
                line_no: key.line_no,
                func_name: key.func_name.clone(),
                call_count: totals.call_count,
                total_time_us: totals.total_time_us,
            })
            .collect();
        functions.sort_by(|a, b| {
            b.total_time_us
                .cmp(&a.total_time_us)
                .then_with(|| a.filename.cmp(&b.filename))
                .then_with(|| a.line_no.cmp(&b.line_no))
        });
        ProfileStats { functions }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionStats {
    pub filename: String,
    pub line_no: u32,
    pub func_name: String,
    pub call_count: u64,
    pub total_time_us: u64,
}

/// Decoded form of the stats blob stored with a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub functions: Vec<FunctionStats>,
}

impl ProfileStats {
    pub fn to_blob(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(blob)
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn get(&self, func_name: &str) -> Option<&FunctionStats> {
        self.functions.iter().find(|f| f.func_name == func_name)
    }
}
