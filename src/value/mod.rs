//! Runtime values observed in traced frames
//!
//! Values mirror what an interpreter exposes through frame introspection:
//! scalars, containers, user objects and a handful of "live code" kinds that
//! the tracer filters out. Containers and objects are shared (`Arc`) so a
//! value graph can be self-referential, the same way it can be inside the
//! traced program.

mod encode;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub use encode::{encode, encode_locals, MAX_ENCODE_DEPTH};

/// Shared, mutable container storage
pub type Shared<T> = Arc<RwLock<T>>;

/// A value captured from a traced frame
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Value>),
    List(Shared<Vec<Value>>),
    Dict(Shared<Vec<(Value, Value)>>),
    Object(Arc<Object>),
    Traceback(Vec<TracebackFrame>),
    Module { name: String },
    Function { name: String },
    Method { owner: String, name: String },
    Class { module: String, name: String },
    Code { name: String },
    /// A handle the runtime could only describe, never inspect
    Opaque { type_name: String, repr: String },
}

impl Value {
    pub fn str(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(RwLock::new(items)))
    }

    pub fn dict(entries: Vec<(Value, Value)>) -> Self {
        Value::Dict(Arc::new(RwLock::new(entries)))
    }

    /// Append to a list value. No-op for anything else.
    pub fn push(&self, item: Value) {
        if let Value::List(items) = self {
            items.write().push(item);
        }
    }

    /// Whether the value is live code or an introspection artifact rather
    /// than plain data.
    pub fn is_code_like(&self) -> bool {
        matches!(
            self,
            Value::Module { .. }
                | Value::Function { .. }
                | Value::Method { .. }
                | Value::Class { .. }
                | Value::Code { .. }
        )
    }

    /// Module the value's type originates from, when known.
    pub fn type_module(&self) -> Option<&str> {
        match self {
            Value::Object(obj) => Some(obj.module.as_str()),
            Value::Class { module, .. } => Some(module.as_str()),
            _ => None,
        }
    }

    /// Debug representation. Never fails and never recurses forever.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        let mut seen = HashSet::new();
        write_repr(self, &mut out, &mut seen, 0);
        out
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// A user object: a named type plus a bag of attributes
pub struct Object {
    pub type_name: String,
    pub module: String,
    /// Constructor arguments, present only for exception objects
    pub exception_args: Option<Vec<Value>>,
    attrs: RwLock<Vec<(String, Value)>>,
}

impl Object {
    pub fn new(type_name: impl Into<String>, module: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            type_name: type_name.into(),
            module: module.into(),
            exception_args: None,
            attrs: RwLock::new(Vec::new()),
        })
    }

    pub fn exception(
        type_name: impl Into<String>,
        module: impl Into<String>,
        args: Vec<Value>,
    ) -> Arc<Self> {
        Arc::new(Self {
            type_name: type_name.into(),
            module: module.into(),
            exception_args: Some(args),
            attrs: RwLock::new(Vec::new()),
        })
    }

    /// Set or replace an attribute.
    pub fn set_attr(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let mut attrs = self.attrs.write();
        match attrs.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => attrs.push((name, value)),
        }
    }

    /// Snapshot of the attributes in definition order.
    pub fn attrs(&self) -> Vec<(String, Value)> {
        self.attrs.read().clone()
    }

    pub fn is_exception(&self) -> bool {
        self.exception_args.is_some()
    }
}

/// One frame of a flattened traceback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FrameTuple", into = "FrameTuple")]
pub struct TracebackFrame {
    pub filename: String,
    pub line_no: u32,
    pub func_name: String,
    pub text: String,
}

type FrameTuple = (String, u32, String, String);

impl TracebackFrame {
    pub fn new(
        filename: impl Into<String>,
        line_no: u32,
        func_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            line_no,
            func_name: func_name.into(),
            text: text.into(),
        }
    }
}

impl From<FrameTuple> for TracebackFrame {
    fn from((filename, line_no, func_name, text): FrameTuple) -> Self {
        Self {
            filename,
            line_no,
            func_name,
            text,
        }
    }
}

impl From<TracebackFrame> for FrameTuple {
    fn from(frame: TracebackFrame) -> Self {
        (frame.filename, frame.line_no, frame.func_name, frame.text)
    }
}

const MAX_REPR_DEPTH: usize = 16;

fn shared_addr<T>(shared: &Arc<T>) -> usize {
    Arc::as_ptr(shared) as *const () as usize
}

fn write_repr(value: &Value, out: &mut String, seen: &mut HashSet<usize>, depth: usize) {
    if depth > MAX_REPR_DEPTH {
        out.push_str("...");
        return;
    }
    match value {
        Value::None => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&format!("{f:?}")),
        Value::Str(s) => out.push_str(&format!("{s:?}")),
        Value::Bytes(bytes) => out.push_str(&format!("b\"{}\"", bytes.escape_ascii())),
        Value::Tuple(items) => {
            out.push('(');
            write_items(items.iter(), out, seen, depth);
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Value::List(items) => {
            let addr = shared_addr(items);
            if !seen.insert(addr) {
                out.push_str("[...]");
                return;
            }
            out.push('[');
            let snapshot = items.read().clone();
            write_items(snapshot.iter(), out, seen, depth);
            out.push(']');
            seen.remove(&addr);
        }
        Value::Dict(entries) => {
            let addr = shared_addr(entries);
            if !seen.insert(addr) {
                out.push_str("{...}");
                return;
            }
            out.push('{');
            let snapshot = entries.read().clone();
            for (idx, (key, val)) in snapshot.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_repr(key, out, seen, depth + 1);
                out.push_str(": ");
                write_repr(val, out, seen, depth + 1);
            }
            out.push('}');
            seen.remove(&addr);
        }
        Value::Object(obj) => {
            out.push_str(&format!(
                "<{}.{} object at {:#x}>",
                obj.module,
                obj.type_name,
                shared_addr(obj)
            ));
        }
        Value::Traceback(frames) => {
            out.push_str(&format!("<traceback with {} frames>", frames.len()));
        }
        Value::Module { name } => out.push_str(&format!("<module '{name}'>")),
        Value::Function { name } => out.push_str(&format!("<function {name}>")),
        Value::Method { owner, name } => out.push_str(&format!("<method {owner}.{name}>")),
        Value::Class { module, name } => out.push_str(&format!("<class '{module}.{name}'>")),
        Value::Code { name } => out.push_str(&format!("<code object {name}>")),
        Value::Opaque { repr, .. } => out.push_str(repr),
    }
}

fn write_items<'a>(
    items: impl Iterator<Item = &'a Value>,
    out: &mut String,
    seen: &mut HashSet<usize>,
    depth: usize,
) {
    for (idx, item) in items.enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        write_repr(item, out, seen, depth + 1);
    }
}
