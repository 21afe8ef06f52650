//! Fallback chain that turns runtime values into JSON
//!
//! Anything JSON can hold natively is kept as is. Tracebacks become frame
//! tuples, objects become attribute maps tagged with `__class__` and
//! `__module__`, and whatever is left (live code, opaque handles, byte
//! strings, non-finite floats, back-references) degrades to its debug
//! representation instead of failing the event.

use std::collections::HashSet;

use serde_json::{Map, Number, Value as JsonValue};

use super::{shared_addr, Value};

/// Nesting depth after which values are replaced by their representation
pub const MAX_ENCODE_DEPTH: usize = 32;

/// Encode one value.
pub fn encode(value: &Value) -> JsonValue {
    Encoder::default().encode(value, 0)
}

/// Encode a `name -> value` list into a JSON object.
pub fn encode_locals(locals: &[(String, Value)]) -> Map<String, JsonValue> {
    let mut encoder = Encoder::default();
    locals
        .iter()
        .map(|(name, value)| (name.clone(), encoder.encode(value, 0)))
        .collect()
}

#[derive(Default)]
struct Encoder {
    /// Shared containers on the current descent path
    visiting: HashSet<usize>,
}

impl Encoder {
    fn encode(&mut self, value: &Value, depth: usize) -> JsonValue {
        if depth > MAX_ENCODE_DEPTH {
            return JsonValue::String(value.repr());
        }
        match value {
            Value::None => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(value.repr())),
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::Tuple(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.encode(item, depth + 1))
                    .collect(),
            ),
            Value::List(items) => {
                let addr = shared_addr(items);
                if !self.visiting.insert(addr) {
                    return JsonValue::String(value.repr());
                }
                let snapshot = items.read().clone();
                let encoded = snapshot
                    .iter()
                    .map(|item| self.encode(item, depth + 1))
                    .collect();
                self.visiting.remove(&addr);
                JsonValue::Array(encoded)
            }
            Value::Dict(entries) => {
                let addr = shared_addr(entries);
                if !self.visiting.insert(addr) {
                    return JsonValue::String(value.repr());
                }
                let snapshot = entries.read().clone();
                let mut map = Map::new();
                for (key, val) in &snapshot {
                    map.insert(stringify_key(key), self.encode(val, depth + 1));
                }
                self.visiting.remove(&addr);
                JsonValue::Object(map)
            }
            Value::Object(obj) => {
                let addr = shared_addr(obj);
                if !self.visiting.insert(addr) {
                    return JsonValue::String(value.repr());
                }
                let mut map = Map::new();
                for (name, attr) in obj.attrs() {
                    if name.starts_with('_') {
                        continue;
                    }
                    let encoded = self.encode(&attr, depth + 1);
                    map.insert(name, encoded);
                }
                if let Some(args) = &obj.exception_args {
                    if !map.contains_key("args") {
                        let encoded = args
                            .iter()
                            .map(|arg| self.encode(arg, depth + 1))
                            .collect();
                        map.insert("args".to_string(), JsonValue::Array(encoded));
                    }
                }
                map.insert(
                    "__class__".to_string(),
                    JsonValue::String(obj.type_name.clone()),
                );
                map.insert(
                    "__module__".to_string(),
                    JsonValue::String(obj.module.clone()),
                );
                self.visiting.remove(&addr);
                JsonValue::Object(map)
            }
            Value::Traceback(frames) => {
                serde_json::to_value(frames).unwrap_or_else(|_| JsonValue::String(value.repr()))
            }
            Value::Bytes(_)
            | Value::Module { .. }
            | Value::Function { .. }
            | Value::Method { .. }
            | Value::Class { .. }
            | Value::Code { .. }
            | Value::Opaque { .. } => JsonValue::String(value.repr()),
        }
    }
}

fn stringify_key(key: &Value) -> String {
    match key {
        Value::Str(s) => s.clone(),
        other => other.repr(),
    }
}
