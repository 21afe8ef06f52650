use crate::value::Value;

/// Module the runtime uses for its own bootstrap machinery
pub const BOOTSTRAP_NAMESPACE: &str = "__future__";

/// Keep only the locals worth recording at a step.
pub fn interesting_locals(locals: Vec<(String, Value)>) -> Vec<(String, Value)> {
    locals
        .into_iter()
        .filter(|(name, value)| is_interesting(name, value))
        .collect()
}

fn is_interesting(name: &str, value: &Value) -> bool {
    if name.starts_with("__") || name.ends_with("__") {
        return false;
    }
    if value.is_code_like() {
        return false;
    }
    value.type_module() != Some(BOOTSTRAP_NAMESPACE)
}
