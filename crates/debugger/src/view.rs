use serde_json::{Map, Value};

const CALLABLE_MARKERS: &[&str] = &["<function ", "<built-in function", "<bound method"];

/// Which slice of a probed scope the caller wants to see.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VariableView {
    /// Data values; callables are excluded.
    Variables,
    /// Only callables (functions, builtins, bound methods).
    Methods,
}

impl VariableView {
    pub fn admits(self, value: &Value) -> bool {
        match self {
            VariableView::Variables => !looks_callable(value),
            VariableView::Methods => looks_callable(value),
        }
    }

    /// Keep the entries this view admits, preserving order.
    pub fn filter(self, map: Map<String, Value>) -> Map<String, Value> {
        map.into_iter().filter(|(_, v)| self.admits(v)).collect()
    }
}

/// A value whose text form is the repr of a function object.
pub fn looks_callable(value: &Value) -> bool {
    match value {
        Value::String(text) => CALLABLE_MARKERS.iter().any(|m| text.contains(m)),
        _ => false,
    }
}
