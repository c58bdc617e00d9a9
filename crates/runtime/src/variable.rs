use serde_json::{Map, Value};

/// Value of a runtime variable as reported by the target.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    String(String),
    /// List or tuple items, named `[i]`.
    Children(Vec<RuntimeVariable>),
    /// Mapping entries, named by key.
    Mapping(Vec<RuntimeVariable>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeVariable {
    pub name: String,
    pub value: RuntimeValue,
}

impl RuntimeVariable {
    pub fn new(name: impl Into<String>, value: RuntimeValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Convert one entry of a probed scope. `null` becomes the string `None`.
    pub fn from_json(name: impl Into<String>, value: &Value) -> Self {
        let value = match value {
            Value::Null => RuntimeValue::String("None".to_string()),
            Value::Bool(b) => RuntimeValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => RuntimeValue::Integer(i),
                None => RuntimeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => RuntimeValue::String(s.clone()),
            Value::Array(items) => RuntimeValue::Children(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| Self::from_json(format!("[{i}]"), v))
                    .collect(),
            ),
            Value::Object(map) => RuntimeValue::Mapping(Self::from_scope(map)),
        };
        Self {
            name: name.into(),
            value,
        }
    }

    /// Convert a whole probed scope, keeping its key order.
    pub fn from_scope(map: &Map<String, Value>) -> Vec<Self> {
        map.iter().map(|(k, v)| Self::from_json(k, v)).collect()
    }

    /// Bytes exposed as this variable's memory: the UTF-8 text of string values.
    pub fn memory(&self) -> Option<&[u8]> {
        match &self.value {
            RuntimeValue::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Replace the contents of a string variable from raw bytes (lossy UTF-8).
    pub fn set_memory(&mut self, offset: usize, data: &[u8]) -> usize {
        let RuntimeValue::String(s) = &mut self.value else {
            return 0;
        };
        let mut bytes = s.as_bytes().to_vec();
        let offset = offset.min(bytes.len());
        let end = offset + data.len();
        if end > bytes.len() {
            bytes.resize(end, 0);
        }
        bytes[offset..end].copy_from_slice(data);
        *s = String::from_utf8_lossy(&bytes).into_owned();
        data.len()
    }

    /// Python source spelling of the value, used when assigning it back into the target.
    pub fn to_python_literal(&self) -> String {
        value_to_python(&self.value)
    }
}

fn value_to_python(value: &RuntimeValue) -> String {
    match value {
        RuntimeValue::Integer(i) => i.to_string(),
        RuntimeValue::Float(f) if f.is_nan() => "float('nan')".to_string(),
        RuntimeValue::Float(f) if f.is_infinite() => {
            let sign = if *f < 0.0 { "-" } else { "" };
            format!("{sign}float('inf')")
        }
        RuntimeValue::Float(f) => format!("{f:?}"),
        RuntimeValue::Bool(true) => "True".to_string(),
        RuntimeValue::Bool(false) => "False".to_string(),
        RuntimeValue::String(s) if s == "None" => "None".to_string(),
        RuntimeValue::String(s) => python_string(s),
        RuntimeValue::Children(items) => {
            let inner: Vec<String> = items.iter().map(|v| value_to_python(&v.value)).collect();
            format!("[{}]", inner.join(", "))
        }
        RuntimeValue::Mapping(entries) => {
            let inner: Vec<String> = entries
                .iter()
                .map(|v| format!("{}: {}", python_string(&v.name), value_to_python(&v.value)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

/// Single-quoted Python string literal for `s`.
fn python_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
