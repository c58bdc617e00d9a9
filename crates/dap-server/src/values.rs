//! Text forms of runtime values and memory references.

use condor_protocol::Variable;
use condor_runtime::{RuntimeValue, RuntimeVariable};

use crate::handles::{Handles, VariableContainer};

/// Interpret user-typed text (REPL, set-variable) as a runtime value.
///
/// `true`/`false` are booleans, quoted text is a string, numbers parse as integers or floats,
/// anything else stays a plain string.
pub fn parse_value(text: &str) -> RuntimeValue {
    let value = text.trim();
    match value {
        "true" => return RuntimeValue::Bool(true),
        "false" => return RuntimeValue::Bool(false),
        _ => {}
    }
    if let Some(quote) = value.chars().next().filter(|c| *c == '\'' || *c == '"') {
        let inner = &value[1..];
        return RuntimeValue::String(inner.strip_suffix(quote).unwrap_or(inner).to_string());
    }
    if let Ok(i) = value.parse::<i64>() {
        return RuntimeValue::Integer(i);
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() => RuntimeValue::Float(f),
        _ => RuntimeValue::String(value.to_string()),
    }
}

pub fn format_integer(value: i64, hex: bool) -> String {
    match (hex, value < 0) {
        (false, _) => value.to_string(),
        (true, false) => format!("0x{value:x}"),
        (true, true) => format!("-0x{:x}", value.unsigned_abs()),
    }
}

/// Display value and type name for a scalar; `None` for containers.
fn describe(value: &RuntimeValue, hex: bool) -> Option<(String, &'static str)> {
    match value {
        RuntimeValue::Integer(i) => Some((format_integer(*i, hex), "integer")),
        RuntimeValue::Float(f) => Some((f.to_string(), "float")),
        RuntimeValue::Bool(b) => Some((b.to_string(), "boolean")),
        RuntimeValue::String(s) => Some((format!("\"{s}\""), "string")),
        RuntimeValue::Children(_) | RuntimeValue::Mapping(_) => None,
    }
}

/// Protocol view of a runtime variable. Containers get a variables reference, strings get a
/// memory reference; both are session handles.
pub fn to_protocol_variable(
    var: &RuntimeVariable,
    hex: bool,
    handles: &mut Handles<VariableContainer>,
) -> Variable {
    let mut out = Variable {
        name: var.name.clone(),
        evaluate_name: Some(format!("${}", var.name)),
        ..Variable::default()
    };
    match describe(&var.value, hex) {
        Some((value, type_)) => {
            out.value = value;
            out.type_ = Some(type_.to_string());
            if var.memory().is_some() {
                let handle = handles.lookup_or_create(VariableContainer::Variable(var.clone()));
                out.memory_reference = Some(handle.to_string());
            }
        }
        None => {
            out.value = "Object".to_string();
            out.type_ = Some("object".to_string());
            out.variables_reference =
                handles.lookup_or_create(VariableContainer::Variable(var.clone()));
        }
    }
    out
}

/// Instruction pointer reference for a frame: `mem0x0000002a`.
pub fn format_address(address: i64) -> String {
    let sign = if address < 0 { "-" } else { "" };
    format!("mem{sign}0x{:08x}", address.unsigned_abs())
}

/// A parsed `mem...` reference, remembering its radix and digit width so that addresses can be
/// rendered back in the same style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReference {
    pub address: i64,
    pub hex: bool,
    pub width: usize,
}

impl MemoryReference {
    pub fn parse(reference: &str) -> Option<Self> {
        let raw = reference.strip_prefix("mem").unwrap_or(reference);
        let (negative, raw) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (magnitude, hex, width) = match raw.strip_prefix("0x") {
            Some(digits) => (i64::from_str_radix(digits, 16).ok()?, true, digits.len()),
            None => (raw.parse::<i64>().ok()?, false, raw.len()),
        };
        Some(Self {
            address: if negative { -magnitude } else { magnitude },
            hex,
            width,
        })
    }

    /// Render `address` with this reference's radix and padding.
    pub fn render(&self, address: i64) -> String {
        let sign = if address < 0 { "-" } else { "" };
        let magnitude = address.unsigned_abs();
        let width = self.width;
        if self.hex {
            format!("{sign}0x{magnitude:0width$x}")
        } else {
            format!("{sign}{magnitude:0width$}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_user_values() {
        assert_eq!(parse_value(" true "), RuntimeValue::Bool(true));
        assert_eq!(parse_value("'abc'"), RuntimeValue::String("abc".to_string()));
        assert_eq!(parse_value("\"x"), RuntimeValue::String("x".to_string()));
        assert_eq!(parse_value("42"), RuntimeValue::Integer(42));
        assert_eq!(parse_value("2.5"), RuntimeValue::Float(2.5));
        assert_eq!(parse_value("inf"), RuntimeValue::String("inf".to_string()));
        assert_eq!(parse_value("hello"), RuntimeValue::String("hello".to_string()));
    }

    #[test]
    fn integers_honor_hex_formatting() {
        assert_eq!(format_integer(255, true), "0xff");
        assert_eq!(format_integer(-16, true), "-0x10");
        assert_eq!(format_integer(255, false), "255");
    }

    #[test]
    fn containers_and_strings_get_handles() {
        let mut handles = Handles::default();
        let list = RuntimeVariable::new(
            "items",
            RuntimeValue::Children(vec![RuntimeVariable::new("[0]", RuntimeValue::Integer(1))]),
        );
        let var = to_protocol_variable(&list, false, &mut handles);
        assert_eq!(var.value, "Object");
        assert!(var.variables_reference > 0);
        assert_eq!(
            to_protocol_variable(&list, false, &mut handles).variables_reference,
            var.variables_reference
        );

        let text = RuntimeVariable::new("s", RuntimeValue::String("hi".to_string()));
        let var = to_protocol_variable(&text, false, &mut handles);
        assert_eq!(var.value, "\"hi\"");
        assert_eq!(var.variables_reference, 0);
        assert!(var.memory_reference.is_some());
        assert_eq!(var.evaluate_name.as_deref(), Some("$s"));
    }

    #[test]
    fn memory_references_round_trip_their_style() {
        assert_eq!(format_address(42), "mem0x0000002a");
        let hex = MemoryReference::parse("mem0x0000002a").expect("hex reference");
        assert_eq!(hex.address, 42);
        assert_eq!(hex.render(43), "0x0000002b");

        let dec = MemoryReference::parse("mem0100").expect("decimal reference");
        assert_eq!(dec.address, 100);
        assert_eq!(dec.render(-3), "-0003");
        assert_eq!(MemoryReference::parse("memzz"), None);
    }
}
