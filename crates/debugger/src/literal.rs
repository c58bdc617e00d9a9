//! Conversion of Python literal text (as printed by `repr`/`str`) into JSON values.
//!
//! The probe prints a dict through `str()`, which yields single-quoted strings, `None`,
//! `True`/`False` and occasionally trailing commas. A small scanner rewrites those tokens
//! outside of string literals and re-escapes string contents for JSON.

use serde_json::{Map, Value};

use crate::chrome::strip_prompts;
use crate::error::{DebuggerError, Result};

/// Key of the entry every probe answer opens with; its value is the probe id.
pub const PROBE_TAG: &str = "__condor_probe__";

/// Find a probe answer on an output line.
///
/// Returns the probe id and the remaining dict literal, or `None` for anything that is not a
/// quoted dict opening with the [`PROBE_TAG`] entry.
pub fn tagged_answer(line: &str) -> Option<(u64, String)> {
    let literal = extract_probe_literal(line)?;
    let rest = literal
        .strip_prefix("{'")?
        .strip_prefix(PROBE_TAG)?
        .strip_prefix("': ")?;
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let id = rest[..digits].parse().ok()?;
    let rest = rest[digits..].trim_start();
    let body = match rest.strip_prefix(',') {
        Some(fields) => format!("{{{}", fields.trim_start()),
        None if rest.starts_with('}') => format!("{{{rest}"),
        None => return None,
    };
    Some((id, body))
}

/// A quoted literal whose body starts with `{`, with the wrapping quote removed.
fn extract_probe_literal(line: &str) -> Option<String> {
    let line = strip_prompts(line).trim();
    let quote = line.chars().next().filter(|q| *q == '\'' || *q == '"')?;
    let rest = &line[quote.len_utf8()..];
    if !rest.starts_with('{') {
        return None;
    }
    let inner = rest.strip_suffix(quote).unwrap_or(rest);
    Some(unescape_outer(inner, quote))
}

/// Undo the escaping `repr` applied for the wrapping quote and for backslashes.
fn unescape_outer(inner: &str, quote: char) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(&next) if next == quote || next == '\\' => {
                    out.push(next);
                    chars.next();
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

/// Rewrite a Python literal into JSON text.
pub fn repair_literal(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => i = copy_string(&chars, i, &mut out),
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some(']') | Some('}')) {
                    out.push(',');
                }
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push_str(match word.as_str() {
                    "None" => "null",
                    "True" => "true",
                    "False" => "false",
                    other => other,
                });
            }
            '(' => {
                out.push('[');
                i += 1;
            }
            ')' => {
                out.push(']');
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Copy the Python string literal starting at `start` as a JSON string; returns the next index.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    out.push('"');
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            out.push('"');
            return i + 1;
        }
        match c {
            '\\' if i + 1 < chars.len() => {
                let esc = chars[i + 1];
                i += 2;
                match esc {
                    '\'' => out.push('\''),
                    '"' => out.push_str("\\\""),
                    'x' if i + 2 <= chars.len() => {
                        out.push_str("\\u00");
                        out.extend(&chars[i..i + 2]);
                        i += 2;
                    }
                    'n' | 't' | 'r' | 'b' | 'f' | '\\' | 'u' | '/' => {
                        out.push('\\');
                        out.push(esc);
                    }
                    other => {
                        // unknown escape: keep it literally
                        out.push_str("\\\\");
                        out.push(other);
                    }
                }
                continue;
            }
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
        i += 1;
    }
    // unterminated; close it so the caller gets a parse error with context rather than a panic
    out.push('"');
    i
}

/// Repair and parse a probe literal into a mapping.
pub fn try_parse_literal(raw: &str) -> Result<Map<String, Value>> {
    let repaired = repair_literal(raw.trim());
    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DebuggerError::parse(format!(
            "expected a mapping, got {}",
            type_name(&other)
        ))),
        Err(err) => Err(DebuggerError::parse(format!("{err} in {repaired:?}"))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
