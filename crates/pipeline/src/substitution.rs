// SPDX-License-Identifier: MIT

//! Variable substitution (§4.4.3): `${context.a.b.c}` → the stringified
//! value at that path, missing → empty string. Only `context.*` resolves;
//! anything else inside `${...}` is left literal.

use serde_json::Value;
use std::collections::HashMap;

pub fn lookup<'a>(context: &'a HashMap<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = context.get(first)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}

pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Replace every `${context.path}` marker in `template`. Idempotent on
/// strings with no markers.
pub fn substitute(template: &str, context: &HashMap<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let inner = &after[..end];
                match inner.strip_prefix("context.") {
                    Some(path) => {
                        let value = lookup(context, path).cloned().unwrap_or(Value::String(String::new()));
                        out.push_str(&stringify(&value));
                    }
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Recursively substitute `${context.*}` markers inside a JSON tree
/// (webhook headers/body, sub-pipeline inputs, wait's `until`).
pub fn substitute_value(value: &Value, context: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => Value::String(substitute(s, context)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_value(v, context)).collect()),
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), substitute_value(v, context))).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
#[path = "substitution_tests.rs"]
mod tests;
