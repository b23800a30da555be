// SPDX-License-Identifier: MIT

//! Restricted evaluators: the condition grammar (§4.4.3, used by
//! `conditional` and `Step.condition`) and the per-item expression
//! language `map`/`filter`/`reduce` bind `$item`/`$index`/`$acc` into
//! (§4.4.2's `transform` step). Neither exposes host functions or
//! globals — deliberately small grammars, not a general interpreter.

use crate::substitution::lookup;
use serde_json::Value;
use std::collections::HashMap;

const OPERATORS: [&str; 8] = ["===", "!==", "==", "!=", ">=", "<=", ">", "<"];

fn split_comparison(s: &str) -> Option<(&str, &str, &str)> {
    for op in OPERATORS {
        if let Some(idx) = s.find(op) {
            return Some((s[..idx].trim(), op, s[idx + op.len()..].trim()));
        }
    }
    None
}

fn parse_literal(s: &str) -> Option<Value> {
    match s {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "null" => return Some(Value::Null),
        _ => {}
    }
    if let Ok(n) = s.parse::<f64>() {
        return serde_json::Number::from_f64(n).map(Value::Number);
    }
    let quoted = (s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\''));
    if quoted && s.len() >= 2 {
        return Some(Value::String(s[1..s.len() - 1].to_string()));
    }
    None
}

fn apply_op(op: &str, lhs: &Value, rhs: &Value) -> bool {
    match op {
        "==" | "===" => values_equal(lhs, rhs),
        "!=" | "!==" => !values_equal(lhs, rhs),
        ">" | ">=" | "<" | "<=" => {
            let ordering = match (lhs.as_f64(), rhs.as_f64()) {
                (Some(l), Some(r)) => l.partial_cmp(&r),
                _ => stringify_cmp(lhs).partial_cmp(&stringify_cmp(rhs)),
            };
            match (op, ordering) {
                (">", Some(o)) => o == std::cmp::Ordering::Greater,
                (">=", Some(o)) => o != std::cmp::Ordering::Less,
                ("<", Some(o)) => o == std::cmp::Ordering::Less,
                ("<=", Some(o)) => o != std::cmp::Ordering::Greater,
                _ => false,
            }
        }
        _ => false,
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => lhs == rhs,
    }
}

fn stringify_cmp(v: &Value) -> String {
    crate::substitution::stringify(v)
}

fn truthy(value: &Value) -> bool {
    let s = crate::substitution::stringify(value);
    !s.is_empty() && s != "false" && s != "0"
}

fn is_bare_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// Evaluate a `Step.condition` or `conditional` step's condition string
/// against run context. Malformed input evaluates to `false`.
pub fn evaluate_condition(condition: &str, context: &HashMap<String, Value>) -> bool {
    let trimmed = condition.trim();
    match trimmed {
        "true" => return true,
        "false" => return false,
        _ => {}
    }
    if let Some((lhs, op, rhs)) = split_comparison(trimmed) {
        let lhs = resolve_context_operand(lhs, context);
        let rhs = resolve_context_operand(rhs, context);
        return match (lhs, rhs) {
            (Some(l), Some(r)) => apply_op(op, &l, &r),
            _ => false,
        };
    }
    if is_bare_identifier(trimmed) {
        let value = lookup(context, trimmed).cloned().unwrap_or(Value::String(String::new()));
        return truthy(&value);
    }
    false
}

fn resolve_context_operand(token: &str, context: &HashMap<String, Value>) -> Option<Value> {
    if let Some(v) = parse_literal(token) {
        return Some(v);
    }
    token.strip_prefix("${context.").and_then(|r| r.strip_suffix('}')).map(|path| {
        lookup(context, path).cloned().unwrap_or(Value::String(String::new()))
    })
}

/// Evaluate a `map`/`filter`/`reduce` expression against `$item`,
/// `$index`, `$acc` bindings. Returns `None` on malformed input so the
/// caller can apply the per-operation fallback (identity/include/
/// pass-through) described in §4.4.2.
pub fn evaluate_expression(expr: &str, bindings: &HashMap<String, Value>) -> Option<Value> {
    let expr = expr.trim();
    if let Some((lhs, op, rhs)) = split_comparison(expr) {
        let l = resolve_binding_operand(lhs, bindings)?;
        let r = resolve_binding_operand(rhs, bindings)?;
        return Some(Value::Bool(apply_op(op, &l, &r)));
    }
    for op in ['+', '-', '*', '/'] {
        if let Some(idx) = find_arithmetic_op(expr, op) {
            let l = resolve_binding_operand(expr[..idx].trim(), bindings)?.as_f64()?;
            let r = resolve_binding_operand(expr[idx + 1..].trim(), bindings)?.as_f64()?;
            let result = match op {
                '+' => l + r,
                '-' => l - r,
                '*' => l * r,
                '/' => l / r,
                _ => unreachable!(),
            };
            return serde_json::Number::from_f64(result).map(Value::Number);
        }
    }
    resolve_binding_operand(expr, bindings)
}

/// First occurrence of `op` not at position 0 (so a leading `-` sign on a
/// numeric literal isn't mistaken for subtraction).
fn find_arithmetic_op(expr: &str, op: char) -> Option<usize> {
    expr.char_indices().skip(1).find(|(_, c)| *c == op).map(|(i, _)| i)
}

fn resolve_binding_operand(token: &str, bindings: &HashMap<String, Value>) -> Option<Value> {
    if let Some(v) = parse_literal(token) {
        return Some(v);
    }
    if let Some(rest) = token.strip_prefix('$') {
        let mut parts = rest.split('.');
        let root = parts.next()?;
        let mut current = bindings.get(root)?;
        for part in parts {
            current = current.get(part)?;
        }
        return Some(current.clone());
    }
    None
}

#[cfg(test)]
#[path = "eval_tests.rs"]
mod tests;
