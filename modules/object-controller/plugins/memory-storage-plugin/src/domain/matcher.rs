//! Evaluation of rewritten queries against stored rows.

use std::cmp::Ordering;

use object_controller_sdk::{Document, StorageError};
use regex::RegexBuilder;
use serde_json::Value;

/// Value at a dotted `path`, descending through nested objects.
#[must_use]
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Whether `doc` satisfies every constraint of `query`.
///
/// # Errors
///
/// `Unsupported` for operators this backend cannot evaluate, `Backend` for
/// malformed constraints.
pub fn matches(doc: &Document, query: &Document) -> Result<bool, StorageError> {
    for (key, constraint) in query {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for branch in branches(key, constraint)? {
                    if !matches(doc, branch)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_branch(doc, key, constraint)?,
            "$nor" => !any_branch(doc, key, constraint)?,
            other if other.starts_with('$') => {
                return Err(StorageError::Unsupported(format!(
                    "top-level operator {other}"
                )));
            }
            path => field_matches(lookup(doc, path), constraint)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_branch(doc: &Document, key: &str, constraint: &Value) -> Result<bool, StorageError> {
    for branch in branches(key, constraint)? {
        if matches(doc, branch)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn branches<'a>(key: &str, constraint: &'a Value) -> Result<Vec<&'a Document>, StorageError> {
    let items = constraint
        .as_array()
        .ok_or_else(|| StorageError::Backend(format!("{key} expects an array")))?;
    items
        .iter()
        .map(|b| {
            b.as_object()
                .ok_or_else(|| StorageError::Backend(format!("{key} entries must be objects")))
        })
        .collect()
}

fn is_operator_object(constraint: &Value) -> bool {
    constraint
        .as_object()
        .is_some_and(|o| !o.is_empty() && o.keys().all(|k| k.starts_with('$')))
}

fn field_matches(value: Option<&Value>, constraint: &Value) -> Result<bool, StorageError> {
    let Some(ops) = constraint.as_object().filter(|_| is_operator_object(constraint)) else {
        return Ok(equals(value, constraint));
    };
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(value, arg),
            "$ne" => !equals(value, arg),
            "$in" => in_set(value, op, arg)?,
            "$nin" => !in_set(value, op, arg)?,
            "$all" => contains_all(value, arg)?,
            "$exists" => value.is_some() == arg.as_bool().unwrap_or(false),
            "$gt" => compare(value, arg).is_some_and(Ordering::is_gt),
            "$gte" => compare(value, arg).is_some_and(Ordering::is_ge),
            "$lt" => compare(value, arg).is_some_and(Ordering::is_lt),
            "$lte" => compare(value, arg).is_some_and(Ordering::is_le),
            "$regex" => regex_matches(value, arg, ops.get("$options"))?,
            "$options" => true,
            other => {
                return Err(StorageError::Unsupported(format!("query operator {other}")));
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality with array-contains semantics; `null` matches a missing field.
fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(v) => v == expected,
    }
}

fn in_set(value: Option<&Value>, op: &str, arg: &Value) -> Result<bool, StorageError> {
    let candidates = arg
        .as_array()
        .ok_or_else(|| StorageError::Backend(format!("{op} expects an array")))?;
    Ok(candidates.iter().any(|c| equals(value, c)))
}

fn contains_all(value: Option<&Value>, arg: &Value) -> Result<bool, StorageError> {
    let required = arg
        .as_array()
        .ok_or_else(|| StorageError::Backend("$all expects an array".to_owned()))?;
    Ok(match value {
        Some(Value::Array(items)) => required.iter().all(|r| items.contains(r)),
        _ => false,
    })
}

fn regex_matches(
    value: Option<&Value>,
    pattern: &Value,
    options: Option<&Value>,
) -> Result<bool, StorageError> {
    let Some(pattern) = pattern.as_str() else {
        return Err(StorageError::Backend("$regex expects a string".to_owned()));
    };
    let options = options.and_then(Value::as_str).unwrap_or_default();
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .ignore_whitespace(options.contains('x'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|e| StorageError::Backend(format!("invalid $regex: {e}")))?;
    Ok(value.and_then(Value::as_str).is_some_and(|s| regex.is_match(s)))
}

/// `{"__type": "Date", "iso": ...}` compares by its ISO string.
fn date_iso(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    if obj.get("__type").and_then(Value::as_str) != Some("Date") {
        return None;
    }
    obj.get("iso").and_then(Value::as_str)
}

/// Ordering of two scalar values of the same kind.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => Some(date_iso(a)?.cmp(date_iso(b)?)),
    }
}

fn compare(value: Option<&Value>, arg: &Value) -> Option<Ordering> {
    compare_values(value?, arg)
}
