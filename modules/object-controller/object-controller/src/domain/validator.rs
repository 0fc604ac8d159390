//! Structural validation of query trees.

use object_controller_sdk::{ACL_FIELD, Document, Query};
use serde_json::Value;

use super::error::DomainError;
use super::keys::{is_special_query_key, is_valid_query_key};

/// Validates `query`, recursing into `$and` / `$or` / `$nor`.
///
/// Unless `skip_or_restructuring` is set, top-level siblings of `$or` that do
/// not collide with a key of any branch and carry no `$near`/`$nearSphere`
/// are moved into every branch.
///
/// # Errors
///
/// - `InvalidQuery` for a top-level `ACL` key, malformed combinators or
///   regex options outside `imxs`
/// - `InvalidKeyName` for field names failing the identifier pattern
pub fn validate_query(query: Query, skip_or_restructuring: bool) -> Result<Query, DomainError> {
    let mut map = query.into_inner();
    validate_map(&mut map, skip_or_restructuring)?;
    Ok(map.into())
}

fn validate_map(query: &mut Document, skip: bool) -> Result<(), DomainError> {
    if query.contains_key(ACL_FIELD) {
        return Err(DomainError::invalid_query("Cannot query on ACL."));
    }

    if let Some(or) = query.get_mut("$or") {
        let Value::Array(branches) = or else {
            return Err(DomainError::invalid_query(
                "Bad $or format - use an array value.",
            ));
        };
        validate_branches(branches, skip, "$or")?;
        if !skip {
            push_siblings_into_or(query);
            if let Some(Value::Array(branches)) = query.get_mut("$or") {
                validate_branches(branches, skip, "$or")?;
            }
        }
    }

    if let Some(and) = query.get_mut("$and") {
        let Value::Array(branches) = and else {
            return Err(DomainError::invalid_query(
                "Bad $and format - use an array value.",
            ));
        };
        validate_branches(branches, skip, "$and")?;
    }

    if let Some(nor) = query.get_mut("$nor") {
        match nor {
            Value::Array(branches) if !branches.is_empty() => {
                validate_branches(branches, skip, "$nor")?;
            }
            _ => {
                return Err(DomainError::invalid_query(
                    "Bad $nor format - use an array of at least 1 value.",
                ));
            }
        }
    }

    for (key, value) in &*query {
        check_regex_options(value)?;
        if !is_special_query_key(key) && !is_valid_query_key(key) {
            return Err(DomainError::invalid_key(key));
        }
    }
    Ok(())
}

fn validate_branches(branches: &mut [Value], skip: bool, op: &str) -> Result<(), DomainError> {
    for branch in branches {
        let Value::Object(map) = branch else {
            return Err(DomainError::invalid_query(format!(
                "Bad {op} format - every entry must be an object."
            )));
        };
        validate_map(map, skip)?;
    }
    Ok(())
}

fn check_regex_options(constraint: &Value) -> Result<(), DomainError> {
    let Some(obj) = constraint.as_object() else {
        return Ok(());
    };
    let has_regex = obj
        .get("$regex")
        .is_some_and(|r| !r.is_null() && r != &Value::Bool(false));
    if has_regex
        && let Some(Value::String(options)) = obj.get("$options")
        && (options.is_empty() || !options.chars().all(|c| matches!(c, 'i' | 'm' | 'x' | 's')))
    {
        return Err(DomainError::invalid_query(format!(
            "Bad $options value for query: {options}"
        )));
    }
    Ok(())
}

fn has_near(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.contains_key("$near") || o.contains_key("$nearSphere"))
}

fn push_siblings_into_or(query: &mut Document) {
    let Some(Value::Array(branches)) = query.get("$or") else {
        return;
    };
    let movable: Vec<String> = query
        .iter()
        .filter(|(key, value)| {
            key.as_str() != "$or"
                && !has_near(value)
                && !branches
                    .iter()
                    .any(|b| b.as_object().is_some_and(|m| m.contains_key(key.as_str())))
        })
        .map(|(key, _)| key.clone())
        .collect();

    for key in movable {
        let Some(value) = query.remove(&key) else {
            continue;
        };
        if let Some(Value::Array(branches)) = query.get_mut("$or") {
            for branch in branches.iter_mut().filter_map(Value::as_object_mut) {
                branch.insert(key.clone(), value.clone());
            }
        }
    }
}
