//! Application of storage field updates to stored rows.

use object_controller_sdk::{Document, FieldUpdate, Query, StorageError, UpdateDocument};
use serde_json::{Number, Value};

/// Applies every change of `update` to `doc`.
///
/// # Errors
///
/// `Backend` when an operator meets a value of the wrong kind.
pub fn apply(doc: &mut Document, update: &UpdateDocument) -> Result<(), StorageError> {
    for (path, change) in update {
        apply_one(doc, path, change)?;
    }
    Ok(())
}

fn apply_one(doc: &mut Document, path: &str, change: &FieldUpdate) -> Result<(), StorageError> {
    let (parent, leaf) = parent_of(doc, path)?;
    match change {
        FieldUpdate::Set(value) => {
            parent.insert(leaf.to_owned(), value.clone());
        }
        FieldUpdate::Unset => {
            parent.remove(leaf);
        }
        FieldUpdate::Increment(amount) => {
            let current = parent.get(leaf).cloned().unwrap_or_else(|| Value::from(0));
            let Value::Number(current) = current else {
                return Err(StorageError::Backend(format!(
                    "cannot increment non-numeric field {path}"
                )));
            };
            parent.insert(leaf.to_owned(), Value::Number(add(&current, amount)?));
        }
        FieldUpdate::Add(items) => {
            array_at(parent, leaf, path)?.extend(items.iter().cloned());
        }
        FieldUpdate::AddUnique(items) => {
            let array = array_at(parent, leaf, path)?;
            for item in items {
                if !array.contains(item) {
                    array.push(item.clone());
                }
            }
        }
        FieldUpdate::Remove(items) => {
            if let Some(Value::Array(array)) = parent.get_mut(leaf) {
                array.retain(|v| !items.contains(v));
            } else if parent.contains_key(leaf) {
                return Err(StorageError::Backend(format!(
                    "cannot remove from non-array field {path}"
                )));
            }
        }
    }
    Ok(())
}

/// Walks to the object holding the last segment of `path`, creating
/// intermediate objects.
fn parent_of<'a, 'p>(
    doc: &'a mut Document,
    path: &'p str,
) -> Result<(&'a mut Document, &'p str), StorageError> {
    let (prefix, leaf) = match path.rsplit_once('.') {
        Some((prefix, leaf)) => (Some(prefix), leaf),
        None => (None, path),
    };
    let mut current = doc;
    for part in prefix.into_iter().flat_map(|p| p.split('.')) {
        let slot = current
            .entry(part.to_owned())
            .or_insert_with(|| Value::Object(Document::new()));
        current = slot.as_object_mut().ok_or_else(|| {
            StorageError::Backend(format!("cannot traverse non-object segment {part} of {path}"))
        })?;
    }
    Ok((current, leaf))
}

fn array_at<'a>(
    parent: &'a mut Document,
    leaf: &str,
    path: &str,
) -> Result<&'a mut Vec<Value>, StorageError> {
    parent
        .entry(leaf.to_owned())
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| StorageError::Backend(format!("cannot append to non-array field {path}")))
}

fn add(current: &Number, amount: &Number) -> Result<Number, StorageError> {
    if let (Some(a), Some(b)) = (current.as_i64(), amount.as_i64())
        && let Some(sum) = a.checked_add(b)
    {
        return Ok(sum.into());
    }
    let (Some(a), Some(b)) = (current.as_f64(), amount.as_f64()) else {
        return Err(StorageError::Backend("numeric overflow".to_owned()));
    };
    Number::from_f64(a + b).ok_or_else(|| StorageError::Backend("non-finite increment".to_owned()))
}

/// Row an upsert inserts when nothing matches: the query's equality
/// constraints, including `{"$eq": v}`.
#[must_use]
pub fn upsert_seed(query: &Query) -> Document {
    query
        .iter()
        .filter(|(key, _)| !key.starts_with('$'))
        .filter_map(|(key, constraint)| {
            let value = match constraint.as_object() {
                Some(ops) if ops.keys().any(|k| k.starts_with('$')) => ops.get("$eq")?.clone(),
                _ => constraint.clone(),
            };
            Some((key.clone(), value))
        })
        .collect()
}
