//! `objectId` id-set algebra used by relation rewriting.
//!
//! `add_in_object_ids` intersects: the resulting `$in` holds only ids present
//! in every pre-existing constraint (bare string, `$eq`, `$in`) and in the
//! new candidates. A bare string constraint is kept as `$eq` next to `$in`.
//! `add_not_in_object_ids` unions into `$nin` without duplicates.

use std::collections::HashSet;

use object_controller_sdk::{OBJECT_ID_FIELD, Query};
use serde_json::{Map, Value, json};

/// Merges `ids` into `objectId.$in` by intersection.
///
/// Above `threshold` total candidates a hash-based intersection is used;
/// both algorithms produce the same ids in the same order.
#[must_use]
pub fn add_in_object_ids(mut query: Query, ids: &[String], threshold: usize) -> Query {
    let existing = query.get(OBJECT_ID_FIELD);
    let from_string = existing
        .and_then(Value::as_str)
        .map(|s| vec![s.to_owned()]);
    let from_eq = existing
        .and_then(|v| v.get("$eq"))
        .and_then(Value::as_str)
        .map(|s| vec![s.to_owned()]);
    let from_in = existing
        .and_then(|v| v.get("$in"))
        .and_then(Value::as_array)
        .map(|items| string_items(items));

    let lists: Vec<Vec<String>> = [from_string, from_eq, from_in, Some(ids.to_vec())]
        .into_iter()
        .flatten()
        .collect();
    let total: usize = lists.iter().map(Vec::len).sum();
    let intersection = if total > threshold {
        intersect_large(&lists)
    } else {
        intersect(&lists)
    };

    let mut constraint = match query.remove(OBJECT_ID_FIELD) {
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = Map::new();
            map.insert("$eq".to_owned(), other);
            map
        }
        None => Map::new(),
    };
    constraint.insert("$in".to_owned(), json!(intersection));
    query.insert(OBJECT_ID_FIELD.to_owned(), Value::Object(constraint));
    query
}

/// Merges `ids` into `objectId.$nin` by de-duplicated union.
#[must_use]
pub fn add_not_in_object_ids(mut query: Query, ids: &[String]) -> Query {
    let mut all: Vec<String> = query
        .get(OBJECT_ID_FIELD)
        .and_then(|v| v.get("$nin"))
        .and_then(Value::as_array)
        .map(|items| string_items(items))
        .unwrap_or_default();
    all.extend(ids.iter().cloned());
    let union = dedup(all);

    let mut constraint = match query.remove(OBJECT_ID_FIELD) {
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = Map::new();
            map.insert("$eq".to_owned(), other);
            map
        }
        None => Map::new(),
    };
    constraint.insert("$nin".to_owned(), json!(union));
    query.insert(OBJECT_ID_FIELD.to_owned(), Value::Object(constraint));
    query
}

fn string_items(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_owned)
        .collect()
}

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Ids of the first list present in every other list, linear scans.
fn intersect(lists: &[Vec<String>]) -> Vec<String> {
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };
    dedup(
        first
            .iter()
            .filter(|id| rest.iter().all(|list| list.contains(id)))
            .cloned()
            .collect(),
    )
}

/// Same result as [`intersect`], hashing the other lists first.
fn intersect_large(lists: &[Vec<String>]) -> Vec<String> {
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };
    let sets: Vec<HashSet<&str>> = rest
        .iter()
        .map(|list| list.iter().map(String::as_str).collect())
        .collect();
    dedup(
        first
            .iter()
            .filter(|id| sets.iter().all(|set| set.contains(id.as_str())))
            .cloned()
            .collect(),
    )
}
