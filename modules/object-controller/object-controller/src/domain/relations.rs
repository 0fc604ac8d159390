//! Relation rewriting: eliminates `$relatedTo` clauses and relation-typed
//! field constraints by resolving them through join collections into
//! `objectId` id-set constraints.

use std::slice;

use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use object_controller_sdk::{
    Document, OBJECT_ID_FIELD, Query, SchemaSnapshot, SortKey, StorageAdapter, StorageFindOptions,
    join_table_name,
};
use serde_json::{Value, json};

use super::error::DomainError;
use super::id_set::{add_in_object_ids, add_not_in_object_ids};

const RELATED_TO: &str = "$relatedTo";
const OWNING_ID: &str = "owningId";
const RELATED_ID: &str = "relatedId";

/// Paging pushed down to an ordered join scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinPaging {
    pub descending: bool,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

/// One id lookup against a relation's join collection.
#[derive(Debug)]
struct OwnerLookup {
    key: String,
    negated: bool,
    /// `None` resolves every owning id in the join collection.
    related_ids: Option<Vec<String>>,
}

pub struct RelationRewriter<'a> {
    storage: &'a dyn StorageAdapter,
    schema: &'a SchemaSnapshot,
    threshold: usize,
}

impl<'a> RelationRewriter<'a> {
    #[must_use]
    pub fn new(
        storage: &'a dyn StorageAdapter,
        schema: &'a SchemaSnapshot,
        threshold: usize,
    ) -> Self {
        Self {
            storage,
            schema,
            threshold,
        }
    }

    /// Ids related to `owning_id` through relation `key` of `owner_class`.
    ///
    /// # Errors
    ///
    /// Storage failure.
    pub async fn related_ids(
        &self,
        owner_class: &str,
        key: &str,
        owning_id: &str,
        paging: Option<JoinPaging>,
    ) -> Result<Vec<String>, DomainError> {
        let mut options = StorageFindOptions::default();
        if let Some(paging) = paging {
            options.sort = vec![if paging.descending {
                SortKey::descending("_id")
            } else {
                SortKey::ascending("_id")
            }];
            options.skip = paging.skip;
            options.limit = paging.limit;
        }
        let query = Query::from_value(json!({ OWNING_ID: owning_id })).unwrap_or_default();
        let rows = self
            .storage
            .find(&join_table_name(owner_class, key), &query, &options)
            .await?;
        Ok(column(&rows, RELATED_ID))
    }

    /// Owning ids of `class_name` whose relation `key` points to any of
    /// `related_ids`; every owning id when `related_ids` is `None`.
    ///
    /// # Errors
    ///
    /// Storage failure.
    pub async fn owning_ids(
        &self,
        class_name: &str,
        key: &str,
        related_ids: Option<&[String]>,
    ) -> Result<Vec<String>, DomainError> {
        let query = match related_ids {
            Some(ids) => {
                Query::from_value(json!({ RELATED_ID: { "$in": ids } })).unwrap_or_default()
            }
            None => Query::new(),
        };
        let options = StorageFindOptions {
            keys: Some(vec![OWNING_ID.to_owned()]),
            ..StorageFindOptions::default()
        };
        let rows = self
            .storage
            .find(&join_table_name(class_name, key), &query, &options)
            .await?;
        Ok(column(&rows, OWNING_ID))
    }

    /// Replaces every `$relatedTo` clause (top level and inside `$or` /
    /// `$and` branches) with an `objectId.$in` constraint.
    pub fn reduce_relation_keys(
        &'a self,
        class_name: &'a str,
        query: Query,
        paging: Option<JoinPaging>,
    ) -> BoxFuture<'a, Result<Query, DomainError>> {
        async move {
            let mut query = Self::rewrite_branches(query, move |branch| {
                self.reduce_relation_keys(class_name, branch, paging)
            })
            .await?;

            let Some(related_to) = query.remove(RELATED_TO) else {
                return Ok(query);
            };
            let (owner_class, owner_id, key) = parse_related_to(&related_to)?;
            let ids = self.related_ids(owner_class, key, owner_id, paging).await?;
            tracing::debug!(
                class_name,
                relation = key,
                resolved = ids.len(),
                "resolved $relatedTo"
            );
            Ok(add_in_object_ids(query, &ids, self.threshold))
        }
        .boxed()
    }

    /// Replaces constraints on relation-typed fields with `objectId`
    /// `$in` / `$nin` sets built from reverse join lookups.
    ///
    /// Each `$or` / `$and` branch is resolved on its own; lookups within one
    /// level run concurrently and are merged once all complete.
    pub fn reduce_in_relation(
        &'a self,
        class_name: &'a str,
        query: Query,
    ) -> BoxFuture<'a, Result<Query, DomainError>> {
        async move {
            let mut query = Self::rewrite_branches(query, move |branch| {
                self.reduce_in_relation(class_name, branch)
            })
            .await?;

            let relation_keys: Vec<String> = query
                .keys()
                .filter(|key| {
                    self.schema
                        .class(class_name)
                        .and_then(|c| c.fields.get(key.as_str()))
                        .is_some_and(|t| t.is_relation())
                })
                .cloned()
                .collect();

            let mut lookups = Vec::new();
            for key in relation_keys {
                let constraint = query.remove(&key).unwrap_or(Value::Null);
                lookups.extend(owner_lookups(&key, &constraint));
            }
            if lookups.is_empty() {
                return Ok(query);
            }

            let resolved = try_join_all(lookups.iter().map(|lookup| {
                self.owning_ids(class_name, &lookup.key, lookup.related_ids.as_deref())
            }))
            .await?;

            for (lookup, ids) in lookups.iter().zip(resolved) {
                tracing::debug!(
                    class_name,
                    relation = %lookup.key,
                    negated = lookup.negated,
                    resolved = ids.len(),
                    "resolved relation constraint"
                );
                query = if lookup.negated {
                    add_not_in_object_ids(query, &ids)
                } else {
                    add_in_object_ids(query, &ids, self.threshold)
                };
            }
            Ok(query)
        }
        .boxed()
    }

    /// Applies `rewrite` to every `$or` and `$and` branch concurrently.
    async fn rewrite_branches<F>(mut query: Query, rewrite: F) -> Result<Query, DomainError>
    where
        F: Fn(Query) -> BoxFuture<'a, Result<Query, DomainError>>,
    {
        for combinator in ["$or", "$and"] {
            // Malformed combinators stay in place for the validator to reject.
            if !matches!(query.get(combinator), Some(Value::Array(_))) {
                continue;
            }
            let Some(Value::Array(branches)) = query.remove(combinator) else {
                continue;
            };
            let rewritten = try_join_all(branches.into_iter().map(|branch| {
                match Query::from_value(branch) {
                    Some(branch) => rewrite(branch),
                    None => async move {
                        Err(DomainError::invalid_query(format!(
                            "Bad {combinator} format - every entry must be an object."
                        )))
                    }
                    .boxed(),
                }
            }))
            .await?;
            query.insert(
                combinator.to_owned(),
                Value::Array(rewritten.into_iter().map(Query::into_value).collect()),
            );
        }
        Ok(query)
    }
}

/// Splits one relation-field constraint into join lookups.
fn owner_lookups(key: &str, constraint: &Value) -> Vec<OwnerLookup> {
    let lookup = |negated, related_ids| OwnerLookup {
        key: key.to_owned(),
        negated,
        related_ids,
    };

    let Some(obj) = constraint.as_object().filter(|o| {
        o.contains_key("$in")
            || o.contains_key("$ne")
            || o.contains_key("$nin")
            || o.get("__type").and_then(Value::as_str) == Some("Pointer")
    }) else {
        return vec![lookup(false, None)];
    };

    obj.iter()
        .filter_map(|(op, value)| match op.as_str() {
            OBJECT_ID_FIELD => Some(lookup(false, Some(pointer_ids(slice::from_ref(value), true)))),
            "$in" => Some(lookup(false, Some(pointer_ids(as_slice(value), false)))),
            "$nin" => Some(lookup(true, Some(pointer_ids(as_slice(value), false)))),
            "$ne" => Some(lookup(true, Some(pointer_ids(slice::from_ref(value), false)))),
            _ => None,
        })
        .collect()
}

fn as_slice(value: &Value) -> &[Value] {
    value.as_array().map_or(&[], Vec::as_slice)
}

/// Object ids of pointer values; with `bare`, plain strings are ids themselves.
fn pointer_ids(values: &[Value], bare: bool) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| {
            if bare {
                v.as_str()
            } else {
                v.get(OBJECT_ID_FIELD).and_then(Value::as_str)
            }
        })
        .map(str::to_owned)
        .collect()
}

fn parse_related_to(value: &Value) -> Result<(&str, &str, &str), DomainError> {
    let object = value.get("object");
    let owner_class = object
        .and_then(|o| o.get("className"))
        .and_then(Value::as_str);
    let owner_id = object
        .and_then(|o| o.get(OBJECT_ID_FIELD))
        .and_then(Value::as_str);
    let key = value.get("key").and_then(Value::as_str);
    match (owner_class, owner_id, key) {
        (Some(c), Some(id), Some(k)) => Ok((c, id, k)),
        _ => Err(DomainError::invalid_query(
            "$relatedTo requires an object pointer and a key",
        )),
    }
}

fn column(rows: &[Document], field: &str) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get(field).and_then(Value::as_str))
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use serde_json::json;

    use super::*;

    fn lookups(v: &Value) -> Vec<(bool, Option<Vec<String>>)> {
        owner_lookups("likes", v)
            .into_iter()
            .map(|l| (l.negated, l.related_ids))
            .collect()
    }

    fn ptr(id: &str) -> Value {
        json!({"__type": "Pointer", "className": "_User", "objectId": id})
    }

    #[test]
    fn bare_pointer_is_positive_lookup() {
        assert_eq!(lookups(&ptr("u1")), vec![(false, Some(vec!["u1".to_owned()]))]);
    }

    #[test]
    fn in_nin_ne_split_into_branches() {
        let got = lookups(&json!({"$in": [ptr("a"), ptr("b")], "$nin": [ptr("c")]}));
        assert_eq!(
            got,
            vec![
                (false, Some(vec!["a".to_owned(), "b".to_owned()])),
                (true, Some(vec!["c".to_owned()])),
            ]
        );
        assert_eq!(
            lookups(&json!({"$ne": ptr("d")})),
            vec![(true, Some(vec!["d".to_owned()]))]
        );
    }

    #[test]
    fn constraint_without_operator_resolves_all_owners() {
        assert_eq!(lookups(&json!({"$exists": true})), vec![(false, None)]);
        assert_eq!(lookups(&Value::Null), vec![(false, None)]);
    }

    #[test]
    fn related_to_requires_pointer_and_key() {
        assert!(parse_related_to(&json!({"object": ptr("u1"), "key": "likes"})).is_ok());
        assert!(matches!(
            parse_related_to(&json!({"key": "likes"})),
            Err(DomainError::InvalidQuery(_))
        ));
    }
}
