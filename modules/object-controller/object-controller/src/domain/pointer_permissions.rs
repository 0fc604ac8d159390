//! Pointer-permission rewriting: restricts a query to rows whose pointer
//! fields reference the caller.

use object_controller_sdk::{Document, Operation, Query, SchemaSnapshot, USER_CLASS};
use objgate_security::AclGroup;
use serde_json::{Value, json};

/// Outcome of the pointer-permission stage.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopedQuery {
    Query(Query),
    /// The caller can match no row. Never means "unrestricted".
    DenyAll,
}

impl ScopedQuery {
    /// Conjunction of two scoped queries; `DenyAll` absorbs.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::Query(a), Self::Query(b)) => {
                let mut combined = Query::new();
                combined.insert(
                    "$and".to_owned(),
                    Value::Array(vec![a.into_value(), b.into_value()]),
                );
                Self::Query(combined)
            }
            _ => Self::DenyAll,
        }
    }
}

/// Rewrites `query` so that only rows pointing to the caller through one of
/// the class's pointer-permission fields for `op` match.
///
/// The query passes through unchanged when the base-level table already
/// grants `op` or no pointer fields are configured. A caller without exactly
/// one user id gets [`ScopedQuery::DenyAll`].
#[must_use]
pub fn add_pointer_permissions(
    schema: &SchemaSnapshot,
    class_name: &str,
    op: Operation,
    query: Query,
    acl: &AclGroup,
) -> ScopedQuery {
    if schema.test_permissions(class_name, acl, op) {
        return ScopedQuery::Query(query);
    }
    let Some(clp) = schema.class_level_permissions(class_name) else {
        return ScopedQuery::Query(query);
    };
    let fields = clp.pointer_fields(op);
    if fields.is_empty() {
        return ScopedQuery::Query(query);
    }
    let Some(user_id) = acl.single_user_id() else {
        tracing::debug!(
            class_name,
            operation = %op,
            user_ids = acl.user_ids().count(),
            "pointer permissions need exactly one user id, matching nothing"
        );
        return ScopedQuery::DenyAll;
    };

    let caller = json!({"__type": "Pointer", "className": USER_CLASS, "objectId": user_id});
    let mut branches = Vec::with_capacity(fields.len() * 2);
    for field in &fields {
        for clause in [caller.clone(), json!({ "$all": [caller.clone()] })] {
            branches.push(constrain(&query, field, clause).into_value());
        }
    }

    let mut scoped = Query::new();
    scoped.insert("$or".to_owned(), Value::Array(branches));
    ScopedQuery::Query(reduce_or(scoped))
}

/// `query` with `field` matching `clause`; an existing constraint on `field`
/// is kept and ANDed.
fn constrain(query: &Query, field: &str, clause: Value) -> Query {
    if query.contains_key(field) {
        let mut clause_query = Document::new();
        clause_query.insert(field.to_owned(), clause);
        let mut and = Query::new();
        and.insert(
            "$and".to_owned(),
            Value::Array(vec![Value::Object(clause_query), query.clone().into_value()]),
        );
        return reduce_and(and);
    }
    let mut out = query.clone();
    out.insert(field.to_owned(), clause);
    out
}

/// `true` when every entry of `small` appears with the same value in `large`.
fn is_subset(small: &Document, large: &Document) -> bool {
    small.iter().all(|(k, v)| large.get(k) == Some(v))
}

/// Index to drop from `branches`, if any pair makes one redundant.
///
/// With `drop_larger`, a branch containing all entries of another is dropped
/// (disjunction); otherwise the contained branch is dropped (conjunction).
fn redundant_branch(branches: &[Value], drop_larger: bool) -> Option<usize> {
    for (i, a) in branches.iter().enumerate() {
        let Some(a) = a.as_object() else { continue };
        for (j, b) in branches.iter().enumerate().skip(i + 1) {
            let Some(b) = b.as_object() else { continue };
            let (small, large, small_doc, large_doc) = if a.len() > b.len() {
                (j, i, b, a)
            } else {
                (i, j, a, b)
            };
            if is_subset(small_doc, large_doc) {
                return Some(if drop_larger { large } else { small });
            }
        }
    }
    None
}

fn reduce(mut query: Query, combinator: &str, drop_larger: bool) -> Query {
    let Some(Value::Array(branches)) = query.get_mut(combinator) else {
        return query;
    };
    while let Some(idx) = redundant_branch(branches, drop_larger) {
        branches.remove(idx);
    }
    if branches.len() == 1
        && let Some(Value::Object(single)) = branches.pop()
    {
        query.remove(combinator);
        query.extend(single);
    }
    query
}

/// Drops `$or` branches that are supersets of another branch and inlines a
/// single survivor.
#[must_use]
pub fn reduce_or(query: Query) -> Query {
    reduce(query, "$or", true)
}

/// Drops `$and` branches that are subsets of another branch and inlines a
/// single survivor.
#[must_use]
pub fn reduce_and(query: Query) -> Query {
    reduce(query, "$and", false)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use object_controller_sdk::{
        ClassLevelPermissions, ClassSchema, FieldType, OperationPermissions,
    };
    use serde_json::json;

    use super::*;

    fn q(v: Value) -> Query {
        Query::from_value(v).unwrap()
    }

    fn schema(find: OperationPermissions) -> SchemaSnapshot {
        SchemaSnapshot::new([ClassSchema::new("Doc")
            .with_field(
                "owner",
                FieldType::Pointer {
                    target_class: "_User".to_owned(),
                },
            )
            .with_permissions(ClassLevelPermissions {
                find: Some(find),
                ..ClassLevelPermissions::default()
            })])
    }

    fn caller(id: &str) -> Value {
        json!({"__type": "Pointer", "className": "_User", "objectId": id})
    }

    #[test]
    fn public_permission_leaves_query_alone() {
        let s = schema(OperationPermissions::allow(["*"]));
        let acl = AclGroup::public();
        let out = add_pointer_permissions(&s, "Doc", Operation::Find, q(json!({"a": 1})), &acl);
        assert_eq!(out, ScopedQuery::Query(q(json!({"a": 1}))));
    }

    #[test]
    fn single_user_gets_pointer_branches() {
        let s = schema(OperationPermissions::pointer(["owner"]));
        let acl = AclGroup::new(["*", "u1", "role:x"]);
        let ScopedQuery::Query(out) =
            add_pointer_permissions(&s, "Doc", Operation::Find, q(json!({"a": 1})), &acl)
        else {
            panic!("expected a query");
        };
        assert_eq!(
            out.into_value(),
            json!({"$or": [
                {"a": 1, "owner": caller("u1")},
                {"a": 1, "owner": {"$all": [caller("u1")]}}
            ]})
        );
    }

    #[test]
    fn ambiguous_or_anonymous_caller_matches_nothing() {
        let s = schema(OperationPermissions::pointer(["owner"]));
        for acl in [AclGroup::public(), AclGroup::new(["*", "u1", "u2"])] {
            let out = add_pointer_permissions(&s, "Doc", Operation::Find, Query::new(), &acl);
            assert_eq!(out, ScopedQuery::DenyAll);
        }
    }

    #[test]
    fn existing_field_constraint_is_anded() {
        let s = schema(OperationPermissions::pointer(["owner"]));
        let ScopedQuery::Query(out) = add_pointer_permissions(
            &s,
            "Doc",
            Operation::Find,
            q(json!({"owner": {"$exists": true}})),
            &AclGroup::new(["u1"]),
        ) else {
            panic!("expected a query");
        };
        let branches = out["$or"].as_array().unwrap();
        assert_eq!(
            branches[0],
            json!({"$and": [{"owner": caller("u1")}, {"owner": {"$exists": true}}]})
        );
    }

    #[test]
    fn or_reduction_drops_supersets_and_inlines() {
        let out = reduce_or(q(json!({"$or": [{"a": 1, "b": 2}, {"a": 1}]})));
        assert_eq!(out.into_value(), json!({"a": 1}));
        let kept = reduce_or(q(json!({"$or": [{"a": 1}, {"b": 2}]})));
        assert_eq!(kept.into_value(), json!({"$or": [{"a": 1}, {"b": 2}]}));
    }

    #[test]
    fn and_reduction_drops_subsets() {
        let out = reduce_and(q(json!({"$and": [{"a": 1}, {"a": 1, "b": 2}]})));
        assert_eq!(out.into_value(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn deny_all_absorbs_conjunction() {
        let a = ScopedQuery::Query(Query::new());
        assert_eq!(a.clone().and(ScopedQuery::DenyAll), ScopedQuery::DenyAll);
        assert!(matches!(a.clone().and(a), ScopedQuery::Query(q) if q.contains_key("$and")));
    }
}
