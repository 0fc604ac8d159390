use object_controller_sdk::{
    ClassSchema, Document, FindOptions, FindResult, Operation, Query, SchemaSnapshot, SortKey,
    StorageFindOptions,
};
use objgate_security::SecurityContext;
use serde_json::Value;

use super::Service;
use crate::domain::acl;
use crate::domain::error::DomainError;
use crate::domain::keys::{field_name_is_valid, is_auth_data_id_path, root_field_name};
use crate::domain::pointer_permissions::{ScopedQuery, add_pointer_permissions};
use crate::domain::protected_fields::{ProtectionPlan, protection_plan};
use crate::domain::relations::JoinPaging;
use crate::domain::sanitize::RowFilter;
use crate::domain::validator::validate_query;

const RELATED_TO: &str = "$relatedTo";

/// Fully rewritten read, ready for the backend.
struct PreparedRead {
    op: Operation,
    query: Query,
    sort: Vec<SortKey>,
    skip: Option<u64>,
    plan: Option<ProtectionPlan>,
}

impl Service {
    /// Finds, counts, lists distinct values or aggregates rows of `class_name`.
    ///
    /// # Errors
    ///
    /// - `InvalidQuery` / `InvalidKeyName` for malformed queries or sort keys
    /// - `Schema(PermissionDenied)` when the class-level check fails
    /// - `ObjectNotFound` for a `get` resolving to no match
    #[tracing::instrument(skip_all, fields(class_name = %class_name))]
    pub async fn find(
        &self,
        ctx: &SecurityContext,
        class_name: &str,
        query: Query,
        options: FindOptions,
    ) -> Result<FindResult, DomainError> {
        let schema = self.schema.load_schema(false).await?;
        let class = schema.class(class_name);

        let Some(prepared) = self
            .prepare_read(ctx, &schema, class_name, query, &options)
            .await?
        else {
            return Ok(FindResult::empty_for(&options));
        };

        let filter = RowFilter {
            class_name,
            op: prepared.op,
            ctx,
            acl: options.acl.as_ref(),
            clp: schema.class_level_permissions(class_name),
            plan: prepared.plan.as_ref(),
        };
        let shape = |rows: Vec<Document>| -> Vec<Document> {
            rows.into_iter()
                .map(|row| filter.apply(acl::decode(row)))
                .collect()
        };

        if options.count {
            if class.is_none() {
                return Ok(FindResult::Count(0));
            }
            let n = self
                .storage
                .count(class_name, &prepared.query, options.read_preference.as_deref())
                .await?;
            return Ok(FindResult::Count(n));
        }
        if let Some(field) = &options.distinct {
            if class.is_none() {
                return Ok(FindResult::Distinct(Vec::new()));
            }
            let values = self
                .storage
                .distinct(class_name, &prepared.query, field)
                .await?;
            return Ok(FindResult::Distinct(values));
        }
        if let Some(pipeline) = &options.pipeline {
            if class.is_none() {
                return Ok(FindResult::Aggregate(Vec::new()));
            }
            let pipeline = scoped_pipeline(&prepared.query, pipeline);
            let rows = self
                .storage
                .aggregate(class_name, &pipeline, options.read_preference.as_deref())
                .await?;
            return Ok(FindResult::Aggregate(shape(rows)));
        }

        let mut keys = options.keys.clone();
        if let (Some(keys), Some(plan)) = (keys.as_mut(), prepared.plan.as_ref()) {
            keys.extend(plan.temporary_keys.iter().cloned());
        }
        let storage_options = StorageFindOptions {
            skip: prepared.skip,
            limit: options.limit,
            sort: prepared.sort,
            keys,
            read_preference: options.read_preference.clone(),
        };
        let rows = self
            .storage
            .find(class_name, &prepared.query, &storage_options)
            .await?;
        tracing::debug!(rows = rows.len(), operation = %prepared.op, "find completed");
        Ok(FindResult::Objects(shape(rows)))
    }

    /// Runs the rewrite pipeline for a read; `None` means "no match".
    async fn prepare_read(
        &self,
        ctx: &SecurityContext,
        schema: &SchemaSnapshot,
        class_name: &str,
        query: Query,
        options: &FindOptions,
    ) -> Result<Option<PreparedRead>, DomainError> {
        let op = if options.count {
            Operation::Count
        } else {
            options.op.unwrap_or_else(|| infer_operation(&query))
        };
        let sort = normalize_sort(schema.class(class_name), &options.sort)?;
        if let Some(acl) = &options.acl {
            schema.validate_permission(class_name, acl, op, None)?;
        }

        let plain_find =
            !options.count && options.distinct.is_none() && options.pipeline.is_none();
        let paging = join_paging(
            plain_find && self.storage.can_sort_on_join_tables(),
            &sort,
            options,
        );
        let skip = if paging.is_some() && mentions_related_to(&query) {
            None
        } else {
            options.skip
        };

        let query = self
            .rewrite_relations(schema, class_name, query, paging)
            .await?;

        let (query, plan) = match &options.acl {
            None => (query, None),
            Some(acl) => {
                let query = match add_pointer_permissions(schema, class_name, op, query, acl) {
                    ScopedQuery::Query(query) => query,
                    ScopedQuery::DenyAll if op == Operation::Get => {
                        return Err(DomainError::ObjectNotFound);
                    }
                    ScopedQuery::DenyAll => return Ok(None),
                };
                let plan = protection_plan(
                    schema.class_level_permissions(class_name),
                    &query,
                    acl,
                    ctx,
                    options.keys.as_deref(),
                );
                let query = if matches!(op, Operation::Update | Operation::Delete) {
                    acl::add_write_acl(query, acl)
                } else {
                    acl::add_read_acl(query, acl)
                };
                (query, plan)
            }
        };

        let query = validate_query(query, self.config.skip_or_restructuring)?;
        Ok(Some(PreparedRead {
            op,
            query,
            sort,
            skip,
            plan,
        }))
    }
}

/// `get` for a query that is exactly `{objectId: "<id>"}`, `find` otherwise.
fn infer_operation(query: &Query) -> Operation {
    if query.len() == 1 && query.object_id().is_some() {
        Operation::Get
    } else {
        Operation::Find
    }
}

/// Renames internal timestamp keys, rejects unsortable keys and drops keys
/// the class does not declare.
fn normalize_sort(
    class: Option<&ClassSchema>,
    sort: &[SortKey],
) -> Result<Vec<SortKey>, DomainError> {
    let mut normalized = Vec::with_capacity(sort.len());
    for key in sort {
        let field = match key.field.as_str() {
            "_created_at" => "createdAt",
            "_updated_at" => "updatedAt",
            other => other,
        };
        if is_auth_data_id_path(field) {
            return Err(DomainError::InvalidKeyName(format!("Cannot sort by {field}")));
        }
        let root = root_field_name(field);
        if !field_name_is_valid(root) {
            return Err(DomainError::InvalidKeyName(format!(
                "Invalid field name: {field}."
            )));
        }
        if field != "score" && !class.is_some_and(|c| c.fields.contains_key(root)) {
            continue;
        }
        normalized.push(SortKey {
            field: field.to_owned(),
            direction: key.direction,
        });
    }
    Ok(normalized)
}

/// Join-side paging when results are ordered by creation time.
fn join_paging(enabled: bool, sort: &[SortKey], options: &FindOptions) -> Option<JoinPaging> {
    if !enabled {
        return None;
    }
    let created = sort.iter().find(|k| k.field == "createdAt")?;
    Some(JoinPaging {
        descending: created.is_descending(),
        skip: options.skip,
        limit: options.limit,
    })
}

fn mentions_related_to(query: &Query) -> bool {
    query.contains_key(RELATED_TO)
        || ["$or", "$and"].iter().any(|combinator| {
            query
                .get(*combinator)
                .and_then(Value::as_array)
                .is_some_and(|branches| {
                    branches
                        .iter()
                        .any(|b| b.as_object().is_some_and(|m| m.contains_key(RELATED_TO)))
                })
        })
}

/// Prepends the rewritten query as a `$match` stage.
fn scoped_pipeline(query: &Query, pipeline: &[Value]) -> Vec<Value> {
    let mut stages = Vec::with_capacity(pipeline.len() + 1);
    if !query.is_empty() {
        let mut stage = Document::new();
        stage.insert("$match".to_owned(), query.clone().into_value());
        stages.push(Value::Object(stage));
    }
    stages.extend(pipeline.iter().cloned());
    stages
}
