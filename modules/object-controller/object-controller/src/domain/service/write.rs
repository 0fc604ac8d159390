use futures::future::try_join_all;
use object_controller_sdk::{
    CreateOptions, DestroyOptions, Document, OBJECT_ID_FIELD, Operation, Query, SESSION_CLASS,
    SchemaSnapshot, SessionHandle, StorageFindOptions, UpdateOptions, join_table_name,
};
use objgate_security::AclGroup;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::Service;
use crate::domain::acl;
use crate::domain::error::DomainError;
use crate::domain::keys::{check_prohibited_keywords, class_name_is_valid};
use crate::domain::pointer_permissions::{ScopedQuery, add_pointer_permissions};
use crate::domain::update::{
    RelationChange, RelationUpdate, adds_fields, collect_relation_updates, flatten_for_create,
    sanitize_result, target_object_id, to_storage_update, transform_auth_data,
    validate_update_keys,
};
use crate::domain::validator::validate_query;

const OBJECT_ID_LEN: usize = 10;

impl Service {
    /// Creates one object of `class_name`.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyName` for denylisted keywords
    /// - `InvalidClassName`, `InvalidJson`, `UnsupportedOperator`
    /// - `Schema(PermissionDenied | IncorrectType)`
    #[tracing::instrument(skip_all, fields(class_name = %class_name))]
    pub async fn create(
        &self,
        class_name: &str,
        object: Document,
        options: CreateOptions,
    ) -> Result<Document, DomainError> {
        check_prohibited_keywords(&Value::Object(object.clone()), &self.config.keyword_denylist)?;
        if !class_name_is_valid(class_name) {
            return Err(DomainError::InvalidClassName(format!(
                "invalid className: {class_name}"
            )));
        }
        let original = object.clone();

        let mut object = acl::encode(object)?;
        let now = json!({"__type": "Date", "iso": now_iso()?});
        object.insert("createdAt".to_owned(), now.clone());
        object.insert("updatedAt".to_owned(), now);
        let object_id = match object.get(OBJECT_ID_FIELD).and_then(Value::as_str) {
            Some(id) => id.to_owned(),
            None => {
                let id = new_object_id();
                object.insert(OBJECT_ID_FIELD.to_owned(), Value::String(id.clone()));
                id
            }
        };
        let (object, relation_updates) = collect_relation_updates(object)?;

        let schema = self.schema.load_schema(false).await?;
        if let Some(acl) = &options.acl {
            schema.validate_permission(class_name, acl, Operation::Create, None)?;
        }
        self.schema.enforce_class_exists(class_name).await?;

        let object = flatten_for_create(transform_auth_data(class_name, object))?;
        self.schema.validate_object(class_name, &object).await?;
        let stored = self
            .storage
            .create_object(class_name, object, options.session.as_ref())
            .await?;

        self.apply_relation_updates(
            class_name,
            &object_id,
            relation_updates,
            options.session.as_ref(),
        )
        .await?;

        let mut response = sanitize_result(&original, &stored);
        for key in [OBJECT_ID_FIELD, "createdAt"] {
            if let Some(value) = stored.get(key) {
                response.insert(key.to_owned(), value.clone());
            }
        }
        tracing::debug!(object_id = %object_id, "object created");
        Ok(response)
    }

    /// Updates rows of `class_name` matching `query`.
    ///
    /// # Errors
    ///
    /// - `ObjectNotFound` when the single target is missing or not writable
    /// - `InvalidKeyName` / `InvalidNestedKey` / `InvalidQuery`
    /// - `Schema(PermissionDenied)`
    #[tracing::instrument(skip_all, fields(class_name = %class_name))]
    pub async fn update(
        &self,
        class_name: &str,
        query: Query,
        update: Document,
        options: UpdateOptions,
    ) -> Result<Document, DomainError> {
        check_prohibited_keywords(&Value::Object(update.clone()), &self.config.keyword_denylist)?;
        let original = update.clone();
        let schema = self.schema.load_schema(false).await?;
        if let Some(acl) = &options.acl {
            schema.validate_permission(class_name, acl, Operation::Update, None)?;
        }

        let owner_id = target_object_id(&update, query.object_id()).map(str::to_owned);
        let (update, relation_updates) = collect_relation_updates(update)?;
        if owner_id.is_none() && !relation_updates.is_empty() {
            return Err(DomainError::invalid_query(
                "relation updates require an objectId",
            ));
        }

        let query = self
            .rewrite_relations(&schema, class_name, query, None)
            .await?;
        let query = match &options.acl {
            Some(acl) => {
                let scoped = scope_update(&schema, class_name, query, &update, acl)?;
                let ScopedQuery::Query(query) = scoped else {
                    return Err(DomainError::ObjectNotFound);
                };
                acl::add_write_acl(query, acl)
            }
            None => query,
        };
        let query = validate_query(query, self.config.skip_or_restructuring)?;

        validate_update_keys(&update)?;
        let update = transform_auth_data(class_name, acl::encode(update)?);

        if options.validate_only {
            let probe = StorageFindOptions {
                limit: Some(1),
                ..StorageFindOptions::default()
            };
            let found = self.storage.find(class_name, &query, &probe).await?;
            if found.is_empty() {
                return Err(DomainError::ObjectNotFound);
            }
            return Ok(Document::new());
        }

        let changes = to_storage_update(update)?;
        let session = options.session.as_ref();
        let result = if options.many {
            let matched = self
                .storage
                .update_objects_by_query(class_name, &query, &changes, session)
                .await?;
            tracing::debug!(matched, "bulk update applied");
            Document::new()
        } else if options.upsert {
            self.storage
                .upsert_one_object(class_name, &query, &changes, session)
                .await?;
            Document::new()
        } else {
            self.storage
                .find_one_and_update(class_name, &query, &changes, session)
                .await?
                .ok_or(DomainError::ObjectNotFound)?
        };

        if let Some(owner_id) = &owner_id {
            self.apply_relation_updates(class_name, owner_id, relation_updates, session)
                .await?;
        }
        Ok(sanitize_result(&original, &result))
    }

    /// Deletes rows of `class_name` matching `query`.
    ///
    /// # Errors
    ///
    /// `ObjectNotFound` when nothing was deleted, except for `_Session`.
    #[tracing::instrument(skip_all, fields(class_name = %class_name))]
    pub async fn destroy(
        &self,
        class_name: &str,
        query: Query,
        options: DestroyOptions,
    ) -> Result<(), DomainError> {
        let schema = self.schema.load_schema(false).await?;
        if let Some(acl) = &options.acl {
            schema.validate_permission(class_name, acl, Operation::Delete, None)?;
        }
        let query = self
            .rewrite_relations(&schema, class_name, query, None)
            .await?;
        let query = match &options.acl {
            Some(acl) => {
                let ScopedQuery::Query(query) =
                    add_pointer_permissions(&schema, class_name, Operation::Delete, query, acl)
                else {
                    return Err(DomainError::ObjectNotFound);
                };
                acl::add_write_acl(query, acl)
            }
            None => query,
        };
        let query = validate_query(query, self.config.skip_or_restructuring)?;

        let deleted = self
            .storage
            .delete_objects_by_query(class_name, &query, options.session.as_ref())
            .await?;
        if deleted == 0 {
            if class_name == SESSION_CLASS {
                tracing::warn!("no sessions matched, nothing deleted");
                return Ok(());
            }
            return Err(DomainError::ObjectNotFound);
        }
        tracing::debug!(deleted, "objects deleted");
        Ok(())
    }

    /// Drops an empty class together with its relation join collections.
    ///
    /// # Errors
    ///
    /// `ClassNotEmpty` when rows remain.
    #[tracing::instrument(skip_all, fields(class_name = %class_name))]
    pub async fn delete_schema(&self, class_name: &str) -> Result<(), DomainError> {
        let schema = self.schema.load_schema(true).await?;
        let relation_fields: Vec<String> = schema
            .class(class_name)
            .map(|c| c.relation_fields().map(str::to_owned).collect())
            .unwrap_or_default();

        let count = self.storage.count(class_name, &Query::new(), None).await?;
        if count > 0 {
            return Err(DomainError::ClassNotEmpty {
                class_name: class_name.to_owned(),
                count,
            });
        }

        if self.storage.delete_class(class_name).await? {
            let join_tables: Vec<String> = relation_fields
                .iter()
                .map(|field| join_table_name(class_name, field))
                .collect();
            try_join_all(join_tables.iter().map(|t| self.storage.delete_class(t))).await?;
        }
        self.forget_class(class_name).await?;
        self.schema.load_schema(true).await?;
        tracing::info!(relations = relation_fields.len(), "class deleted");
        Ok(())
    }

    /// Replays lifted relation operators against the join collections.
    async fn apply_relation_updates(
        &self,
        class_name: &str,
        owner_id: &str,
        updates: Vec<RelationUpdate>,
        session: Option<&SessionHandle>,
    ) -> Result<(), DomainError> {
        let writes = updates.iter().flat_map(|update| {
            update.related_ids.iter().map(move |related_id| async move {
                let key = update.key.as_str();
                match update.change {
                    RelationChange::Add => {
                        self.add_relation(key, class_name, owner_id, related_id, session)
                            .await
                    }
                    RelationChange::Remove => {
                        self.remove_relation(key, class_name, owner_id, related_id, session)
                            .await
                    }
                }
            })
        });
        try_join_all(writes).await?;
        Ok(())
    }
}

/// Pointer-permission scope of an update, including the `addField`
/// scope when the body introduces new fields.
fn scope_update(
    schema: &SchemaSnapshot,
    class_name: &str,
    query: Query,
    update: &Document,
    acl: &AclGroup,
) -> Result<ScopedQuery, DomainError> {
    let scoped =
        add_pointer_permissions(schema, class_name, Operation::Update, query.clone(), acl);
    if !adds_fields(schema.class(class_name), update)? {
        return Ok(scoped);
    }
    schema.validate_permission(
        class_name,
        acl,
        Operation::AddField,
        Some(Operation::Update),
    )?;
    let add_field =
        add_pointer_permissions(schema, class_name, Operation::AddField, query, acl);
    tracing::debug!("update adds fields, applying addField scope");
    Ok(scoped.and(add_field))
}

fn new_object_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(OBJECT_ID_LEN)
        .map(char::from)
        .collect()
}

fn now_iso() -> Result<String, DomainError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| DomainError::Internal(format!("timestamp formatting failed: {e}")))
}
