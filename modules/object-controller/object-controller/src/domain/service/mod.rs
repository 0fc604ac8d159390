//! Orchestrating service for object operations.
//!
//! Every read and write runs the same rewrite pipeline before reaching the
//! storage backend: relation rewrite, pointer-permission rewrite, ACL
//! injection, then validation.

mod read;
mod write;

use std::sync::Arc;

use futures::future::try_join_all;
use object_controller_sdk::{
    FieldUpdate, Query, ROLE_CLASS, SESSION_CLASS, SchemaError, SchemaRegistryClient,
    SchemaSnapshot, SessionHandle, StorageAdapter, TransactionalSession, USER_CLASS,
    UpdateDocument, join_table_name,
};
use serde_json::{Value, json};

use crate::config::ObjectControllerConfig;

use super::error::DomainError;
use super::relations::{JoinPaging, RelationRewriter};

/// Object controller service.
pub struct Service {
    schema: Arc<dyn SchemaRegistryClient>,
    storage: Arc<dyn StorageAdapter>,
    config: ObjectControllerConfig,
}

impl Service {
    #[must_use]
    pub fn new(
        schema: Arc<dyn SchemaRegistryClient>,
        storage: Arc<dyn StorageAdapter>,
        config: ObjectControllerConfig,
    ) -> Self {
        Self {
            schema,
            storage,
            config,
        }
    }

    fn rewriter<'a>(&'a self, schema: &'a SchemaSnapshot) -> RelationRewriter<'a> {
        RelationRewriter::new(
            self.storage.as_ref(),
            schema,
            self.config.large_id_set_threshold,
        )
    }

    /// Resolves `$relatedTo` clauses and relation-field constraints into
    /// `objectId` id sets. Runs before any permission rewrite.
    async fn rewrite_relations(
        &self,
        schema: &SchemaSnapshot,
        class_name: &str,
        query: Query,
        paging: Option<JoinPaging>,
    ) -> Result<Query, DomainError> {
        let rewriter = self.rewriter(schema);
        let query = rewriter
            .reduce_relation_keys(class_name, query, paging)
            .await?;
        rewriter.reduce_in_relation(class_name, query).await
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
    ) -> Result<Vec<String>, DomainError> {
        let schema = SchemaSnapshot::default();
        self.rewriter(&schema)
            .related_ids(owner_class, key, owning_id, None)
            .await
    }

    /// Owning ids of `class_name` whose relation `key` includes any of `related_ids`.
    ///
    /// # Errors
    ///
    /// Storage failure.
    pub async fn owning_ids(
        &self,
        class_name: &str,
        key: &str,
        related_ids: &[String],
    ) -> Result<Vec<String>, DomainError> {
        let schema = SchemaSnapshot::default();
        self.rewriter(&schema)
            .owning_ids(class_name, key, Some(related_ids))
            .await
    }

    /// Records that `from_id` relates to `to_id` through `key`; idempotent.
    ///
    /// # Errors
    ///
    /// Storage failure.
    pub async fn add_relation(
        &self,
        key: &str,
        from_class: &str,
        from_id: &str,
        to_id: &str,
        session: Option<&SessionHandle>,
    ) -> Result<(), DomainError> {
        let (query, row) = join_row(from_id, to_id);
        self.storage
            .upsert_one_object(&join_table_name(from_class, key), &query, &row, session)
            .await?;
        Ok(())
    }

    /// Removes a relation row; a missing row is not an error.
    ///
    /// # Errors
    ///
    /// Storage failure.
    pub async fn remove_relation(
        &self,
        key: &str,
        from_class: &str,
        from_id: &str,
        to_id: &str,
        session: Option<&SessionHandle>,
    ) -> Result<(), DomainError> {
        let (query, _) = join_row(from_id, to_id);
        let removed = self
            .storage
            .delete_objects_by_query(&join_table_name(from_class, key), &query, session)
            .await?;
        if removed == 0 {
            tracing::debug!(key, from_class, from_id, to_id, "relation row already absent");
        }
        Ok(())
    }

    /// Deletes every row of `class_name`, keeping the class.
    ///
    /// # Errors
    ///
    /// Storage failure.
    #[tracing::instrument(skip_all, fields(class_name = %class_name))]
    pub async fn purge_collection(&self, class_name: &str) -> Result<(), DomainError> {
        let removed = self
            .storage
            .delete_objects_by_query(class_name, &Query::new(), None)
            .await?;
        tracing::info!(removed, "collection purged");
        Ok(())
    }

    /// Drops every class and invalidates the schema cache.
    ///
    /// # Errors
    ///
    /// Storage or registry failure.
    pub async fn delete_everything(&self) -> Result<(), DomainError> {
        self.storage.delete_all_classes().await?;
        self.schema.load_schema(true).await?;
        tracing::warn!("all classes deleted");
        Ok(())
    }

    /// Ensures the built-in `_User`, `_Role` and `_Session` classes exist.
    ///
    /// # Errors
    ///
    /// Registry failure.
    pub async fn perform_initialization(&self) -> Result<(), DomainError> {
        try_join_all(
            [USER_CLASS, ROLE_CLASS, SESSION_CLASS]
                .into_iter()
                .map(|class_name| self.schema.enforce_class_exists(class_name)),
        )
        .await?;
        tracing::info!("built-in classes initialized");
        Ok(())
    }

    /// Opens a backend transactional session.
    ///
    /// # Errors
    ///
    /// `Transaction` when `session` is already open; storage failure.
    pub async fn start_transaction(
        &self,
        session: &mut TransactionalSession,
    ) -> Result<(), DomainError> {
        session.ensure_can_begin().map_err(DomainError::Transaction)?;
        let handle = self.storage.create_transactional_session().await?;
        session.begin(handle).map_err(DomainError::Transaction)?;
        tracing::debug!(session = %handle, "transactional session started");
        Ok(())
    }

    /// # Errors
    ///
    /// `Transaction` when no session is open; storage failure.
    pub async fn commit_transaction(
        &self,
        session: &mut TransactionalSession,
    ) -> Result<(), DomainError> {
        let handle = session
            .open_handle("commit")
            .map_err(DomainError::Transaction)?;
        self.storage.commit_transactional_session(&handle).await?;
        session.mark_committed();
        tracing::debug!(session = %handle, "transactional session committed");
        Ok(())
    }

    /// # Errors
    ///
    /// `Transaction` when no session is open; storage failure.
    pub async fn abort_transaction(
        &self,
        session: &mut TransactionalSession,
    ) -> Result<(), DomainError> {
        let handle = session
            .open_handle("abort")
            .map_err(DomainError::Transaction)?;
        self.storage.abort_transactional_session(&handle).await?;
        session.mark_aborted();
        tracing::debug!(session = %handle, "transactional session aborted");
        Ok(())
    }

    /// Forgets a class in the registry; an unknown class is fine.
    async fn forget_class(&self, class_name: &str) -> Result<(), DomainError> {
        match self.schema.delete_class(class_name).await {
            Ok(()) | Err(SchemaError::ClassNotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Join row identity and the update that creates it.
fn join_row(owning_id: &str, related_id: &str) -> (Query, UpdateDocument) {
    let query = Query::from_value(json!({"relatedId": related_id, "owningId": owning_id}))
        .unwrap_or_default();
    let row = UpdateDocument::from([
        (
            "relatedId".to_owned(),
            FieldUpdate::Set(Value::String(related_id.to_owned())),
        ),
        (
            "owningId".to_owned(),
            FieldUpdate::Set(Value::String(owning_id.to_owned())),
        ),
    ]);
    (query, row)
}
