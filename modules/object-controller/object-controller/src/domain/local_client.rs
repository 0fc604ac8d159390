//! Local (in-process) client for the object controller.

use std::sync::Arc;

use async_trait::async_trait;
use object_controller_sdk::{
    CreateOptions, DestroyOptions, Document, FindOptions, FindResult, ObjectControllerClient,
    ObjectControllerError, Query, TransactionalSession, UpdateOptions,
};
use objgate_security::SecurityContext;

use super::{DomainError, Service};

/// Local client wrapping the service.
pub struct ObjectControllerLocalClient {
    svc: Arc<Service>,
}

impl ObjectControllerLocalClient {
    #[must_use]
    pub fn new(svc: Arc<Service>) -> Self {
        Self { svc }
    }
}

fn log_and_convert(op: &str, e: DomainError) -> ObjectControllerError {
    tracing::error!(operation = op, error = ?e, "object_controller call failed");
    e.into()
}

#[async_trait]
impl ObjectControllerClient for ObjectControllerLocalClient {
    async fn find(
        &self,
        ctx: &SecurityContext,
        class_name: &str,
        query: Query,
        options: FindOptions,
    ) -> Result<FindResult, ObjectControllerError> {
        self.svc
            .find(ctx, class_name, query, options)
            .await
            .map_err(|e| log_and_convert("find", e))
    }

    async fn create(
        &self,
        _ctx: &SecurityContext,
        class_name: &str,
        object: Document,
        options: CreateOptions,
    ) -> Result<Document, ObjectControllerError> {
        self.svc
            .create(class_name, object, options)
            .await
            .map_err(|e| log_and_convert("create", e))
    }

    async fn update(
        &self,
        _ctx: &SecurityContext,
        class_name: &str,
        query: Query,
        update: Document,
        options: UpdateOptions,
    ) -> Result<Document, ObjectControllerError> {
        self.svc
            .update(class_name, query, update, options)
            .await
            .map_err(|e| log_and_convert("update", e))
    }

    async fn destroy(
        &self,
        _ctx: &SecurityContext,
        class_name: &str,
        query: Query,
        options: DestroyOptions,
    ) -> Result<(), ObjectControllerError> {
        self.svc
            .destroy(class_name, query, options)
            .await
            .map_err(|e| log_and_convert("destroy", e))
    }

    async fn delete_schema(&self, class_name: &str) -> Result<(), ObjectControllerError> {
        self.svc
            .delete_schema(class_name)
            .await
            .map_err(|e| log_and_convert("delete_schema", e))
    }

    async fn start_transaction(
        &self,
        session: &mut TransactionalSession,
    ) -> Result<(), ObjectControllerError> {
        self.svc
            .start_transaction(session)
            .await
            .map_err(|e| log_and_convert("start_transaction", e))
    }

    async fn commit_transaction(
        &self,
        session: &mut TransactionalSession,
    ) -> Result<(), ObjectControllerError> {
        self.svc
            .commit_transaction(session)
            .await
            .map_err(|e| log_and_convert("commit_transaction", e))
    }

    async fn abort_transaction(
        &self,
        session: &mut TransactionalSession,
    ) -> Result<(), ObjectControllerError> {
        self.svc
            .abort_transaction(session)
            .await
            .map_err(|e| log_and_convert("abort_transaction", e))
    }
}
