//! Public API trait for the object controller.

use async_trait::async_trait;
use objgate_security::SecurityContext;

use crate::error::ObjectControllerError;
use crate::models::{
    CreateOptions, DestroyOptions, Document, FindOptions, FindResult, Query, UpdateOptions,
};
use crate::transaction::TransactionalSession;

/// Authorization-aware object operations.
///
/// Every call is rewritten against the class-level permissions, the
/// per-object ACLs and the pointer/protected-field policies of the class
/// before it reaches the storage backend.
#[async_trait]
pub trait ObjectControllerClient: Send + Sync {
    /// Finds, counts, lists distinct values or aggregates.
    ///
    /// A missing class behaves as an empty class.
    ///
    /// # Errors
    ///
    /// - `InvalidQuery` / `InvalidKeyName` for malformed queries or sort keys
    /// - `PermissionDenied` when the class-level check fails
    /// - `ObjectNotFound` for a `get` the caller may not see
    /// - `Internal` for backend failures
    async fn find(
        &self,
        ctx: &SecurityContext,
        class_name: &str,
        query: Query,
        options: FindOptions,
    ) -> Result<FindResult, ObjectControllerError>;

    /// Creates one object; returns the result-bearing fields of the stored row.
    ///
    /// # Errors
    ///
    /// - `InvalidClassName`, `InvalidKeyName`, `InvalidJson`, `IncorrectType`
    /// - `UnsupportedOperator` for operators that cannot apply to a new object
    /// - `PermissionDenied`
    async fn create(
        &self,
        ctx: &SecurityContext,
        class_name: &str,
        object: Document,
        options: CreateOptions,
    ) -> Result<Document, ObjectControllerError>;

    /// Updates matching objects; the response holds only fields changed by
    /// result-bearing operators.
    ///
    /// # Errors
    ///
    /// - `ObjectNotFound` when the single target is missing or not writable
    /// - `InvalidKeyName` / `InvalidNestedKey` for malformed update keys
    /// - `PermissionDenied`
    async fn update(
        &self,
        ctx: &SecurityContext,
        class_name: &str,
        query: Query,
        update: Document,
        options: UpdateOptions,
    ) -> Result<Document, ObjectControllerError>;

    /// Deletes matching objects.
    ///
    /// # Errors
    ///
    /// `ObjectNotFound` when nothing was deleted (except for `_Session`).
    async fn destroy(
        &self,
        ctx: &SecurityContext,
        class_name: &str,
        query: Query,
        options: DestroyOptions,
    ) -> Result<(), ObjectControllerError>;

    /// Drops an empty class and its relation join collections.
    ///
    /// # Errors
    ///
    /// `ClassNotEmpty` when rows remain.
    async fn delete_schema(&self, class_name: &str) -> Result<(), ObjectControllerError>;

    /// # Errors
    ///
    /// `InvalidTransactionState` when `session` is already open.
    async fn start_transaction(
        &self,
        session: &mut TransactionalSession,
    ) -> Result<(), ObjectControllerError>;

    /// # Errors
    ///
    /// `InvalidTransactionState` when `session` is not open.
    async fn commit_transaction(
        &self,
        session: &mut TransactionalSession,
    ) -> Result<(), ObjectControllerError>;

    /// # Errors
    ///
    /// `InvalidTransactionState` when `session` is not open.
    async fn abort_transaction(
        &self,
        session: &mut TransactionalSession,
    ) -> Result<(), ObjectControllerError>;
}
