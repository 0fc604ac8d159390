//! Storage backend interface.
//!
//! The backend executes already-authorized queries; it never evaluates
//! class-level permissions itself. Every mutating call receives the active
//! transactional session handle, or `None`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Number, Value};
use uuid::Uuid;

use crate::error::StorageError;
use crate::models::{Document, Query, SortKey};

/// Opaque handle to a backend transactional session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Storage-applicable change for one (possibly dotted) field path.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(Value),
    /// Adds `amount`; a missing field starts from zero.
    Increment(Number),
    /// Appends every item.
    Add(Vec<Value>),
    /// Appends items not already present.
    AddUnique(Vec<Value>),
    /// Removes every occurrence of each item.
    Remove(Vec<Value>),
    Unset,
}

/// Field path to change.
pub type UpdateDocument = BTreeMap<String, FieldUpdate>;

#[derive(Debug, Clone, Default)]
pub struct StorageFindOptions {
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    /// Sort keys; `_id` orders by insertion.
    pub sort: Vec<SortKey>,
    /// Projection; system fields are always returned.
    pub keys: Option<Vec<String>>,
    pub read_preference: Option<String>,
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// # Errors
    /// Backend failure.
    async fn class_exists(&self, class_name: &str) -> Result<bool, StorageError>;

    /// Inserts one row and returns it as stored.
    ///
    /// # Errors
    /// Backend failure or unknown session.
    async fn create_object(
        &self,
        class_name: &str,
        object: Document,
        session: Option<&SessionHandle>,
    ) -> Result<Document, StorageError>;

    /// # Errors
    /// Backend failure.
    async fn find(
        &self,
        class_name: &str,
        query: &Query,
        options: &StorageFindOptions,
    ) -> Result<Vec<Document>, StorageError>;

    /// # Errors
    /// Backend failure.
    async fn count(
        &self,
        class_name: &str,
        query: &Query,
        read_preference: Option<&str>,
    ) -> Result<u64, StorageError>;

    /// Distinct values of `field` among matching rows; array values are flattened.
    ///
    /// # Errors
    /// Backend failure.
    async fn distinct(
        &self,
        class_name: &str,
        query: &Query,
        field: &str,
    ) -> Result<Vec<Value>, StorageError>;

    /// # Errors
    /// Backend failure or unsupported pipeline stage.
    async fn aggregate(
        &self,
        class_name: &str,
        pipeline: &[Value],
        read_preference: Option<&str>,
    ) -> Result<Vec<Document>, StorageError>;

    /// Updates the first matching row and returns it after the update.
    ///
    /// # Errors
    /// Backend failure or unknown session.
    async fn find_one_and_update(
        &self,
        class_name: &str,
        query: &Query,
        update: &UpdateDocument,
        session: Option<&SessionHandle>,
    ) -> Result<Option<Document>, StorageError>;

    /// Updates every matching row; returns the number of rows matched.
    ///
    /// # Errors
    /// Backend failure or unknown session.
    async fn update_objects_by_query(
        &self,
        class_name: &str,
        query: &Query,
        update: &UpdateDocument,
        session: Option<&SessionHandle>,
    ) -> Result<u64, StorageError>;

    /// Updates the first matching row, or inserts one seeded from the
    /// query's equality constraints.
    ///
    /// # Errors
    /// Backend failure or unknown session.
    async fn upsert_one_object(
        &self,
        class_name: &str,
        query: &Query,
        update: &UpdateDocument,
        session: Option<&SessionHandle>,
    ) -> Result<(), StorageError>;

    /// Deletes matching rows; returns how many were removed.
    ///
    /// # Errors
    /// Backend failure or unknown session.
    async fn delete_objects_by_query(
        &self,
        class_name: &str,
        query: &Query,
        session: Option<&SessionHandle>,
    ) -> Result<u64, StorageError>;

    /// Drops a collection; returns whether it existed.
    ///
    /// # Errors
    /// Backend failure.
    async fn delete_class(&self, class_name: &str) -> Result<bool, StorageError>;

    /// # Errors
    /// Backend failure.
    async fn delete_all_classes(&self) -> Result<(), StorageError>;

    /// Whether join collections can be scanned in insertion order with paging.
    fn can_sort_on_join_tables(&self) -> bool;

    /// # Errors
    /// Backend failure.
    async fn create_transactional_session(&self) -> Result<SessionHandle, StorageError>;

    /// # Errors
    /// Backend failure or unknown session.
    async fn commit_transactional_session(
        &self,
        session: &SessionHandle,
    ) -> Result<(), StorageError>;

    /// # Errors
    /// Backend failure or unknown session.
    async fn abort_transactional_session(&self, session: &SessionHandle)
    -> Result<(), StorageError>;
}
