//! Client implementation for the memory storage plugin.
//!
//! Implements `StorageAdapter` using the domain service.

use async_trait::async_trait;
use object_controller_sdk::{
    Document, Query, SessionHandle, StorageAdapter, StorageError, StorageFindOptions,
    UpdateDocument,
};
use serde_json::Value;

use super::service::Service;

#[async_trait]
impl StorageAdapter for Service {
    async fn class_exists(&self, class_name: &str) -> Result<bool, StorageError> {
        Ok(self.class_exists(class_name))
    }

    async fn create_object(
        &self,
        class_name: &str,
        object: Document,
        session: Option<&SessionHandle>,
    ) -> Result<Document, StorageError> {
        self.create_object(class_name, object, session)
    }

    async fn find(
        &self,
        class_name: &str,
        query: &Query,
        options: &StorageFindOptions,
    ) -> Result<Vec<Document>, StorageError> {
        self.find(class_name, query, options)
    }

    async fn count(
        &self,
        class_name: &str,
        query: &Query,
        _read_preference: Option<&str>,
    ) -> Result<u64, StorageError> {
        self.count(class_name, query)
    }

    async fn distinct(
        &self,
        class_name: &str,
        query: &Query,
        field: &str,
    ) -> Result<Vec<Value>, StorageError> {
        self.distinct(class_name, query, field)
    }

    async fn aggregate(
        &self,
        class_name: &str,
        pipeline: &[Value],
        _read_preference: Option<&str>,
    ) -> Result<Vec<Document>, StorageError> {
        self.aggregate(class_name, pipeline)
    }

    async fn find_one_and_update(
        &self,
        class_name: &str,
        query: &Query,
        update: &UpdateDocument,
        session: Option<&SessionHandle>,
    ) -> Result<Option<Document>, StorageError> {
        self.find_one_and_update(class_name, query, update, session)
    }

    async fn update_objects_by_query(
        &self,
        class_name: &str,
        query: &Query,
        update: &UpdateDocument,
        session: Option<&SessionHandle>,
    ) -> Result<u64, StorageError> {
        self.update_objects_by_query(class_name, query, update, session)
    }

    async fn upsert_one_object(
        &self,
        class_name: &str,
        query: &Query,
        update: &UpdateDocument,
        session: Option<&SessionHandle>,
    ) -> Result<(), StorageError> {
        self.upsert_one_object(class_name, query, update, session)
    }

    async fn delete_objects_by_query(
        &self,
        class_name: &str,
        query: &Query,
        session: Option<&SessionHandle>,
    ) -> Result<u64, StorageError> {
        self.delete_objects_by_query(class_name, query, session)
    }

    async fn delete_class(&self, class_name: &str) -> Result<bool, StorageError> {
        Ok(self.delete_class(class_name))
    }

    async fn delete_all_classes(&self) -> Result<(), StorageError> {
        self.delete_all_classes();
        Ok(())
    }

    fn can_sort_on_join_tables(&self) -> bool {
        self.can_sort_on_join_tables()
    }

    async fn create_transactional_session(&self) -> Result<SessionHandle, StorageError> {
        Ok(self.create_transactional_session())
    }

    async fn commit_transactional_session(
        &self,
        session: &SessionHandle,
    ) -> Result<(), StorageError> {
        self.commit_transactional_session(session)
    }

    async fn abort_transactional_session(
        &self,
        session: &SessionHandle,
    ) -> Result<(), StorageError> {
        self.abort_transactional_session(session)
    }
}
