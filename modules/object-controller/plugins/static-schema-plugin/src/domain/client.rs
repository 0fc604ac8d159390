//! Client implementation for the static schema plugin.
//!
//! Implements `SchemaRegistryClient` using the domain service.

use async_trait::async_trait;
use object_controller_sdk::{
    ClassSchema, Document, SchemaError, SchemaRegistryClient, SchemaSnapshot,
};

use super::service::Service;

#[async_trait]
impl SchemaRegistryClient for Service {
    async fn load_schema(&self, clear_cache: bool) -> Result<SchemaSnapshot, SchemaError> {
        if clear_cache {
            tracing::trace!("schema reload requested, serving live classes");
        }
        Ok(self.snapshot())
    }

    async fn enforce_class_exists(&self, class_name: &str) -> Result<ClassSchema, SchemaError> {
        self.enforce_class_exists(class_name)
    }

    async fn validate_object(
        &self,
        class_name: &str,
        object: &Document,
    ) -> Result<(), SchemaError> {
        self.validate_object(class_name, object)
    }

    async fn delete_class(&self, class_name: &str) -> Result<(), SchemaError> {
        self.delete_class(class_name)
    }
}
