#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Object controller SDK
//!
//! Shared types for the authorization-aware object controller and its
//! pluggable collaborators (schema registry, storage backend).
//!
//! ```ignore
//! let objects = client
//!     .find(&ctx, "Post", Query::new(), FindOptions::for_context(&ctx))
//!     .await?
//!     .into_objects();
//! ```

pub mod api;
pub mod error;
pub mod models;
pub mod permissions;
pub mod schema_api;
pub mod storage_api;
pub mod transaction;
pub mod update_ops;

pub use api::ObjectControllerClient;
pub use error::{ObjectControllerError, SchemaError, StorageError};
pub use models::{
    ACL_FIELD, ClassSchema, CreateOptions, DestroyOptions, Document, FieldType, FindOptions,
    FindResult, OBJECT_ID_FIELD, Query, READ_PERMISSION_FIELD, ROLE_CLASS, SESSION_CLASS,
    SortDirection, SortKey, USER_CLASS, UpdateOptions, WRITE_PERMISSION_FIELD, join_table_name,
};
pub use permissions::{
    ClassLevelPermissions, Operation, OperationPermissions, PermissionDenial, USER_FIELD_PREFIX,
};
pub use schema_api::{SchemaRegistryClient, SchemaSnapshot};
pub use storage_api::{
    FieldUpdate, SessionHandle, StorageAdapter, StorageFindOptions, UpdateDocument,
};
pub use transaction::TransactionalSession;
pub use update_ops::{UpdateOperator, UpdateOperatorError};
