//! Domain layer for the object controller.
//!
//! Pure rewrite stages live in their own modules; [`service::Service`]
//! composes them around the schema registry and storage backend.

pub mod acl;
pub mod error;
pub mod id_set;
pub mod keys;
pub mod local_client;
pub mod pointer_permissions;
pub mod protected_fields;
pub mod relations;
pub mod sanitize;
pub mod service;
pub mod update;
pub mod validator;

pub use error::DomainError;
pub use local_client::ObjectControllerLocalClient;
pub use service::Service;
