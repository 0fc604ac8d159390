#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Memory Storage Plugin
//!
//! In-memory storage backend executing already-authorized queries for the
//! object controller. Intended for development and tests.
//!
//! ## Configuration
//!
//! ```yaml
//! modules:
//!   memory_storage_plugin:
//!     config:
//!       can_sort_on_join_tables: true
//! ```

pub mod config;
pub mod domain;

pub use config::MemoryStoragePluginConfig;
pub use domain::service::Service;
