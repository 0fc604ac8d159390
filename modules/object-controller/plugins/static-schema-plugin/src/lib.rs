#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Static Schema Plugin
//!
//! Schema registry serving class definitions from configuration.

pub mod config;
pub mod domain;

pub use config::StaticSchemaPluginConfig;
pub use domain::service::Service;
