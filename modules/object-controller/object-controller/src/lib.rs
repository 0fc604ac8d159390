#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Object controller
//!
//! Entry points are [`Service`] (`find`, `create`, `update`, `destroy` and
//! maintenance operations) and [`ObjectControllerLocalClient`], the
//! in-process implementation of `ObjectControllerClient`.

pub mod config;
pub mod domain;

pub use config::{KeywordRule, ObjectControllerConfig};
pub use domain::local_client::ObjectControllerLocalClient;
pub use domain::service::Service;
