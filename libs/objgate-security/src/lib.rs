#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
pub mod acl_group;
pub mod context;

pub use acl_group::{AclGroup, PUBLIC_TOKEN, ROLE_PREFIX};
pub use context::SecurityContext;
