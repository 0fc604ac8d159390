//! Domain layer for the static schema plugin.

pub mod client;
pub mod service;
