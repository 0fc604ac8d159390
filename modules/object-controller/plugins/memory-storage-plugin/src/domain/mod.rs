//! Domain layer for the memory storage plugin.

pub mod client;
pub mod matcher;
pub mod service;
pub mod update;
