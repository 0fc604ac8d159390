//! Configuration for the memory storage plugin.

use serde::Deserialize;

/// Plugin configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryStoragePluginConfig {
    /// Report join collections as scannable in insertion order with paging.
    pub can_sort_on_join_tables: bool,
}

impl Default for MemoryStoragePluginConfig {
    fn default() -> Self {
        Self {
            can_sort_on_join_tables: true,
        }
    }
}
