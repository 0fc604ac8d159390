//! Configuration for the static schema plugin.

use object_controller_sdk::ClassSchema;
use serde::Deserialize;

/// Plugin configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticSchemaPluginConfig {
    /// Classes known at startup; others are created on first write.
    pub classes: Vec<ClassSchema>,
}
