#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use memory_storage_plugin::MemoryStoragePluginConfig;
use object_controller::{ObjectControllerConfig, ObjectControllerLocalClient, Service};
use object_controller_sdk::{ClassSchema, Document, FieldType, Query, USER_CLASS};
use objgate_security::SecurityContext;
use serde_json::{Value, json};
use static_schema_plugin::StaticSchemaPluginConfig;

pub struct Harness {
    pub svc: Arc<Service>,
    pub client: ObjectControllerLocalClient,
    pub storage: Arc<memory_storage_plugin::Service>,
}

pub fn harness(classes: Vec<ClassSchema>) -> Harness {
    let schema = Arc::new(
        static_schema_plugin::Service::from_config(&StaticSchemaPluginConfig { classes })
            .expect("valid schema config"),
    );
    let storage = Arc::new(memory_storage_plugin::Service::from_config(
        &MemoryStoragePluginConfig::default(),
    ));
    let svc = Arc::new(Service::new(
        schema,
        storage.clone(),
        ObjectControllerConfig::default(),
    ));
    Harness {
        client: ObjectControllerLocalClient::new(svc.clone()),
        svc,
        storage,
    }
}

pub fn doc(v: Value) -> Document {
    match v {
        Value::Object(m) => m,
        other => panic!("expected an object, got {other}"),
    }
}

pub fn query(v: Value) -> Query {
    Query::from_value(v).expect("query must be an object")
}

pub fn user(id: &str) -> SecurityContext {
    SecurityContext::builder().user_id(id).build()
}

pub fn pointer(class_name: &str, id: &str) -> Value {
    json!({"__type": "Pointer", "className": class_name, "objectId": id})
}

pub fn user_pointer_field() -> FieldType {
    FieldType::Pointer {
        target_class: USER_CLASS.to_owned(),
    }
}

pub fn ids(rows: &[Document]) -> Vec<String> {
    let mut ids: Vec<String> = rows
        .iter()
        .filter_map(|r| r.get("objectId").and_then(Value::as_str))
        .map(str::to_owned)
        .collect();
    ids.sort();
    ids
}
