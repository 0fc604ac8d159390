//! Service implementation for the memory storage plugin.

use std::cmp::Ordering;
use std::collections::HashMap;

use object_controller_sdk::{
    Document, OBJECT_ID_FIELD, Query, READ_PERMISSION_FIELD, SessionHandle, SortKey,
    StorageError, StorageFindOptions, UpdateDocument, WRITE_PERMISSION_FIELD,
};
use parking_lot::RwLock;
use serde_json::Value;

use super::matcher::{compare_values, lookup, matches};
use super::update::{apply, upsert_seed};
use crate::config::MemoryStoragePluginConfig;

/// Fields returned regardless of the requested projection.
const ALWAYS_PROJECTED: [&str; 5] = [
    OBJECT_ID_FIELD,
    "createdAt",
    "updatedAt",
    READ_PERMISSION_FIELD,
    WRITE_PERMISSION_FIELD,
];

#[derive(Debug, Clone)]
struct StoredRow {
    /// Insertion sequence, exposed to sorting as `_id`.
    seq: u64,
    doc: Document,
}

type Collections = HashMap<String, Vec<StoredRow>>;

#[derive(Debug, Default)]
struct Store {
    classes: Collections,
    next_seq: u64,
    /// State captured when each open session began; restored on abort.
    sessions: HashMap<SessionHandle, Collections>,
}

impl Store {
    fn ensure_session(&self, session: Option<&SessionHandle>) -> Result<(), StorageError> {
        match session {
            Some(handle) if !self.sessions.contains_key(handle) => {
                Err(StorageError::UnknownSession(handle.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn push(&mut self, class_name: &str, doc: Document) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.classes
            .entry(class_name.to_owned())
            .or_default()
            .push(StoredRow { seq, doc });
    }
}

/// In-memory storage backend.
///
/// Sessions snapshot the whole store on begin; writes apply immediately and
/// an abort restores the snapshot.
pub struct Service {
    can_sort_on_join_tables: bool,
    state: RwLock<Store>,
}

impl Service {
    /// Create a service from plugin configuration.
    #[must_use]
    pub fn from_config(cfg: &MemoryStoragePluginConfig) -> Self {
        Self {
            can_sort_on_join_tables: cfg.can_sort_on_join_tables,
            state: RwLock::new(Store::default()),
        }
    }

    #[must_use]
    pub fn can_sort_on_join_tables(&self) -> bool {
        self.can_sort_on_join_tables
    }

    #[must_use]
    pub fn class_exists(&self, class_name: &str) -> bool {
        self.state.read().classes.contains_key(class_name)
    }

    /// # Errors
    ///
    /// `Backend` for a duplicate `objectId`, `UnknownSession`.
    pub fn create_object(
        &self,
        class_name: &str,
        object: Document,
        session: Option<&SessionHandle>,
    ) -> Result<Document, StorageError> {
        let mut store = self.state.write();
        store.ensure_session(session)?;
        if let Some(id) = object.get(OBJECT_ID_FIELD)
            && store
                .classes
                .get(class_name)
                .is_some_and(|rows| rows.iter().any(|r| r.doc.get(OBJECT_ID_FIELD) == Some(id)))
        {
            return Err(StorageError::Backend(format!(
                "duplicate objectId {id} in {class_name}"
            )));
        }
        store.push(class_name, object.clone());
        Ok(object)
    }

    /// # Errors
    ///
    /// Unsupported or malformed query operators.
    pub fn find(
        &self,
        class_name: &str,
        query: &Query,
        options: &StorageFindOptions,
    ) -> Result<Vec<Document>, StorageError> {
        let store = self.state.read();
        let mut rows = matching(&store, class_name, query)?;
        if !options.sort.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, &options.sort));
        }
        Ok(page(rows, options.skip, options.limit)
            .map(|row| project(&row.doc, options.keys.as_deref()))
            .collect())
    }

    /// # Errors
    ///
    /// Unsupported or malformed query operators.
    pub fn count(&self, class_name: &str, query: &Query) -> Result<u64, StorageError> {
        let store = self.state.read();
        Ok(matching(&store, class_name, query)?.len() as u64)
    }

    /// # Errors
    ///
    /// Unsupported or malformed query operators.
    pub fn distinct(
        &self,
        class_name: &str,
        query: &Query,
        field: &str,
    ) -> Result<Vec<Value>, StorageError> {
        let store = self.state.read();
        let mut values: Vec<Value> = Vec::new();
        for row in matching(&store, class_name, query)? {
            let found = match lookup(&row.doc, field) {
                Some(Value::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => continue,
            };
            for value in found {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }
        Ok(values)
    }

    /// Runs `$match`, `$sort`, `$skip`, `$limit`, `$project` and `$count` stages.
    ///
    /// # Errors
    ///
    /// `Unsupported` for any other stage, `Backend` for malformed stages.
    pub fn aggregate(
        &self,
        class_name: &str,
        pipeline: &[Value],
    ) -> Result<Vec<Document>, StorageError> {
        let mut rows: Vec<StoredRow> = {
            let store = self.state.read();
            store.classes.get(class_name).cloned().unwrap_or_default()
        };
        for stage in pipeline {
            let (name, arg) = stage
                .as_object()
                .filter(|s| s.len() == 1)
                .and_then(|s| s.iter().next())
                .ok_or_else(|| {
                    StorageError::Backend("pipeline stages must have exactly one key".to_owned())
                })?;
            rows = run_stage(rows, name, arg)?;
        }
        Ok(rows.into_iter().map(|r| r.doc).collect())
    }

    /// # Errors
    ///
    /// `UnknownSession`, unsupported operators, or an update that does not fit
    /// the stored value.
    pub fn find_one_and_update(
        &self,
        class_name: &str,
        query: &Query,
        update: &UpdateDocument,
        session: Option<&SessionHandle>,
    ) -> Result<Option<Document>, StorageError> {
        let mut store = self.state.write();
        store.ensure_session(session)?;
        let Some(rows) = store.classes.get_mut(class_name) else {
            return Ok(None);
        };
        for row in rows {
            if matches(&row.doc, query)? {
                apply(&mut row.doc, update)?;
                return Ok(Some(row.doc.clone()));
            }
        }
        Ok(None)
    }

    /// # Errors
    ///
    /// See [`Service::find_one_and_update`].
    pub fn update_objects_by_query(
        &self,
        class_name: &str,
        query: &Query,
        update: &UpdateDocument,
        session: Option<&SessionHandle>,
    ) -> Result<u64, StorageError> {
        let mut store = self.state.write();
        store.ensure_session(session)?;
        let mut matched = 0;
        for row in store.classes.get_mut(class_name).into_iter().flatten() {
            if matches(&row.doc, query)? {
                apply(&mut row.doc, update)?;
                matched += 1;
            }
        }
        Ok(matched)
    }

    /// # Errors
    ///
    /// See [`Service::find_one_and_update`].
    pub fn upsert_one_object(
        &self,
        class_name: &str,
        query: &Query,
        update: &UpdateDocument,
        session: Option<&SessionHandle>,
    ) -> Result<(), StorageError> {
        if self
            .find_one_and_update(class_name, query, update, session)?
            .is_some()
        {
            return Ok(());
        }
        let mut doc = upsert_seed(query);
        apply(&mut doc, update)?;
        let mut store = self.state.write();
        store.ensure_session(session)?;
        store.push(class_name, doc);
        tracing::trace!(class_name, "upsert inserted a new row");
        Ok(())
    }

    /// # Errors
    ///
    /// `UnknownSession` or unsupported operators.
    pub fn delete_objects_by_query(
        &self,
        class_name: &str,
        query: &Query,
        session: Option<&SessionHandle>,
    ) -> Result<u64, StorageError> {
        let mut store = self.state.write();
        store.ensure_session(session)?;
        let Some(rows) = store.classes.get_mut(class_name) else {
            return Ok(0);
        };
        let mut doomed = Vec::with_capacity(rows.len());
        for row in &*rows {
            doomed.push(matches(&row.doc, query)?);
        }
        let before = rows.len();
        let mut verdicts = doomed.into_iter();
        rows.retain(|_| !verdicts.next().unwrap_or(false));
        Ok((before - rows.len()) as u64)
    }

    /// Drops a collection; returns whether it existed.
    #[must_use]
    pub fn delete_class(&self, class_name: &str) -> bool {
        self.state.write().classes.remove(class_name).is_some()
    }

    pub fn delete_all_classes(&self) {
        let mut store = self.state.write();
        let dropped = store.classes.len();
        store.classes.clear();
        tracing::debug!(dropped, "all collections dropped");
    }

    #[must_use]
    pub fn create_transactional_session(&self) -> SessionHandle {
        let handle = SessionHandle::new();
        let mut store = self.state.write();
        let snapshot = store.classes.clone();
        store.sessions.insert(handle, snapshot);
        tracing::debug!(session = %handle, "session started");
        handle
    }

    /// # Errors
    ///
    /// `UnknownSession`.
    pub fn commit_transactional_session(&self, session: &SessionHandle) -> Result<(), StorageError> {
        self.state
            .write()
            .sessions
            .remove(session)
            .map(|_| ())
            .ok_or_else(|| StorageError::UnknownSession(session.to_string()))
    }

    /// # Errors
    ///
    /// `UnknownSession`.
    pub fn abort_transactional_session(&self, session: &SessionHandle) -> Result<(), StorageError> {
        let mut store = self.state.write();
        let snapshot = store
            .sessions
            .remove(session)
            .ok_or_else(|| StorageError::UnknownSession(session.to_string()))?;
        store.classes = snapshot;
        tracing::debug!(session = %session, "session aborted, store restored");
        Ok(())
    }
}

fn matching<'a>(
    store: &'a Store,
    class_name: &str,
    query: &Query,
) -> Result<Vec<&'a StoredRow>, StorageError> {
    let mut out = Vec::new();
    for row in store.classes.get(class_name).into_iter().flatten() {
        if matches(&row.doc, query)? {
            out.push(row);
        }
    }
    Ok(out)
}

fn page<T>(rows: Vec<T>, skip: Option<u64>, limit: Option<u64>) -> impl Iterator<Item = T> {
    let skip = usize::try_from(skip.unwrap_or(0)).unwrap_or(usize::MAX);
    let limit = limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
    rows.into_iter().skip(skip).take(limit)
}

fn compare_rows(a: &StoredRow, b: &StoredRow, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let ord = if key.field == "_id" {
            a.seq.cmp(&b.seq)
        } else {
            match (lookup(&a.doc, &key.field), lookup(&b.doc, &key.field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            }
        };
        let ord = if key.is_descending() { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn project(doc: &Document, keys: Option<&[String]>) -> Document {
    let Some(keys) = keys else {
        return doc.clone();
    };
    doc.iter()
        .filter(|(name, _)| {
            ALWAYS_PROJECTED.contains(&name.as_str())
                || keys
                    .iter()
                    .any(|k| k.split('.').next() == Some(name.as_str()))
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn run_stage(rows: Vec<StoredRow>, name: &str, arg: &Value) -> Result<Vec<StoredRow>, StorageError> {
    let malformed = || StorageError::Backend(format!("malformed {name} stage"));
    match name {
        "$match" => {
            let query = arg.as_object().ok_or_else(malformed)?;
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                if matches(&row.doc, query)? {
                    out.push(row);
                }
            }
            Ok(out)
        }
        "$sort" => {
            let stage_fields = arg.as_object().ok_or_else(malformed)?;
            let sort: Vec<SortKey> = stage_fields
                .iter()
                .map(|(field, dir)| {
                    if dir.as_i64() == Some(-1) {
                        SortKey::descending(field)
                    } else {
                        SortKey::ascending(field)
                    }
                })
                .collect();
            let mut rows = rows;
            rows.sort_by(|a, b| compare_rows(a, b, &sort));
            Ok(rows)
        }
        "$skip" => Ok(page(rows, Some(arg.as_u64().ok_or_else(malformed)?), None).collect()),
        "$limit" => Ok(page(rows, None, Some(arg.as_u64().ok_or_else(malformed)?)).collect()),
        "$project" => {
            let stage_fields = arg.as_object().ok_or_else(malformed)?;
            let keys: Vec<String> = stage_fields
                .iter()
                .filter(|(_, v)| v.as_bool() == Some(true) || v.as_i64() == Some(1))
                .map(|(k, _)| k.clone())
                .collect();
            Ok(rows
                .into_iter()
                .map(|row| StoredRow {
                    seq: row.seq,
                    doc: project(&row.doc, Some(&keys)),
                })
                .collect())
        }
        "$count" => {
            let field = arg.as_str().ok_or_else(malformed)?;
            let mut doc = Document::new();
            doc.insert(field.to_owned(), Value::from(rows.len()));
            Ok(vec![StoredRow { seq: 0, doc }])
        }
        other => Err(StorageError::Unsupported(format!("pipeline stage {other}"))),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use object_controller_sdk::FieldUpdate;
    use serde_json::json;

    use super::*;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    fn query(v: Value) -> Query {
        Query::from_value(v).unwrap()
    }

    fn seeded() -> Service {
        let svc = Service::from_config(&MemoryStoragePluginConfig::default());
        let rows = [
            ("a", 3, json!(["x"])),
            ("b", 1, json!(["x", "y"])),
            ("c", 2, json!([])),
        ];
        for (id, n, tags) in rows {
            let row = doc(json!({"objectId": id, "n": n, "tags": tags, "secret": 1}));
            svc.create_object("Item", row, None).unwrap();
        }
        svc
    }

    #[test]
    fn find_sorts_pages_and_projects() {
        let svc = seeded();
        let opts = StorageFindOptions {
            sort: vec![SortKey::ascending("n")],
            skip: Some(1),
            limit: Some(1),
            keys: Some(vec!["n".to_owned()]),
            ..StorageFindOptions::default()
        };
        let rows = svc.find("Item", &Query::new(), &opts).unwrap();
        assert_eq!(rows, vec![doc(json!({"objectId": "c", "n": 2}))]);

        let opts = StorageFindOptions {
            sort: vec![SortKey::descending("_id")],
            ..StorageFindOptions::default()
        };
        let ids: Vec<_> = svc
            .find("Item", &Query::new(), &opts)
            .unwrap()
            .into_iter()
            .map(|r| r["objectId"].clone())
            .collect();
        assert_eq!(ids, vec![json!("c"), json!("b"), json!("a")]);
    }

    #[test]
    fn duplicate_object_id_is_rejected() {
        let svc = seeded();
        let err = svc
            .create_object("Item", doc(json!({"objectId": "a"})), None)
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
    }

    #[test]
    fn distinct_flattens_arrays() {
        let svc = seeded();
        let values = svc.distinct("Item", &Query::new(), "tags").unwrap();
        assert_eq!(values, vec![json!("x"), json!("y")]);
    }

    #[test]
    fn aggregate_pipeline() {
        let svc = seeded();
        let rows = svc
            .aggregate(
                "Item",
                &[json!({"$match": {"n": {"$gte": 2}}}), json!({"$count": "total"})],
            )
            .unwrap();
        assert_eq!(rows, vec![doc(json!({"total": 2}))]);

        let err = svc.aggregate("Item", &[json!({"$group": {}})]).unwrap_err();
        assert!(matches!(err, StorageError::Unsupported(_)));
    }

    #[test]
    fn updates_and_deletes() {
        let svc = seeded();
        let inc = UpdateDocument::from([("n".to_owned(), FieldUpdate::Increment(10.into()))]);
        let row = svc
            .find_one_and_update("Item", &query(json!({"objectId": "b"})), &inc, None)
            .unwrap()
            .unwrap();
        assert_eq!(row["n"], json!(11));

        let many = svc
            .update_objects_by_query("Item", &query(json!({"tags": "x"})), &inc, None)
            .unwrap();
        assert_eq!(many, 2);

        let deleted = svc
            .delete_objects_by_query("Item", &query(json!({"n": {"$gt": 10}})), None)
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(svc.count("Item", &Query::new()).unwrap(), 1);
    }

    #[test]
    fn upsert_inserts_once() {
        let svc = seeded();
        let q = query(json!({"owningId": "o", "relatedId": "r"}));
        let set = UpdateDocument::from([("owningId".to_owned(), FieldUpdate::Set(json!("o")))]);
        svc.upsert_one_object("_Join:k:Item", &q, &set, None).unwrap();
        svc.upsert_one_object("_Join:k:Item", &q, &set, None).unwrap();
        assert_eq!(svc.count("_Join:k:Item", &Query::new()).unwrap(), 1);
    }

    #[test]
    fn abort_restores_snapshot() {
        let svc = seeded();
        let handle = svc.create_transactional_session();
        svc.create_object("Item", doc(json!({"objectId": "d"})), Some(&handle))
            .unwrap();
        assert_eq!(svc.count("Item", &Query::new()).unwrap(), 4);
        svc.abort_transactional_session(&handle).unwrap();
        assert_eq!(svc.count("Item", &Query::new()).unwrap(), 3);

        let err = svc.commit_transactional_session(&handle).unwrap_err();
        assert!(matches!(err, StorageError::UnknownSession(_)));
        let err = svc
            .create_object("Item", doc(json!({"objectId": "e"})), Some(&handle))
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownSession(_)));
    }

    #[test]
    fn delete_class_reports_existence() {
        let svc = seeded();
        assert!(svc.delete_class("Item"));
        assert!(!svc.delete_class("Item"));
        assert!(!svc.class_exists("Item"));
    }
}
