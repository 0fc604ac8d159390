#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{Harness, doc, harness, ids, pointer, query};
use object_controller_sdk::{
    ClassSchema, CreateOptions, DestroyOptions, FieldType, FindOptions, Query, SortKey,
    USER_CLASS, UpdateOptions,
};
use objgate_security::SecurityContext;
use serde_json::{Value, json};

fn user_relation() -> FieldType {
    FieldType::Relation {
        target_class: USER_CLASS.to_owned(),
    }
}

async fn liked_posts() -> Harness {
    let post = ClassSchema::new("Post")
        .with_field("likes", user_relation())
        .with_field("shares", user_relation());
    let h = harness(vec![post]);
    for id in ["u1", "u2", "u3"] {
        h.svc
            .create(USER_CLASS, doc(json!({"objectId": id})), CreateOptions::default())
            .await
            .unwrap();
    }
    for (id, likers) in [("p1", ["u1", "u2"].as_slice()), ("p2", ["u3"].as_slice())] {
        let objects: Vec<Value> = likers.iter().map(|u| pointer(USER_CLASS, u)).collect();
        h.svc
            .create(
                "Post",
                doc(json!({
                    "objectId": id,
                    "likes": {"__op": "AddRelation", "objects": objects}
                })),
                CreateOptions::default(),
            )
            .await
            .unwrap();
    }
    h
}

async fn create_post(h: &Harness, id: &str) {
    h.svc
        .create("Post", doc(json!({"objectId": id})), CreateOptions::default())
        .await
        .unwrap();
}

fn sorted_page(sort: SortKey, skip: Option<u64>, limit: Option<u64>) -> FindOptions {
    FindOptions {
        sort: vec![sort],
        skip,
        limit,
        ..FindOptions::master()
    }
}

async fn master_find(h: &Harness, class_name: &str, q: Value) -> Vec<String> {
    let rows = h
        .svc
        .find(
            &SecurityContext::master(),
            class_name,
            query(q),
            FindOptions::master(),
        )
        .await
        .unwrap()
        .into_objects();
    ids(&rows)
}

#[tokio::test]
async fn related_to_resolves_join_rows() {
    let h = liked_posts().await;
    let found = master_find(
        &h,
        USER_CLASS,
        json!({"$relatedTo": {"object": pointer("Post", "p1"), "key": "likes"}}),
    )
    .await;
    assert_eq!(found, vec!["u1", "u2"]);

    let found = master_find(
        &h,
        USER_CLASS,
        json!({"$or": [
            {"$relatedTo": {"object": pointer("Post", "p2"), "key": "likes"}},
            {"objectId": "u1"}
        ]}),
    )
    .await;
    assert_eq!(found, vec!["u1", "u3"]);
}

#[tokio::test]
async fn relation_field_constraints() {
    let h = liked_posts().await;
    assert_eq!(
        master_find(&h, "Post", json!({"likes": pointer(USER_CLASS, "u3")})).await,
        vec!["p2"]
    );
    assert_eq!(
        master_find(&h, "Post", json!({"likes": {"$in": [pointer(USER_CLASS, "u1")]}})).await,
        vec!["p1"]
    );
    assert_eq!(
        master_find(&h, "Post", json!({"likes": {"$nin": [pointer(USER_CLASS, "u1")]}})).await,
        vec!["p2"]
    );
}

#[tokio::test]
async fn relation_ops_on_update() {
    let h = liked_posts().await;
    h.svc
        .update(
            "Post",
            query(json!({"objectId": "p1"})),
            doc(json!({"likes": {
                "__op": "Batch",
                "ops": [
                    {"__op": "RemoveRelation", "objects": [pointer(USER_CLASS, "u2")]},
                    {"__op": "AddRelation", "objects": [pointer(USER_CLASS, "u3")]}
                ]
            }})),
            UpdateOptions::default(),
        )
        .await
        .unwrap();

    let mut related = h.svc.related_ids("Post", "likes", "p1").await.unwrap();
    related.sort();
    assert_eq!(related, vec!["u1", "u3"]);

    let mut owners = h
        .svc
        .owning_ids("Post", "likes", &["u3".to_owned()])
        .await
        .unwrap();
    owners.sort();
    assert_eq!(owners, vec!["p1", "p2"]);
}

#[tokio::test]
async fn relation_update_needs_target_id() {
    let h = liked_posts().await;
    let err = h
        .svc
        .update(
            "Post",
            Query::new(),
            doc(json!({"likes": {"__op": "AddRelation", "objects": [pointer(USER_CLASS, "u1")]}})),
            UpdateOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        object_controller::domain::DomainError::InvalidQuery(_)
    ));
}

#[tokio::test]
async fn add_relation_is_idempotent() {
    let h = liked_posts().await;
    h.svc
        .add_relation("likes", "Post", "p2", "u3", None)
        .await
        .unwrap();
    assert_eq!(h.svc.related_ids("Post", "likes", "p2").await.unwrap(), vec!["u3"]);

    h.svc
        .remove_relation("likes", "Post", "p2", "u3", None)
        .await
        .unwrap();
    h.svc
        .remove_relation("likes", "Post", "p2", "u3", None)
        .await
        .unwrap();
    assert!(h.svc.related_ids("Post", "likes", "p2").await.unwrap().is_empty());
}

#[tokio::test]
async fn relation_constraints_in_or_branches_and_negations() {
    let h = liked_posts().await;
    create_post(&h, "p3").await;

    assert_eq!(
        master_find(
            &h,
            "Post",
            json!({"$or": [
                {"likes": pointer(USER_CLASS, "u3")},
                {"likes": {"$in": [pointer(USER_CLASS, "u1")]}}
            ]}),
        )
        .await,
        vec!["p1", "p2"]
    );
    assert_eq!(
        master_find(&h, "Post", json!({"likes": {"$ne": pointer(USER_CLASS, "u1")}})).await,
        vec!["p2", "p3"]
    );
    assert_eq!(
        master_find(&h, "Post", json!({"likes": {"$exists": true}})).await,
        vec!["p1", "p2"]
    );
}

#[tokio::test]
async fn positive_relation_constraints_intersect() {
    let h = liked_posts().await;
    create_post(&h, "p3").await;
    for post in ["p1", "p3"] {
        h.svc
            .add_relation("shares", "Post", post, "u1", None)
            .await
            .unwrap();
    }

    assert_eq!(
        master_find(
            &h,
            "Post",
            json!({"likes": pointer(USER_CLASS, "u1"), "shares": pointer(USER_CLASS, "u1")}),
        )
        .await,
        vec!["p1"]
    );
    assert!(
        master_find(
            &h,
            "Post",
            json!({"likes": pointer(USER_CLASS, "u3"), "shares": pointer(USER_CLASS, "u1")}),
        )
        .await
        .is_empty()
    );
}

#[tokio::test]
async fn related_to_pages_on_join_rows_when_sorted_by_creation() {
    let h = liked_posts().await;
    for user_id in ["u1", "u2", "u3"] {
        h.svc
            .add_relation("likes", "Post", "p3", user_id, None)
            .await
            .unwrap();
    }
    let related = query(json!({"$relatedTo": {"object": pointer("Post", "p3"), "key": "likes"}}));
    let master = SecurityContext::master();

    let rows = h
        .svc
        .find(
            &master,
            USER_CLASS,
            related.clone(),
            sorted_page(SortKey::ascending("createdAt"), Some(1), Some(1)),
        )
        .await
        .unwrap()
        .into_objects();
    assert_eq!(ids(&rows), vec!["u2"]);

    let rows = h
        .svc
        .find(
            &master,
            USER_CLASS,
            related.clone(),
            sorted_page(SortKey::descending("createdAt"), None, Some(2)),
        )
        .await
        .unwrap()
        .into_objects();
    assert_eq!(ids(&rows), vec!["u2", "u3"]);

    let rows = h
        .svc
        .find(
            &master,
            USER_CLASS,
            related,
            FindOptions {
                skip: Some(1),
                ..FindOptions::master()
            },
        )
        .await
        .unwrap()
        .into_objects();
    assert_eq!(ids(&rows), vec!["u2", "u3"]);
}

#[tokio::test]
async fn update_resolves_relation_constraints() {
    let h = liked_posts().await;
    h.svc
        .update(
            "Post",
            query(json!({"likes": pointer(USER_CLASS, "u1")})),
            doc(json!({"title": "liked by u1"})),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(
        master_find(&h, "Post", json!({"title": "liked by u1"})).await,
        vec!["p1"]
    );

    let err = h
        .svc
        .update(
            "Post",
            query(json!({"likes": {"$in": [pointer(USER_CLASS, "nobody")]}})),
            doc(json!({"title": "x"})),
            UpdateOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        object_controller::domain::DomainError::ObjectNotFound
    ));
}

#[tokio::test]
async fn destroy_resolves_relation_constraints() {
    let h = liked_posts().await;
    h.svc
        .destroy(
            "Post",
            query(json!({"likes": pointer(USER_CLASS, "u3")})),
            DestroyOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(master_find(&h, "Post", json!({})).await, vec!["p1"]);

    h.svc
        .destroy(
            USER_CLASS,
            query(json!({"$relatedTo": {"object": pointer("Post", "p1"), "key": "likes"}})),
            DestroyOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(master_find(&h, USER_CLASS, json!({})).await, vec!["u3"]);
}
