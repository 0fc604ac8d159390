#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{Harness, doc, harness, ids, pointer, query, user, user_pointer_field};
use object_controller_sdk::{
    ClassLevelPermissions, ClassSchema, CreateOptions, FieldType, FindOptions,
    ObjectControllerClient, ObjectControllerError, OperationPermissions, Query, USER_CLASS,
    UpdateOptions,
};
use objgate_security::{AclGroup, SecurityContext};
use serde_json::json;

async fn owned_posts() -> Harness {
    let post = ClassSchema::new("Post")
        .with_field("title", FieldType::String)
        .with_field("owner", user_pointer_field())
        .with_permissions(ClassLevelPermissions {
            get: Some(OperationPermissions::pointer(["owner"])),
            find: Some(OperationPermissions::pointer(["owner"])),
            update: Some(OperationPermissions::pointer(["owner"])),
            ..ClassLevelPermissions::default()
        });
    let h = harness(vec![post]);
    for (id, owner) in [("p1", "u1"), ("p2", "u2")] {
        h.svc
            .create(
                "Post",
                doc(json!({"objectId": id, "title": id, "owner": pointer(USER_CLASS, owner)})),
                CreateOptions::default(),
            )
            .await
            .unwrap();
    }
    h
}

#[tokio::test]
async fn owner_sees_only_own_rows() {
    let h = owned_posts().await;
    let me = user("u1");
    let rows = h
        .client
        .find(&me, "Post", Query::new(), FindOptions::for_context(&me))
        .await
        .unwrap()
        .into_objects();
    assert_eq!(ids(&rows), vec!["p1"]);
}

#[tokio::test]
async fn ambiguous_or_missing_identity_matches_nothing() {
    let h = owned_posts().await;
    let anonymous = SecurityContext::anonymous();

    let rows = h
        .svc
        .find(
            &anonymous,
            "Post",
            Query::new(),
            FindOptions::with_acl(AclGroup::public()),
        )
        .await
        .unwrap()
        .into_objects();
    assert!(rows.is_empty());

    let rows = h
        .svc
        .find(
            &anonymous,
            "Post",
            Query::new(),
            FindOptions::with_acl(AclGroup::new(["*", "u1", "u2"])),
        )
        .await
        .unwrap()
        .into_objects();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn get_without_identity_is_not_found() {
    let h = owned_posts().await;
    let anonymous = SecurityContext::anonymous();
    let err = h
        .client
        .find(
            &anonymous,
            "Post",
            query(json!({"objectId": "p1"})),
            FindOptions::with_acl(AclGroup::public()),
        )
        .await
        .unwrap_err();
    assert_eq!(err, ObjectControllerError::ObjectNotFound);
}

#[tokio::test]
async fn update_is_scoped_to_owner() {
    let h = owned_posts().await;
    let stranger = user("u2");
    let err = h
        .client
        .update(
            &stranger,
            "Post",
            query(json!({"objectId": "p1"})),
            doc(json!({"title": "mine now"})),
            UpdateOptions {
                acl: stranger.acl_group(),
                ..UpdateOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, ObjectControllerError::ObjectNotFound);

    let me = user("u1");
    h.client
        .update(
            &me,
            "Post",
            query(json!({"objectId": "p1"})),
            doc(json!({"title": "edited"})),
            UpdateOptions {
                acl: me.acl_group(),
                ..UpdateOptions::default()
            },
        )
        .await
        .unwrap();

    let rows = h
        .svc
        .find(
            &SecurityContext::master(),
            "Post",
            query(json!({"objectId": "p1"})),
            FindOptions::master(),
        )
        .await
        .unwrap()
        .into_objects();
    assert_eq!(rows[0]["title"], json!("edited"));
}

#[tokio::test]
async fn class_level_denial_is_permission_denied() {
    let locked = ClassSchema::new("Locked").with_permissions(ClassLevelPermissions {
        find: Some(OperationPermissions::allow(["role:admin"])),
        ..ClassLevelPermissions::default()
    });
    let h = harness(vec![locked]);
    let me = user("u1");
    let err = h
        .client
        .find(&me, "Locked", Query::new(), FindOptions::for_context(&me))
        .await
        .unwrap_err();
    assert!(matches!(err, ObjectControllerError::PermissionDenied(_)));

    let admin = SecurityContext::builder().user_id("u9").role("admin").build();
    let rows = h
        .client
        .find(&admin, "Locked", Query::new(), FindOptions::for_context(&admin))
        .await
        .unwrap();
    assert!(rows.into_objects().is_empty());
}
