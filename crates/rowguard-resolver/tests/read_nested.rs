// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rowguard_memstore::{MemoryStore, fixtures};
use rowguard_model::{
    OperationKind, PermissionDefinition, QueryExecutor, SessionProvider, StoreError,
    TransactionMarker,
};
use rowguard_resolver::{InterceptedOperation, RlsError, RlsOptions};
use serde_json::{Value, json};

mod common;

use common::{RequestContext, TestDb, filter, ids, read_only};

fn published_posts_of_all_users() -> TestDb {
    TestDb::new(vec![
        ("User", read_only(PermissionDefinition::AllowAll)),
        ("Post", read_only(filter(json!({"published": true})))),
        ("Comment", read_only(PermissionDefinition::AllowAll)),
    ])
}

fn posts_per_user(users: &Value) -> Vec<(i64, Vec<i64>)> {
    users
        .as_array()
        .unwrap()
        .iter()
        .map(|user| (user["id"].as_i64().unwrap(), ids(&user["posts"])))
        .collect()
}

#[test_log::test(tokio::test)]
async fn included_lists_are_filtered() {
    let db = published_posts_of_all_users();

    let users = db
        .run(
            "User",
            OperationKind::FindMany,
            json!({"include": {"posts": true}, "orderBy": {"id": "asc"}}),
        )
        .await
        .unwrap();

    assert_eq!(
        posts_per_user(&users),
        vec![(1, vec![1]), (2, vec![3]), (3, vec![])]
    );
}

#[test_log::test(tokio::test)]
async fn nested_arguments_are_kept() {
    let db = published_posts_of_all_users();

    let users = db
        .run(
            "User",
            OperationKind::FindMany,
            json!({
                "select": {"id": true, "posts": {"where": {"categoryId": 2}, "select": {"id": true}}},
                "orderBy": {"id": "asc"}
            }),
        )
        .await
        .unwrap();

    assert_eq!(
        users,
        json!([
            {"id": 1, "posts": []},
            {"id": 2, "posts": [{"id": 3}]},
            {"id": 3, "posts": []}
        ])
    );
}

#[test_log::test(tokio::test)]
async fn deeply_nested_relations_are_filtered() {
    let db = TestDb::new(vec![
        ("User", read_only(PermissionDefinition::AllowAll)),
        ("Post", read_only(filter(json!({"published": true})))),
        ("Comment", read_only(PermissionDefinition::Deny)),
    ]);

    let user = db
        .run(
            "User",
            OperationKind::FindUnique,
            json!({"where": {"id": 1}, "select": {"posts": {"include": {"comments": true}}}}),
        )
        .await
        .unwrap();

    assert_eq!(ids(&user["posts"]), vec![1]);
    assert_eq!(user["posts"][0]["comments"], json!([]));

    // The store itself has a comment on that post
    let unchecked = db
        .unchecked(
            "Post",
            OperationKind::FindUnique,
            json!({"where": {"id": 1}, "include": {"comments": true}}),
        )
        .await;
    assert_eq!(ids(&unchecked["comments"]), vec![1]);
}

#[test_log::test(tokio::test)]
async fn optional_relations_are_filtered() {
    let db = TestDb::new(vec![
        ("Comment", read_only(PermissionDefinition::AllowAll)),
        ("User", read_only(filter(json!({"id": 2})))),
    ]);

    let comment = db
        .run(
            "Comment",
            OperationKind::FindUnique,
            json!({"where": {"id": 1}, "include": {"author": true}}),
        )
        .await
        .unwrap();
    assert_eq!(comment["author"]["name"], json!("Zara Nightshade"));

    let db = TestDb::new(vec![("Comment", read_only(PermissionDefinition::AllowAll))]);

    let comment = db
        .run(
            "Comment",
            OperationKind::FindUnique,
            json!({"where": {"id": 1}, "include": {"author": true}}),
        )
        .await
        .unwrap();
    assert_eq!(comment["author"], Value::Null);
    assert_eq!(comment["authorId"], json!(2));
}

#[test_log::test(tokio::test)]
async fn relation_counts_are_filtered() {
    let db = published_posts_of_all_users();

    let user = db
        .run(
            "User",
            OperationKind::FindUnique,
            json!({"where": {"id": 1}, "select": {"_count": true}}),
        )
        .await
        .unwrap();
    assert_eq!(user, json!({"_count": {"posts": 1, "comments": 0}}));

    let unchecked = db
        .unchecked(
            "User",
            OperationKind::FindUnique,
            json!({"where": {"id": 1}, "select": {"_count": true}}),
        )
        .await;
    assert_eq!(unchecked, json!({"_count": {"posts": 2, "comments": 0}}));

    let user = db
        .run(
            "User",
            OperationKind::FindUnique,
            json!({
                "where": {"id": 1},
                "select": {"_count": {"select": {"posts": {"where": {"categoryId": 1}}}}}
            }),
        )
        .await
        .unwrap();
    assert_eq!(user, json!({"_count": {"posts": 1}}));
}

#[test_log::test(tokio::test)]
async fn required_relations_are_not_filtered_by_default() {
    let db = TestDb::new(vec![
        ("Post", read_only(PermissionDefinition::AllowAll)),
        ("Category", read_only(filter(json!({"name": "First"})))),
    ]);

    let posts = db
        .run(
            "Post",
            OperationKind::FindMany,
            json!({"include": {"category": true}}),
        )
        .await
        .unwrap();

    assert_eq!(ids(&posts), vec![1, 2, 3]);
    assert_eq!(posts[2]["category"]["name"], json!("Second"));
}

fn checked(category_read: PermissionDefinition<RequestContext>) -> TestDb {
    TestDb::with_options(
        vec![
            ("Post", read_only(PermissionDefinition::AllowAll)),
            ("Category", read_only(category_read)),
        ],
        RlsOptions {
            check_required_belongs_to: true,
        },
    )
}

#[test_log::test(tokio::test)]
async fn unreadable_required_relations_fail() {
    let db = checked(filter(json!({"name": "First"})));

    let error = db
        .run(
            "Post",
            OperationKind::FindMany,
            json!({"include": {"category": true}}),
        )
        .await
        .unwrap_err();
    assert!(
        matches!(
            error,
            RlsError::ReferentialIntegrity { ref entity, ref path } if entity == "Category" && path == "$.category"
        ),
        "{error:?}"
    );

    let posts = db
        .run(
            "Post",
            OperationKind::FindMany,
            json!({"where": {"categoryId": 1}, "include": {"category": true}}),
        )
        .await
        .unwrap();
    assert_eq!(ids(&posts), vec![1, 2]);

    // Not selecting the relation needs no check
    let posts = db.run("Post", OperationKind::FindMany, json!({})).await.unwrap();
    assert_eq!(ids(&posts), vec![1, 2, 3]);
}

#[test_log::test(tokio::test)]
async fn required_relations_below_lists_are_checked() {
    let db = TestDb::with_options(
        vec![
            ("User", read_only(PermissionDefinition::AllowAll)),
            ("Post", read_only(PermissionDefinition::AllowAll)),
            ("Category", read_only(filter(json!({"id": 1})))),
        ],
        RlsOptions {
            check_required_belongs_to: true,
        },
    );

    let user = db
        .run(
            "User",
            OperationKind::FindUnique,
            json!({"where": {"id": 1}, "include": {"posts": {"include": {"category": true}}}}),
        )
        .await
        .unwrap();
    assert_eq!(ids(&user["posts"]), vec![1, 2]);

    let error = db
        .run(
            "User",
            OperationKind::FindUnique,
            json!({"where": {"id": 2}, "include": {"posts": {"include": {"category": true}}}}),
        )
        .await
        .unwrap_err();
    assert!(
        matches!(error, RlsError::ReferentialIntegrity { ref path, .. } if path == "$.posts.*.category"),
        "{error:?}"
    );
}

#[test_log::test(tokio::test)]
async fn checked_relations_must_select_their_key() {
    let db = checked(filter(json!({"name": "First"})));

    let error = db
        .run(
            "Post",
            OperationKind::FindMany,
            json!({"select": {"id": true, "category": {"select": {"name": true}}}}),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        RlsError::MissingPrimaryKeySelection { ref entity, ref field, .. } if entity == "Category" && field == "id"
    ));

    let posts = db
        .run(
            "Post",
            OperationKind::FindMany,
            json!({
                "where": {"categoryId": 1},
                "select": {"id": true, "category": {"select": {"id": true, "name": true}}}
            }),
        )
        .await
        .unwrap();
    assert_eq!(posts[0]["category"], json!({"id": 1, "name": "First"}));
}

#[test_log::test(tokio::test)]
async fn readable_required_relations_skip_the_check() {
    let db = checked(PermissionDefinition::AllowAll);

    let posts = db
        .run(
            "Post",
            OperationKind::FindMany,
            json!({"select": {"id": true, "category": {"select": {"name": true}}}}),
        )
        .await
        .unwrap();
    assert_eq!(posts.as_array().unwrap().len(), 3);
}

/// Hands out its own store for every transaction and remembers which transactions asked.
struct RecordingSessions {
    store: MemoryStore,
    requested: Mutex<Vec<Option<TransactionMarker>>>,
}

impl SessionProvider for RecordingSessions {
    fn session<'a>(&'a self, transaction: Option<&TransactionMarker>) -> &'a dyn QueryExecutor {
        self.requested.lock().unwrap().push(transaction.cloned());
        &self.store
    }
}

/// Runs everything except counts, which belong to the transaction's session.
struct WithoutCounts<'a>(&'a MemoryStore);

#[async_trait]
impl QueryExecutor for WithoutCounts<'_> {
    async fn execute(
        &self,
        entity: &str,
        operation: OperationKind,
        args: Value,
    ) -> Result<Value, StoreError> {
        match operation {
            OperationKind::Count => Err(StoreError::Invalid(format!(
                "Count of {entity} outside of the transaction"
            ))),
            _ => self.0.execute(entity, operation, args).await,
        }
    }
}

#[test_log::test(tokio::test)]
async fn integrity_checks_run_in_the_callers_transaction() {
    let TestDb {
        store,
        engine,
        context,
    } = checked(filter(json!({"name": "First"})));

    let sessions = Arc::new(RecordingSessions {
        store: fixtures::seeded_blog_store().unwrap(),
        requested: Mutex::default(),
    });
    let engine = engine.with_session_provider(sessions.clone());

    let transaction = TransactionMarker("tx1".to_string());
    let proceed = WithoutCounts(&store);

    let posts = engine
        .intercept(
            &context,
            InterceptedOperation {
                entity: "Post",
                operation: OperationKind::FindMany,
                args: json!({"where": {"categoryId": 1}, "include": {"category": true}}),
                transaction: Some(&transaction),
            },
            &proceed,
        )
        .await
        .unwrap();
    assert_eq!(ids(&posts), vec![1, 2]);

    let error = engine
        .intercept(
            &context,
            InterceptedOperation {
                entity: "Post",
                operation: OperationKind::FindMany,
                args: json!({"include": {"category": true}}),
                transaction: Some(&transaction),
            },
            &proceed,
        )
        .await
        .unwrap_err();
    assert!(
        matches!(error, RlsError::ReferentialIntegrity { ref entity, .. } if entity == "Category"),
        "{error:?}"
    );

    assert_eq!(
        *sessions.requested.lock().unwrap(),
        vec![Some(transaction.clone()), Some(transaction)]
    );
}
