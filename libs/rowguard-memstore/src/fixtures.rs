// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A small blog (users, categories, posts, comments) shared by the tests of the workspace.

use rowguard_model::{EntitySchema, SchemaError, StoreError};
use serde_json::{Value, json};

use crate::{MemoryStore, projection::invalid};

pub fn blog_datamodel() -> Value {
    json!({
        "models": [
            {
                "name": "User",
                "fields": [
                    { "name": "id", "kind": "scalar", "type": "Int", "isId": true, "isRequired": true },
                    { "name": "email", "kind": "scalar", "type": "String", "isUnique": true, "isRequired": true },
                    { "name": "name", "kind": "scalar", "type": "String" },
                    { "name": "posts", "kind": "object", "type": "Post", "isList": true, "isRequired": true, "relationName": "PostToUser" },
                    { "name": "comments", "kind": "object", "type": "Comment", "isList": true, "isRequired": true, "relationName": "CommentToUser" }
                ]
            },
            {
                "name": "Category",
                "fields": [
                    { "name": "id", "kind": "scalar", "type": "Int", "isId": true, "isRequired": true },
                    { "name": "name", "kind": "scalar", "type": "String", "isRequired": true },
                    { "name": "posts", "kind": "object", "type": "Post", "isList": true, "isRequired": true, "relationName": "CategoryToPost" }
                ]
            },
            {
                "name": "Post",
                "fields": [
                    { "name": "id", "kind": "scalar", "type": "Int", "isId": true, "isRequired": true },
                    { "name": "published", "kind": "scalar", "type": "Boolean", "isRequired": true },
                    { "name": "title", "kind": "scalar", "type": "String", "isRequired": true },
                    { "name": "content", "kind": "scalar", "type": "String" },
                    { "name": "categoryId", "kind": "scalar", "type": "Int", "isRequired": true },
                    {
                        "name": "category", "kind": "object", "type": "Category", "isRequired": true,
                        "relationName": "CategoryToPost", "relationFromFields": ["categoryId"], "relationToFields": ["id"]
                    },
                    { "name": "authorId", "kind": "scalar", "type": "Int", "isRequired": true },
                    {
                        "name": "author", "kind": "object", "type": "User", "isRequired": true,
                        "relationName": "PostToUser", "relationFromFields": ["authorId"], "relationToFields": ["id"]
                    },
                    { "name": "comments", "kind": "object", "type": "Comment", "isList": true, "isRequired": true, "relationName": "CommentToPost" }
                ]
            },
            {
                "name": "Comment",
                "fields": [
                    { "name": "id", "kind": "scalar", "type": "Int", "isId": true, "isRequired": true },
                    { "name": "content", "kind": "scalar", "type": "String", "isRequired": true },
                    { "name": "postId", "kind": "scalar", "type": "Int", "isRequired": true },
                    {
                        "name": "post", "kind": "object", "type": "Post", "isRequired": true,
                        "relationName": "CommentToPost", "relationFromFields": ["postId"], "relationToFields": ["id"]
                    },
                    { "name": "authorId", "kind": "scalar", "type": "Int" },
                    {
                        "name": "author", "kind": "object", "type": "User",
                        "relationName": "CommentToUser", "relationFromFields": ["authorId"], "relationToFields": ["id"]
                    }
                ]
            }
        ]
    })
}

pub fn blog_schema() -> Result<EntitySchema, SchemaError> {
    EntitySchema::from_datamodel(&blog_datamodel())
}

/// Three users, two categories, three posts (two published) and one comment per post.
pub fn seeded_blog_store() -> Result<MemoryStore, StoreError> {
    let store = MemoryStore::new(blog_schema().map_err(invalid)?);

    let records = [
        ("User", json!({"id": 1, "email": "john.doe@test.local", "name": "John Doe"})),
        ("User", json!({"id": 2, "email": "zara.nightshade@test.local", "name": "Zara Nightshade"})),
        ("User", json!({"id": 3, "email": "ben.matlock@test.local", "name": "Ben Matlock"})),
        ("Category", json!({"id": 1, "name": "First"})),
        ("Category", json!({"id": 2, "name": "Second"})),
        (
            "Post",
            json!({"id": 1, "published": true, "categoryId": 1, "authorId": 1, "title": "Quick bites", "content": "Easy 5-minute snack recipes"}),
        ),
        (
            "Post",
            json!({"id": 2, "published": false, "categoryId": 1, "authorId": 1, "title": "Tech today", "content": "Latest gadget news & reviews"}),
        ),
        (
            "Post",
            json!({"id": 3, "published": true, "categoryId": 2, "authorId": 2, "title": "Green living", "content": "Eco-friendly home hacks"}),
        ),
        ("Comment", json!({"postId": 1, "authorId": 2, "content": "Easy 5-minute snack recipes"})),
        ("Comment", json!({"postId": 2, "content": "Latest gadget news & reviews"})),
        ("Comment", json!({"postId": 3, "content": "Eco-friendly home hacks"})),
    ];

    for (entity_name, data) in records {
        store.insert(entity_name, data)?;
    }

    Ok(store)
}
