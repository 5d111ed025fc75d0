// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

#![allow(dead_code)]

use rowguard_memstore::{MemoryStore, fixtures};
use rowguard_model::{
    EntityPermissions, OperationKind, PermissionDefinition, PermissionsConfig, Predicate,
    QueryExecutor,
};
use rowguard_resolver::{InterceptedOperation, RlsEngine, RlsError, RlsOptions};
use serde_json::Value;

/// What a permission resolver gets to see about the caller.
#[derive(Debug, Default)]
pub struct RequestContext {
    pub user_id: Option<i64>,
}

/// The seeded blog store behind an engine whose policy denies everything except `overrides`.
pub struct TestDb {
    pub store: MemoryStore,
    pub engine: RlsEngine<RequestContext>,
    pub context: RequestContext,
}

impl TestDb {
    pub fn new(overrides: Vec<(&str, EntityPermissions<RequestContext>)>) -> Self {
        Self::with_options(overrides, RlsOptions::default())
    }

    pub fn with_options(
        overrides: Vec<(&str, EntityPermissions<RequestContext>)>,
        options: RlsOptions,
    ) -> Self {
        let schema = fixtures::blog_schema().unwrap();
        let permissions = overrides.into_iter().fold(
            PermissionsConfig::deny_all(&schema),
            |permissions, (entity, entity_permissions)| permissions.with(entity, entity_permissions),
        );

        Self {
            store: fixtures::seeded_blog_store().unwrap(),
            engine: RlsEngine::new(schema, permissions, options),
            context: RequestContext::default(),
        }
    }

    pub fn as_user(mut self, user_id: i64) -> Self {
        self.context.user_id = Some(user_id);
        self
    }

    /// Run an operation through the engine.
    pub async fn run(
        &self,
        entity: &str,
        operation: OperationKind,
        args: Value,
    ) -> Result<Value, RlsError> {
        self.engine
            .intercept(
                &self.context,
                InterceptedOperation {
                    entity,
                    operation,
                    args,
                    transaction: None,
                },
                &self.store,
            )
            .await
    }

    /// Run an operation against the store directly, bypassing the policy.
    pub async fn unchecked(&self, entity: &str, operation: OperationKind, args: Value) -> Value {
        self.store.execute(entity, operation, args).await.unwrap()
    }
}

pub fn filter(predicate: Value) -> PermissionDefinition<RequestContext> {
    PermissionDefinition::try_from(predicate).unwrap()
}

/// Only the records whose `column` is the current user.
pub fn owned_by(column: &'static str) -> PermissionDefinition<RequestContext> {
    PermissionDefinition::from_fn(move |context: &RequestContext| {
        let user_id = context
            .user_id
            .ok_or_else(|| anyhow::anyhow!("No user in the request context"))?;
        Ok(Predicate::try_from(serde_json::json!({ column: user_id }))?)
    })
}

pub fn read_only(read: PermissionDefinition<RequestContext>) -> EntityPermissions<RequestContext> {
    EntityPermissions::deny_all().with_read(read)
}

pub fn is_unauthorized(error: &RlsError, entity_name: &str, operation_name: &str) -> bool {
    matches!(
        error,
        RlsError::Authorization { entity, operation } if entity == entity_name && operation == operation_name
    )
}

pub fn ids(records: &Value) -> Vec<i64> {
    records
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["id"].as_i64().unwrap())
        .collect()
}
