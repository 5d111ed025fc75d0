// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Post-fetch check that every required to-one relation in a result is readable on its own.

use std::collections::HashSet;

use rowguard_model::{OperationKind, Predicate, QueryExecutor, StoreError};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    access_solver::AccessSolution, predicate_util::merge_filter,
    relation_path::RelationPathRecord, request_resolver::RequestResolver, rls_error::RlsError,
};

impl<'a, C: Sync> RequestResolver<'a, C> {
    /// Checks run one after the other through `executor`, which must be bound to the same
    /// transaction as the query that produced `result`.
    pub async fn verify_relations(
        &self,
        result: &Value,
        relation_paths: &[RelationPathRecord],
        executor: &dyn QueryExecutor,
    ) -> Result<(), RlsError> {
        for record in relation_paths {
            self.verify_relation(result, record, executor).await?;
        }

        Ok(())
    }

    async fn verify_relation(
        &self,
        result: &Value,
        record: &RelationPathRecord,
        executor: &dyn QueryExecutor,
    ) -> Result<(), RlsError> {
        let related = record.path.extract(result);
        if related.is_empty() {
            return Ok(());
        }

        let target = record.target_entity.as_str();
        let violation = || {
            warn!(
                entity = target,
                path = %record.path,
                "Referential integrity violation"
            );
            RlsError::ReferentialIntegrity {
                entity: target.to_string(),
                path: record.path.to_string(),
            }
        };

        let filter = match self.solve_read(target).await? {
            AccessSolution::Unrestricted => return Ok(()),
            AccessSolution::Denied => return Err(violation()),
            AccessSolution::Filtered(filter) => filter,
        };

        let key_name = &self.schema.primary_key(target)?.name;
        let mut seen = HashSet::new();
        let mut keys = vec![];
        for value in related {
            let key = value.get(key_name).ok_or_else(violation)?;
            if seen.insert(key.to_string()) {
                keys.push(key.clone());
            }
        }

        debug!(
            entity = target,
            path = %record.path,
            keys = keys.len(),
            "Verifying required relation"
        );

        let key_filter = Predicate::new(Map::from_iter([(
            key_name.clone(),
            Value::Object(Map::from_iter([("in".to_string(), Value::Array(keys.clone()))])),
        )]));
        let args = Value::Object(Map::from_iter([(
            "where".to_string(),
            merge_filter(Some(key_filter), filter).into(),
        )]));

        let count = executor.execute(target, OperationKind::Count, args).await?;
        let count = count.as_u64().ok_or_else(|| {
            StoreError::Invalid(format!("Expected a number from count, got '{count}'"))
        })?;

        if count == keys.len() as u64 {
            Ok(())
        } else {
            Err(violation())
        }
    }
}

#[cfg(test)]
mod tests {
    use rowguard_memstore::{MemoryStore, fixtures};
    use rowguard_model::{EntityPermissions, PermissionDefinition};
    use serde_json::json;

    use super::*;
    use crate::{options::RlsOptions, relation_path::ResultPath, request_resolver::test_support};

    async fn verify(
        category_read: PermissionDefinition<()>,
        result: Value,
    ) -> Result<(), RlsError> {
        let store: MemoryStore = fixtures::seeded_blog_store().unwrap();
        let schema = test_support::schema();
        let permissions = test_support::permissions(
            &schema,
            vec![("Category", EntityPermissions::allow_all().with_read(category_read))],
        );
        let resolver = RequestResolver {
            schema: &schema,
            permissions: &permissions,
            options: RlsOptions {
                check_required_belongs_to: true,
            },
            context: &(),
        };

        let record = RelationPathRecord {
            path: ResultPath::root().field("category"),
            target_entity: "Category".to_string(),
        };

        resolver.verify_relations(&result, &[record], &store).await
    }

    fn first_only() -> PermissionDefinition<()> {
        PermissionDefinition::try_from(json!({"name": "First"})).unwrap()
    }

    #[tokio::test]
    async fn readable_relations_pass() {
        let result = json!([
            {"id": 1, "category": {"id": 1, "name": "First"}},
            {"id": 2, "category": {"id": 1, "name": "First"}}
        ]);

        verify(first_only(), result.clone()).await.unwrap();
        verify(PermissionDefinition::AllowAll, result).await.unwrap();
    }

    #[tokio::test]
    async fn unreadable_relation_is_a_violation() {
        let result = json!([
            {"id": 1, "category": {"id": 1}},
            {"id": 3, "category": {"id": 2}}
        ]);

        let error = verify(first_only(), result.clone()).await.unwrap_err();
        assert!(matches!(
            error,
            RlsError::ReferentialIntegrity { ref entity, ref path } if entity == "Category" && path == "$.category"
        ));

        let error = verify(PermissionDefinition::Deny, result).await.unwrap_err();
        assert!(matches!(error, RlsError::ReferentialIntegrity { .. }));
    }

    #[tokio::test]
    async fn single_record_results() {
        verify(first_only(), json!({"id": 1, "category": {"id": 1}}))
            .await
            .unwrap();

        let error = verify(first_only(), json!({"id": 3, "category": {"id": 2}}))
            .await
            .unwrap_err();
        assert!(matches!(error, RlsError::ReferentialIntegrity { .. }));
    }

    #[tokio::test]
    async fn absent_relations_are_skipped() {
        verify(PermissionDefinition::Deny, json!([]))
            .await
            .unwrap();
        verify(PermissionDefinition::Deny, Value::Null).await.unwrap();
        verify(PermissionDefinition::Deny, json!([{"id": 1}]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn relation_without_key_is_a_violation() {
        let error = verify(first_only(), json!({"id": 1, "category": {"name": "First"}}))
            .await
            .unwrap_err();
        assert!(matches!(error, RlsError::ReferentialIntegrity { .. }));
    }
}
