// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Rewrite the `data` of `create`/`update` (and both halves of `upsert`) so that nested relation
//! actions honor the related entity's policy.
//!
//! Nested writes that the policy denies fail outright. Nested lookups (`connect`, `set`,
//! `disconnect`, and the `where` of `update`/`upsert`/`delete`) are scoped instead, so a lookup
//! of a record the caller may not see fails the same way a lookup of a missing record does.

use async_recursion::async_recursion;
use futures::future::try_join_all;
use rowguard_model::{PermissionDefinition, Predicate};
use serde_json::{Map, Value};

use crate::{
    access_solver::AccessSolution,
    request_resolver::RequestResolver,
    rls_error::{MutationContext, RelationContext, RlsError},
};

const WHERE: &str = "where";
const DATA: &str = "data";
const CREATE: &str = "create";
const UPDATE: &str = "update";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelationAction {
    Create,
    CreateMany,
    ConnectOrCreate,
    Connect,
    Set,
    Disconnect,
    Update,
    UpdateMany,
    Upsert,
    Delete,
    DeleteMany,
}

impl RelationAction {
    fn parse(
        name: &str,
        relation: RelationContext,
        mutation: MutationContext,
    ) -> Result<Self, RlsError> {
        let action = match name {
            "create" => Some(RelationAction::Create),
            "createMany" => Some(RelationAction::CreateMany),
            "connectOrCreate" => Some(RelationAction::ConnectOrCreate),
            "connect" => Some(RelationAction::Connect),
            "set" => Some(RelationAction::Set),
            "disconnect" => Some(RelationAction::Disconnect),
            "update" => Some(RelationAction::Update),
            "updateMany" => Some(RelationAction::UpdateMany),
            "upsert" => Some(RelationAction::Upsert),
            "delete" => Some(RelationAction::Delete),
            "deleteMany" => Some(RelationAction::DeleteMany),
            _ => None,
        };

        action
            .filter(|action| action.is_allowed(relation, mutation))
            .ok_or_else(|| RlsError::UnsupportedOperation {
                action: name.to_string(),
                relation,
                mutation,
            })
    }

    fn is_allowed(self, relation: RelationContext, mutation: MutationContext) -> bool {
        use RelationAction::*;

        match (mutation, relation) {
            (MutationContext::Create, RelationContext::List) => {
                matches!(self, Create | CreateMany | ConnectOrCreate | Connect)
            }
            (MutationContext::Create, RelationContext::Singular) => {
                matches!(self, Create | ConnectOrCreate | Connect)
            }
            (MutationContext::Update, RelationContext::List) => true,
            (MutationContext::Update, RelationContext::Singular) => {
                !matches!(self, CreateMany | Set | UpdateMany | DeleteMany)
            }
        }
    }
}

impl<'a, C: Sync> RequestResolver<'a, C> {
    pub async fn resolve_create(
        &self,
        entity_name: &str,
        data: &Map<String, Value>,
    ) -> Result<Map<String, Value>, RlsError> {
        self.resolve_data(entity_name, data, MutationContext::Create)
            .await
    }

    pub async fn resolve_update(
        &self,
        entity_name: &str,
        data: &Map<String, Value>,
    ) -> Result<Map<String, Value>, RlsError> {
        self.resolve_data(entity_name, data, MutationContext::Update)
            .await
    }

    async fn resolve_data(
        &self,
        entity_name: &str,
        data: &Map<String, Value>,
        mutation: MutationContext,
    ) -> Result<Map<String, Value>, RlsError> {
        let resolved = try_join_all(data.iter().map(|(name, value)| async move {
            let field = self.schema.field(entity_name, name)?;

            let value = match field.relation() {
                Some(relation) => {
                    let relation_context = if field.is_list {
                        RelationContext::List
                    } else {
                        RelationContext::Singular
                    };
                    self.resolve_relation_actions(&relation.target, relation_context, mutation, value)
                        .await?
                }
                None => value.clone(),
            };

            Ok::<_, RlsError>((name.clone(), value))
        }))
        .await?;

        Ok(resolved.into_iter().collect())
    }

    async fn resolve_relation_actions(
        &self,
        target: &str,
        relation: RelationContext,
        mutation: MutationContext,
        actions: &Value,
    ) -> Result<Value, RlsError> {
        let actions = as_object(actions, target)?;

        let resolved = try_join_all(actions.iter().map(|(name, payload)| async move {
            let action = RelationAction::parse(name, relation, mutation)?;
            let payload = self
                .resolve_relation_action(target, action, relation, payload)
                .await?;
            Ok::<_, RlsError>((name.clone(), payload))
        }))
        .await?;

        Ok(Value::Object(resolved.into_iter().collect()))
    }

    #[async_recursion]
    async fn resolve_relation_action(
        &self,
        target: &str,
        action: RelationAction,
        relation: RelationContext,
        payload: &Value,
    ) -> Result<Value, RlsError> {
        let permissions = self.permissions_of(target)?;
        let is_list = relation == RelationContext::List;

        match action {
            RelationAction::Create => {
                self.require_create(target)?;
                map_elements(payload, is_list, |element| async move {
                    let data = self.resolve_create(target, as_object(element, target)?).await?;
                    Ok(Value::Object(data))
                })
                .await
            }
            RelationAction::CreateMany => {
                // A bulk create cannot carry nested relation actions
                self.require_create(target)?;
                Ok(payload.clone())
            }
            RelationAction::ConnectOrCreate => {
                self.require_create(target)?;
                map_elements(payload, is_list, |element| {
                    self.resolve_connect_or_create(target, &permissions.read, element)
                })
                .await
            }
            RelationAction::Connect | RelationAction::Set => {
                let solution = self.solve(&permissions.read).await?;
                map_elements(payload, is_list, |element| {
                    let solution = solution.clone();
                    async move { self.scope_unique_value(target, element, solution) }
                })
                .await
            }
            RelationAction::Disconnect if is_list => {
                let solution = self.solve(&permissions.read).await?;
                map_elements(payload, is_list, |element| {
                    let solution = solution.clone();
                    async move { self.scope_unique_value(target, element, solution) }
                })
                .await
            }
            RelationAction::Disconnect => {
                let solution = self.solve(&permissions.read).await?;
                self.scope_relation_filter(target, payload, solution)
            }
            RelationAction::Update => {
                self.require_permission(target, &permissions.update, "update")?;
                map_elements(payload, is_list, |element| {
                    self.resolve_nested_update(target, &permissions.update, is_list, element)
                })
                .await
            }
            RelationAction::UpdateMany => {
                self.require_permission(target, &permissions.update, "update")?;
                let solution = self.solve(&permissions.update).await?;
                map_elements(payload, is_list, |element| {
                    let solution = solution.clone();
                    async move {
                        let mut element = as_object(element, target)?.clone();
                        let where_ = take_where(&mut element)?;
                        if let Some(where_) = self.scope_filter(target, where_, solution)? {
                            element.insert(WHERE.to_string(), where_.into());
                        }
                        Ok(Value::Object(element))
                    }
                })
                .await
            }
            RelationAction::Upsert => {
                self.require_create(target)?;
                self.require_permission(target, &permissions.update, "update")?;
                map_elements(payload, is_list, |element| {
                    self.resolve_nested_upsert(target, &permissions.update, is_list, element)
                })
                .await
            }
            RelationAction::Delete => {
                self.require_permission(target, &permissions.delete, "delete")?;
                let solution = self.solve(&permissions.delete).await?;
                if is_list {
                    map_elements(payload, is_list, |element| {
                        let solution = solution.clone();
                        async move { self.scope_unique_value(target, element, solution) }
                    })
                    .await
                } else {
                    self.scope_relation_filter(target, payload, solution)
                }
            }
            RelationAction::DeleteMany => {
                self.require_permission(target, &permissions.delete, "delete")?;
                let solution = self.solve(&permissions.delete).await?;
                map_elements(payload, is_list, |element| {
                    let solution = solution.clone();
                    async move {
                        let where_ = Predicate::try_from(element.clone())?;
                        Ok(self
                            .scope_filter(target, Some(where_), solution)?
                            .map_or_else(|| element.clone(), Value::from))
                    }
                })
                .await
            }
        }
    }

    pub fn require_create(&self, target: &str) -> Result<(), RlsError> {
        if self.can_create(target)? {
            Ok(())
        } else {
            Err(RlsError::authorization(target, "create"))
        }
    }

    pub fn require_permission(
        &self,
        target: &str,
        definition: &PermissionDefinition<C>,
        operation: &str,
    ) -> Result<(), RlsError> {
        if definition.is_deny() {
            Err(RlsError::authorization(target, operation))
        } else {
            Ok(())
        }
    }

    /// The `where` half is scoped by the read policy (a denied target can only be created), the
    /// `create` half is resolved like any nested create.
    async fn resolve_connect_or_create(
        &self,
        target: &str,
        read: &PermissionDefinition<C>,
        element: &Value,
    ) -> Result<Value, RlsError> {
        let mut element = as_object(element, target)?.clone();
        let create = match element.get(CREATE) {
            Some(create) => as_object(create, target)?.clone(),
            None => Map::new(),
        };

        let (create, solution) =
            futures::try_join!(self.resolve_create(target, &create), self.solve(read))?;

        element.insert(CREATE.to_string(), Value::Object(create));
        if let Some(where_) = element.remove(WHERE) {
            element.insert(
                WHERE.to_string(),
                self.scope_unique_value(target, &where_, solution)?,
            );
        }

        Ok(Value::Object(element))
    }

    /// A list element is always `{ where, data }`. A to-one update is either that envelope (with
    /// an optional filter) or bare update data; a filtered policy always produces the envelope.
    async fn resolve_nested_update(
        &self,
        target: &str,
        update: &PermissionDefinition<C>,
        is_list: bool,
        element: &Value,
    ) -> Result<Value, RlsError> {
        let element = as_object(element, target)?;
        let no_data = Map::new();

        let (mut envelope, data) = match element.get(DATA) {
            Some(data) => (element.clone(), as_object(data, target)?),
            None if is_list => (element.clone(), &no_data),
            None => (Map::new(), element),
        };
        let is_bare = !is_list && !element.contains_key(DATA);

        let (data, solution) =
            futures::try_join!(self.resolve_update(target, data), self.solve(update))?;

        if is_bare && solution == AccessSolution::Unrestricted {
            return Ok(Value::Object(data));
        }

        envelope.insert(DATA.to_string(), Value::Object(data));
        self.scope_envelope_where(target, is_list, &mut envelope, solution)?;

        Ok(Value::Object(envelope))
    }

    async fn resolve_nested_upsert(
        &self,
        target: &str,
        update: &PermissionDefinition<C>,
        is_list: bool,
        element: &Value,
    ) -> Result<Value, RlsError> {
        let mut element = as_object(element, target)?.clone();
        let create_data = match element.get(CREATE) {
            Some(create) => as_object(create, target)?.clone(),
            None => Map::new(),
        };
        let update_data = match element.get(UPDATE) {
            Some(update) => as_object(update, target)?.clone(),
            None => Map::new(),
        };

        let (create_data, update_data, solution) = futures::try_join!(
            self.resolve_create(target, &create_data),
            self.resolve_update(target, &update_data),
            self.solve(update)
        )?;

        element.insert(CREATE.to_string(), Value::Object(create_data));
        element.insert(UPDATE.to_string(), Value::Object(update_data));
        self.scope_envelope_where(target, is_list, &mut element, solution)?;

        Ok(Value::Object(element))
    }

    /// List elements address one related record through a unique `where`; a to-one relation
    /// has at most one related record, so its `where` is a plain (optional) filter.
    fn scope_envelope_where(
        &self,
        target: &str,
        is_list: bool,
        envelope: &mut Map<String, Value>,
        solution: AccessSolution,
    ) -> Result<(), RlsError> {
        if is_list {
            let where_ = envelope.remove(WHERE).unwrap_or(Value::Object(Map::new()));
            envelope.insert(
                WHERE.to_string(),
                self.scope_unique_value(target, &where_, solution)?,
            );
        } else {
            let where_ = take_where(envelope)?;
            if let Some(where_) = self.scope_filter(target, where_, solution)? {
                envelope.insert(WHERE.to_string(), where_.into());
            }
        }

        Ok(())
    }

    fn scope_unique_value(
        &self,
        target: &str,
        unique_where: &Value,
        solution: AccessSolution,
    ) -> Result<Value, RlsError> {
        let unique_where = Predicate::try_from(unique_where.clone())?;
        Ok(self
            .scope_unique_filter(target, unique_where, solution)?
            .into())
    }

    /// To-one `disconnect`/`delete` take `true` (whatever is related) or a filter object.
    fn scope_relation_filter(
        &self,
        target: &str,
        payload: &Value,
        solution: AccessSolution,
    ) -> Result<Value, RlsError> {
        let where_ = match payload {
            Value::Bool(false) => return Ok(payload.clone()),
            Value::Bool(true) => None,
            filter => Some(Predicate::try_from(filter.clone())?),
        };

        Ok(self
            .scope_filter(target, where_, solution)?
            .map_or(Value::Bool(true), Value::from))
    }
}

/// Apply `f` to every element of a list relation payload (a single object or an array of them)
/// or to the sole payload of a to-one relation.
async fn map_elements<'v, F, Fut>(payload: &'v Value, is_list: bool, f: F) -> Result<Value, RlsError>
where
    F: Fn(&'v Value) -> Fut,
    Fut: Future<Output = Result<Value, RlsError>>,
{
    match payload {
        Value::Array(elements) if is_list => {
            Ok(Value::Array(try_join_all(elements.iter().map(f)).await?))
        }
        element => f(element).await,
    }
}

fn as_object<'v>(value: &'v Value, target: &str) -> Result<&'v Map<String, Value>, RlsError> {
    value.as_object().ok_or_else(|| {
        RlsError::InvalidArgument(format!(
            "Expected an object in a nested write of '{target}', got '{value}'"
        ))
    })
}

fn take_where(args: &mut Map<String, Value>) -> Result<Option<Predicate>, RlsError> {
    match args.remove(WHERE) {
        None | Some(Value::Null) => Ok(None),
        Some(where_) => Ok(Some(Predicate::try_from(where_)?)),
    }
}

#[cfg(test)]
mod tests {
    use rowguard_model::{EntityPermissions, EntitySchema, PermissionsConfig};
    use serde_json::json;

    use super::*;
    use crate::{options::RlsOptions, request_resolver::test_support};

    struct Fixture {
        schema: EntitySchema,
        permissions: PermissionsConfig<()>,
    }

    impl Fixture {
        fn new(overrides: Vec<(&str, EntityPermissions<()>)>) -> Self {
            let schema = test_support::schema();
            let permissions = test_support::permissions(&schema, overrides);
            Self {
                schema,
                permissions,
            }
        }

        fn resolver(&self) -> RequestResolver<'_, ()> {
            RequestResolver {
                schema: &self.schema,
                permissions: &self.permissions,
                options: RlsOptions::default(),
                context: &(),
            }
        }

        async fn create(&self, entity: &str, data: Value) -> Result<Value, RlsError> {
            let data = data.as_object().unwrap().clone();
            Ok(Value::Object(self.resolver().resolve_create(entity, &data).await?))
        }

        async fn update(&self, entity: &str, data: Value) -> Result<Value, RlsError> {
            let data = data.as_object().unwrap().clone();
            Ok(Value::Object(self.resolver().resolve_update(entity, &data).await?))
        }
    }

    fn filter(value: Value) -> PermissionDefinition<()> {
        PermissionDefinition::try_from(value).unwrap()
    }

    fn impossible() -> Value {
        json!({"id": {"equals": 0, "not": 0}})
    }

    #[tokio::test]
    async fn scalars_pass_through() {
        let fixture = Fixture::new(vec![("User", EntityPermissions::deny_all())]);

        let data = json!({"email": "new@test.local", "name": null});
        assert_eq!(fixture.create("User", data.clone()).await.unwrap(), data);
        assert_eq!(fixture.update("User", data.clone()).await.unwrap(), data);
    }

    #[tokio::test]
    async fn nested_create_requires_create_permission() {
        let fixture = Fixture::new(vec![(
            "Post",
            EntityPermissions::allow_all().with_create(false),
        )]);

        for data in [
            json!({"posts": {"create": {"title": "t", "published": false, "categoryId": 1}}}),
            json!({"posts": {"createMany": {"data": [{"title": "t", "published": false, "categoryId": 1}]}}}),
            json!({"posts": {"connectOrCreate": {"where": {"id": 1}, "create": {"title": "t", "published": false, "categoryId": 1}}}}),
        ] {
            let error = fixture.create("User", data).await.unwrap_err();
            assert!(
                matches!(error, RlsError::Authorization { ref entity, ref operation } if entity == "Post" && operation == "create")
            );
        }
    }

    #[tokio::test]
    async fn nested_creates_are_resolved_recursively() {
        let fixture = Fixture::new(vec![(
            "Category",
            EntityPermissions::allow_all().with_read(filter(json!({"name": "First"}))),
        )]);

        let resolved = fixture
            .create(
                "User",
                json!({
                    "email": "new@test.local",
                    "posts": {"create": [
                        {"title": "a", "published": true, "category": {"connect": {"id": 2}}},
                        {"title": "b", "published": true, "category": {"connect": {"id": 1, "name": "First"}}}
                    ]}
                }),
            )
            .await
            .unwrap();

        assert_eq!(
            resolved,
            json!({
                "email": "new@test.local",
                "posts": {"create": [
                    {"title": "a", "published": true, "category": {"connect": {"id": 2, "AND": [{"name": "First"}]}}},
                    {"title": "b", "published": true, "category": {"connect": {"id": 1, "AND": [{"name": "First"}, {"name": "First"}]}}}
                ]}
            })
        );
    }

    #[tokio::test]
    async fn connect_to_denied_target_cannot_match() {
        let fixture = Fixture::new(vec![(
            "Category",
            EntityPermissions::allow_all().with_read(PermissionDefinition::Deny),
        )]);

        let resolved = fixture
            .create("Post", json!({"category": {"connect": {"id": 1}}}))
            .await
            .unwrap();

        assert_eq!(
            resolved,
            json!({"category": {"connect": {"id": 1, "AND": [impossible()]}}})
        );
    }

    #[tokio::test]
    async fn connect_or_create_scopes_where_and_resolves_create() {
        let fixture = Fixture::new(vec![
            (
                "Category",
                EntityPermissions::allow_all().with_read(PermissionDefinition::Deny),
            ),
            (
                "Post",
                EntityPermissions::allow_all().with_create(false),
            ),
        ]);

        let resolved = fixture
            .create(
                "Post",
                json!({"category": {"connectOrCreate": {
                    "where": {"id": 5},
                    "create": {"id": 5, "name": "Fifth"}
                }}}),
            )
            .await
            .unwrap();

        assert_eq!(
            resolved,
            json!({"category": {"connectOrCreate": {
                "where": {"id": 5, "AND": [impossible()]},
                "create": {"id": 5, "name": "Fifth"}
            }}})
        );

        // The create half is still resolved as a nested create
        let error = fixture
            .create(
                "User",
                json!({"comments": {"connectOrCreate": {
                    "where": {"id": 1},
                    "create": {"content": "c", "post": {"create": {"title": "t"}}}
                }}}),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, RlsError::Authorization { ref entity, .. } if entity == "Post"));
    }

    #[tokio::test]
    async fn list_lookups_are_scoped_by_read_policy() {
        let fixture = Fixture::new(vec![(
            "Post",
            EntityPermissions::allow_all().with_read(filter(json!({"published": true}))),
        )]);

        let resolved = fixture
            .update(
                "User",
                json!({"posts": {
                    "connect": [{"id": 1}, {"id": 2}],
                    "set": {"id": 3},
                    "disconnect": [{"id": 1, "title": "Quick bites"}]
                }}),
            )
            .await
            .unwrap();

        assert_eq!(
            resolved,
            json!({"posts": {
                "connect": [
                    {"id": 1, "AND": [{"published": true}]},
                    {"id": 2, "AND": [{"published": true}]}
                ],
                "set": {"id": 3, "AND": [{"published": true}]},
                "disconnect": [{"id": 1, "AND": [{"title": "Quick bites"}, {"published": true}]}]
            }})
        );
    }

    #[tokio::test]
    async fn list_writes_are_scoped_by_write_policy() {
        let fixture = Fixture::new(vec![(
            "Post",
            EntityPermissions::allow_all()
                .with_update(filter(json!({"published": false})))
                .with_delete(filter(json!({"authorId": 1}))),
        )]);

        let resolved = fixture
            .update(
                "User",
                json!({"posts": {
                    "update": {"where": {"id": 2}, "data": {"title": "x"}},
                    "updateMany": {"where": {"title": "x"}, "data": {"title": "y"}},
                    "upsert": [{"where": {"id": 9}, "create": {"title": "z"}, "update": {"title": "z"}}],
                    "delete": {"id": 2},
                    "deleteMany": [{"published": true}]
                }}),
            )
            .await
            .unwrap();

        assert_eq!(
            resolved,
            json!({"posts": {
                "update": {"where": {"id": 2, "AND": [{"published": false}]}, "data": {"title": "x"}},
                "updateMany": {"where": {"AND": [{"title": "x"}, {"published": false}]}, "data": {"title": "y"}},
                "upsert": [{
                    "where": {"id": 9, "AND": [{"published": false}]},
                    "create": {"title": "z"},
                    "update": {"title": "z"}
                }],
                "delete": {"id": 2, "AND": [{"authorId": 1}]},
                "deleteMany": [{"AND": [{"published": true}, {"authorId": 1}]}]
            }})
        );
    }

    #[tokio::test]
    async fn denied_nested_writes_fail() {
        let fixture = Fixture::new(vec![
            (
                "Post",
                EntityPermissions::allow_all()
                    .with_update(PermissionDefinition::Deny)
                    .with_delete(PermissionDefinition::Deny),
            ),
            ("Category", EntityPermissions::allow_all().with_create(false)),
        ]);

        for (entity, data, operation) in [
            ("User", json!({"posts": {"update": {"where": {"id": 1}, "data": {}}}}), "update"),
            ("User", json!({"posts": {"updateMany": {"data": {}}}}), "update"),
            ("User", json!({"posts": {"delete": {"id": 1}}}), "delete"),
            ("User", json!({"posts": {"deleteMany": {}}}), "delete"),
            ("Comment", json!({"post": {"update": {"title": "x"}}}), "update"),
            (
                "Post",
                json!({"category": {"upsert": {"create": {"name": "n"}, "update": {"name": "n"}}}}),
                "create",
            ),
        ] {
            let error = fixture.update(entity, data).await.unwrap_err();
            assert!(
                matches!(error, RlsError::Authorization { operation: ref op, .. } if op == operation),
                "{error:?}"
            );
        }
    }

    #[tokio::test]
    async fn to_one_update_forms() {
        let fixture = Fixture::new(vec![(
            "Post",
            EntityPermissions::allow_all().with_update(filter(json!({"published": false}))),
        )]);

        // Bare data becomes an envelope carrying the policy filter
        let resolved = fixture
            .update("Comment", json!({"post": {"update": {"title": "x"}}}))
            .await
            .unwrap();
        assert_eq!(
            resolved,
            json!({"post": {"update": {"data": {"title": "x"}, "where": {"published": false}}}})
        );

        let resolved = fixture
            .update(
                "Comment",
                json!({"post": {"update": {"where": {"title": "a"}, "data": {"title": "x"}}}}),
            )
            .await
            .unwrap();
        assert_eq!(
            resolved,
            json!({"post": {"update": {
                "where": {"AND": [{"title": "a"}, {"published": false}]},
                "data": {"title": "x"}
            }}})
        );

        // Unrestricted updates keep their shape
        let fixture = Fixture::new(vec![]);
        let data = json!({"post": {"update": {"title": "x"}}});
        assert_eq!(fixture.update("Comment", data.clone()).await.unwrap(), data);
    }

    #[tokio::test]
    async fn to_one_disconnect_and_delete() {
        let fixture = Fixture::new(vec![(
            "User",
            EntityPermissions::allow_all()
                .with_read(filter(json!({"name": {"not": null}})))
                .with_delete(filter(json!({"email": {"endsWith": "@test.local"}}))),
        )]);

        let resolved = fixture
            .update("Comment", json!({"author": {"disconnect": true}}))
            .await
            .unwrap();
        assert_eq!(
            resolved,
            json!({"author": {"disconnect": {"name": {"not": null}}}})
        );

        let resolved = fixture
            .update("Comment", json!({"author": {"delete": {"id": 2}}}))
            .await
            .unwrap();
        assert_eq!(
            resolved,
            json!({"author": {"delete": {"AND": [{"id": 2}, {"email": {"endsWith": "@test.local"}}]}}})
        );

        let resolved = fixture
            .update("Comment", json!({"author": {"disconnect": false}}))
            .await
            .unwrap();
        assert_eq!(resolved, json!({"author": {"disconnect": false}}));
    }

    #[tokio::test]
    async fn unsupported_actions() {
        let fixture = Fixture::new(vec![]);

        let error = fixture
            .create("User", json!({"posts": {"set": [{"id": 1}]}}))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            RlsError::UnsupportedOperation {
                ref action,
                relation: RelationContext::List,
                mutation: MutationContext::Create
            } if action == "set"
        ));

        let error = fixture
            .update("Post", json!({"author": {"deleteMany": {}}}))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            RlsError::UnsupportedOperation {
                relation: RelationContext::Singular,
                mutation: MutationContext::Update,
                ..
            }
        ));

        let error = fixture
            .update("Post", json!({"comments": {"replace": []}}))
            .await
            .unwrap_err();
        assert!(matches!(error, RlsError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn allow_all_is_identity() {
        let fixture = Fixture::new(vec![]);

        let data = json!({
            "title": "t",
            "author": {"connectOrCreate": {"where": {"email": "a@b"}, "create": {"email": "a@b"}}},
            "comments": {
                "create": [{"content": "c", "author": {"connect": {"id": 1}}}],
                "connect": {"id": 2},
                "set": [],
                "disconnect": [{"id": 3}],
                "update": [{"where": {"id": 1}, "data": {"content": "d"}}],
                "updateMany": {"where": {"content": "c"}, "data": {"content": "e"}},
                "upsert": {"where": {"id": 1}, "create": {"content": "f"}, "update": {"content": "g"}},
                "delete": {"id": 1},
                "deleteMany": [{"content": "x"}]
            },
            "category": {"update": {"name": "n"}}
        });

        assert_eq!(fixture.update("Post", data.clone()).await.unwrap(), data);
    }
}
