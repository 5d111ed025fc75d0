// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{mem, sync::Arc};

use rowguard_model::{
    EntityPermissions, EntitySchema, Operation, OperationKind, PermissionsConfig, QueryExecutor,
    SessionProvider, TransactionMarker,
    operation::{
        CreateArgs, DeleteArgs, FilterArgs, Projection, ReadArgs, UpdateArgs, UpdateManyArgs,
        UpsertArgs,
    },
};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{
    options::RlsOptions,
    relation_path::{RelationPathRecord, ResultPath},
    request_resolver::RequestResolver,
    rls_error::RlsError,
};

const SELECT: &str = "select";

/// One call caught by the query-interception hook.
#[derive(Debug, Clone)]
pub struct InterceptedOperation<'a> {
    pub entity: &'a str,
    pub operation: OperationKind,
    pub args: Value,
    /// The ambient transaction, if the call runs inside one.
    pub transaction: Option<&'a TransactionMarker>,
}

/// The outcome of rewriting an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite {
    /// Run the rewritten operation, then verify the recorded required relations in its result.
    Proceed {
        operation: Operation,
        relation_paths: Vec<RelationPathRecord>,
    },
    /// The policy decided the result without consulting the store.
    ShortCircuit(Value),
}

enum Outcome {
    Proceed(Vec<RelationPathRecord>),
    ShortCircuit(Value),
}

/// The row-level authorization engine: rewrites every intercepted operation so that it only sees
/// (and only changes) what the policy allows for the request context `C`.
pub struct RlsEngine<C> {
    schema: Arc<EntitySchema>,
    permissions: Arc<PermissionsConfig<C>>,
    options: RlsOptions,
    sessions: Option<Arc<dyn SessionProvider>>,
}

impl<C> Clone for RlsEngine<C> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            permissions: self.permissions.clone(),
            options: self.options,
            sessions: self.sessions.clone(),
        }
    }
}

impl<C: Sync> RlsEngine<C> {
    /// Entities of the schema that the policy doesn't mention are denied everything.
    pub fn new(schema: EntitySchema, permissions: PermissionsConfig<C>, options: RlsOptions) -> Self {
        for entity_name in permissions.entity_names() {
            if schema.entity(entity_name).is_err() {
                warn!(entity = entity_name, "Policy for an entity missing from the schema");
            }
        }

        let missing: Vec<String> = schema
            .entity_names()
            .filter(|entity_name| permissions.get(entity_name).is_none())
            .map(str::to_string)
            .collect();

        let permissions = missing.iter().fold(permissions, |permissions, entity_name| {
            warn!(entity = %entity_name, "No policy for entity, denying all operations");
            permissions.with(entity_name, EntityPermissions::deny_all())
        });

        Self {
            schema: Arc::new(schema),
            permissions: Arc::new(permissions),
            options,
            sessions: None,
        }
    }

    /// Route integrity checks through the session bound to the intercepted call's transaction.
    /// Without a provider they go through the call's own executor.
    pub fn with_session_provider(mut self, sessions: Arc<dyn SessionProvider>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn options(&self) -> RlsOptions {
        self.options
    }

    fn resolver<'a>(&'a self, context: &'a C) -> RequestResolver<'a, C> {
        RequestResolver {
            schema: &self.schema,
            permissions: &self.permissions,
            options: self.options,
            context,
        }
    }

    /// The query-interception hook: rewrite the operation, run it through `proceed` and verify
    /// the result.
    #[instrument(
        name = "RlsEngine::intercept",
        skip_all,
        fields(entity = intercepted.entity, operation = %intercepted.operation)
    )]
    pub async fn intercept(
        &self,
        context: &C,
        intercepted: InterceptedOperation<'_>,
        proceed: &dyn QueryExecutor,
    ) -> Result<Value, RlsError> {
        let entity_name = intercepted.entity;
        let operation = Operation::parse(intercepted.operation, intercepted.args)?;

        match self.rewrite(context, entity_name, operation).await? {
            Rewrite::ShortCircuit(result) => Ok(result),
            Rewrite::Proceed {
                operation,
                relation_paths,
            } => {
                let result = proceed
                    .execute(entity_name, operation.kind(), operation.into_args())
                    .await?;

                if !relation_paths.is_empty() {
                    let executor = match &self.sessions {
                        Some(sessions) => sessions.session(intercepted.transaction),
                        None => proceed,
                    };

                    self.resolver(context)
                        .verify_relations(&result, &relation_paths, executor)
                        .await?;
                }

                Ok(result)
            }
        }
    }

    /// Rewrite an operation without running it.
    pub async fn rewrite(
        &self,
        context: &C,
        entity_name: &str,
        mut operation: Operation,
    ) -> Result<Rewrite, RlsError> {
        let resolver = self.resolver(context);
        let kind = operation.kind();

        let outcome = match &mut operation {
            Operation::FindUnique(args)
            | Operation::FindUniqueOrThrow(args)
            | Operation::FindFirst(args)
            | Operation::FindFirstOrThrow(args)
            | Operation::FindMany(args) => resolver.rewrite_read(entity_name, kind, args).await?,
            Operation::Aggregate(args) | Operation::Count(args) | Operation::GroupBy(args) => {
                resolver.rewrite_filtered_read(entity_name, kind, args).await?
            }
            Operation::Create(args) => resolver.rewrite_create(entity_name, args).await?,
            Operation::CreateMany(_) => {
                resolver.require_create(entity_name)?;
                Outcome::Proceed(vec![])
            }
            Operation::Update(args) => resolver.rewrite_update(entity_name, args).await?,
            Operation::UpdateMany(args) => resolver.rewrite_update_many(entity_name, args).await?,
            Operation::Upsert(args) => resolver.rewrite_upsert(entity_name, args).await?,
            Operation::Delete(args) => resolver.rewrite_delete(entity_name, args).await?,
            Operation::DeleteMany(args) => resolver.rewrite_delete_many(entity_name, args).await?,
        };

        Ok(match outcome {
            Outcome::Proceed(relation_paths) => Rewrite::Proceed {
                operation,
                relation_paths,
            },
            Outcome::ShortCircuit(result) => Rewrite::ShortCircuit(result),
        })
    }
}

impl<'a, C: Sync> RequestResolver<'a, C> {
    async fn resolve_root_projection(
        &self,
        entity_name: &str,
        projection: Option<Projection>,
    ) -> Result<(Option<Projection>, Vec<RelationPathRecord>), RlsError> {
        match projection {
            None => Ok((None, vec![])),
            Some(projection) => {
                let (projection, relation_paths) = self
                    .resolve_projection(entity_name, &projection, &ResultPath::root())
                    .await?;
                Ok((Some(projection), relation_paths))
            }
        }
    }

    async fn rewrite_read(
        &self,
        entity_name: &str,
        kind: OperationKind,
        args: &mut ReadArgs,
    ) -> Result<Outcome, RlsError> {
        let solution = self.solve_read(entity_name).await?;

        if solution.is_denied() {
            debug!("Read denied");
            return match kind {
                OperationKind::FindUniqueOrThrow | OperationKind::FindFirstOrThrow => {
                    Err(RlsError::NotFound {
                        entity: entity_name.to_string(),
                        operation: kind,
                    })
                }
                OperationKind::FindMany => Ok(Outcome::ShortCircuit(Value::Array(vec![]))),
                _ => Ok(Outcome::ShortCircuit(Value::Null)),
            };
        }

        let is_unique_lookup = matches!(
            kind,
            OperationKind::FindUnique | OperationKind::FindUniqueOrThrow
        );
        args.where_ = match args.where_.take() {
            Some(where_) if is_unique_lookup => {
                Some(self.scope_unique_filter(entity_name, where_, solution)?)
            }
            where_ => self.scope_filter(entity_name, where_, solution)?,
        };

        let (projection, relation_paths) = self
            .resolve_root_projection(entity_name, args.projection.take())
            .await?;
        args.projection = projection;

        Ok(Outcome::Proceed(relation_paths))
    }

    /// `aggregate`, `count` and `groupBy`. A denied `count` is zero and a denied `groupBy` has no
    /// groups; a denied `aggregate` (and a `count` with a `select`, whose result is an object)
    /// runs over no records to keep the shape of its result.
    async fn rewrite_filtered_read(
        &self,
        entity_name: &str,
        kind: OperationKind,
        args: &mut FilterArgs,
    ) -> Result<Outcome, RlsError> {
        let solution = self.solve_read(entity_name).await?;

        if solution.is_denied() {
            debug!("Read denied");
            match kind {
                OperationKind::Count if !args.rest.contains_key(SELECT) => {
                    return Ok(Outcome::ShortCircuit(Value::from(0)));
                }
                OperationKind::GroupBy => return Ok(Outcome::ShortCircuit(Value::Array(vec![]))),
                _ => {}
            }
        }

        args.where_ = self.scope_filter(entity_name, args.where_.take(), solution)?;

        Ok(Outcome::Proceed(vec![]))
    }

    async fn rewrite_create(
        &self,
        entity_name: &str,
        args: &mut CreateArgs,
    ) -> Result<Outcome, RlsError> {
        self.require_create(entity_name)?;

        let projection = args.projection.take();
        let (data, (projection, relation_paths)) = futures::try_join!(
            self.resolve_create(entity_name, &args.data),
            self.resolve_root_projection(entity_name, projection)
        )?;

        args.data = data;
        args.projection = projection;

        Ok(Outcome::Proceed(relation_paths))
    }

    async fn rewrite_update(
        &self,
        entity_name: &str,
        args: &mut UpdateArgs,
    ) -> Result<Outcome, RlsError> {
        let update = &self.permissions_of(entity_name)?.update;
        self.require_permission(entity_name, update, OperationKind::Update.name())?;

        let projection = args.projection.take();
        let (solution, data, (projection, relation_paths)) = futures::try_join!(
            self.solve(update),
            self.resolve_update(entity_name, &args.data),
            self.resolve_root_projection(entity_name, projection)
        )?;

        args.where_ = self.scope_unique_filter(entity_name, mem::take(&mut args.where_), solution)?;
        args.data = data;
        args.projection = projection;

        Ok(Outcome::Proceed(relation_paths))
    }

    /// The data of a bulk update cannot hold relation actions and passes through.
    async fn rewrite_update_many(
        &self,
        entity_name: &str,
        args: &mut UpdateManyArgs,
    ) -> Result<Outcome, RlsError> {
        let update = &self.permissions_of(entity_name)?.update;
        self.require_permission(entity_name, update, OperationKind::UpdateMany.name())?;

        let solution = self.solve(update).await?;
        args.where_ = self.scope_filter(entity_name, args.where_.take(), solution)?;

        Ok(Outcome::Proceed(vec![]))
    }

    async fn rewrite_upsert(
        &self,
        entity_name: &str,
        args: &mut UpsertArgs,
    ) -> Result<Outcome, RlsError> {
        let permissions = self.permissions_of(entity_name)?;
        if !permissions.create || permissions.update.is_deny() {
            return Err(RlsError::authorization(
                entity_name,
                OperationKind::Upsert.name(),
            ));
        }

        let projection = args.projection.take();
        let (solution, create, update, (projection, relation_paths)) = futures::try_join!(
            self.solve(&permissions.update),
            self.resolve_create(entity_name, &args.create),
            self.resolve_update(entity_name, &args.update),
            self.resolve_root_projection(entity_name, projection)
        )?;

        args.where_ = self.scope_unique_filter(entity_name, mem::take(&mut args.where_), solution)?;
        args.create = create;
        args.update = update;
        args.projection = projection;

        Ok(Outcome::Proceed(relation_paths))
    }

    async fn rewrite_delete(
        &self,
        entity_name: &str,
        args: &mut DeleteArgs,
    ) -> Result<Outcome, RlsError> {
        let delete = &self.permissions_of(entity_name)?.delete;
        self.require_permission(entity_name, delete, OperationKind::Delete.name())?;

        let projection = args.projection.take();
        let (solution, (projection, relation_paths)) = futures::try_join!(
            self.solve(delete),
            self.resolve_root_projection(entity_name, projection)
        )?;

        args.where_ = self.scope_unique_filter(entity_name, mem::take(&mut args.where_), solution)?;
        args.projection = projection;

        Ok(Outcome::Proceed(relation_paths))
    }

    async fn rewrite_delete_many(
        &self,
        entity_name: &str,
        args: &mut FilterArgs,
    ) -> Result<Outcome, RlsError> {
        let delete = &self.permissions_of(entity_name)?.delete;
        self.require_permission(entity_name, delete, OperationKind::DeleteMany.name())?;

        let solution = self.solve(delete).await?;
        args.where_ = self.scope_filter(entity_name, args.where_.take(), solution)?;

        Ok(Outcome::Proceed(vec![]))
    }
}
