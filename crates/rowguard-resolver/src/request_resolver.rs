// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use rowguard_model::{
    EntityPermissions, EntitySchema, PermissionDefinition, PermissionsConfig, Predicate,
    SchemaError,
};

use crate::{
    access_solver::{AccessSolution, solve},
    options::RlsOptions,
    predicate_util::{impossible_predicate, scope_filter, scope_unique_filter},
    rls_error::RlsError,
};

/// Everything needed to rewrite the arguments of one intercepted call.
///
/// Holds only shared references and the request context; the projection and mutation resolvers
/// return what they produce instead of accumulating into it.
pub(crate) struct RequestResolver<'a, C> {
    pub schema: &'a EntitySchema,
    pub permissions: &'a PermissionsConfig<C>,
    pub options: RlsOptions,
    pub context: &'a C,
}

impl<'a, C: Sync> RequestResolver<'a, C> {
    /// Permissions of an entity. The engine fills in every schema entity missing from the
    /// policy, so a miss here means the entity itself is unknown.
    pub fn permissions_of(&self, entity_name: &str) -> Result<&'a EntityPermissions<C>, RlsError> {
        self.permissions
            .get(entity_name)
            .ok_or_else(|| SchemaError::UnknownEntity(entity_name.to_string()).into())
    }

    pub async fn solve(
        &self,
        definition: &PermissionDefinition<C>,
    ) -> Result<AccessSolution, RlsError> {
        solve(definition, self.context).await
    }

    pub async fn solve_read(&self, entity_name: &str) -> Result<AccessSolution, RlsError> {
        self.solve(&self.permissions_of(entity_name)?.read).await
    }

    pub fn can_create(&self, entity_name: &str) -> Result<bool, RlsError> {
        Ok(self.permissions_of(entity_name)?.create)
    }

    pub fn impossible_predicate(&self, entity_name: &str) -> Result<Predicate, RlsError> {
        impossible_predicate(self.schema, entity_name)
    }

    pub fn scope_filter(
        &self,
        entity_name: &str,
        where_: Option<Predicate>,
        solution: AccessSolution,
    ) -> Result<Option<Predicate>, RlsError> {
        scope_filter(self.schema, entity_name, where_, solution)
    }

    pub fn scope_unique_filter(
        &self,
        entity_name: &str,
        unique_where: Predicate,
        solution: AccessSolution,
    ) -> Result<Predicate, RlsError> {
        scope_unique_filter(self.schema, entity_name, unique_where, solution)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use rowguard_memstore::fixtures;
    use rowguard_model::{EntityPermissions, EntitySchema, PermissionsConfig};

    /// The blog schema with a policy that allows everything, overridden per entity.
    pub fn permissions<C>(
        schema: &EntitySchema,
        overrides: Vec<(&str, EntityPermissions<C>)>,
    ) -> PermissionsConfig<C> {
        let base = schema
            .entity_names()
            .fold(PermissionsConfig::new(), |config, name| {
                config.with(name, EntityPermissions::allow_all())
            });

        overrides
            .into_iter()
            .fold(base, |config, (name, permissions)| config.with(name, permissions))
    }

    pub fn schema() -> EntitySchema {
        fixtures::blog_schema().unwrap()
    }
}
