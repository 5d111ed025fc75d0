// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! # Permission policies
//!
//! A policy assigns each entity an [`EntityPermissions`]: one [`PermissionDefinition`] for each
//! of the read, update and delete operation classes and a plain flag for create (a record that
//! doesn't exist yet cannot be filtered).
//!
//! Definitions are generic over the request context `C`. The engine never inspects the context;
//! it only hands it to [`PredicateResolver`]s, which turn it into a concrete filter (for example,
//! `{ "authorId": <current user id> }`).

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    predicate::{NotAPredicate, Predicate},
    schema::EntitySchema,
};

/// Produces a filter from the request context. May perform I/O.
#[async_trait]
pub trait PredicateResolver<C>: Send + Sync {
    async fn resolve(&self, context: &C) -> anyhow::Result<Predicate>;
}

struct FnPredicateResolver<F>(F);

#[async_trait]
impl<C, F> PredicateResolver<C> for FnPredicateResolver<F>
where
    C: Sync,
    F: Fn(&C) -> anyhow::Result<Predicate> + Send + Sync,
{
    async fn resolve(&self, context: &C) -> anyhow::Result<Predicate> {
        (self.0)(context)
    }
}

pub enum PermissionDefinition<C> {
    Deny,
    AllowAll,
    StaticFilter(Predicate),
    ContextResolver(Arc<dyn PredicateResolver<C>>),
}

impl<C> PermissionDefinition<C> {
    /// Wrap a synchronous function of the context.
    pub fn from_fn<F>(resolver: F) -> Self
    where
        C: Sync + 'static,
        F: Fn(&C) -> anyhow::Result<Predicate> + Send + Sync + 'static,
    {
        PermissionDefinition::ContextResolver(Arc::new(FnPredicateResolver(resolver)))
    }

    pub fn from_resolver(resolver: impl PredicateResolver<C> + 'static) -> Self {
        PermissionDefinition::ContextResolver(Arc::new(resolver))
    }

    pub fn is_deny(&self) -> bool {
        matches!(self, PermissionDefinition::Deny)
    }

    pub fn is_allow_all(&self) -> bool {
        matches!(self, PermissionDefinition::AllowAll)
    }
}

impl<C> From<bool> for PermissionDefinition<C> {
    fn from(allowed: bool) -> Self {
        if allowed {
            PermissionDefinition::AllowAll
        } else {
            PermissionDefinition::Deny
        }
    }
}

impl<C> From<Predicate> for PermissionDefinition<C> {
    fn from(predicate: Predicate) -> Self {
        PermissionDefinition::StaticFilter(predicate)
    }
}

impl<C> TryFrom<Value> for PermissionDefinition<C> {
    type Error = NotAPredicate;

    /// `true`/`false` map to allow-all/deny, objects to a static filter.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(allowed) => Ok(allowed.into()),
            other => Ok(PermissionDefinition::StaticFilter(Predicate::try_from(other)?)),
        }
    }
}

impl<C> Clone for PermissionDefinition<C> {
    fn clone(&self) -> Self {
        match self {
            PermissionDefinition::Deny => PermissionDefinition::Deny,
            PermissionDefinition::AllowAll => PermissionDefinition::AllowAll,
            PermissionDefinition::StaticFilter(predicate) => {
                PermissionDefinition::StaticFilter(predicate.clone())
            }
            PermissionDefinition::ContextResolver(resolver) => {
                PermissionDefinition::ContextResolver(resolver.clone())
            }
        }
    }
}

impl<C> fmt::Debug for PermissionDefinition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionDefinition::Deny => write!(f, "Deny"),
            PermissionDefinition::AllowAll => write!(f, "AllowAll"),
            PermissionDefinition::StaticFilter(predicate) => {
                f.debug_tuple("StaticFilter").field(predicate).finish()
            }
            PermissionDefinition::ContextResolver(_) => write!(f, "ContextResolver(..)"),
        }
    }
}

#[derive(Debug)]
pub struct EntityPermissions<C> {
    pub read: PermissionDefinition<C>,
    pub create: bool,
    pub update: PermissionDefinition<C>,
    pub delete: PermissionDefinition<C>,
}

impl<C> EntityPermissions<C> {
    pub fn deny_all() -> Self {
        Self {
            read: PermissionDefinition::Deny,
            create: false,
            update: PermissionDefinition::Deny,
            delete: PermissionDefinition::Deny,
        }
    }

    pub fn allow_all() -> Self {
        Self {
            read: PermissionDefinition::AllowAll,
            create: true,
            update: PermissionDefinition::AllowAll,
            delete: PermissionDefinition::AllowAll,
        }
    }

    pub fn with_read(mut self, read: impl Into<PermissionDefinition<C>>) -> Self {
        self.read = read.into();
        self
    }

    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn with_update(mut self, update: impl Into<PermissionDefinition<C>>) -> Self {
        self.update = update.into();
        self
    }

    pub fn with_delete(mut self, delete: impl Into<PermissionDefinition<C>>) -> Self {
        self.delete = delete.into();
        self
    }
}

impl<C> Clone for EntityPermissions<C> {
    fn clone(&self) -> Self {
        Self {
            read: self.read.clone(),
            create: self.create,
            update: self.update.clone(),
            delete: self.delete.clone(),
        }
    }
}

impl<C> Default for EntityPermissions<C> {
    fn default() -> Self {
        Self::deny_all()
    }
}

/// The full policy: entity name to [`EntityPermissions`].
///
/// Entities without an entry are treated as fully denied by the engine.
#[derive(Debug)]
pub struct PermissionsConfig<C> {
    entities: HashMap<String, EntityPermissions<C>>,
}

impl<C> PermissionsConfig<C> {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }

    /// A policy that denies every operation on every entity of the schema.
    pub fn deny_all(schema: &EntitySchema) -> Self {
        Self {
            entities: schema
                .entity_names()
                .map(|name| (name.to_string(), EntityPermissions::deny_all()))
                .collect(),
        }
    }

    /// Set (or replace) the permissions of one entity.
    pub fn with(mut self, entity_name: &str, permissions: EntityPermissions<C>) -> Self {
        self.entities.insert(entity_name.to_string(), permissions);
        self
    }

    pub fn get(&self, entity_name: &str) -> Option<&EntityPermissions<C>> {
        self.entities.get(entity_name)
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }
}

impl<C> Default for PermissionsConfig<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for PermissionsConfig<C> {
    fn clone(&self) -> Self {
        Self {
            entities: self.entities.clone(),
        }
    }
}
