// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Solve a [`PermissionDefinition`] against the request context.
//!
//! The solution is either a definitive answer (denied or unrestricted), which lets the caller
//! short-circuit without touching the store, or a residual predicate that must be conjoined to
//! the query's filter.

use rowguard_model::{PermissionDefinition, Predicate};

use crate::rls_error::RlsError;

#[derive(Debug, Clone, PartialEq)]
pub enum AccessSolution {
    Denied,
    Unrestricted,
    Filtered(Predicate),
}

impl AccessSolution {
    pub fn is_denied(&self) -> bool {
        matches!(self, AccessSolution::Denied)
    }
}

/// `Deny` and `AllowAll` are solved without looking at the context. A failing context resolver
/// surfaces as [`RlsError::PermissionResolution`], never as an authorization outcome.
pub async fn solve<C: Sync>(
    definition: &PermissionDefinition<C>,
    context: &C,
) -> Result<AccessSolution, RlsError> {
    match definition {
        PermissionDefinition::Deny => Ok(AccessSolution::Denied),
        PermissionDefinition::AllowAll => Ok(AccessSolution::Unrestricted),
        PermissionDefinition::StaticFilter(predicate) => {
            Ok(AccessSolution::Filtered(predicate.clone()))
        }
        PermissionDefinition::ContextResolver(resolver) => resolver
            .resolve(context)
            .await
            .map(AccessSolution::Filtered)
            .map_err(RlsError::PermissionResolution),
    }
}
