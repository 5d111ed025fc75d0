// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Row-level authorization for a structured-query store.
//!
//! [`RlsEngine`] sits in front of a [`rowguard_model::QueryExecutor`] and rewrites every
//! operation before it runs: reads only see records the policy allows, nested relations in
//! `select`/`include` are filtered the same way, writes fail (or are scoped) per the policy, and
//! required to-one relations in results can be verified after the fact.

mod access_solver;
mod dispatcher;
mod integrity_verifier;
mod mutation_resolver;
mod options;
mod predicate_util;
mod projection_resolver;
mod relation_path;
mod request_resolver;
mod rls_error;

pub use access_solver::{AccessSolution, solve};
pub use dispatcher::{InterceptedOperation, Rewrite, RlsEngine};
pub use options::{
    CHECK_REQUIRED_BELONGS_TO_ENV, EnvError, Environment, RlsOptions, SystemEnvironment,
};
pub use predicate_util::{
    impossible_predicate, merge_filter, merge_unique_filter, scope_filter, scope_unique_filter,
    split_unique_filter,
};
pub use relation_path::{PathSegment, RelationPathRecord, ResultPath};
pub use rls_error::{MutationContext, RelationContext, RlsError};
