// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Data model shared by the row-level authorization engine and the stores it fronts.
//!
//! - [`schema`]: the entity/field metadata index built once from a datamodel description.
//! - [`permission`]: per-entity, per-operation-class permission policies.
//! - [`predicate`]: the opaque filter value exchanged with the store.
//! - [`operation`]: the closed set of operations and their typed arguments.
//! - [`executor`]: the boundary traits a store implements.

pub mod executor;
pub mod operation;
pub mod permission;
pub mod predicate;
pub mod schema;

pub use executor::{QueryExecutor, SessionProvider, StoreError, TransactionMarker};
pub use operation::{Operation, OperationKind};
pub use permission::{EntityPermissions, PermissionDefinition, PermissionsConfig};
pub use predicate::Predicate;
pub use schema::{
    EntitySchema, FieldDescriptor, FieldKind, RelationCardinality, RelationDescriptor, ScalarType,
    SchemaError,
};
