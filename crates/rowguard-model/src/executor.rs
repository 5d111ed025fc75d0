// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::operation::OperationKind;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The store's own "record not found" class (throwing reads, updates and deletes of a
    /// record that doesn't match).
    #[error("No '{entity}' record found for {operation}")]
    NotFound {
        entity: String,
        operation: OperationKind,
    },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Invalid query: {0}")]
    Invalid(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Runs (already rewritten) operations against the underlying store.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        entity: &str,
        operation: OperationKind,
        args: Value,
    ) -> Result<Value, StoreError>;
}

/// Identifies the ambient transaction of an intercepted call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionMarker(pub String);

/// Hands out a client bound to a transaction, or the default client when there is none.
pub trait SessionProvider: Send + Sync {
    fn session<'a>(&'a self, transaction: Option<&TransactionMarker>) -> &'a dyn QueryExecutor;
}
