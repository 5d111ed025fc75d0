// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use rowguard_model::{
    OperationKind, SchemaError, StoreError, operation::ArgumentError, predicate::NotAPredicate,
};
use thiserror::Error;
use tracing::error;

/// Where a nested mutation action was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationContext {
    List,
    Singular,
}

impl fmt::Display for RelationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationContext::List => f.write_str("list"),
            RelationContext::Singular => f.write_str("singular"),
        }
    }
}

/// Which nested payload (create or update) contained an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationContext {
    Create,
    Update,
}

impl fmt::Display for MutationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationContext::Create => f.write_str("create"),
            MutationContext::Update => f.write_str("update"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RlsError {
    #[error("Not authorized to {operation} '{entity}'")]
    Authorization {
        entity: String,
        operation: String,
    },

    #[error("Referential integrity violation for '{entity}' at {path}")]
    ReferentialIntegrity { entity: String, path: String },

    #[error("{0}")]
    Schema(#[from] SchemaError),

    #[error("Unsupported nested action '{action}' in a {relation} relation of a {mutation} payload")]
    UnsupportedOperation {
        action: String,
        relation: RelationContext,
        mutation: MutationContext,
    },

    #[error("Cannot build an always-false predicate for '{entity}.{field}' of type '{field_type}'")]
    UnsupportedFieldType {
        entity: String,
        field: String,
        field_type: String,
    },

    #[error("The primary key '{field}' of '{entity}' must be selected at {path}")]
    MissingPrimaryKeySelection {
        entity: String,
        field: String,
        path: String,
    },

    #[error("No '{entity}' record found for {operation}")]
    NotFound {
        entity: String,
        operation: OperationKind,
    },

    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    PermissionResolution(anyhow::Error),

    #[error("{0}")]
    Store(#[from] StoreError),
}

impl RlsError {
    pub fn authorization(entity: &str, operation: impl Into<String>) -> RlsError {
        RlsError::Authorization {
            entity: entity.to_string(),
            operation: operation.into(),
        }
    }

    /// Not-found from either the engine (denied throwing reads) or the store.
    pub fn is_not_found(&self) -> bool {
        match self {
            RlsError::NotFound { .. } => true,
            RlsError::Store(store_error) => store_error.is_not_found(),
            _ => false,
        }
    }

    pub fn user_error_message(&self) -> String {
        match self {
            RlsError::Authorization { .. } => "Not authorized".to_string(),
            RlsError::ReferentialIntegrity { .. } => "Referential integrity violation".to_string(),
            RlsError::NotFound { .. } => self.to_string(),
            RlsError::Store(store_error) if store_error.is_not_found() => store_error.to_string(),
            // Configuration and store errors may expose schema or policy details
            _ => {
                error!("Row-level authorization failed: {:?}", self);
                "Operation failed".to_string()
            }
        }
    }
}

impl From<ArgumentError> for RlsError {
    fn from(error: ArgumentError) -> Self {
        RlsError::InvalidArgument(error.to_string())
    }
}

impl From<NotAPredicate> for RlsError {
    fn from(error: NotAPredicate) -> Self {
        RlsError::InvalidArgument(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_hide_details() {
        assert_eq!(
            RlsError::authorization("User", "create").user_error_message(),
            "Not authorized"
        );

        assert_eq!(
            RlsError::ReferentialIntegrity {
                entity: "Category".into(),
                path: "$.*.category".into()
            }
            .user_error_message(),
            "Referential integrity violation"
        );

        assert_eq!(
            RlsError::Schema(SchemaError::MissingUniqueField("Log".into())).user_error_message(),
            "Operation failed"
        );
    }

    #[test]
    fn not_found_from_engine_or_store() {
        let engine = RlsError::NotFound {
            entity: "User".into(),
            operation: OperationKind::FindUniqueOrThrow,
        };
        let store = RlsError::from(StoreError::NotFound {
            entity: "Post".into(),
            operation: OperationKind::Delete,
        });

        assert!(engine.is_not_found());
        assert!(store.is_not_found());
        assert!(!RlsError::authorization("Post", "delete").is_not_found());
    }
}
