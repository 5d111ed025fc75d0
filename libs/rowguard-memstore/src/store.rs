// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rowguard_model::{
    EntitySchema, OperationKind, QueryExecutor, SessionProvider, StoreError, TransactionMarker,
};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    filter::StoreView,
    mutation::Mutation,
    table::{Table, Tables},
};

/// An in-memory store executing operations on JSON rows.
///
/// Every operation is atomic: writes run against a copy of the tables that replaces the
/// original only on success.
pub struct MemoryStore {
    schema: EntitySchema,
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new(schema: EntitySchema) -> Self {
        let tables = schema
            .entity_names()
            .map(|name| (name.to_string(), Table::default()))
            .collect();

        Self {
            schema,
            tables: Mutex::new(tables),
        }
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// Insert a record (nested relation payloads allowed) and return it.
    pub fn insert(&self, entity_name: &str, data: Value) -> Result<Value, StoreError> {
        let mut args = Map::new();
        args.insert("data".to_string(), data);
        self.execute_now(entity_name, OperationKind::Create, Value::Object(args))
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // Writes only swap in fully built tables, so a poisoned lock still guards consistent data
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn execute_now(
        &self,
        entity_name: &str,
        operation: OperationKind,
        args: Value,
    ) -> Result<Value, StoreError> {
        let args = match args {
            Value::Object(args) => args,
            Value::Null => Map::new(),
            other => {
                return Err(StoreError::Invalid(format!(
                    "Arguments must be an object, got '{other}'"
                )));
            }
        };

        let mut tables = self.lock();

        if operation.is_read() {
            let view = StoreView {
                schema: &self.schema,
                tables: &tables,
            };
            return view.read(entity_name, operation, &args);
        }

        let mut mutation = Mutation::new(&self.schema, operation, tables.clone());
        let result = mutation.write(entity_name, &args)?;
        *tables = mutation.into_tables();

        Ok(result)
    }
}

impl StoreView<'_> {
    fn read(
        &self,
        entity_name: &str,
        operation: OperationKind,
        args: &Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let first = || -> Result<Option<Value>, StoreError> {
            self.select_rows(entity_name, self.rows(entity_name)?, args)?
                .first()
                .map(|row| self.render(entity_name, row, args))
                .transpose()
        };
        let not_found = || StoreError::NotFound {
            entity: entity_name.to_string(),
            operation,
        };

        match operation {
            OperationKind::FindUnique | OperationKind::FindFirst => {
                Ok(first()?.unwrap_or(Value::Null))
            }
            OperationKind::FindUniqueOrThrow | OperationKind::FindFirstOrThrow => {
                first()?.ok_or_else(not_found)
            }
            OperationKind::FindMany => Ok(Value::Array(
                self.select_rows(entity_name, self.rows(entity_name)?, args)?
                    .into_iter()
                    .map(|row| self.render(entity_name, row, args))
                    .collect::<Result<_, _>>()?,
            )),
            OperationKind::Count => self.count(entity_name, args),
            OperationKind::Aggregate => self.aggregate(entity_name, args),
            OperationKind::GroupBy => self.group_by(entity_name, args),
            write => Err(StoreError::Invalid(format!("'{write}' is not a read operation"))),
        }
    }
}

#[async_trait]
impl QueryExecutor for MemoryStore {
    async fn execute(
        &self,
        entity_name: &str,
        operation: OperationKind,
        args: Value,
    ) -> Result<Value, StoreError> {
        debug!(entity = entity_name, %operation, %args, "Executing");
        self.execute_now(entity_name, operation, args)
    }
}

/// Every operation is atomic on its own, so every transaction shares the same client.
impl SessionProvider for MemoryStore {
    fn session<'a>(&'a self, _transaction: Option<&TransactionMarker>) -> &'a dyn QueryExecutor {
        self
    }
}
