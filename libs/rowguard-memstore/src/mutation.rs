// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Write operations, including nested relation actions.
//!
//! A [`Mutation`] works on its own copy of the tables; the store only swaps it in once the whole
//! operation has succeeded, so a failing nested action leaves nothing behind.

use rowguard_model::{EntitySchema, FieldDescriptor, OperationKind, ScalarType, StoreError};
use serde_json::{Map, Number, Value};

use crate::{
    filter::{StoreView, as_filter, operands, relation_target},
    projection::{invalid, object_arg},
    table::{Join, Row, Table, Tables, values_equal},
};

pub(crate) struct Mutation<'a> {
    schema: &'a EntitySchema,
    operation: OperationKind,
    tables: Tables,
}

impl<'a> Mutation<'a> {
    pub fn new(schema: &'a EntitySchema, operation: OperationKind, tables: Tables) -> Self {
        Self {
            schema,
            operation,
            tables,
        }
    }

    pub fn into_tables(self) -> Tables {
        self.tables
    }

    fn view(&self) -> StoreView<'_> {
        StoreView {
            schema: self.schema,
            tables: &self.tables,
        }
    }

    pub fn write(&mut self, entity_name: &str, args: &Map<String, Value>) -> Result<Value, StoreError> {
        match self.operation {
            OperationKind::Create => {
                let key = self.create(entity_name, required_object(args, "data")?, vec![])?;
                self.render_key(entity_name, &key, args)
            }
            OperationKind::CreateMany => {
                let data = args
                    .get("data")
                    .ok_or_else(|| StoreError::Invalid("'createMany' requires 'data'".to_string()))?;
                let elements = operands(data)?;
                for element in &elements {
                    self.create(entity_name, element, vec![])?;
                }
                Ok(count_result(elements.len()))
            }
            OperationKind::Update => {
                let key = self.find_key(entity_name, object_arg(args, "where")?, None)?;
                let key = self.update(entity_name, &key, required_object(args, "data")?)?;
                self.render_key(entity_name, &key, args)
            }
            OperationKind::UpdateMany => {
                let data = required_object(args, "data")?;
                let keys = self.find_keys(entity_name, object_arg(args, "where")?, None)?;
                for key in &keys {
                    self.update(entity_name, key, data)?;
                }
                Ok(count_result(keys.len()))
            }
            OperationKind::Upsert => {
                let existing = self.first_key(entity_name, object_arg(args, "where")?, None)?;
                let key = match existing {
                    Some(key) => self.update(entity_name, &key, required_object(args, "update")?)?,
                    None => self.create(entity_name, required_object(args, "create")?, vec![])?,
                };
                self.render_key(entity_name, &key, args)
            }
            OperationKind::Delete => {
                let key = self.find_key(entity_name, object_arg(args, "where")?, None)?;
                let rendered = self.render_key(entity_name, &key, args)?;
                self.remove(entity_name, &key)?;
                Ok(rendered)
            }
            OperationKind::DeleteMany => {
                let keys = self.find_keys(entity_name, object_arg(args, "where")?, None)?;
                for key in &keys {
                    self.remove(entity_name, key)?;
                }
                Ok(count_result(keys.len()))
            }
            read => Err(StoreError::Invalid(format!("'{read}' is not a write operation"))),
        }
    }

    fn render_key(
        &self,
        entity_name: &str,
        key: &Value,
        args: &Map<String, Value>,
    ) -> Result<Value, StoreError> {
        self.view().render(entity_name, self.row(entity_name, key)?, args)
    }

    fn key_column(&self, entity_name: &str) -> Result<&'a str, StoreError> {
        Ok(self
            .schema
            .primary_key(entity_name)
            .map_err(invalid)?
            .name
            .as_str())
    }

    fn table_mut(&mut self, entity_name: &str) -> Result<&mut Table, StoreError> {
        self.tables
            .get_mut(entity_name)
            .ok_or_else(|| StoreError::Invalid(format!("Unknown entity '{entity_name}'")))
    }

    fn position(&self, entity_name: &str, key: &Value) -> Result<usize, StoreError> {
        let key_column = self.key_column(entity_name)?;

        self.view()
            .rows(entity_name)?
            .iter()
            .position(|row| row.get(key_column).is_some_and(|value| values_equal(value, key)))
            .ok_or_else(|| self.not_found(entity_name))
    }

    fn row(&self, entity_name: &str, key: &Value) -> Result<&Row, StoreError> {
        let position = self.position(entity_name, key)?;
        Ok(&self.view().rows(entity_name)?[position])
    }

    fn set_columns(
        &mut self,
        entity_name: &str,
        key: &Value,
        columns: &[(String, Value)],
    ) -> Result<(), StoreError> {
        let position = self.position(entity_name, key)?;
        let row = &mut self.table_mut(entity_name)?.rows[position];
        row.extend(columns.iter().cloned());
        Ok(())
    }

    fn remove(&mut self, entity_name: &str, key: &Value) -> Result<Row, StoreError> {
        let position = self.position(entity_name, key)?;
        Ok(self.table_mut(entity_name)?.rows.remove(position))
    }

    fn not_found(&self, entity_name: &str) -> StoreError {
        StoreError::NotFound {
            entity: entity_name.to_string(),
            operation: self.operation,
        }
    }

    /// Keys of the rows matching `where_`, restricted to the rows joined to `scope` if given.
    fn find_keys(
        &self,
        entity_name: &str,
        where_: Option<&Map<String, Value>>,
        scope: Option<(&Join, &Row)>,
    ) -> Result<Vec<Value>, StoreError> {
        let view = self.view();
        let key_column = self.key_column(entity_name)?;

        let candidates = view.rows(entity_name)?.iter().filter(|row| {
            scope.is_none_or(|(join, source)| join.joins(source, row))
        });

        Ok(view
            .filter_rows(entity_name, candidates, where_)?
            .into_iter()
            .map(|row| row.get(key_column).cloned().unwrap_or(Value::Null))
            .collect())
    }

    fn first_key(
        &self,
        entity_name: &str,
        where_: Option<&Map<String, Value>>,
        scope: Option<(&Join, &Row)>,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self.find_keys(entity_name, where_, scope)?.into_iter().next())
    }

    fn find_key(
        &self,
        entity_name: &str,
        where_: Option<&Map<String, Value>>,
        scope: Option<(&Join, &Row)>,
    ) -> Result<Value, StoreError> {
        self.first_key(entity_name, where_, scope)?
            .ok_or_else(|| self.not_found(entity_name))
    }

    fn matches(
        &self,
        entity_name: &str,
        key: &Value,
        where_: Option<&Map<String, Value>>,
    ) -> Result<bool, StoreError> {
        match where_ {
            None => Ok(true),
            Some(where_) => self
                .view()
                .matches(entity_name, self.row(entity_name, key)?, where_),
        }
    }

    /// Insert a record built from `data` plus `links` (foreign key columns set by a parent).
    /// Returns the new record's key.
    fn create(
        &mut self,
        entity_name: &str,
        data: &Map<String, Value>,
        links: Vec<(String, Value)>,
    ) -> Result<Value, StoreError> {
        let schema = self.schema;
        let mut row = Row::new();
        let mut deferred = vec![];

        for (name, value) in data {
            let field = schema.field(entity_name, name).map_err(invalid)?;

            if field.relation().is_none() {
                row.insert(name.clone(), value.clone());
                continue;
            }

            let join = Join::of(schema, entity_name, field)?;
            if join.owned_by_source {
                let target = relation_target(field)?;
                let related_key = self.resolve_owned_relation(target, as_filter(value)?)?;
                let related = self.row(target, &related_key)?;
                row.extend(join.owner_columns(related));
            } else {
                deferred.push((field, value));
            }
        }

        row.extend(links);
        let key = self.insert_row(entity_name, row)?;

        for (field, value) in deferred {
            self.apply_relation_actions(entity_name, &key, field, value)?;
        }

        Ok(key)
    }

    /// Create or find the record a to-one relation of a new record points at.
    fn resolve_owned_relation(
        &mut self,
        target: &str,
        actions: &Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let Some((action, payload)) = actions.iter().next() else {
            return Err(StoreError::Invalid(format!(
                "Empty nested payload for '{target}'"
            )));
        };

        match action.as_str() {
            "create" => self.create(target, as_filter(payload)?, vec![]),
            "connect" => self.find_key(target, Some(as_filter(payload)?), None),
            "connectOrCreate" => {
                let payload = as_filter(payload)?;
                match self.first_key(target, Some(required_object(payload, "where")?), None)? {
                    Some(key) => Ok(key),
                    None => self.create(target, required_object(payload, "create")?, vec![]),
                }
            }
            other => Err(StoreError::Invalid(format!(
                "Unsupported nested action '{other}' when creating '{target}'"
            ))),
        }
    }

    fn insert_row(&mut self, entity_name: &str, mut row: Row) -> Result<Value, StoreError> {
        let key_field = self.schema.primary_key(entity_name).map_err(invalid)?;
        let key_column = key_field.name.clone();

        if row.get(&key_column).is_none_or(Value::is_null) {
            if !matches!(
                key_field.scalar_type(),
                Some(ScalarType::Int | ScalarType::BigInt)
            ) {
                return Err(StoreError::Constraint(format!(
                    "Missing value for key '{entity_name}.{key_column}'"
                )));
            }

            let table = self.table_mut(entity_name)?;
            let highest = table
                .rows
                .iter()
                .filter_map(|row| row.get(&key_column).and_then(Value::as_i64))
                .max()
                .unwrap_or(0);
            table.next_id = table.next_id.max(highest) + 1;
            row.insert(key_column.clone(), Value::from(table.next_id));
        }

        self.check_unique(entity_name, &row, None)?;

        let key = row.get(&key_column).cloned().unwrap_or(Value::Null);
        self.table_mut(entity_name)?.rows.push(row);
        Ok(key)
    }

    fn check_unique(
        &self,
        entity_name: &str,
        row: &Row,
        except: Option<&Value>,
    ) -> Result<(), StoreError> {
        let key_column = self.key_column(entity_name)?;
        let fields = self.schema.entity(entity_name).map_err(invalid)?;

        for field in fields.values().filter(|field| field.is_key()) {
            let Some(value) = row.get(&field.name).filter(|value| !value.is_null()) else {
                continue;
            };

            let conflict = self.view().rows(entity_name)?.iter().any(|existing| {
                let is_self = except.is_some_and(|except| {
                    existing
                        .get(key_column)
                        .is_some_and(|existing_key| values_equal(existing_key, except))
                });
                !is_self
                    && existing
                        .get(&field.name)
                        .is_some_and(|existing_value| values_equal(existing_value, value))
            });

            if conflict {
                return Err(StoreError::Constraint(format!(
                    "Unique constraint failed on '{entity_name}.{}'",
                    field.name
                )));
            }
        }

        Ok(())
    }

    /// Apply `data` to an existing record. Returns the (possibly changed) key.
    fn update(
        &mut self,
        entity_name: &str,
        key: &Value,
        data: &Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let schema = self.schema;
        let key_column = self.key_column(entity_name)?;

        let mut updated = self.row(entity_name, key)?.clone();
        let mut deferred = vec![];

        for (name, value) in data {
            let field = schema.field(entity_name, name).map_err(invalid)?;
            if field.relation().is_some() {
                deferred.push((field, value));
            } else {
                let current = updated.get(name).cloned().unwrap_or(Value::Null);
                updated.insert(name.clone(), apply_scalar_update(&current, value)?);
            }
        }

        self.check_unique(entity_name, &updated, Some(key))?;
        let new_key = updated.get(key_column).cloned().unwrap_or(Value::Null);

        let position = self.position(entity_name, key)?;
        self.table_mut(entity_name)?.rows[position] = updated;

        for (field, value) in deferred {
            self.apply_relation_actions(entity_name, &new_key, field, value)?;
        }

        Ok(new_key)
    }

    fn apply_relation_actions(
        &mut self,
        entity_name: &str,
        key: &Value,
        field: &FieldDescriptor,
        actions: &Value,
    ) -> Result<(), StoreError> {
        let target = relation_target(field)?;
        let join = Join::of(self.schema, entity_name, field)?;

        for (action, payload) in as_filter(actions)? {
            if field.is_list {
                self.apply_to_many(entity_name, key, target, &join, action, payload)?;
            } else {
                self.apply_to_one(entity_name, key, target, &join, action, payload)?;
            }
        }

        Ok(())
    }

    fn apply_to_many(
        &mut self,
        entity_name: &str,
        key: &Value,
        target: &str,
        join: &Join,
        action: &str,
        payload: &Value,
    ) -> Result<(), StoreError> {
        let parent = self.row(entity_name, key)?.clone();
        let links = join.link_columns(&parent);
        let unlinked: Vec<(String, Value)> = links
            .iter()
            .map(|(column, _)| (column.clone(), Value::Null))
            .collect();
        let scope = Some((join, &parent));

        match action {
            "create" => {
                for element in operands(payload)? {
                    self.create(target, element, links.clone())?;
                }
            }
            "createMany" => {
                let data = as_filter(payload)?.get("data").ok_or_else(|| {
                    StoreError::Invalid("Nested 'createMany' requires 'data'".to_string())
                })?;
                for element in operands(data)? {
                    self.create(target, element, links.clone())?;
                }
            }
            "connect" => {
                for where_ in operands(payload)? {
                    let related_key = self.find_key(target, Some(where_), None)?;
                    self.set_columns(target, &related_key, &links)?;
                }
            }
            "connectOrCreate" => {
                for element in operands(payload)? {
                    match self.first_key(target, Some(required_object(element, "where")?), None)? {
                        Some(related_key) => self.set_columns(target, &related_key, &links)?,
                        None => {
                            self.create(target, required_object(element, "create")?, links.clone())?;
                        }
                    }
                }
            }
            "set" => {
                for related_key in self.find_keys(target, None, scope)? {
                    self.set_columns(target, &related_key, &unlinked)?;
                }
                for where_ in operands(payload)? {
                    let related_key = self.find_key(target, Some(where_), None)?;
                    self.set_columns(target, &related_key, &links)?;
                }
            }
            "disconnect" => {
                for where_ in operands(payload)? {
                    for related_key in self.find_keys(target, Some(where_), scope)? {
                        self.set_columns(target, &related_key, &unlinked)?;
                    }
                }
            }
            "update" => {
                for element in operands(payload)? {
                    let related_key =
                        self.find_key(target, Some(required_object(element, "where")?), scope)?;
                    self.update(target, &related_key, required_object(element, "data")?)?;
                }
            }
            "updateMany" => {
                for element in operands(payload)? {
                    let data = required_object(element, "data")?;
                    for related_key in self.find_keys(target, object_arg(element, "where")?, scope)? {
                        self.update(target, &related_key, data)?;
                    }
                }
            }
            "upsert" => {
                for element in operands(payload)? {
                    match self.first_key(target, Some(required_object(element, "where")?), scope)? {
                        Some(related_key) => {
                            self.update(target, &related_key, required_object(element, "update")?)?;
                        }
                        None => {
                            self.create(target, required_object(element, "create")?, links.clone())?;
                        }
                    }
                }
            }
            "delete" => {
                for where_ in operands(payload)? {
                    let related_key = self.find_key(target, Some(where_), scope)?;
                    self.remove(target, &related_key)?;
                }
            }
            "deleteMany" => {
                for where_ in operands(payload)? {
                    for related_key in self.find_keys(target, Some(where_), scope)? {
                        self.remove(target, &related_key)?;
                    }
                }
            }
            other => {
                return Err(StoreError::Invalid(format!(
                    "Unsupported nested action '{other}' on a list relation"
                )));
            }
        }

        Ok(())
    }

    fn apply_to_one(
        &mut self,
        entity_name: &str,
        key: &Value,
        target: &str,
        join: &Join,
        action: &str,
        payload: &Value,
    ) -> Result<(), StoreError> {
        let parent = self.row(entity_name, key)?.clone();
        let current = self.first_key(target, None, Some((join, &parent)))?;
        let new_links = if join.owned_by_source {
            vec![]
        } else {
            join.link_columns(&parent)
        };

        match action {
            "create" => {
                let related_key =
                    self.create(target, as_filter(payload)?, new_links)?;
                self.attach(entity_name, key, target, join, &parent, &related_key)?;
            }
            "connect" => {
                let related_key = self.find_key(target, Some(as_filter(payload)?), None)?;
                self.attach(entity_name, key, target, join, &parent, &related_key)?;
            }
            "connectOrCreate" => {
                let payload = as_filter(payload)?;
                let related_key =
                    match self.first_key(target, Some(required_object(payload, "where")?), None)? {
                        Some(related_key) => related_key,
                        None => {
                            self.create(target, required_object(payload, "create")?, new_links)?
                        }
                    };
                self.attach(entity_name, key, target, join, &parent, &related_key)?;
            }
            "disconnect" => {
                let Some(filter) = relation_filter(payload)? else {
                    return Ok(());
                };
                if let Some(current) = current
                    && self.matches(target, &current, filter)?
                {
                    let detached: Vec<(String, Value)> = join
                        .pairs
                        .iter()
                        .map(|(source_column, related_column)| {
                            let column = if join.owned_by_source {
                                source_column
                            } else {
                                related_column
                            };
                            (column.clone(), Value::Null)
                        })
                        .collect();

                    if join.owned_by_source {
                        self.set_columns(entity_name, key, &detached)?;
                    } else {
                        self.set_columns(target, &current, &detached)?;
                    }
                }
            }
            "update" => {
                let payload = as_filter(payload)?;
                let (where_, data) = match payload.get("data") {
                    Some(data) => (object_arg(payload, "where")?, as_filter(data)?),
                    None => (None, payload),
                };
                let current = current.ok_or_else(|| self.not_found(target))?;
                if !self.matches(target, &current, where_)? {
                    return Err(self.not_found(target));
                }
                self.update(target, &current, data)?;
            }
            "upsert" => {
                let payload = as_filter(payload)?;
                let where_ = object_arg(payload, "where")?;
                match current {
                    Some(current) if self.matches(target, &current, where_)? => {
                        self.update(target, &current, required_object(payload, "update")?)?;
                    }
                    _ => {
                        let related_key = self.create(
                            target,
                            required_object(payload, "create")?,
                            new_links,
                        )?;
                        self.attach(entity_name, key, target, join, &parent, &related_key)?;
                    }
                }
            }
            "delete" => {
                let Some(filter) = relation_filter(payload)? else {
                    return Ok(());
                };
                let current = current.ok_or_else(|| self.not_found(target))?;
                if !self.matches(target, &current, filter)? {
                    return Err(self.not_found(target));
                }
                self.remove(target, &current)?;
            }
            other => {
                return Err(StoreError::Invalid(format!(
                    "Unsupported nested action '{other}' on a to-one relation"
                )));
            }
        }

        Ok(())
    }

    /// Point the relation of `parent` at the record `related_key`.
    fn attach(
        &mut self,
        entity_name: &str,
        key: &Value,
        target: &str,
        join: &Join,
        parent: &Row,
        related_key: &Value,
    ) -> Result<(), StoreError> {
        if join.owned_by_source {
            let related = self.row(target, related_key)?.clone();
            self.set_columns(entity_name, key, &join.owner_columns(&related))
        } else {
            self.set_columns(target, related_key, &join.link_columns(parent))
        }
    }
}

/// `true` means "whatever is connected", `false` means "do nothing", an object filters.
/// Returns `None` for "do nothing" and `Some(None)` for "no filter".
fn relation_filter(payload: &Value) -> Result<Option<Option<&Map<String, Value>>>, StoreError> {
    match payload {
        Value::Bool(true) => Ok(Some(None)),
        Value::Bool(false) => Ok(None),
        Value::Object(filter) => Ok(Some(Some(filter))),
        other => Err(StoreError::Invalid(format!(
            "Expected 'true' or a filter, got '{other}'"
        ))),
    }
}

fn required_object<'v>(
    args: &'v Map<String, Value>,
    name: &str,
) -> Result<&'v Map<String, Value>, StoreError> {
    object_arg(args, name)?.ok_or_else(|| StoreError::Invalid(format!("Missing '{name}'")))
}

fn count_result(count: usize) -> Value {
    let mut result = Map::new();
    result.insert("count".to_string(), Value::from(count));
    Value::Object(result)
}

/// Plain values replace the column; `{ set | increment | decrement | multiply | divide }` apply
/// to the current value.
fn apply_scalar_update(current: &Value, update: &Value) -> Result<Value, StoreError> {
    let Value::Object(operations) = update else {
        return Ok(update.clone());
    };
    let Some((operation, operand)) = operations.iter().next() else {
        return Ok(update.clone());
    };
    if operations.len() != 1 {
        return Ok(update.clone());
    }

    let arithmetic = |integer: fn(i64, i64) -> Option<i64>, float: fn(f64, f64) -> f64| {
        match (current.as_i64(), operand.as_i64()) {
            (Some(lhs), Some(rhs)) => integer(lhs, rhs).map(Value::from).ok_or_else(|| {
                StoreError::Invalid(format!("Invalid arithmetic '{operation}' on {current}"))
            }),
            _ => match (current.as_f64(), operand.as_f64()) {
                (Some(lhs), Some(rhs)) => Number::from_f64(float(lhs, rhs))
                    .map(Value::Number)
                    .ok_or_else(|| {
                        StoreError::Invalid(format!("Invalid arithmetic '{operation}' on {current}"))
                    }),
                _ => Err(StoreError::Invalid(format!(
                    "'{operation}' requires numbers, got '{current}' and '{operand}'"
                ))),
            },
        }
    };

    match operation.as_str() {
        "set" => Ok(operand.clone()),
        "increment" => arithmetic(i64::checked_add, |lhs, rhs| lhs + rhs),
        "decrement" => arithmetic(i64::checked_sub, |lhs, rhs| lhs - rhs),
        "multiply" => arithmetic(i64::checked_mul, |lhs, rhs| lhs * rhs),
        "divide" => arithmetic(i64::checked_div, |lhs, rhs| lhs / rhs),
        _ => Ok(update.clone()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn scalar_updates() {
        assert_eq!(apply_scalar_update(&json!(1), &json!(5)).unwrap(), json!(5));
        assert_eq!(
            apply_scalar_update(&json!(1), &json!({"increment": 2})).unwrap(),
            json!(3)
        );
        assert_eq!(
            apply_scalar_update(&json!(1.5), &json!({"multiply": 2})).unwrap(),
            json!(3.0)
        );
        assert_eq!(
            apply_scalar_update(&json!("a"), &json!({"set": "b"})).unwrap(),
            json!("b")
        );
        assert!(apply_scalar_update(&json!(1), &json!({"divide": 0})).is_err());
    }
}
