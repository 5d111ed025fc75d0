// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Row selection (`where`, `orderBy`, `skip`, `take`) and rendering of `select`/`include` trees.

use std::cmp::Ordering;

use rowguard_model::{FieldDescriptor, RelationCardinality, StoreError};
use serde_json::{Map, Value};

use crate::{
    filter::{StoreView, relation_target},
    table::{Row, sort_order},
};

const COUNT_FIELD: &str = "_count";

pub(crate) fn object_arg<'v>(
    args: &'v Map<String, Value>,
    name: &str,
) -> Result<Option<&'v Map<String, Value>>, StoreError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(object)) => Ok(Some(object)),
        Some(other) => Err(StoreError::Invalid(format!(
            "'{name}' must be an object, got '{other}'"
        ))),
    }
}

fn is_selected(value: &Value) -> bool {
    !matches!(value, Value::Bool(false) | Value::Null)
}

impl<'a> StoreView<'a> {
    /// Apply `where`, `orderBy`, `skip` and `take` from `args` to candidate rows.
    pub fn select_rows(
        &self,
        entity_name: &str,
        candidates: impl IntoIterator<Item = &'a Row>,
        args: &Map<String, Value>,
    ) -> Result<Vec<&'a Row>, StoreError> {
        let mut rows = self.filter_rows(entity_name, candidates, object_arg(args, "where")?)?;

        if let Some(order_by) = args.get("orderBy") {
            let keys = order_keys(order_by)?;
            rows.sort_by(|lhs, rhs| {
                keys.iter()
                    .map(|(column, descending)| {
                        let ordering = sort_order(
                            lhs.get(column).unwrap_or(&Value::Null),
                            rhs.get(column).unwrap_or(&Value::Null),
                        );
                        if *descending {
                            ordering.reverse()
                        } else {
                            ordering
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }

        let skip = args.get("skip").and_then(Value::as_u64).unwrap_or(0) as usize;
        let take = args
            .get("take")
            .and_then(Value::as_u64)
            .map_or(usize::MAX, |take| take as usize);

        Ok(rows.into_iter().skip(skip).take(take).collect())
    }

    /// Render a row according to the `select`/`include` of `args`.
    pub fn render(
        &self,
        entity_name: &str,
        row: &Row,
        args: &Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let mut rendered = Map::new();

        match (object_arg(args, "select")?, object_arg(args, "include")?) {
            (Some(_), Some(_)) => {
                return Err(StoreError::Invalid(
                    "'select' and 'include' cannot be used together".to_string(),
                ));
            }
            (Some(select), None) => {
                for (name, value) in select.iter().filter(|(_, value)| is_selected(value)) {
                    self.render_entry(entity_name, row, name, value, &mut rendered)?;
                }
            }
            (None, include) => {
                for field in self.schema.entity(entity_name).map_err(invalid)?.values() {
                    if field.relation().is_none() {
                        rendered.insert(
                            field.name.clone(),
                            row.get(&field.name).cloned().unwrap_or(Value::Null),
                        );
                    }
                }
                for (name, value) in include
                    .into_iter()
                    .flatten()
                    .filter(|(_, value)| is_selected(value))
                {
                    self.render_entry(entity_name, row, name, value, &mut rendered)?;
                }
            }
        }

        Ok(Value::Object(rendered))
    }

    fn render_entry(
        &self,
        entity_name: &str,
        row: &Row,
        name: &str,
        value: &Value,
        rendered: &mut Map<String, Value>,
    ) -> Result<(), StoreError> {
        if name == COUNT_FIELD {
            let counts = self.render_count(entity_name, row, value)?;
            rendered.insert(name.to_string(), counts);
            return Ok(());
        }

        let field = self
            .schema
            .field(entity_name, name)
            .map_err(invalid)?;

        let rendered_value = match field.cardinality() {
            None => row.get(name).cloned().unwrap_or(Value::Null),
            Some(cardinality) => {
                self.render_relation(entity_name, field, cardinality, row, value)?
            }
        };
        rendered.insert(name.to_string(), rendered_value);

        Ok(())
    }

    fn render_relation(
        &self,
        entity_name: &str,
        field: &FieldDescriptor,
        cardinality: RelationCardinality,
        row: &Row,
        value: &Value,
    ) -> Result<Value, StoreError> {
        let empty = Map::new();
        let nested_args = value.as_object().unwrap_or(&empty);
        let target = relation_target(field)?;
        let related = self.related(entity_name, field, row)?;
        let selected = self.select_rows(target, related, nested_args)?;

        match cardinality {
            RelationCardinality::ToMany => Ok(Value::Array(
                selected
                    .into_iter()
                    .map(|related| self.render(target, related, nested_args))
                    .collect::<Result<_, _>>()?,
            )),
            _ => match selected.first() {
                Some(related) => self.render(target, related, nested_args),
                None => Ok(Value::Null),
            },
        }
    }

    /// `_count: true` counts every list relation; `_count: { select: { posts: ... } }` only the
    /// selected ones, each optionally filtered with `{ where }`.
    fn render_count(
        &self,
        entity_name: &str,
        row: &Row,
        value: &Value,
    ) -> Result<Value, StoreError> {
        let mut counts = Map::new();

        let selection: Vec<(&FieldDescriptor, Map<String, Value>)> = match value {
            Value::Bool(true) => self
                .schema
                .relations(entity_name)
                .map_err(invalid)?
                .filter(|field| field.is_list)
                .map(|field| (field, Map::new()))
                .collect(),
            Value::Object(count_args) => {
                let select = object_arg(count_args, "select")?.ok_or_else(|| {
                    StoreError::Invalid("'_count' expects 'true' or a 'select'".to_string())
                })?;

                let mut selection = vec![];
                for (name, relation_args) in select.iter().filter(|(_, value)| is_selected(value)) {
                    let field = self
                        .schema
                        .field(entity_name, name)
                        .map_err(invalid)?;
                    if !field.is_list || field.relation().is_none() {
                        return Err(StoreError::Invalid(format!(
                            "'_count' only applies to list relations, not '{name}'"
                        )));
                    }
                    let mut count_args = Map::new();
                    if let Some(where_) = relation_args.get("where") {
                        count_args.insert("where".to_string(), where_.clone());
                    }
                    selection.push((field, count_args));
                }
                selection
            }
            other => {
                return Err(StoreError::Invalid(format!(
                    "'_count' expects 'true' or a 'select', got '{other}'"
                )));
            }
        };

        for (field, count_args) in selection {
            let target = relation_target(field)?;
            let related = self.related(entity_name, field, row)?;
            let count = self.select_rows(target, related, &count_args)?.len();
            counts.insert(field.name.clone(), Value::from(count));
        }

        Ok(Value::Object(counts))
    }
}

/// Schema lookups fail when the query names an unknown entity or field.
pub(crate) fn invalid(error: impl std::fmt::Display) -> StoreError {
    StoreError::Invalid(error.to_string())
}

/// `{ id: "asc" }`, `{ id: { sort: "desc" } }` or a list of those.
pub(crate) fn order_keys(order_by: &Value) -> Result<Vec<(String, bool)>, StoreError> {
    let clauses = match order_by {
        Value::Array(clauses) => clauses.iter().collect(),
        clause => vec![clause],
    };

    let mut keys = vec![];
    for clause in clauses {
        let Value::Object(clause) = clause else {
            return Err(StoreError::Invalid(format!(
                "Invalid orderBy clause '{clause}'"
            )));
        };
        for (column, direction) in clause {
            let direction = match direction {
                Value::Object(options) => options.get("sort").unwrap_or(&Value::Null),
                direction => direction,
            };
            let descending = match direction.as_str() {
                Some("asc") => false,
                Some("desc") => true,
                _ => {
                    return Err(StoreError::Invalid(format!(
                        "Invalid sort direction for '{column}'"
                    )));
                }
            };
            keys.push((column.clone(), descending));
        }
    }

    Ok(keys)
}
