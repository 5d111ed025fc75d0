// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::cmp::Ordering;

use indexmap::IndexMap;
use rowguard_model::{EntitySchema, FieldDescriptor, StoreError};
use serde_json::{Map, Value};

/// Scalar columns of one record. Relations are never stored, only derived through joins.
pub(crate) type Row = Map<String, Value>;

#[derive(Debug, Clone, Default)]
pub(crate) struct Table {
    pub rows: Vec<Row>,
    pub next_id: i64,
}

pub(crate) type Tables = IndexMap<String, Table>;

/// How a relation field joins two tables.
#[derive(Debug, Clone)]
pub(crate) struct Join {
    /// (column on the source row, column on the related row)
    pub pairs: Vec<(String, String)>,
    /// Whether the source row holds the foreign key.
    pub owned_by_source: bool,
}

impl Join {
    pub fn of(
        schema: &EntitySchema,
        entity_name: &str,
        field: &FieldDescriptor,
    ) -> Result<Join, StoreError> {
        let relation = field.relation().ok_or_else(|| {
            StoreError::Invalid(format!("'{entity_name}.{}' is not a relation", field.name))
        })?;

        if !relation.from_fields.is_empty() {
            return Ok(Join {
                pairs: zip_columns(&relation.from_fields, &relation.to_fields),
                owned_by_source: true,
            });
        }

        let opposite = schema
            .opposite_relation(entity_name, field)
            .and_then(FieldDescriptor::relation)
            .filter(|opposite| !opposite.from_fields.is_empty())
            .ok_or_else(|| {
                StoreError::Invalid(format!(
                    "Relation '{entity_name}.{}' has no foreign key on either side",
                    field.name
                ))
            })?;

        Ok(Join {
            pairs: zip_columns(&opposite.to_fields, &opposite.from_fields),
            owned_by_source: false,
        })
    }

    pub fn joins(&self, source: &Row, related: &Row) -> bool {
        self.pairs.iter().all(|(source_column, related_column)| {
            match (source.get(source_column), related.get(related_column)) {
                (Some(source_value), Some(related_value)) if !source_value.is_null() => {
                    values_equal(source_value, related_value)
                }
                _ => false,
            }
        })
    }

    /// Column assignments that make a related row point at `source`.
    pub fn link_columns(&self, source: &Row) -> Vec<(String, Value)> {
        self.pairs
            .iter()
            .map(|(source_column, related_column)| {
                (
                    related_column.clone(),
                    source.get(source_column).cloned().unwrap_or(Value::Null),
                )
            })
            .collect()
    }

    /// Column assignments that make `source` point at a related row.
    pub fn owner_columns(&self, related: &Row) -> Vec<(String, Value)> {
        self.pairs
            .iter()
            .map(|(source_column, related_column)| {
                (
                    source_column.clone(),
                    related.get(related_column).cloned().unwrap_or(Value::Null),
                )
            })
            .collect()
    }
}

fn zip_columns(lhs: &[String], rhs: &[String]) -> Vec<(String, String)> {
    lhs.iter().cloned().zip(rhs.iter().cloned()).collect()
}

/// Numbers compare by value regardless of their JSON representation (`1` equals `1.0`).
pub(crate) fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(lhs), Value::Number(rhs)) => lhs.as_f64() == rhs.as_f64(),
        _ => lhs == rhs,
    }
}

pub(crate) fn compare_values(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(lhs), Value::Number(rhs)) => lhs.as_f64()?.partial_cmp(&rhs.as_f64()?),
        (Value::String(lhs), Value::String(rhs)) => Some(lhs.cmp(rhs)),
        (Value::Bool(lhs), Value::Bool(rhs)) => Some(lhs.cmp(rhs)),
        _ => None,
    }
}

/// Ordering for `orderBy`: nulls first, incomparable values keep their relative order.
pub(crate) fn sort_order(lhs: &Value, rhs: &Value) -> Ordering {
    match (lhs.is_null(), rhs.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_values(lhs, rhs).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn numbers_compare_by_value() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
        assert_eq!(compare_values(&json!(2), &json!(10.5)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!([]), &json!([])), None);
    }

    #[test]
    fn nulls_sort_first() {
        let mut values = vec![json!(3), Value::Null, json!(1)];
        values.sort_by(sort_order);
        assert_eq!(values, vec![Value::Null, json!(1), json!(3)]);
    }
}
