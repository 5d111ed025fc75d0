// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Evaluation of `where` filters against stored rows.

use std::cmp::Ordering;

use rowguard_model::{EntitySchema, FieldDescriptor, RelationCardinality, StoreError};
use serde_json::{Map, Value};

use crate::table::{Join, Row, Tables, compare_values, values_equal};

const SCALAR_OPERATORS: [&str; 12] = [
    "equals",
    "not",
    "in",
    "notIn",
    "lt",
    "lte",
    "gt",
    "gte",
    "contains",
    "startsWith",
    "endsWith",
    "mode",
];

/// Read-only view over the tables of a store.
#[derive(Clone, Copy)]
pub(crate) struct StoreView<'a> {
    pub schema: &'a EntitySchema,
    pub tables: &'a Tables,
}

impl<'a> StoreView<'a> {
    pub fn rows(&self, entity_name: &str) -> Result<&'a [Row], StoreError> {
        self.tables
            .get(entity_name)
            .map(|table| table.rows.as_slice())
            .ok_or_else(|| StoreError::Invalid(format!("Unknown entity '{entity_name}'")))
    }

    /// Rows of `field.target` related to `row`.
    pub fn related(
        &self,
        entity_name: &str,
        field: &FieldDescriptor,
        row: &Row,
    ) -> Result<Vec<&'a Row>, StoreError> {
        let join = Join::of(self.schema, entity_name, field)?;
        let target = &field
            .relation()
            .ok_or_else(|| StoreError::Invalid(format!("'{}' is not a relation", field.name)))?
            .target;

        Ok(self
            .rows(target)?
            .iter()
            .filter(|related| join.joins(row, related))
            .collect())
    }

    pub fn filter_rows(
        &self,
        entity_name: &str,
        rows: impl IntoIterator<Item = &'a Row>,
        where_: Option<&Map<String, Value>>,
    ) -> Result<Vec<&'a Row>, StoreError> {
        let mut matching = vec![];
        for row in rows {
            if where_.map_or(Ok(true), |where_| self.matches(entity_name, row, where_))? {
                matching.push(row);
            }
        }
        Ok(matching)
    }

    pub fn matches(
        &self,
        entity_name: &str,
        row: &Row,
        where_: &Map<String, Value>,
    ) -> Result<bool, StoreError> {
        for (key, condition) in where_ {
            if !self.matches_entry(entity_name, row, key, condition)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn matches_entry(
        &self,
        entity_name: &str,
        row: &Row,
        key: &str,
        condition: &Value,
    ) -> Result<bool, StoreError> {
        match key {
            "AND" => {
                for operand in operands(condition)? {
                    if !self.matches(entity_name, row, operand)? {
                        return Ok(false);
                    }
                }
                return Ok(true);
            }
            "OR" => {
                for operand in operands(condition)? {
                    if self.matches(entity_name, row, operand)? {
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
            "NOT" => {
                for operand in operands(condition)? {
                    if self.matches(entity_name, row, operand)? {
                        return Ok(false);
                    }
                }
                return Ok(true);
            }
            _ => {}
        }

        let Ok(field) = self.schema.field(entity_name, key) else {
            // Compound unique selector (`email_tenantId: { email, tenantId }`)
            return match condition {
                Value::Object(components) => Ok(components.iter().all(|(column, expected)| {
                    row.get(column)
                        .is_some_and(|actual| values_equal(actual, expected))
                })),
                _ => Err(StoreError::Invalid(format!(
                    "Unknown field '{key}' in filter on '{entity_name}'"
                ))),
            };
        };

        match field.cardinality() {
            None => matches_scalar(row.get(key).unwrap_or(&Value::Null), condition),
            Some(RelationCardinality::ToMany) => {
                self.matches_to_many(entity_name, field, row, condition)
            }
            Some(_) => self.matches_to_one(entity_name, field, row, condition),
        }
    }

    fn matches_to_many(
        &self,
        entity_name: &str,
        field: &FieldDescriptor,
        row: &Row,
        condition: &Value,
    ) -> Result<bool, StoreError> {
        let Value::Object(quantifiers) = condition else {
            return Err(StoreError::Invalid(format!(
                "Filter on list relation '{}' must be an object",
                field.name
            )));
        };

        let target = relation_target(field)?;
        let related = self.related(entity_name, field, row)?;

        for (quantifier, nested) in quantifiers {
            let nested = as_filter(nested)?;
            let matching = self.filter_rows(target, related.iter().copied(), Some(nested))?.len();

            let satisfied = match quantifier.as_str() {
                "some" => matching > 0,
                "every" => matching == related.len(),
                "none" => matching == 0,
                other => {
                    return Err(StoreError::Invalid(format!(
                        "Unknown list relation filter '{other}'"
                    )));
                }
            };

            if !satisfied {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn matches_to_one(
        &self,
        entity_name: &str,
        field: &FieldDescriptor,
        row: &Row,
        condition: &Value,
    ) -> Result<bool, StoreError> {
        let target = relation_target(field)?;
        let related = self.related(entity_name, field, row)?.into_iter().next();

        let is = |nested: &Value| -> Result<bool, StoreError> {
            match (nested, related) {
                (Value::Null, related) => Ok(related.is_none()),
                (_, None) => Ok(false),
                (nested, Some(related)) => self.matches(target, related, as_filter(nested)?),
            }
        };

        match condition {
            Value::Object(fields) if fields.contains_key("is") || fields.contains_key("isNot") => {
                for (key, nested) in fields {
                    let satisfied = match key.as_str() {
                        "is" => is(nested)?,
                        "isNot" => !is(nested)?,
                        other => {
                            return Err(StoreError::Invalid(format!(
                                "Unknown relation filter '{other}'"
                            )));
                        }
                    };
                    if !satisfied {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            condition => is(condition),
        }
    }
}

pub(crate) fn relation_target(field: &FieldDescriptor) -> Result<&str, StoreError> {
    field
        .relation()
        .map(|relation| relation.target.as_str())
        .ok_or_else(|| StoreError::Invalid(format!("'{}' is not a relation", field.name)))
}

pub(crate) fn as_filter(value: &Value) -> Result<&Map<String, Value>, StoreError> {
    value
        .as_object()
        .ok_or_else(|| StoreError::Invalid(format!("Expected a filter object, got '{value}'")))
}

pub(crate) fn operands(condition: &Value) -> Result<Vec<&Map<String, Value>>, StoreError> {
    match condition {
        Value::Array(elements) => elements.iter().map(as_filter).collect(),
        single => Ok(vec![as_filter(single)?]),
    }
}

fn is_operator_object(condition: &Value) -> bool {
    match condition {
        Value::Object(fields) => {
            !fields.is_empty()
                && fields
                    .keys()
                    .all(|key| SCALAR_OPERATORS.contains(&key.as_str()))
        }
        _ => false,
    }
}

/// Scalar comparison with SQL null semantics: a null column only ever matches `equals: null`.
fn matches_scalar(value: &Value, condition: &Value) -> Result<bool, StoreError> {
    let Value::Object(operators) = condition else {
        return Ok(values_equal(value, condition));
    };
    if !is_operator_object(condition) {
        return Ok(values_equal(value, condition));
    }

    let insensitive = operators.get("mode").and_then(Value::as_str) == Some("insensitive");
    let fold = |s: &str| {
        if insensitive {
            s.to_lowercase()
        } else {
            s.to_string()
        }
    };
    let string_test = |operand: &Value, test: fn(&str, &str) -> bool| match (value, operand) {
        (Value::String(value), Value::String(operand)) => test(&fold(value), &fold(operand)),
        _ => false,
    };
    let ordered = |operand: &Value, accept: fn(Ordering) -> bool| {
        compare_values(value, operand).is_some_and(accept)
    };

    for (operator, operand) in operators {
        let satisfied = match operator.as_str() {
            "equals" => values_equal(value, operand),
            "not" => {
                if value.is_null() {
                    false
                } else if is_operator_object(operand) {
                    !matches_scalar(value, operand)?
                } else {
                    !values_equal(value, operand)
                }
            }
            "in" => list_operand(operand)?
                .iter()
                .any(|candidate| values_equal(value, candidate)),
            "notIn" => {
                !value.is_null()
                    && !list_operand(operand)?
                        .iter()
                        .any(|candidate| values_equal(value, candidate))
            }
            "lt" => ordered(operand, Ordering::is_lt),
            "lte" => ordered(operand, Ordering::is_le),
            "gt" => ordered(operand, Ordering::is_gt),
            "gte" => ordered(operand, Ordering::is_ge),
            "contains" => string_test(operand, |value, operand| value.contains(operand)),
            "startsWith" => string_test(operand, |value, operand| value.starts_with(operand)),
            "endsWith" => string_test(operand, |value, operand| value.ends_with(operand)),
            _ => true,
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn list_operand(operand: &Value) -> Result<&Vec<Value>, StoreError> {
    operand
        .as_array()
        .ok_or_else(|| StoreError::Invalid(format!("Expected a list, got '{operand}'")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn scalar_operators() {
        assert!(matches_scalar(&json!(3), &json!({"gt": 1, "lte": 3})).unwrap());
        assert!(!matches_scalar(&json!(3), &json!({"in": [1, 2]})).unwrap());
        assert!(matches_scalar(&json!("Second"), &json!({"not": {"equals": "First"}})).unwrap());
        assert!(
            matches_scalar(&json!("Quick Bites"), &json!({"contains": "bite", "mode": "insensitive"}))
                .unwrap()
        );
        assert!(matches_scalar(&json!("Quick bites"), &json!("Quick bites")).unwrap());
    }

    #[test]
    fn null_columns() {
        assert!(matches_scalar(&Value::Null, &json!({"equals": null})).unwrap());
        assert!(!matches_scalar(&Value::Null, &json!({"not": "x"})).unwrap());
        assert!(!matches_scalar(&Value::Null, &json!({"notIn": ["x"]})).unwrap());
        assert!(matches_scalar(&json!("x"), &json!({"not": null})).unwrap());
    }

    #[test]
    fn contradiction_never_matches() {
        for value in [json!(0), json!(""), json!([]), json!(true), Value::Null] {
            let condition = json!({"equals": value.clone(), "not": value.clone()});
            assert!(!matches_scalar(&value, &condition).unwrap());
        }
    }
}
