// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! `count`, `aggregate` and `groupBy`.

use std::cmp::Ordering;

use indexmap::IndexMap;
use rowguard_model::StoreError;
use serde_json::{Map, Number, Value};

use crate::{
    filter::StoreView,
    projection::{object_arg, order_keys},
    table::{Row, compare_values, sort_order},
};

const ALL_FIELD: &str = "_all";

impl StoreView<'_> {
    pub fn count(&self, entity_name: &str, args: &Map<String, Value>) -> Result<Value, StoreError> {
        let rows = self.select_rows(entity_name, self.rows(entity_name)?, args)?;

        match object_arg(args, "select")? {
            None => Ok(Value::from(rows.len())),
            Some(select) => count_fields(&rows, select),
        }
    }

    pub fn aggregate(
        &self,
        entity_name: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let rows = self.select_rows(entity_name, self.rows(entity_name)?, args)?;
        Ok(Value::Object(aggregate_rows(&rows, args)?))
    }

    pub fn group_by(
        &self,
        entity_name: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, StoreError> {
        let by: Vec<&str> = match args.get("by") {
            Some(Value::String(column)) => vec![column.as_str()],
            Some(Value::Array(columns)) => columns
                .iter()
                .map(|column| {
                    column.as_str().ok_or_else(|| {
                        StoreError::Invalid(format!("Invalid groupBy column '{column}'"))
                    })
                })
                .collect::<Result<_, _>>()?,
            _ => {
                return Err(StoreError::Invalid(
                    "'groupBy' requires a 'by' argument".to_string(),
                ));
            }
        };

        let rows = self.filter_rows(
            entity_name,
            self.rows(entity_name)?,
            object_arg(args, "where")?,
        )?;

        let mut groups: IndexMap<String, (Map<String, Value>, Vec<&Row>)> = IndexMap::new();
        for row in rows {
            let key: Map<String, Value> = by
                .iter()
                .map(|column| {
                    (
                        column.to_string(),
                        row.get(*column).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect();

            groups
                .entry(Value::Object(key.clone()).to_string())
                .or_insert_with(|| (key, vec![]))
                .1
                .push(row);
        }

        let mut results = groups
            .into_values()
            .map(|(mut key, rows)| {
                key.extend(aggregate_rows(&rows, args)?);
                Ok(key)
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        if let Some(order_by) = args.get("orderBy") {
            let keys = order_keys(order_by)?;
            results.sort_by(|lhs, rhs| {
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

        Ok(Value::Array(results.into_iter().map(Value::Object).collect()))
    }
}

/// Compute `_count`, `_min`, `_max`, `_sum` and `_avg` for the keys present in `args`.
fn aggregate_rows(rows: &[&Row], args: &Map<String, Value>) -> Result<Map<String, Value>, StoreError> {
    let mut aggregates = Map::new();

    for (name, selection) in args {
        let aggregate = match name.as_str() {
            "_count" => match selection {
                Value::Bool(true) => Value::from(rows.len()),
                Value::Object(select) => count_fields(rows, select)?,
                other => {
                    return Err(StoreError::Invalid(format!(
                        "Invalid '_count' selection '{other}'"
                    )));
                }
            },
            "_min" => per_column(rows, selection, |values| {
                extremum(values, Ordering::Less)
            })?,
            "_max" => per_column(rows, selection, |values| {
                extremum(values, Ordering::Greater)
            })?,
            "_sum" => per_column(rows, selection, sum)?,
            "_avg" => per_column(rows, selection, |values| {
                let count = values.len();
                match sum(values) {
                    Value::Number(total) => total
                        .as_f64()
                        .and_then(|total| Number::from_f64(total / count as f64))
                        .map_or(Value::Null, Value::Number),
                    _ => Value::Null,
                }
            })?,
            _ => continue,
        };

        aggregates.insert(name.clone(), aggregate);
    }

    Ok(aggregates)
}

fn count_fields(rows: &[&Row], select: &Map<String, Value>) -> Result<Value, StoreError> {
    let mut counts = Map::new();

    for (column, selected) in select {
        if !selected.as_bool().unwrap_or(false) {
            continue;
        }
        let count = if column == ALL_FIELD {
            rows.len()
        } else {
            rows.iter()
                .filter(|row| row.get(column).is_some_and(|value| !value.is_null()))
                .count()
        };
        counts.insert(column.clone(), Value::from(count));
    }

    Ok(Value::Object(counts))
}

/// Apply `compute` to the non-null values of every selected column.
fn per_column(
    rows: &[&Row],
    selection: &Value,
    compute: impl Fn(Vec<&Value>) -> Value,
) -> Result<Value, StoreError> {
    let Value::Object(columns) = selection else {
        return Err(StoreError::Invalid(format!(
            "Invalid aggregate selection '{selection}'"
        )));
    };

    Ok(Value::Object(
        columns
            .iter()
            .filter(|(_, selected)| selected.as_bool().unwrap_or(false))
            .map(|(column, _)| {
                let values = rows
                    .iter()
                    .filter_map(|row| row.get(column))
                    .filter(|value| !value.is_null())
                    .collect();
                (column.clone(), compute(values))
            })
            .collect(),
    ))
}

fn extremum(values: Vec<&Value>, keep: Ordering) -> Value {
    values
        .into_iter()
        .reduce(|best, candidate| {
            if compare_values(candidate, best) == Some(keep) {
                candidate
            } else {
                best
            }
        })
        .cloned()
        .unwrap_or(Value::Null)
}

/// Integer sum when every value is an integer, float sum otherwise. `null` for no values.
fn sum(values: Vec<&Value>) -> Value {
    if values.is_empty() {
        return Value::Null;
    }

    let integers: Option<Vec<i64>> = values.iter().map(|value| value.as_i64()).collect();
    match integers {
        Some(integers) => Value::from(integers.into_iter().sum::<i64>()),
        None => Number::from_f64(values.iter().filter_map(|value| value.as_f64()).sum())
            .map_or(Value::Null, Value::Number),
    }
}
