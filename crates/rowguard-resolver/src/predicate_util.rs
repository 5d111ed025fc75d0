// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Predicate algebra: conjoining access filters with user filters and building the always-false
//! predicate used to express denial inside filter-shaped arguments.

use chrono::{DateTime, SecondsFormat, Utc};
use rowguard_model::{EntitySchema, FieldKind, Predicate, ScalarType, predicate::AND_KEY};
use serde_json::{Map, Value};

use crate::{access_solver::AccessSolution, rls_error::RlsError};

const LOGICAL_OPERATORS: [&str; 3] = ["AND", "OR", "NOT"];

/// `extra` alone if there is no existing filter, otherwise `{ AND: [existing, extra] }`.
pub fn merge_filter(existing: Option<Predicate>, extra: Predicate) -> Predicate {
    match existing {
        None => extra,
        Some(existing) if existing.is_empty() => extra,
        Some(existing) => Predicate::and(existing, extra),
    }
}

/// Split a unique `where` into the part that addresses a single record and the rest.
///
/// The addressing part holds the id/unique fields and compound unique selectors
/// (`email_tenantId: { email, tenantId }`). Everything else goes to the rest.
pub fn split_unique_filter(
    schema: &EntitySchema,
    entity_name: &str,
    unique_where: Predicate,
) -> Result<(Map<String, Value>, Map<String, Value>), RlsError> {
    let fields = schema.entity(entity_name)?;

    let is_compound_selector = |key: &str, value: &Value| {
        !LOGICAL_OPERATORS.contains(&key)
            && matches!(value, Value::Object(selector)
                if !selector.is_empty() && selector.keys().all(|name| fields.contains_key(name)))
    };

    Ok(unique_where
        .into_fields()
        .into_iter()
        .partition(|(key, value)| match fields.get(key) {
            Some(field) => field.is_key(),
            None => is_compound_selector(key.as_str(), value),
        }))
}

/// Conjoin `extra` to a unique `where` while keeping it a valid unique lookup.
///
/// The result is `{ ...uniquePart, AND: [rest, extra] }` (or `AND: [extra]` if nothing but the
/// unique part was given).
pub fn merge_unique_filter(
    schema: &EntitySchema,
    entity_name: &str,
    unique_where: Predicate,
    extra: Predicate,
) -> Result<Predicate, RlsError> {
    let (mut unique_part, rest) = split_unique_filter(schema, entity_name, unique_where)?;

    let conjuncts = if rest.is_empty() {
        vec![Value::from(extra)]
    } else {
        vec![Value::Object(rest), Value::from(extra)]
    };
    unique_part.insert(AND_KEY.to_string(), Value::Array(conjuncts));

    Ok(Predicate::new(unique_part))
}

/// A predicate matching no record of `entity_name`, built without looking at any data:
/// `{ <primary key>: { equals: s, not: s } }`.
pub fn impossible_predicate(
    schema: &EntitySchema,
    entity_name: &str,
) -> Result<Predicate, RlsError> {
    let key_field = schema.primary_key(entity_name)?;

    let unsupported = |field_type: &str| RlsError::UnsupportedFieldType {
        entity: entity_name.to_string(),
        field: key_field.name.clone(),
        field_type: field_type.to_string(),
    };

    let sentinel = match &key_field.kind {
        FieldKind::Scalar(scalar_type) => match scalar_type {
            ScalarType::Boolean => Value::Bool(true),
            ScalarType::Int | ScalarType::BigInt | ScalarType::Float | ScalarType::Decimal => {
                Value::from(0)
            }
            ScalarType::String => Value::from(""),
            ScalarType::Bytes => Value::Array(vec![]),
            ScalarType::DateTime => Value::from(
                DateTime::<Utc>::UNIX_EPOCH.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            ScalarType::Json => Value::Null,
            ScalarType::Enum(_) | ScalarType::Unsupported(_) => {
                return Err(unsupported(scalar_type.type_name()));
            }
        },
        FieldKind::Relation(relation) => return Err(unsupported(&relation.target)),
    };

    let mut contradiction = Map::new();
    contradiction.insert("equals".to_string(), sentinel.clone());
    contradiction.insert("not".to_string(), sentinel);

    let mut fields = Map::new();
    fields.insert(key_field.name.clone(), Value::Object(contradiction));

    Ok(Predicate::new(fields))
}

/// Restrict an optional multi-record filter by an access solution.
pub fn scope_filter(
    schema: &EntitySchema,
    entity_name: &str,
    where_: Option<Predicate>,
    solution: AccessSolution,
) -> Result<Option<Predicate>, RlsError> {
    Ok(match solution {
        AccessSolution::Unrestricted => where_,
        AccessSolution::Filtered(predicate) => Some(merge_filter(where_, predicate)),
        AccessSolution::Denied => Some(merge_filter(
            where_,
            impossible_predicate(schema, entity_name)?,
        )),
    })
}

/// Restrict a unique lookup by an access solution.
pub fn scope_unique_filter(
    schema: &EntitySchema,
    entity_name: &str,
    unique_where: Predicate,
    solution: AccessSolution,
) -> Result<Predicate, RlsError> {
    match solution {
        AccessSolution::Unrestricted => Ok(unique_where),
        AccessSolution::Filtered(predicate) => {
            merge_unique_filter(schema, entity_name, unique_where, predicate)
        }
        AccessSolution::Denied => {
            let impossible = impossible_predicate(schema, entity_name)?;
            merge_unique_filter(schema, entity_name, unique_where, impossible)
        }
    }
}
