// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde_json::{Map, Value};

pub const AND_KEY: &str = "AND";

/// A structured filter understood by the store (the value of a `where` argument).
///
/// The engine treats the content as opaque: it only ever wraps predicates in a conjunction or
/// builds one from scratch for the always-false case.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate(Map<String, Value>);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("A predicate must be an object, got '{0}'")]
pub struct NotAPredicate(pub Value);

impl Predicate {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// A predicate that places no restriction.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Conjunction of two predicates (`{ AND: [lhs, rhs] }`).
    pub fn and(lhs: Predicate, rhs: Predicate) -> Predicate {
        let mut fields = Map::new();
        fields.insert(
            AND_KEY.to_string(),
            Value::Array(vec![Value::Object(lhs.0), Value::Object(rhs.0)]),
        );
        Predicate(fields)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl TryFrom<Value> for Predicate {
    type Error = NotAPredicate;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Predicate(fields)),
            other => Err(NotAPredicate(other)),
        }
    }
}

impl From<Map<String, Value>> for Predicate {
    fn from(fields: Map<String, Value>) -> Self {
        Predicate(fields)
    }
}

impl From<Predicate> for Value {
    fn from(predicate: Predicate) -> Self {
        Value::Object(predicate.0)
    }
}
