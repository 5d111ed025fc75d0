// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    /// Every element of a list.
    Each,
}

/// Address of a value inside a query result, relative to one root record.
///
/// Rendered as `$`, `$.author`, `$.posts.*.category`, and so on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultPath(Vec<PathSegment>);

impl ResultPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn field(&self, name: &str) -> Self {
        self.with(PathSegment::Field(name.to_string()))
    }

    pub fn each(&self) -> Self {
        self.with(PathSegment::Each)
    }

    fn with(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    /// All non-null values at this path in `result`.
    ///
    /// A list result is treated as a list of root records.
    pub fn extract<'v>(&self, result: &'v Value) -> Vec<&'v Value> {
        let roots = match result {
            Value::Array(records) => records.iter().collect(),
            record => vec![record],
        };

        self.0
            .iter()
            .fold(roots, |current, segment| {
                current
                    .into_iter()
                    .flat_map(|value| -> Vec<&'v Value> {
                        match (segment, value) {
                            (PathSegment::Field(name), Value::Object(fields)) => {
                                fields.get(name).into_iter().collect()
                            }
                            (PathSegment::Each, Value::Array(elements)) => {
                                elements.iter().collect()
                            }
                            _ => vec![],
                        }
                    })
                    .collect()
            })
            .into_iter()
            .filter(|value| !value.is_null())
            .collect()
    }
}

impl fmt::Display for ResultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.0 {
            match segment {
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Each => f.write_str(".*")?,
            }
        }
        Ok(())
    }
}

/// A required to-one relation whose fetched values must be verified against the target's read
/// policy once the query has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationPathRecord {
    pub path: ResultPath,
    pub target_entity: String,
}
