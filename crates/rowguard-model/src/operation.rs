// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! # Operations and their arguments
//!
//! Each store operation is represented by a variant of [`Operation`] carrying only the arguments
//! the engine rewrites (`where`, `select`/`include`, `data`, `create`, `update`). Everything else
//! (`orderBy`, `take`, `skip`, `cursor`, `by`, `_min`, ...) rides along untouched in a `rest` map
//! and is put back by [`Operation::into_args`].

use std::{fmt, str::FromStr};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::predicate::Predicate;

const WHERE: &str = "where";
const SELECT: &str = "select";
const INCLUDE: &str = "include";
const DATA: &str = "data";
const CREATE: &str = "create";
const UPDATE: &str = "update";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArgumentError {
    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("Arguments of '{0}' must be an object")]
    NotAnObject(OperationKind),

    #[error("Missing argument '{argument}' for '{operation}'")]
    Missing {
        operation: OperationKind,
        argument: &'static str,
    },

    #[error("Invalid argument '{argument}' for '{operation}': {reason}")]
    Invalid {
        operation: OperationKind,
        argument: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    FindUnique,
    FindUniqueOrThrow,
    FindFirst,
    FindFirstOrThrow,
    FindMany,
    Aggregate,
    Count,
    GroupBy,
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    Delete,
    DeleteMany,
}

impl OperationKind {
    pub const ALL: [OperationKind; 15] = [
        OperationKind::FindUnique,
        OperationKind::FindUniqueOrThrow,
        OperationKind::FindFirst,
        OperationKind::FindFirstOrThrow,
        OperationKind::FindMany,
        OperationKind::Aggregate,
        OperationKind::Count,
        OperationKind::GroupBy,
        OperationKind::Create,
        OperationKind::CreateMany,
        OperationKind::Update,
        OperationKind::UpdateMany,
        OperationKind::Upsert,
        OperationKind::Delete,
        OperationKind::DeleteMany,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::FindUnique => "findUnique",
            OperationKind::FindUniqueOrThrow => "findUniqueOrThrow",
            OperationKind::FindFirst => "findFirst",
            OperationKind::FindFirstOrThrow => "findFirstOrThrow",
            OperationKind::FindMany => "findMany",
            OperationKind::Aggregate => "aggregate",
            OperationKind::Count => "count",
            OperationKind::GroupBy => "groupBy",
            OperationKind::Create => "create",
            OperationKind::CreateMany => "createMany",
            OperationKind::Update => "update",
            OperationKind::UpdateMany => "updateMany",
            OperationKind::Upsert => "upsert",
            OperationKind::Delete => "delete",
            OperationKind::DeleteMany => "deleteMany",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(
            self,
            OperationKind::FindUnique
                | OperationKind::FindUniqueOrThrow
                | OperationKind::FindFirst
                | OperationKind::FindFirstOrThrow
                | OperationKind::FindMany
                | OperationKind::Aggregate
                | OperationKind::Count
                | OperationKind::GroupBy
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ArgumentError::UnknownOperation(s.to_string()))
    }
}

/// A `select` or `include` tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Select(Map<String, Value>),
    Include(Map<String, Value>),
}

impl Projection {
    pub fn entries(&self) -> &Map<String, Value> {
        match self {
            Projection::Select(entries) | Projection::Include(entries) => entries,
        }
    }

    /// The same kind of projection over different entries.
    pub fn with_entries(&self, entries: Map<String, Value>) -> Projection {
        match self {
            Projection::Select(_) => Projection::Select(entries),
            Projection::Include(_) => Projection::Include(entries),
        }
    }

    /// Remove `select`/`include` from an argument object. Both at once is invalid.
    pub fn take_from(
        args: &mut Map<String, Value>,
        operation: OperationKind,
    ) -> Result<Option<Projection>, ArgumentError> {
        let select = take_object(args, SELECT, operation)?;
        let include = take_object(args, INCLUDE, operation)?;

        match (select, include) {
            (Some(_), Some(_)) => Err(ArgumentError::Invalid {
                operation,
                argument: SELECT,
                reason: "'select' and 'include' cannot be used together".to_string(),
            }),
            (Some(select), None) => Ok(Some(Projection::Select(select))),
            (None, Some(include)) => Ok(Some(Projection::Include(include))),
            (None, None) => Ok(None),
        }
    }

    pub fn insert_into(self, args: &mut Map<String, Value>) {
        match self {
            Projection::Select(entries) => args.insert(SELECT.to_string(), Value::Object(entries)),
            Projection::Include(entries) => {
                args.insert(INCLUDE.to_string(), Value::Object(entries))
            }
        };
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadArgs {
    pub where_: Option<Predicate>,
    pub projection: Option<Projection>,
    pub rest: Map<String, Value>,
}

/// Arguments of operations that only take a filter (`aggregate`, `count`, `groupBy`,
/// `deleteMany`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterArgs {
    pub where_: Option<Predicate>,
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateArgs {
    pub data: Map<String, Value>,
    pub projection: Option<Projection>,
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateManyArgs {
    pub data: Vec<Value>,
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateArgs {
    pub where_: Predicate,
    pub data: Map<String, Value>,
    pub projection: Option<Projection>,
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateManyArgs {
    pub where_: Option<Predicate>,
    pub data: Map<String, Value>,
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpsertArgs {
    pub where_: Predicate,
    pub create: Map<String, Value>,
    pub update: Map<String, Value>,
    pub projection: Option<Projection>,
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteArgs {
    pub where_: Predicate,
    pub projection: Option<Projection>,
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    FindUnique(ReadArgs),
    FindUniqueOrThrow(ReadArgs),
    FindFirst(ReadArgs),
    FindFirstOrThrow(ReadArgs),
    FindMany(ReadArgs),
    Aggregate(FilterArgs),
    Count(FilterArgs),
    GroupBy(FilterArgs),
    Create(CreateArgs),
    CreateMany(CreateManyArgs),
    Update(UpdateArgs),
    UpdateMany(UpdateManyArgs),
    Upsert(UpsertArgs),
    Delete(DeleteArgs),
    DeleteMany(FilterArgs),
}

impl Operation {
    /// Parse the raw arguments of an operation. `null` is accepted as "no arguments".
    pub fn parse(operation: OperationKind, args: Value) -> Result<Operation, ArgumentError> {
        let mut args = match args {
            Value::Object(args) => args,
            Value::Null => Map::new(),
            _ => return Err(ArgumentError::NotAnObject(operation)),
        };

        let read_args = |args: &mut Map<String, Value>| -> Result<ReadArgs, ArgumentError> {
            Ok(ReadArgs {
                where_: take_predicate(args, operation)?,
                projection: Projection::take_from(args, operation)?,
                rest: std::mem::take(args),
            })
        };

        let filter_args = |args: &mut Map<String, Value>| -> Result<FilterArgs, ArgumentError> {
            Ok(FilterArgs {
                where_: take_predicate(args, operation)?,
                rest: std::mem::take(args),
            })
        };

        Ok(match operation {
            OperationKind::FindUnique => Operation::FindUnique(read_args(&mut args)?),
            OperationKind::FindUniqueOrThrow => {
                Operation::FindUniqueOrThrow(read_args(&mut args)?)
            }
            OperationKind::FindFirst => Operation::FindFirst(read_args(&mut args)?),
            OperationKind::FindFirstOrThrow => Operation::FindFirstOrThrow(read_args(&mut args)?),
            OperationKind::FindMany => Operation::FindMany(read_args(&mut args)?),
            OperationKind::Aggregate => Operation::Aggregate(filter_args(&mut args)?),
            OperationKind::Count => Operation::Count(filter_args(&mut args)?),
            OperationKind::GroupBy => Operation::GroupBy(filter_args(&mut args)?),
            OperationKind::DeleteMany => Operation::DeleteMany(filter_args(&mut args)?),
            OperationKind::Create => Operation::Create(CreateArgs {
                data: required(take_object(&mut args, DATA, operation)?, operation, DATA)?,
                projection: Projection::take_from(&mut args, operation)?,
                rest: args,
            }),
            OperationKind::CreateMany => {
                let data = match args.remove(DATA) {
                    Some(Value::Array(elements)) => elements,
                    Some(element @ Value::Object(_)) => vec![element],
                    Some(_) => {
                        return Err(ArgumentError::Invalid {
                            operation,
                            argument: DATA,
                            reason: "expected an object or a list of objects".to_string(),
                        });
                    }
                    None => {
                        return Err(ArgumentError::Missing {
                            operation,
                            argument: DATA,
                        });
                    }
                };

                Operation::CreateMany(CreateManyArgs { data, rest: args })
            }
            OperationKind::Update => Operation::Update(UpdateArgs {
                where_: required(take_predicate(&mut args, operation)?, operation, WHERE)?,
                data: required(take_object(&mut args, DATA, operation)?, operation, DATA)?,
                projection: Projection::take_from(&mut args, operation)?,
                rest: args,
            }),
            OperationKind::UpdateMany => Operation::UpdateMany(UpdateManyArgs {
                where_: take_predicate(&mut args, operation)?,
                data: required(take_object(&mut args, DATA, operation)?, operation, DATA)?,
                rest: args,
            }),
            OperationKind::Upsert => Operation::Upsert(UpsertArgs {
                where_: required(take_predicate(&mut args, operation)?, operation, WHERE)?,
                create: required(take_object(&mut args, CREATE, operation)?, operation, CREATE)?,
                update: required(take_object(&mut args, UPDATE, operation)?, operation, UPDATE)?,
                projection: Projection::take_from(&mut args, operation)?,
                rest: args,
            }),
            OperationKind::Delete => Operation::Delete(DeleteArgs {
                where_: required(take_predicate(&mut args, operation)?, operation, WHERE)?,
                projection: Projection::take_from(&mut args, operation)?,
                rest: args,
            }),
        })
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::FindUnique(_) => OperationKind::FindUnique,
            Operation::FindUniqueOrThrow(_) => OperationKind::FindUniqueOrThrow,
            Operation::FindFirst(_) => OperationKind::FindFirst,
            Operation::FindFirstOrThrow(_) => OperationKind::FindFirstOrThrow,
            Operation::FindMany(_) => OperationKind::FindMany,
            Operation::Aggregate(_) => OperationKind::Aggregate,
            Operation::Count(_) => OperationKind::Count,
            Operation::GroupBy(_) => OperationKind::GroupBy,
            Operation::Create(_) => OperationKind::Create,
            Operation::CreateMany(_) => OperationKind::CreateMany,
            Operation::Update(_) => OperationKind::Update,
            Operation::UpdateMany(_) => OperationKind::UpdateMany,
            Operation::Upsert(_) => OperationKind::Upsert,
            Operation::Delete(_) => OperationKind::Delete,
            Operation::DeleteMany(_) => OperationKind::DeleteMany,
        }
    }

    /// Render the arguments back into the shape the store expects.
    pub fn into_args(self) -> Value {
        fn with_where(mut args: Map<String, Value>, where_: Option<Predicate>) -> Map<String, Value> {
            if let Some(where_) = where_ {
                args.insert(WHERE.to_string(), where_.into());
            }
            args
        }

        fn with_projection(
            mut args: Map<String, Value>,
            projection: Option<Projection>,
        ) -> Map<String, Value> {
            if let Some(projection) = projection {
                projection.insert_into(&mut args);
            }
            args
        }

        let args = match self {
            Operation::FindUnique(args)
            | Operation::FindUniqueOrThrow(args)
            | Operation::FindFirst(args)
            | Operation::FindFirstOrThrow(args)
            | Operation::FindMany(args) => {
                with_projection(with_where(args.rest, args.where_), args.projection)
            }
            Operation::Aggregate(args)
            | Operation::Count(args)
            | Operation::GroupBy(args)
            | Operation::DeleteMany(args) => with_where(args.rest, args.where_),
            Operation::Create(args) => {
                let mut rest = with_projection(args.rest, args.projection);
                rest.insert(DATA.to_string(), Value::Object(args.data));
                rest
            }
            Operation::CreateMany(args) => {
                let mut rest = args.rest;
                rest.insert(DATA.to_string(), Value::Array(args.data));
                rest
            }
            Operation::Update(args) => {
                let mut rest = with_projection(
                    with_where(args.rest, Some(args.where_)),
                    args.projection,
                );
                rest.insert(DATA.to_string(), Value::Object(args.data));
                rest
            }
            Operation::UpdateMany(args) => {
                let mut rest = with_where(args.rest, args.where_);
                rest.insert(DATA.to_string(), Value::Object(args.data));
                rest
            }
            Operation::Upsert(args) => {
                let mut rest = with_projection(
                    with_where(args.rest, Some(args.where_)),
                    args.projection,
                );
                rest.insert(CREATE.to_string(), Value::Object(args.create));
                rest.insert(UPDATE.to_string(), Value::Object(args.update));
                rest
            }
            Operation::Delete(args) => {
                with_projection(with_where(args.rest, Some(args.where_)), args.projection)
            }
        };

        Value::Object(args)
    }
}

fn take_object(
    args: &mut Map<String, Value>,
    argument: &'static str,
    operation: OperationKind,
) -> Result<Option<Map<String, Value>>, ArgumentError> {
    match args.remove(argument) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(object)) => Ok(Some(object)),
        Some(other) => Err(ArgumentError::Invalid {
            operation,
            argument,
            reason: format!("expected an object, got '{other}'"),
        }),
    }
}

fn take_predicate(
    args: &mut Map<String, Value>,
    operation: OperationKind,
) -> Result<Option<Predicate>, ArgumentError> {
    Ok(take_object(args, WHERE, operation)?.map(Predicate::new))
}

fn required<T>(
    value: Option<T>,
    operation: OperationKind,
    argument: &'static str,
) -> Result<T, ArgumentError> {
    value.ok_or(ArgumentError::Missing {
        operation,
        argument,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn operation_names_round_trip() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.name().parse::<OperationKind>().unwrap(), kind);
        }

        assert!("findEvery".parse::<OperationKind>().is_err());
    }

    #[test]
    fn read_args_keep_pass_through_keys() {
        let args = json!({
            "where": {"published": true},
            "include": {"author": true},
            "orderBy": {"id": "asc"},
            "take": 2
        });

        let operation = Operation::parse(OperationKind::FindMany, args.clone()).unwrap();

        let Operation::FindMany(read_args) = &operation else {
            panic!("expected findMany");
        };
        assert_eq!(
            read_args.projection,
            Some(Projection::Include(
                json!({"author": true}).as_object().unwrap().clone()
            ))
        );
        assert_eq!(read_args.rest.len(), 2);

        assert_eq!(operation.into_args(), args);
    }

    #[test]
    fn missing_required_arguments() {
        assert_eq!(
            Operation::parse(OperationKind::Update, json!({"data": {"name": "x"}})),
            Err(ArgumentError::Missing {
                operation: OperationKind::Update,
                argument: "where"
            })
        );

        assert_eq!(
            Operation::parse(OperationKind::Create, json!({})),
            Err(ArgumentError::Missing {
                operation: OperationKind::Create,
                argument: "data"
            })
        );
    }

    #[test]
    fn select_and_include_are_exclusive() {
        let result = Operation::parse(
            OperationKind::FindFirst,
            json!({"select": {"id": true}, "include": {"posts": true}}),
        );

        assert!(matches!(result, Err(ArgumentError::Invalid { argument: "select", .. })));
    }

    #[test]
    fn create_many_accepts_single_object() {
        let operation = Operation::parse(
            OperationKind::CreateMany,
            json!({"data": {"email": "a@b"}}),
        )
        .unwrap();

        assert_eq!(operation.into_args(), json!({"data": [{"email": "a@b"}]}));
    }

    #[test]
    fn null_arguments_are_empty() {
        let operation = Operation::parse(OperationKind::Count, Value::Null).unwrap();
        assert_eq!(operation, Operation::Count(FilterArgs::default()));
        assert_eq!(operation.into_args(), json!({}));
    }
}
