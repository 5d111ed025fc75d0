// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Rewrite `select`/`include` trees so that nested relations only return readable records.
//!
//! List and optional to-one relations get the target's read filter as a nested `where` (a denied
//! target gets the impossible predicate and so appears empty). Required to-one relations cannot
//! be filtered away; when integrity checking is on they are recorded for verification instead.

use async_recursion::async_recursion;
use futures::future::try_join_all;
use rowguard_model::{
    PermissionDefinition, Predicate, RelationCardinality, operation::Projection,
};
use serde_json::{Map, Value};

use crate::{
    access_solver::AccessSolution,
    predicate_util::merge_filter,
    relation_path::{RelationPathRecord, ResultPath},
    request_resolver::RequestResolver,
    rls_error::RlsError,
};

const COUNT_FIELD: &str = "_count";
const SELECT: &str = "select";
const INCLUDE: &str = "include";
const WHERE: &str = "where";

type Resolved<T> = (T, Vec<RelationPathRecord>);

impl<'a, C: Sync> RequestResolver<'a, C> {
    /// Rewrite a projection rooted at `path`, returning it along with the required to-one
    /// relations the integrity verifier has to check.
    pub async fn resolve_projection(
        &self,
        entity_name: &str,
        projection: &Projection,
        path: &ResultPath,
    ) -> Result<Resolved<Projection>, RlsError> {
        let (entries, relation_paths) = self
            .resolve_projection_entries(entity_name, projection.entries(), path)
            .await?;

        Ok((projection.with_entries(entries), relation_paths))
    }

    async fn resolve_projection_entries(
        &self,
        entity_name: &str,
        entries: &Map<String, Value>,
        path: &ResultPath,
    ) -> Result<Resolved<Map<String, Value>>, RlsError> {
        let resolved = try_join_all(entries.iter().map(|(name, value)| async move {
            let (value, relation_paths) = self
                .resolve_projection_entry(entity_name, name, value, path)
                .await?;
            Ok::<_, RlsError>((name.clone(), value, relation_paths))
        }))
        .await?;

        let mut rewritten = Map::new();
        let mut relation_paths = vec![];
        for (name, value, entry_paths) in resolved {
            rewritten.insert(name, value);
            relation_paths.extend(entry_paths);
        }

        Ok((rewritten, relation_paths))
    }

    #[async_recursion]
    async fn resolve_projection_entry(
        &self,
        entity_name: &str,
        name: &str,
        value: &Value,
        path: &ResultPath,
    ) -> Result<Resolved<Value>, RlsError> {
        if name == COUNT_FIELD {
            return Ok((self.resolve_count_selection(entity_name, value).await?, vec![]));
        }

        let field = self.schema.field(entity_name, name)?;
        let (Some(relation), Some(cardinality)) = (field.relation(), field.cardinality()) else {
            return Ok((value.clone(), vec![]));
        };

        if !is_selected(value) {
            return Ok((value.clone(), vec![]));
        }

        match cardinality {
            RelationCardinality::RequiredToOne => {
                self.resolve_required_relation(&relation.target, value, &path.field(name))
                    .await
            }
            RelationCardinality::OptionalToOne => {
                self.resolve_filtered_relation(&relation.target, value, &path.field(name))
                    .await
            }
            RelationCardinality::ToMany => {
                self.resolve_filtered_relation(&relation.target, value, &path.field(name).each())
                    .await
            }
        }
    }

    /// A required to-one relation is always fetched. It is recorded for verification unless the
    /// target is readable by everyone.
    async fn resolve_required_relation(
        &self,
        target: &str,
        value: &Value,
        path: &ResultPath,
    ) -> Result<Resolved<Value>, RlsError> {
        let mut relation_paths = vec![];

        if self.options.check_required_belongs_to && !self.permissions_of(target)?.read.is_allow_all()
        {
            if let Value::Object(selection) = value {
                self.check_primary_key_selected(target, selection, path)?;
            }
            relation_paths.push(RelationPathRecord {
                path: path.clone(),
                target_entity: target.to_string(),
            });
        }

        match value {
            Value::Object(selection) => {
                let (selection, nested_paths) =
                    self.resolve_nested_selection(target, selection, path).await?;
                relation_paths.extend(nested_paths);
                Ok((Value::Object(selection), relation_paths))
            }
            other => Ok((other.clone(), relation_paths)),
        }
    }

    /// The verifier identifies related records by their primary key, so it must be fetched.
    /// `true` and `include` fetch every scalar, an explicit `select` must name it.
    fn check_primary_key_selected(
        &self,
        target: &str,
        selection: &Map<String, Value>,
        path: &ResultPath,
    ) -> Result<(), RlsError> {
        let Some(Value::Object(select)) = selection.get(SELECT) else {
            return Ok(());
        };

        let primary_key = &self.schema.primary_key(target)?.name;
        if select.get(primary_key) == Some(&Value::Bool(true)) {
            Ok(())
        } else {
            Err(RlsError::MissingPrimaryKeySelection {
                entity: target.to_string(),
                field: primary_key.clone(),
                path: path.to_string(),
            })
        }
    }

    async fn resolve_filtered_relation(
        &self,
        target: &str,
        value: &Value,
        path: &ResultPath,
    ) -> Result<Resolved<Value>, RlsError> {
        let read = &self.permissions_of(target)?.read;

        if read.is_deny() {
            return Ok((self.denied_relation_selection(target)?, vec![]));
        }

        let empty = Map::new();
        let selection = value.as_object().unwrap_or(&empty);

        let (solution, (mut selection, relation_paths)) = futures::try_join!(
            self.solve(read),
            self.resolve_nested_selection(target, selection, path)
        )?;

        match solution {
            AccessSolution::Unrestricted if !value.is_object() => {
                Ok((value.clone(), relation_paths))
            }
            AccessSolution::Unrestricted => Ok((Value::Object(selection), relation_paths)),
            AccessSolution::Filtered(predicate) => {
                let existing = take_where(&mut selection)?;
                selection.insert(WHERE.to_string(), merge_filter(existing, predicate).into());
                Ok((Value::Object(selection), relation_paths))
            }
            AccessSolution::Denied => Ok((self.denied_relation_selection(target)?, vec![])),
        }
    }

    fn denied_relation_selection(&self, target: &str) -> Result<Value, RlsError> {
        let mut selection = Map::new();
        selection.insert(WHERE.to_string(), self.impossible_predicate(target)?.into());
        Ok(Value::Object(selection))
    }

    /// Rewrite the `select`/`include` inside a relation's selection object, keeping its other
    /// keys (`where`, `orderBy`, `take`, ...).
    async fn resolve_nested_selection(
        &self,
        target: &str,
        selection: &Map<String, Value>,
        path: &ResultPath,
    ) -> Result<Resolved<Map<String, Value>>, RlsError> {
        let mut rewritten = selection.clone();

        let Some(projection) = nested_projection(selection)? else {
            return Ok((rewritten, vec![]));
        };

        let (projection, relation_paths) = self.resolve_projection(target, &projection, path).await?;
        rewritten.remove(SELECT);
        rewritten.remove(INCLUDE);
        projection.insert_into(&mut rewritten);

        Ok((rewritten, relation_paths))
    }

    /// `_count: true` becomes an explicit per-relation selection; `_count: { select }` has each
    /// selected relation filtered.
    async fn resolve_count_selection(
        &self,
        entity_name: &str,
        value: &Value,
    ) -> Result<Value, RlsError> {
        match value {
            Value::Bool(true) => {
                let list_relations = self
                    .schema
                    .relations(entity_name)?
                    .filter(|field| field.is_list)
                    .filter_map(|field| {
                        field
                            .relation()
                            .map(|relation| (field.name.as_str(), relation.target.as_str()))
                    });

                let counts = try_join_all(list_relations.map(|(name, target)| async move {
                    let count = self.resolve_relation_count(target, &Value::Bool(true)).await?;
                    Ok::<_, RlsError>((name.to_string(), count))
                }))
                .await?;

                let mut count_args = Map::new();
                count_args.insert(SELECT.to_string(), Value::Object(counts.into_iter().collect()));
                Ok(Value::Object(count_args))
            }
            Value::Object(count_args) => {
                let Some(Value::Object(select)) = count_args.get(SELECT) else {
                    return Ok(value.clone());
                };

                let counts = try_join_all(select.iter().map(|(name, count)| async move {
                    let field = self.schema.field(entity_name, name)?;
                    let count = match field.relation() {
                        Some(relation) if field.is_list => {
                            self.resolve_relation_count(&relation.target, count).await?
                        }
                        _ => count.clone(),
                    };
                    Ok::<_, RlsError>((name.clone(), count))
                }))
                .await?;

                let mut count_args = count_args.clone();
                count_args.insert(SELECT.to_string(), Value::Object(counts.into_iter().collect()));
                Ok(Value::Object(count_args))
            }
            other => Ok(other.clone()),
        }
    }

    async fn resolve_relation_count(&self, target: &str, value: &Value) -> Result<Value, RlsError> {
        if !is_selected(value) {
            return Ok(value.clone());
        }

        let read = &self.permissions_of(target)?.read;
        let solution = match read {
            PermissionDefinition::Deny => AccessSolution::Denied,
            read => self.solve(read).await?,
        };

        match solution {
            AccessSolution::Unrestricted => Ok(value.clone()),
            AccessSolution::Denied => self.denied_relation_selection(target),
            AccessSolution::Filtered(predicate) => {
                let mut count_args = value.as_object().cloned().unwrap_or_default();
                let existing = take_where(&mut count_args)?;
                count_args.insert(WHERE.to_string(), merge_filter(existing, predicate).into());
                Ok(Value::Object(count_args))
            }
        }
    }
}

fn is_selected(value: &Value) -> bool {
    !matches!(value, Value::Bool(false) | Value::Null)
}

fn take_where(selection: &mut Map<String, Value>) -> Result<Option<Predicate>, RlsError> {
    match selection.remove(WHERE) {
        None | Some(Value::Null) => Ok(None),
        Some(where_) => Ok(Some(Predicate::try_from(where_)?)),
    }
}

fn nested_projection(selection: &Map<String, Value>) -> Result<Option<Projection>, RlsError> {
    match (selection.get(SELECT), selection.get(INCLUDE)) {
        (Some(Value::Object(_)), Some(Value::Object(_))) => Err(RlsError::InvalidArgument(
            "'select' and 'include' cannot be used together".to_string(),
        )),
        (Some(Value::Object(select)), _) => Ok(Some(Projection::Select(select.clone()))),
        (_, Some(Value::Object(include))) => Ok(Some(Projection::Include(include.clone()))),
        _ => Ok(None),
    }
}
