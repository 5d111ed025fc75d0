// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! # Entity schema
//!
//! The relation metadata index: for every entity, its fields in declaration order along with
//! their kind (scalar or relation), cardinality and key flags. The index is built once (typically
//! from a DMMF-style datamodel description through [`EntitySchema::from_datamodel`]) and shared
//! read-only by every resolver.
//!
//! Every entity must declare at least one `id` or `unique` field. The authorization engine relies
//! on it to build impossible predicates and to split point lookups, so a schema that violates
//! this is rejected at construction time.

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("Unknown field '{field}' on entity '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("Entity '{0}' has no id or unique field")]
    MissingUniqueField(String),

    #[error("Relation '{entity}.{field}' targets unknown entity '{target}'")]
    UnknownRelationTarget {
        entity: String,
        field: String,
        target: String,
    },

    #[error("Entity '{0}' is declared more than once")]
    DuplicateEntity(String),

    #[error("Invalid datamodel: {0}")]
    InvalidDatamodel(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarType {
    Boolean,
    Int,
    BigInt,
    Float,
    Decimal,
    String,
    Bytes,
    DateTime,
    Json,
    Enum(String),
    Unsupported(String),
}

impl ScalarType {
    fn from_type_name(type_name: &str) -> ScalarType {
        match type_name {
            "Boolean" => ScalarType::Boolean,
            "Int" => ScalarType::Int,
            "BigInt" => ScalarType::BigInt,
            "Float" => ScalarType::Float,
            "Decimal" => ScalarType::Decimal,
            "String" => ScalarType::String,
            "Bytes" => ScalarType::Bytes,
            "DateTime" => ScalarType::DateTime,
            "Json" => ScalarType::Json,
            other => ScalarType::Unsupported(other.to_string()),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            ScalarType::Boolean => "Boolean",
            ScalarType::Int => "Int",
            ScalarType::BigInt => "BigInt",
            ScalarType::Float => "Float",
            ScalarType::Decimal => "Decimal",
            ScalarType::String => "String",
            ScalarType::Bytes => "Bytes",
            ScalarType::DateTime => "DateTime",
            ScalarType::Json => "Json",
            ScalarType::Enum(name) | ScalarType::Unsupported(name) => name,
        }
    }
}

/// The far side of a relation field.
///
/// `from_fields`/`to_fields` are only populated on the side that owns the foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub target: String,
    pub name: Option<String>,
    pub from_fields: Vec<String>,
    pub to_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarType),
    Relation(RelationDescriptor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationCardinality {
    ToMany,
    RequiredToOne,
    OptionalToOne,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub is_list: bool,
    pub is_required: bool,
    pub is_unique: bool,
    pub is_id: bool,
}

impl FieldDescriptor {
    pub fn relation(&self) -> Option<&RelationDescriptor> {
        match &self.kind {
            FieldKind::Relation(relation) => Some(relation),
            FieldKind::Scalar(_) => None,
        }
    }

    pub fn scalar_type(&self) -> Option<&ScalarType> {
        match &self.kind {
            FieldKind::Scalar(scalar_type) => Some(scalar_type),
            FieldKind::Relation(_) => None,
        }
    }

    /// Can this field address a single record on its own?
    pub fn is_key(&self) -> bool {
        self.is_id || self.is_unique
    }

    /// `None` for scalar fields.
    pub fn cardinality(&self) -> Option<RelationCardinality> {
        self.relation().map(|_| {
            if self.is_list {
                RelationCardinality::ToMany
            } else if self.is_required {
                RelationCardinality::RequiredToOne
            } else {
                RelationCardinality::OptionalToOne
            }
        })
    }
}

pub type EntityFields = IndexMap<String, FieldDescriptor>;

#[derive(Debug, Clone, Default)]
pub struct EntitySchema {
    entities: IndexMap<String, EntityFields>,
}

impl EntitySchema {
    /// Build a schema from already-assembled field maps, validating the key and relation
    /// invariants.
    pub fn new(entities: IndexMap<String, EntityFields>) -> Result<Self, SchemaError> {
        for (entity_name, fields) in &entities {
            if !fields.values().any(FieldDescriptor::is_key) {
                return Err(SchemaError::MissingUniqueField(entity_name.clone()));
            }

            for field in fields.values() {
                if let Some(relation) = field.relation()
                    && !entities.contains_key(&relation.target)
                {
                    return Err(SchemaError::UnknownRelationTarget {
                        entity: entity_name.clone(),
                        field: field.name.clone(),
                        target: relation.target.clone(),
                    });
                }
            }
        }

        Ok(Self { entities })
    }

    /// Build the index from a DMMF-style datamodel (`{ "models": [ { "name", "fields": [...] } ] }`).
    pub fn from_datamodel(datamodel: &serde_json::Value) -> Result<Self, SchemaError> {
        let datamodel = Datamodel::deserialize(datamodel)
            .map_err(|e| SchemaError::InvalidDatamodel(e.to_string()))?;

        let mut entities = IndexMap::new();

        for model in datamodel.models {
            let fields = model
                .fields
                .into_iter()
                .map(|field| {
                    let kind = match field.kind.as_str() {
                        "object" => FieldKind::Relation(RelationDescriptor {
                            target: field.type_name,
                            name: field.relation_name,
                            from_fields: field.relation_from_fields,
                            to_fields: field.relation_to_fields,
                        }),
                        "enum" => FieldKind::Scalar(ScalarType::Enum(field.type_name)),
                        "scalar" => FieldKind::Scalar(ScalarType::from_type_name(&field.type_name)),
                        _ => FieldKind::Scalar(ScalarType::Unsupported(field.type_name)),
                    };

                    let descriptor = FieldDescriptor {
                        name: field.name.clone(),
                        kind,
                        is_list: field.is_list,
                        is_required: field.is_required,
                        is_unique: field.is_unique,
                        is_id: field.is_id,
                    };

                    (field.name, descriptor)
                })
                .collect();

            if entities.insert(model.name.clone(), fields).is_some() {
                return Err(SchemaError::DuplicateEntity(model.name));
            }
        }

        Self::new(entities)
    }

    pub fn entity(&self, entity_name: &str) -> Result<&EntityFields, SchemaError> {
        self.entities
            .get(entity_name)
            .ok_or_else(|| SchemaError::UnknownEntity(entity_name.to_string()))
    }

    pub fn field(&self, entity_name: &str, field_name: &str) -> Result<&FieldDescriptor, SchemaError> {
        self.entity(entity_name)?
            .get(field_name)
            .ok_or_else(|| SchemaError::UnknownField {
                entity: entity_name.to_string(),
                field: field_name.to_string(),
            })
    }

    /// The first `id` field, falling back to the first `unique` field.
    pub fn primary_key(&self, entity_name: &str) -> Result<&FieldDescriptor, SchemaError> {
        let fields = self.entity(entity_name)?;

        fields
            .values()
            .find(|field| field.is_id)
            .or_else(|| fields.values().find(|field| field.is_unique))
            .ok_or_else(|| SchemaError::MissingUniqueField(entity_name.to_string()))
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn relations(
        &self,
        entity_name: &str,
    ) -> Result<impl Iterator<Item = &FieldDescriptor>, SchemaError> {
        Ok(self
            .entity(entity_name)?
            .values()
            .filter(|field| field.relation().is_some()))
    }

    /// The field on `relation.target` that points back at `field` (matched by relation name).
    pub fn opposite_relation(
        &self,
        entity_name: &str,
        field: &FieldDescriptor,
    ) -> Option<&FieldDescriptor> {
        let relation = field.relation()?;
        let target_fields = self.entities.get(&relation.target)?;

        target_fields.values().find(|candidate| {
            // A self-relation field is not its own opposite
            let is_same_field = relation.target == entity_name && candidate.name == field.name;

            !is_same_field
                && candidate.relation().is_some_and(|candidate_relation| {
                    candidate_relation.target == entity_name
                        && candidate_relation.name == relation.name
                })
        })
    }
}

#[derive(Deserialize)]
struct Datamodel {
    models: Vec<DatamodelModel>,
}

#[derive(Deserialize)]
struct DatamodelModel {
    name: String,
    fields: Vec<DatamodelField>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatamodelField {
    name: String,
    kind: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    is_list: bool,
    #[serde(default)]
    is_required: bool,
    #[serde(default)]
    is_unique: bool,
    #[serde(default)]
    is_id: bool,
    #[serde(default)]
    relation_name: Option<String>,
    #[serde(default)]
    relation_from_fields: Vec<String>,
    #[serde(default)]
    relation_to_fields: Vec<String>,
}
