//! Entity metadata used to map logical names to tables and columns

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::{ComposeError, ComposeResult};

/// Read-only snapshot of every entity the composer can address
#[derive(Debug, Clone, Default)]
pub struct SchemaMetadata {
    /// Map from logical entity name to its definition
    entities: HashMap<String, EntityDefinition>,
}

impl SchemaMetadata {
    /// Parse and validate a JSON schema document.
    ///
    /// See [`SchemaConfig`](super::config::SchemaConfig) for the format.
    pub fn from_json(source: &str) -> ComposeResult<Self> {
        let config: super::config::SchemaConfig = serde_json::from_str(source)?;
        config.into_schema()
    }

    /// Get an entity by logical name
    pub fn get_entity(&self, name: &str) -> ComposeResult<&EntityDefinition> {
        self.entities
            .get(name)
            .ok_or_else(|| ComposeError::UnknownEntity(name.to_string()))
    }

    /// Get a field of an entity by logical names
    pub fn get_field(&self, entity: &str, field: &str) -> ComposeResult<&FieldDefinition> {
        self.get_entity(entity)?.get_field(field)
    }

    /// Get a relationship of an entity by logical names
    pub fn get_relationship(
        &self,
        entity: &str,
        relationship: &str,
    ) -> ComposeResult<&RelationshipDefinition> {
        self.get_entity(entity)?.get_relationship(relationship)
    }

    /// Check if an entity exists
    pub fn has_entity(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// All entities, sorted by logical name
    pub fn entities(&self) -> Vec<&EntityDefinition> {
        let mut entities: Vec<_> = self.entities.values().collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        entities
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check every cross reference: keys, relationships and the soft-delete
    /// field must all point at declared fields and entities.
    fn validate(&self) -> ComposeResult<()> {
        for entity in self.entities.values() {
            let invalid = |msg: String| {
                Err(ComposeError::InvalidSchema(format!(
                    "entity '{}': {}",
                    entity.name, msg
                )))
            };

            if let Some(name) = entity.duplicates.first() {
                return invalid(format!("{} is declared more than once", name));
            }

            for field in &entity.primary_key {
                if !entity.has_field(field) {
                    return invalid(format!("primary key field '{}' is not declared", field));
                }
            }

            for key in &entity.unique_keys {
                if key.fields.is_empty() {
                    return invalid(format!("unique key '{}' has no fields", key.name));
                }
                for field in &key.fields {
                    if !entity.has_field(field) {
                        return invalid(format!(
                            "unique key '{}' references undeclared field '{}'",
                            key.name, field
                        ));
                    }
                }
            }

            if let Some(ref name) = entity.conflict_key {
                if entity.get_unique_key(name).is_none() {
                    return invalid(format!("conflict key '{}' is not a unique key", name));
                }
            }

            if let Some(ref name) = entity.soft_delete_field {
                match entity.get_field(name).ok() {
                    Some(field) if matches!(field.field_type, FieldType::Bool | FieldType::Int) => {}
                    Some(_) => {
                        return invalid(format!("soft-delete field '{}' must be bool or int", name))
                    }
                    None => return invalid(format!("soft-delete field '{}' is not declared", name)),
                }
            }

            for rel in entity.relationships.values() {
                let target = match self.entities.get(&rel.target) {
                    Some(target) => target,
                    None => {
                        return invalid(format!(
                            "relationship '{}' targets unknown entity '{}'",
                            rel.name, rel.target
                        ))
                    }
                };
                match &rel.kind {
                    RelationshipKind::BelongsTo { foreign_key } => {
                        if !entity.has_field(foreign_key) {
                            return invalid(format!(
                                "relationship '{}' uses undeclared foreign key '{}'",
                                rel.name, foreign_key
                            ));
                        }
                        if target.primary_key.len() != 1 {
                            return invalid(format!(
                                "relationship '{}' needs a single-column primary key on '{}'",
                                rel.name, target.name
                            ));
                        }
                    }
                    RelationshipKind::HasMany { foreign_key } => {
                        if !target.has_field(foreign_key) {
                            return invalid(format!(
                                "relationship '{}' uses foreign key '{}' not declared on '{}'",
                                rel.name, foreign_key, target.name
                            ));
                        }
                        if entity.primary_key.len() != 1 {
                            return invalid(format!(
                                "relationship '{}' needs a single-column primary key",
                                rel.name
                            ));
                        }
                    }
                    RelationshipKind::ManyToMany {
                        through,
                        near_key,
                        far_key,
                    } => {
                        let middle = match self.entities.get(through) {
                            Some(middle) => middle,
                            None => {
                                return invalid(format!(
                                    "relationship '{}' goes through unknown entity '{}'",
                                    rel.name, through
                                ))
                            }
                        };
                        for key in [near_key, far_key] {
                            if !middle.has_field(key) {
                                return invalid(format!(
                                    "relationship '{}' uses key '{}' not declared on '{}'",
                                    rel.name, key, through
                                ));
                            }
                        }
                        if entity.primary_key.len() != 1 || target.primary_key.len() != 1 {
                            return invalid(format!(
                                "relationship '{}' needs single-column primary keys",
                                rel.name
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Description of one logical entity and its physical table
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    /// Logical name (e.g., "Account", "PostTag")
    pub name: String,
    /// SQL table name (snake_case of the logical name unless overridden)
    pub table_name: String,
    /// Fields in declaration order
    fields: Vec<FieldDefinition>,
    /// Logical field name to position in `fields`
    field_index: HashMap<String, usize>,
    relationships: HashMap<String, RelationshipDefinition>,
    /// Primary key fields; `["id"]` once an `id` field is added unless overridden
    pub primary_key: Vec<String>,
    /// Named unique keys (single or composite)
    pub unique_keys: Vec<UniqueKey>,
    /// Unique key to use as the upsert conflict target
    pub conflict_key: Option<String>,
    /// Flag field marking soft-deleted rows (e.g., "deleted")
    pub soft_delete_field: Option<String>,
    /// Names added twice, reported when the schema is built
    duplicates: Vec<String>,
}

impl EntityDefinition {
    /// Create a new entity description
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let table_name = to_snake_case(&name);
        Self {
            name,
            table_name,
            fields: Vec::new(),
            field_index: HashMap::new(),
            relationships: HashMap::new(),
            primary_key: Vec::new(),
            unique_keys: Vec::new(),
            conflict_key: None,
            soft_delete_field: None,
            duplicates: Vec::new(),
        }
    }

    /// Set the SQL table name
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.add_field(field);
        self
    }

    pub fn with_relationship(mut self, relationship: RelationshipDefinition) -> Self {
        self.add_relationship(relationship);
        self
    }

    /// Override the primary key
    pub fn with_primary_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Declare a named unique key
    pub fn with_unique_key<I, S>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_keys.push(UniqueKey {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Pick which unique key an upsert conflicts on
    pub fn with_conflict_key(mut self, name: impl Into<String>) -> Self {
        self.conflict_key = Some(name.into());
        self
    }

    pub fn with_soft_delete(mut self, field: impl Into<String>) -> Self {
        self.soft_delete_field = Some(field.into());
        self
    }

    /// Add a field. A second field with the same logical name is kept out
    /// and makes [`SchemaBuilder::build`] fail.
    pub fn add_field(&mut self, field: FieldDefinition) {
        if self.field_index.contains_key(&field.name) {
            self.duplicates.push(format!("field '{}'", field.name));
            return;
        }
        if field.name == "id" && self.primary_key.is_empty() {
            self.primary_key.push(field.name.clone());
        }
        self.field_index.insert(field.name.clone(), self.fields.len());
        self.fields.push(field);
    }

    pub fn add_relationship(&mut self, relationship: RelationshipDefinition) {
        if self.relationships.contains_key(&relationship.name) {
            self.duplicates
                .push(format!("relationship '{}'", relationship.name));
            return;
        }
        self.relationships
            .insert(relationship.name.clone(), relationship);
    }

    /// Get a field by logical name
    pub fn get_field(&self, name: &str) -> ComposeResult<&FieldDefinition> {
        self.field_index
            .get(name)
            .map(|&pos| &self.fields[pos])
            .ok_or_else(|| ComposeError::UnknownField {
                entity: self.name.clone(),
                field: name.to_string(),
            })
    }

    /// Get a relationship by name
    pub fn get_relationship(&self, name: &str) -> ComposeResult<&RelationshipDefinition> {
        self.relationships
            .get(name)
            .ok_or_else(|| ComposeError::UnknownRelationship {
                entity: self.name.clone(),
                relationship: name.to_string(),
            })
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_index.contains_key(name)
    }

    pub fn has_relationship(&self, name: &str) -> bool {
        self.relationships.contains_key(name)
    }

    /// Fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter()
    }

    /// Relationships, sorted by name
    pub fn relationships(&self) -> Vec<&RelationshipDefinition> {
        let mut rels: Vec<_> = self.relationships.values().collect();
        rels.sort_by(|a, b| a.name.cmp(&b.name));
        rels
    }

    pub fn get_unique_key(&self, name: &str) -> Option<&UniqueKey> {
        self.unique_keys.iter().find(|k| k.name == name)
    }

    /// Fields an upsert on this entity conflicts on.
    ///
    /// An explicit conflict key wins, then a sole declared unique key, then
    /// the primary key. Several unique keys without an explicit choice are
    /// rejected rather than guessed.
    pub fn conflict_key(&self) -> ComposeResult<Vec<&FieldDefinition>> {
        let unsupported = |reason: &str| ComposeError::UnsupportedUpsertTarget {
            entity: self.name.clone(),
            reason: reason.to_string(),
        };

        let names: &[String] = if let Some(ref name) = self.conflict_key {
            &self
                .get_unique_key(name)
                .ok_or_else(|| unsupported("configured conflict key is not declared"))?
                .fields
        } else {
            match self.unique_keys.as_slice() {
                [only] => &only.fields,
                [] if !self.primary_key.is_empty() => &self.primary_key,
                [] => return Err(unsupported("no primary key or unique key declared")),
                _ => {
                    return Err(unsupported(
                        "several unique keys declared and no conflict key chosen",
                    ))
                }
            }
        };

        names.iter().map(|n| self.get_field(n)).collect()
    }
}

/// Description of one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    /// Logical name (e.g., "postId")
    pub name: String,
    /// SQL column name (typically snake_case)
    pub column_name: String,
    pub field_type: FieldType,
    /// Whether the field can be null
    pub nullable: bool,
    /// Length for string columns in DDL
    pub length: Option<u32>,
}

impl FieldDefinition {
    /// Create a new field description
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        let column_name = to_snake_case(&name);
        Self {
            name,
            column_name,
            field_type,
            nullable: true,
            length: None,
        }
    }

    /// Set the SQL column name
    pub fn with_column_name(mut self, column_name: impl Into<String>) -> Self {
        self.column_name = column_name.into();
        self
    }

    /// Set whether the field can be null
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the field length
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }
}

/// Scalar field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    Id,
    String,
    Text,
    Int,
    Float,
    Bool,
    Date,
    DateTime,
    ForeignKey,
}

impl FieldType {
    /// LIKE only makes sense on character data
    pub fn supports_like(&self) -> bool {
        matches!(
            self,
            FieldType::Id | FieldType::String | FieldType::Text | FieldType::ForeignKey
        )
    }

    /// Whether `<`, `>`, `<=`, `>=` apply
    pub fn is_ordered(&self) -> bool {
        !matches!(self, FieldType::Bool)
    }
}

/// A relationship from one entity to another
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipDefinition {
    /// Relationship name, also the default join alias (e.g., "account")
    pub name: String,
    /// Target entity logical name
    pub target: String,
    pub kind: RelationshipKind,
}

impl RelationshipDefinition {
    /// The source entity holds `foreign_key` pointing at the target's primary key
    pub fn belongs_to(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: RelationshipKind::BelongsTo {
                foreign_key: foreign_key.into(),
            },
        }
    }

    /// The target entity holds `foreign_key` pointing at the source's primary key
    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: RelationshipKind::HasMany {
                foreign_key: foreign_key.into(),
            },
        }
    }

    /// Rows are linked through the `through` entity's two foreign keys
    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        through: impl Into<String>,
        near_key: impl Into<String>,
        far_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind: RelationshipKind::ManyToMany {
                through: through.into(),
                near_key: near_key.into(),
                far_key: far_key.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationshipKind {
    BelongsTo {
        foreign_key: String,
    },
    HasMany {
        foreign_key: String,
    },
    ManyToMany {
        /// Join-table entity
        through: String,
        /// Field on `through` pointing at the source
        near_key: String,
        /// Field on `through` pointing at the target
        far_key: String,
    },
}

/// Named unique key
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueKey {
    pub name: String,
    pub fields: Vec<String>,
}

/// Convert a logical name to snake_case for SQL
pub(crate) fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let mut chars = s.chars().peekable();
    let mut prev_was_upper = false;
    let mut prev_was_underscore = true; // Treat start as after underscore

    while let Some(c) = chars.next() {
        if c == '_' {
            result.push('_');
            prev_was_underscore = true;
            prev_was_upper = false;
        } else if c.is_uppercase() {
            // "HTTPApi" -> "http_api": break before an upper that follows a
            // lower, or before the last upper of a run followed by a lower
            if !prev_was_underscore {
                let next_is_lower = chars.peek().map(|c| c.is_lowercase()).unwrap_or(false);
                if !prev_was_upper || next_is_lower {
                    result.push('_');
                }
            }
            result.extend(c.to_lowercase());
            prev_was_upper = true;
            prev_was_underscore = false;
        } else {
            result.extend(c.to_lowercase());
            prev_was_upper = false;
            prev_was_underscore = false;
        }
    }

    result
}

/// Builder collecting entities into a validated [`SchemaMetadata`]
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    entities: Vec<EntityDefinition>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity
    pub fn with_entity(mut self, entity: EntityDefinition) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn add_entity(&mut self, entity: EntityDefinition) {
        self.entities.push(entity);
    }

    /// Validate cross references and freeze the schema
    pub fn build(self) -> ComposeResult<SchemaMetadata> {
        let mut entities = HashMap::with_capacity(self.entities.len());
        for entity in self.entities {
            if entities.contains_key(&entity.name) {
                return Err(ComposeError::InvalidSchema(format!(
                    "entity '{}' is declared more than once",
                    entity.name
                )));
            }
            entities.insert(entity.name.clone(), entity);
        }

        let schema = SchemaMetadata { entities };
        schema.validate()?;
        Ok(schema)
    }
}
