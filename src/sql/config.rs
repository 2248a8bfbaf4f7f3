//! JSON schema configuration
//!
//! The document is deserialized into strongly typed structs that reject
//! unknown keys and unknown field types, then converted into a validated
//! [`SchemaMetadata`].
//!
//! ```json
//! {
//!   "entities": [
//!     {
//!       "name": "PostTag",
//!       "fields": [
//!         { "name": "id", "type": "id" },
//!         { "name": "postId", "type": "foreignKey" },
//!         { "name": "tagId", "type": "foreignKey" },
//!         { "name": "deleted", "type": "bool" }
//!       ],
//!       "uniqueKeys": [{ "name": "postIdTagId", "fields": ["postId", "tagId"] }],
//!       "softDelete": "deleted"
//!     }
//!   ]
//! }
//! ```

use serde::Deserialize;

use super::error::ComposeResult;
use super::schema::{
    EntityDefinition, FieldDefinition, FieldType, RelationshipDefinition, SchemaBuilder,
    SchemaMetadata,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SchemaConfig {
    pub entities: Vec<EntityConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct EntityConfig {
    pub name: String,
    /// Table name; snake_case of `name` when absent
    #[serde(default)]
    pub table: Option<String>,
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
    #[serde(default)]
    pub primary_key: Option<Vec<String>>,
    #[serde(default)]
    pub unique_keys: Vec<UniqueKeyConfig>,
    #[serde(default)]
    pub conflict_key: Option<String>,
    #[serde(default)]
    pub soft_delete: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub length: Option<u32>,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", deny_unknown_fields)]
pub enum RelationshipConfig {
    #[serde(rename_all = "camelCase")]
    BelongsTo {
        name: String,
        entity: String,
        foreign_key: String,
    },
    #[serde(rename_all = "camelCase")]
    HasMany {
        name: String,
        entity: String,
        foreign_key: String,
    },
    #[serde(rename_all = "camelCase")]
    ManyToMany {
        name: String,
        entity: String,
        through: String,
        near_key: String,
        far_key: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UniqueKeyConfig {
    pub name: String,
    pub fields: Vec<String>,
}

impl SchemaConfig {
    /// Convert into a validated schema snapshot
    pub fn into_schema(self) -> ComposeResult<SchemaMetadata> {
        let mut builder = SchemaBuilder::new();
        for entity in self.entities {
            builder.add_entity(entity.into_definition());
        }
        builder.build()
    }
}

impl EntityConfig {
    fn into_definition(self) -> EntityDefinition {
        let mut entity = EntityDefinition::new(&self.name);
        if let Some(table) = self.table {
            entity = entity.with_table_name(table);
        }

        // Duplicate names are rejected when the schema is built
        for field in self.fields {
            let mut def = FieldDefinition::new(field.name, field.field_type)
                .with_nullable(field.nullable);
            if let Some(column) = field.column {
                def = def.with_column_name(column);
            }
            if let Some(length) = field.length {
                def = def.with_length(length);
            }
            entity.add_field(def);
        }

        for rel in self.relationships {
            let def = match rel {
                RelationshipConfig::BelongsTo {
                    name,
                    entity: target,
                    foreign_key,
                } => RelationshipDefinition::belongs_to(name, target, foreign_key),
                RelationshipConfig::HasMany {
                    name,
                    entity: target,
                    foreign_key,
                } => RelationshipDefinition::has_many(name, target, foreign_key),
                RelationshipConfig::ManyToMany {
                    name,
                    entity: target,
                    through,
                    near_key,
                    far_key,
                } => RelationshipDefinition::many_to_many(name, target, through, near_key, far_key),
            };
            entity.add_relationship(def);
        }

        if let Some(primary_key) = self.primary_key {
            entity = entity.with_primary_key(primary_key);
        }
        for key in self.unique_keys {
            entity = entity.with_unique_key(key.name, key.fields);
        }
        if let Some(conflict_key) = self.conflict_key {
            entity = entity.with_conflict_key(conflict_key);
        }
        if let Some(soft_delete) = self.soft_delete {
            entity = entity.with_soft_delete(soft_delete);
        }

        entity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::error::ComposeError;
    use crate::sql::schema::RelationshipKind;

    const BLOG: &str = r#"{
        "entities": [
            {
                "name": "Post",
                "fields": [
                    { "name": "id", "type": "id", "nullable": false },
                    { "name": "name", "type": "string", "length": 255 },
                    { "name": "createdById", "type": "foreignKey" }
                ],
                "relationships": [
                    { "kind": "manyToMany", "name": "tags", "entity": "Tag",
                      "through": "PostTag", "nearKey": "postId", "farKey": "tagId" }
                ]
            },
            {
                "name": "Tag",
                "fields": [
                    { "name": "id", "type": "id" },
                    { "name": "name", "type": "string" }
                ]
            },
            {
                "name": "PostTag",
                "fields": [
                    { "name": "id", "type": "id" },
                    { "name": "postId", "type": "foreignKey" },
                    { "name": "tagId", "type": "foreignKey" },
                    { "name": "deleted", "type": "bool" }
                ],
                "uniqueKeys": [{ "name": "postIdTagId", "fields": ["postId", "tagId"] }],
                "softDelete": "deleted"
            }
        ]
    }"#;

    #[test]
    fn test_load_schema() {
        let schema = SchemaMetadata::from_json(BLOG).unwrap();
        assert_eq!(schema.len(), 3);

        let post = schema.get_entity("Post").unwrap();
        assert_eq!(post.table_name, "post");
        assert!(!post.get_field("id").unwrap().nullable);
        assert_eq!(post.get_field("name").unwrap().length, Some(255));
        assert_eq!(post.get_field("createdById").unwrap().column_name, "created_by_id");

        let tags = post.get_relationship("tags").unwrap();
        assert!(matches!(tags.kind, RelationshipKind::ManyToMany { .. }));

        let post_tag = schema.get_entity("PostTag").unwrap();
        assert_eq!(post_tag.table_name, "post_tag");
        assert_eq!(post_tag.soft_delete_field.as_deref(), Some("deleted"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let source = r#"{ "entities": [ { "name": "A", "fields": [], "colour": "red" } ] }"#;
        assert!(matches!(
            SchemaMetadata::from_json(source),
            Err(ComposeError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_unknown_field_type_rejected() {
        let source = r#"{ "entities": [ { "name": "A", "fields": [ { "name": "x", "type": "blob" } ] } ] }"#;
        assert!(matches!(
            SchemaMetadata::from_json(source),
            Err(ComposeError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let source = r#"{ "entities": [ { "name": "A", "fields": [
            { "name": "x", "type": "int" }, { "name": "x", "type": "int" } ] } ] }"#;
        let err = SchemaMetadata::from_json(source).unwrap_err();
        assert!(err.to_string().contains("declared more than once"));
    }

    #[test]
    fn test_relationship_to_unknown_entity_rejected() {
        let source = r#"{ "entities": [ { "name": "A",
            "fields": [ { "name": "id", "type": "id" }, { "name": "bId", "type": "foreignKey" } ],
            "relationships": [ { "kind": "belongsTo", "name": "b", "entity": "B", "foreignKey": "bId" } ] } ] }"#;
        let err = SchemaMetadata::from_json(source).unwrap_err();
        assert!(err.to_string().contains("unknown entity 'B'"));
    }
}
