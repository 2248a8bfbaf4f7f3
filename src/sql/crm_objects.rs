//! Sample CRM schema
//!
//! Entities of a small CRM (accounts, contacts, a blog-style stream of posts
//! with tags and comments, and notes). Used by the demo binary and tests,
//! and a reasonable starting point for real schemas.

use super::schema::{
    EntityDefinition, FieldDefinition, FieldType, RelationshipDefinition, SchemaBuilder,
    SchemaMetadata,
};

/// Create the sample CRM schema
pub fn create_crm_schema() -> SchemaMetadata {
    let mut builder = SchemaBuilder::new();

    builder.add_entity(create_user());
    builder.add_entity(create_account());
    builder.add_entity(create_contact());
    builder.add_entity(create_post());
    builder.add_entity(create_tag());
    builder.add_entity(create_post_tag());
    builder.add_entity(create_comment());
    builder.add_entity(create_note());

    match builder.build() {
        Ok(schema) => schema,
        // The definitions below are static; a failure here is a bug in them
        Err(err) => panic!("sample CRM schema is invalid: {}", err),
    }
}

/// Primary key
fn add_id(entity: &mut EntityDefinition) {
    entity.add_field(FieldDefinition::new("id", FieldType::Id).with_nullable(false).with_length(24));
}

/// Audit and soft-delete fields
fn add_system_fields(entity: &mut EntityDefinition) {
    entity.add_field(FieldDefinition::new("createdAt", FieldType::DateTime));
    entity.add_field(FieldDefinition::new("createdById", FieldType::ForeignKey).with_length(24));
    entity.add_relationship(RelationshipDefinition::belongs_to(
        "createdBy",
        "User",
        "createdById",
    ));
    entity.add_field(FieldDefinition::new("deleted", FieldType::Bool).with_nullable(false));
    entity.soft_delete_field = Some("deleted".to_string());
}

fn create_user() -> EntityDefinition {
    let mut entity = EntityDefinition::new("User");
    add_id(&mut entity);
    entity.add_field(FieldDefinition::new("userName", FieldType::String).with_length(50));
    entity.add_field(FieldDefinition::new("firstName", FieldType::String).with_length(100));
    entity.add_field(FieldDefinition::new("lastName", FieldType::String).with_length(100));
    entity.add_field(FieldDefinition::new("isActive", FieldType::Bool));
    entity.add_field(FieldDefinition::new("deleted", FieldType::Bool).with_nullable(false));
    entity
        .with_unique_key("userName", ["userName"])
        .with_soft_delete("deleted")
}

/// Account; upserts conflict on the primary key
fn create_account() -> EntityDefinition {
    let mut entity = EntityDefinition::new("Account");
    add_id(&mut entity);
    entity.add_field(FieldDefinition::new("name", FieldType::String).with_length(249));
    entity.add_field(FieldDefinition::new("type", FieldType::String).with_length(100));
    entity.add_field(FieldDefinition::new("industry", FieldType::String).with_length(100));
    entity.add_field(FieldDefinition::new("website", FieldType::String).with_length(255));
    entity.add_field(FieldDefinition::new("employees", FieldType::Int));
    entity.add_field(FieldDefinition::new("annualRevenue", FieldType::Float));
    entity.add_field(FieldDefinition::new("billingCity", FieldType::String).with_length(100));
    entity.add_field(FieldDefinition::new("description", FieldType::Text));
    add_system_fields(&mut entity);

    entity.add_relationship(RelationshipDefinition::has_many(
        "contacts",
        "Contact",
        "accountId",
    ));
    entity
}

fn create_contact() -> EntityDefinition {
    let mut entity = EntityDefinition::new("Contact");
    add_id(&mut entity);
    entity.add_field(FieldDefinition::new("firstName", FieldType::String).with_length(100));
    entity.add_field(FieldDefinition::new("lastName", FieldType::String).with_length(100));
    entity.add_field(FieldDefinition::new("emailAddress", FieldType::String).with_length(255));
    entity.add_field(FieldDefinition::new("birthday", FieldType::Date));
    entity.add_field(FieldDefinition::new("accountId", FieldType::ForeignKey).with_length(24));
    add_system_fields(&mut entity);

    entity.add_relationship(RelationshipDefinition::belongs_to(
        "account",
        "Account",
        "accountId",
    ));
    entity
}

fn create_post() -> EntityDefinition {
    let mut entity = EntityDefinition::new("Post");
    add_id(&mut entity);
    entity.add_field(FieldDefinition::new("name", FieldType::String).with_length(255));
    entity.add_field(FieldDefinition::new("body", FieldType::Text));
    add_system_fields(&mut entity);

    entity.add_relationship(RelationshipDefinition::many_to_many(
        "tags", "Tag", "PostTag", "postId", "tagId",
    ));
    entity.add_relationship(RelationshipDefinition::has_many(
        "comments", "Comment", "postId",
    ));
    entity
}

fn create_tag() -> EntityDefinition {
    let mut entity = EntityDefinition::new("Tag");
    add_id(&mut entity);
    entity.add_field(FieldDefinition::new("name", FieldType::String).with_length(100));
    entity.add_field(FieldDefinition::new("deleted", FieldType::Bool).with_nullable(false));
    entity
        .with_relationship(RelationshipDefinition::many_to_many(
            "posts", "Post", "PostTag", "tagId", "postId",
        ))
        .with_soft_delete("deleted")
}

/// Join table between posts and tags; upserts conflict on the pair
fn create_post_tag() -> EntityDefinition {
    let mut entity = EntityDefinition::new("PostTag");
    add_id(&mut entity);
    entity.add_field(FieldDefinition::new("postId", FieldType::ForeignKey).with_length(24));
    entity.add_field(FieldDefinition::new("tagId", FieldType::ForeignKey).with_length(24));
    entity.add_field(FieldDefinition::new("deleted", FieldType::Bool).with_nullable(false));
    entity
        .with_relationship(RelationshipDefinition::belongs_to("post", "Post", "postId"))
        .with_relationship(RelationshipDefinition::belongs_to("tag", "Tag", "tagId"))
        .with_unique_key("postIdTagId", ["postId", "tagId"])
        .with_soft_delete("deleted")
}

fn create_comment() -> EntityDefinition {
    let mut entity = EntityDefinition::new("Comment");
    add_id(&mut entity);
    entity.add_field(FieldDefinition::new("postId", FieldType::ForeignKey).with_length(24));
    entity.add_field(FieldDefinition::new("body", FieldType::Text));
    entity.add_field(FieldDefinition::new("likes", FieldType::Int));
    add_system_fields(&mut entity);

    entity.add_relationship(RelationshipDefinition::belongs_to("post", "Post", "postId"));
    entity
}

/// Stream note attached to any record through `parentType` + `parentId`
fn create_note() -> EntityDefinition {
    let mut entity = EntityDefinition::new("Note");
    add_id(&mut entity);
    entity.add_field(FieldDefinition::new("type", FieldType::String).with_length(24));
    entity.add_field(FieldDefinition::new("post", FieldType::Text));
    entity.add_field(FieldDefinition::new("parentType", FieldType::String).with_length(100));
    entity.add_field(FieldDefinition::new("parentId", FieldType::ForeignKey).with_length(24));
    add_system_fields(&mut entity);
    entity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::schema::RelationshipKind;

    #[test]
    fn test_crm_schema_has_all_entities() {
        let schema = create_crm_schema();
        let names: Vec<_> = schema.entities().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Account", "Comment", "Contact", "Note", "Post", "PostTag", "Tag", "User"]
        );
    }

    #[test]
    fn test_table_and_column_names() {
        let schema = create_crm_schema();
        let post_tag = schema.get_entity("PostTag").unwrap();
        assert_eq!(post_tag.table_name, "post_tag");
        assert_eq!(post_tag.get_field("postId").unwrap().column_name, "post_id");

        let account = schema.get_entity("Account").unwrap();
        assert_eq!(account.soft_delete_field.as_deref(), Some("deleted"));
        assert_eq!(
            account.get_field("annualRevenue").unwrap().column_name,
            "annual_revenue"
        );
    }

    #[test]
    fn test_relationships() {
        let schema = create_crm_schema();
        let tags = schema.get_relationship("Post", "tags").unwrap();
        assert_eq!(tags.target, "Tag");
        assert!(matches!(tags.kind, RelationshipKind::ManyToMany { ref through, .. } if through == "PostTag"));

        let account = schema.get_relationship("Contact", "account").unwrap();
        assert!(matches!(account.kind, RelationshipKind::BelongsTo { .. }));
    }

    #[test]
    fn test_conflict_keys() {
        let schema = create_crm_schema();
        let names = |entity: &str| -> Vec<String> {
            schema
                .get_entity(entity)
                .unwrap()
                .conflict_key()
                .unwrap()
                .iter()
                .map(|f| f.name.clone())
                .collect()
        };
        assert_eq!(names("Account"), vec!["id"]);
        assert_eq!(names("PostTag"), vec!["postId", "tagId"]);
        assert_eq!(names("User"), vec!["userName"]);
    }
}
