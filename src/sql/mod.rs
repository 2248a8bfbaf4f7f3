//! Entity query to SQL composition
//!
//! This module turns entity-oriented queries (see [`crate::ast`] and
//! [`crate::builder`]) into SQL for MySQL, PostgreSQL or SQLite, using a
//! schema that maps logical entities and fields to tables and columns. It can
//! also generate the DDL for that schema.
//!
//! # Overview
//!
//! Composition involves:
//! 1. Describing the schema (entities, fields, relationships, unique keys),
//!    in code or as JSON
//! 2. Building a query with one of the builders
//! 3. Composing it for a dialect: identifiers are resolved against the
//!    schema, filters compiled, and the clauses assembled
//!
//! # Example
//!
//! ```rust
//! use ormsql::{Filter, InsertBuilder, Join, SelectBuilder};
//! use ormsql::sql::{
//!     BindMode, ComposerConfig, DdlGenerator, EntityDefinition, FieldDefinition, FieldType,
//!     QueryComposer, RelationshipDefinition, SchemaBuilder, SqlDialect,
//! };
//!
//! let schema = SchemaBuilder::new()
//!     .with_entity(
//!         EntityDefinition::new("Account")
//!             .with_field(FieldDefinition::new("id", FieldType::Id))
//!             .with_field(FieldDefinition::new("name", FieldType::String))
//!             .with_field(FieldDefinition::new("deleted", FieldType::Bool)),
//!     )
//!     .with_entity(
//!         EntityDefinition::new("Contact")
//!             .with_field(FieldDefinition::new("id", FieldType::Id))
//!             .with_field(FieldDefinition::new("accountId", FieldType::ForeignKey))
//!             .with_relationship(RelationshipDefinition::belongs_to(
//!                 "account", "Account", "accountId",
//!             )),
//!     )
//!     .build()
//!     .unwrap();
//!
//! // Generate DDL
//! let ddl = DdlGenerator::new(SqlDialect::Sqlite).generate_schema(&schema);
//! assert!(ddl.contains("CREATE TABLE \"contact\""));
//!
//! let composer = QueryComposer::new(&schema, SqlDialect::Postgres, ComposerConfig::default());
//!
//! let select = SelectBuilder::new("Contact")
//!     .select(["id", "account.name"])
//!     .join(Join::left("account"))
//!     .filter(Filter::eq("account.name", "Acme"))
//!     .build()
//!     .unwrap();
//! let result = composer.compose_select(&select).unwrap();
//! assert_eq!(
//!     result.sql,
//!     "SELECT \"contact\".\"id\" AS \"id\", \"account\".\"name\" AS \"account.name\" \
//!      FROM \"contact\" LEFT JOIN \"account\" \"account\" ON \"account\".\"id\" = \"contact\".\"account_id\" \
//!      WHERE \"account\".\"name\" = $1"
//! );
//! assert_eq!(result.parameters.len(), 1);
//!
//! let upsert = InsertBuilder::new("Account")
//!     .values([("id", "1"), ("name", "name")])
//!     .update_set([("deleted", 0)])
//!     .build()
//!     .unwrap();
//! let inline = QueryComposer::new(
//!     &schema,
//!     SqlDialect::Postgres,
//!     ComposerConfig { bind_mode: BindMode::Inline, ..Default::default() },
//! );
//! assert_eq!(
//!     inline.compose_insert(&upsert).unwrap().sql,
//!     "INSERT INTO \"account\" (\"id\", \"name\") VALUES ('1', 'name') \
//!      ON CONFLICT(\"id\") DO UPDATE SET \"deleted\" = 0"
//! );
//! ```
//!
//! # Dialects
//!
//! - **MySQL**: backtick quoting, `?` placeholders, `ON DUPLICATE KEY UPDATE`
//! - **PostgreSQL**: `$n` placeholders, `ON CONFLICT (...) DO UPDATE`, FOR UPDATE
//! - **SQLite**: `?n` placeholders, INTEGER booleans, TEXT dates; FOR UPDATE is dropped

pub mod compiler;
pub mod composer;
pub mod config;
pub mod crm_objects;
pub mod ddl;
pub mod dialect;
pub mod error;
pub mod resolver;
pub mod schema;
pub mod store;

// Re-export main types
pub use compiler::{BindMode, ClauseCompiler};
pub use composer::{
    compose_delete, compose_insert, compose_select, compose_update, ComposedQuery,
    ComposerConfig, CompositionStage, QueryComposer,
};
pub use config::SchemaConfig;
pub use crm_objects::create_crm_schema;
pub use ddl::DdlGenerator;
pub use dialect::{
    get_dialect, MysqlDialect, PostgresDialect, SqlDialect, SqlDialectImpl, SqliteDialect,
};
pub use error::{ComposeError, ComposeResult};
pub use resolver::{IdentifierResolver, ResolvedColumn};
pub use schema::{
    EntityDefinition, FieldDefinition, FieldType, RelationshipDefinition, RelationshipKind,
    SchemaBuilder, SchemaMetadata, UniqueKey,
};
pub use store::MetadataStore;
