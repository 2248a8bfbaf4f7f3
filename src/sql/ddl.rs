//! DDL generation for entity schemas

use super::dialect::{get_dialect, SqlDialect, SqlDialectImpl};
use super::schema::{
    to_snake_case, EntityDefinition, FieldDefinition, FieldType, RelationshipKind, SchemaMetadata,
};

/// Length used for id and foreign-key columns without one
const DEFAULT_ID_LENGTH: u32 = 24;
/// Length used for string columns without one
const DEFAULT_STRING_LENGTH: u32 = 255;

/// Generator for SQL DDL (CREATE TABLE, etc.)
pub struct DdlGenerator {
    dialect: &'static dyn SqlDialectImpl,
}

impl DdlGenerator {
    /// Create a new DDL generator for the specified dialect
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect: get_dialect(dialect),
        }
    }

    fn quote(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    fn column_list<'e>(
        &self,
        entity: &'e EntityDefinition,
        fields: impl IntoIterator<Item = &'e String>,
    ) -> String {
        fields
            .into_iter()
            .map(|name| match entity.get_field(name) {
                Ok(field) => self.quote(&field.column_name),
                Err(_) => self.quote(name),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Generate CREATE TABLE with primary key and unique constraints
    pub fn generate_table(&self, entity: &EntityDefinition) -> String {
        let mut lines: Vec<String> = entity
            .fields()
            .map(|field| format!("    {}", self.generate_column(entity, field)))
            .collect();

        if !entity.primary_key.is_empty() {
            lines.push(format!(
                "    PRIMARY KEY ({})",
                self.column_list(entity, &entity.primary_key)
            ));
        }

        for key in &entity.unique_keys {
            lines.push(format!(
                "    CONSTRAINT {} UNIQUE ({})",
                self.quote(&format!(
                    "uniq_{}_{}",
                    entity.table_name,
                    to_snake_case(&key.name)
                )),
                self.column_list(entity, &key.fields)
            ));
        }

        format!(
            "CREATE TABLE {} (\n{}\n)",
            self.dialect.quote_table(&entity.table_name),
            lines.join(",\n")
        )
    }

    /// Generate column definition
    fn generate_column(&self, entity: &EntityDefinition, field: &FieldDefinition) -> String {
        let mut col = format!(
            "{} {}",
            self.quote(&field.column_name),
            self.column_type(field)
        );
        if !field.nullable || entity.primary_key.contains(&field.name) {
            col.push_str(" NOT NULL");
        }
        col
    }

    /// Get SQL column type for a field
    fn column_type(&self, field: &FieldDefinition) -> String {
        let dialect = self.dialect.dialect();
        match field.field_type {
            FieldType::Id | FieldType::ForeignKey => match dialect {
                SqlDialect::Sqlite => "TEXT".to_string(),
                _ => format!("VARCHAR({})", field.length.unwrap_or(DEFAULT_ID_LENGTH)),
            },
            FieldType::String => match dialect {
                SqlDialect::Sqlite => "TEXT".to_string(),
                _ => format!("VARCHAR({})", field.length.unwrap_or(DEFAULT_STRING_LENGTH)),
            },
            FieldType::Text => "TEXT".to_string(),
            FieldType::Int => match dialect {
                SqlDialect::Sqlite => "INTEGER".to_string(),
                _ => "BIGINT".to_string(),
            },
            FieldType::Float => match dialect {
                SqlDialect::Postgres => "DOUBLE PRECISION".to_string(),
                SqlDialect::Mysql => "DOUBLE".to_string(),
                SqlDialect::Sqlite => "REAL".to_string(),
            },
            FieldType::Bool => match dialect {
                SqlDialect::Postgres => "BOOLEAN".to_string(),
                SqlDialect::Mysql => "TINYINT(1)".to_string(),
                SqlDialect::Sqlite => "INTEGER".to_string(), // SQLite uses 0/1
            },
            FieldType::Date => match dialect {
                SqlDialect::Sqlite => "TEXT".to_string(),
                _ => "DATE".to_string(),
            },
            FieldType::DateTime => match dialect {
                SqlDialect::Postgres => "TIMESTAMP".to_string(),
                SqlDialect::Mysql => "DATETIME".to_string(),
                SqlDialect::Sqlite => "TEXT".to_string(), // SQLite stores dates as TEXT
            },
        }
    }

    /// Generate CREATE INDEX statements for foreign keys and the soft-delete flag
    pub fn generate_indexes(&self, entity: &EntityDefinition) -> Vec<String> {
        let table = &entity.table_name;
        let mut indexes = Vec::new();

        for field in entity.fields() {
            let indexed = field.field_type == FieldType::ForeignKey
                || entity.soft_delete_field.as_deref() == Some(field.name.as_str());
            if indexed {
                indexes.push(format!(
                    "CREATE INDEX {} ON {} ({})",
                    self.quote(&format!("idx_{}_{}", table, field.column_name)),
                    self.dialect.quote_table(table),
                    self.quote(&field.column_name)
                ));
            }
        }

        indexes
    }

    /// Generate foreign key constraints for belongs-to relationships.
    ///
    /// Emitted as ALTER TABLE so tables can be created in any order. SQLite
    /// cannot add constraints to an existing table and gets none.
    pub fn generate_foreign_keys(
        &self,
        entity: &EntityDefinition,
        schema: &SchemaMetadata,
    ) -> Vec<String> {
        if self.dialect.dialect() == SqlDialect::Sqlite {
            return Vec::new();
        }

        let mut constraints = Vec::new();
        for rel in entity.relationships() {
            let RelationshipKind::BelongsTo { ref foreign_key } = rel.kind else {
                continue;
            };
            let (Ok(field), Ok(target)) =
                (entity.get_field(foreign_key), schema.get_entity(&rel.target))
            else {
                continue;
            };
            constraints.push(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                self.dialect.quote_table(&entity.table_name),
                self.quote(&format!("fk_{}_{}", entity.table_name, field.column_name)),
                self.quote(&field.column_name),
                self.dialect.quote_table(&target.table_name),
                self.column_list(target, &target.primary_key)
            ));
        }
        constraints
    }

    /// Generate complete DDL for a schema
    pub fn generate_schema(&self, schema: &SchemaMetadata) -> String {
        let entities = schema.entities();
        let mut sql = String::new();

        for entity in &entities {
            sql.push_str(&self.generate_table(entity));
            sql.push_str(";\n\n");
        }

        for entity in &entities {
            for index in self.generate_indexes(entity) {
                sql.push_str(&index);
                sql.push_str(";\n");
            }
        }

        for entity in &entities {
            for constraint in self.generate_foreign_keys(entity, schema) {
                sql.push_str(&constraint);
                sql.push_str(";\n");
            }
        }

        sql
    }

    /// Generate DROP TABLE statement
    pub fn generate_drop_table(&self, entity: &EntityDefinition) -> String {
        format!(
            "DROP TABLE IF EXISTS {}",
            self.dialect.quote_table(&entity.table_name)
        )
    }

    /// Generate DROP TABLE statements for all entities in schema
    pub fn generate_drop_schema(&self, schema: &SchemaMetadata) -> String {
        let mut sql = String::new();
        for entity in schema.entities().into_iter().rev() {
            sql.push_str(&self.generate_drop_table(entity));
            sql.push_str(";\n");
        }
        sql
    }
}
