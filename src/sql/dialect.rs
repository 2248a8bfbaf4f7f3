//! SQL dialect abstraction for MySQL, PostgreSQL and SQLite

use crate::ast::Value;

/// Supported SQL dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDialect {
    #[default]
    Postgres,
    Mysql,
    Sqlite,
}

impl SqlDialect {
    /// Look a dialect up by a common engine name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pgsql" => Some(SqlDialect::Postgres),
            "mysql" | "mariadb" => Some(SqlDialect::Mysql),
            "sqlite" | "sqlite3" => Some(SqlDialect::Sqlite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SqlDialect::Postgres => "postgres",
            SqlDialect::Mysql => "mysql",
            SqlDialect::Sqlite => "sqlite",
        }
    }
}

/// Dialect-specific SQL syntax.
///
/// Implementations are stateless; every method is a pure function of its
/// arguments. Column and table names passed in are raw (unquoted) unless the
/// parameter says otherwise.
pub trait SqlDialectImpl: Send + Sync {
    /// Get the dialect type
    fn dialect(&self) -> SqlDialect;

    /// Quote an identifier (column name, alias)
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quote a table name
    fn quote_table(&self, name: &str) -> String {
        self.quote_identifier(name)
    }

    /// Generate placeholder for the bound parameter at 1-based `index`
    fn parameter_placeholder(&self, index: usize) -> String;

    /// Boolean literal
    fn boolean_literal(&self, value: bool) -> &'static str;

    /// Quoted string literal
    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Render a value inline
    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.boolean_literal(*b).to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => self.string_literal(s),
        }
    }

    /// Reference to the value an upsert proposed for a column
    fn proposed_value(&self, column: &str) -> String;

    /// Upsert fragment appended after the VALUES list.
    ///
    /// `insert_columns` and `conflict_columns` are quoted; each assignment is
    /// a quoted column and its rendered value. No assignments means the
    /// conflicting row is left untouched.
    fn compose_upsert(
        &self,
        insert_columns: &[String],
        conflict_columns: &[String],
        assignments: &[(String, String)],
    ) -> String;

    /// LIMIT/OFFSET syntax
    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut result = String::new();
        if let Some(l) = limit {
            result.push_str(&format!("LIMIT {}", l));
        }
        if let Some(o) = offset {
            if !result.is_empty() {
                result.push(' ');
            }
            result.push_str(&format!("OFFSET {}", o));
        }
        result
    }

    /// FOR UPDATE clause (returns None if not supported)
    fn for_update(&self) -> Option<&'static str>;
}

fn join_assignments(assignments: &[(String, String)]) -> String {
    assignments
        .iter()
        .map(|(column, value)| format!("{} = {}", column, value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `ON CONFLICT(...)` form shared by PostgreSQL and SQLite
fn on_conflict(conflict_columns: &[String], assignments: &[(String, String)]) -> String {
    if assignments.is_empty() {
        format!("ON CONFLICT({}) DO NOTHING", conflict_columns.join(", "))
    } else {
        format!(
            "ON CONFLICT({}) DO UPDATE SET {}",
            conflict_columns.join(", "),
            join_assignments(assignments)
        )
    }
}

/// MySQL / MariaDB dialect implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl SqlDialectImpl for MysqlDialect {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Mysql
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn parameter_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn proposed_value(&self, column: &str) -> String {
        format!("VALUES({})", self.quote_identifier(column))
    }

    fn compose_upsert(
        &self,
        insert_columns: &[String],
        _conflict_columns: &[String],
        assignments: &[(String, String)],
    ) -> String {
        // MySQL picks the conflicting key itself; a self-assignment keeps the
        // existing row as it is
        match (assignments, insert_columns.first()) {
            ([], Some(column)) => format!("ON DUPLICATE KEY UPDATE {} = {}", column, column),
            _ => format!("ON DUPLICATE KEY UPDATE {}", join_assignments(assignments)),
        }
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!("LIMIT {}, {}", o, l),
            (Some(l), None) => format!("LIMIT {}", l),
            // MySQL has no bare OFFSET
            (None, Some(o)) => format!("LIMIT {}, {}", o, u64::MAX),
            (None, None) => String::new(),
        }
    }

    fn for_update(&self) -> Option<&'static str> {
        Some("FOR UPDATE")
    }
}

/// PostgreSQL dialect implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialectImpl for PostgresDialect {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    fn parameter_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn proposed_value(&self, column: &str) -> String {
        format!("EXCLUDED.{}", self.quote_identifier(column))
    }

    fn compose_upsert(
        &self,
        _insert_columns: &[String],
        conflict_columns: &[String],
        assignments: &[(String, String)],
    ) -> String {
        on_conflict(conflict_columns, assignments)
    }

    fn for_update(&self) -> Option<&'static str> {
        Some("FOR UPDATE")
    }
}

/// SQLite dialect implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialectImpl for SqliteDialect {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn parameter_placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn proposed_value(&self, column: &str) -> String {
        format!("excluded.{}", self.quote_identifier(column))
    }

    fn compose_upsert(
        &self,
        _insert_columns: &[String],
        conflict_columns: &[String],
        assignments: &[(String, String)],
    ) -> String {
        on_conflict(conflict_columns, assignments)
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            (None, Some(o)) => format!("LIMIT -1 OFFSET {}", o),
            (None, None) => String::new(),
        }
    }

    fn for_update(&self) -> Option<&'static str> {
        // SQLite doesn't support FOR UPDATE (uses file-level locking)
        None
    }
}

/// Get the shared dialect implementation for a given dialect type
pub fn get_dialect(dialect: SqlDialect) -> &'static dyn SqlDialectImpl {
    match dialect {
        SqlDialect::Postgres => &PostgresDialect,
        SqlDialect::Mysql => &MysqlDialect,
        SqlDialect::Sqlite => &SqliteDialect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(PostgresDialect.parameter_placeholder(1), "$1");
        assert_eq!(PostgresDialect.parameter_placeholder(10), "$10");
        assert_eq!(SqliteDialect.parameter_placeholder(3), "?3");
        assert_eq!(MysqlDialect.parameter_placeholder(3), "?");
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(PostgresDialect.quote_identifier("account"), "\"account\"");
        assert_eq!(
            PostgresDialect.quote_identifier("weird\"name"),
            "\"weird\"\"name\""
        );
        assert_eq!(MysqlDialect.quote_identifier("account"), "`account`");
        assert_eq!(MysqlDialect.quote_table("odd`name"), "`odd``name`");
    }

    #[test]
    fn test_literals() {
        let pg = PostgresDialect;
        assert_eq!(pg.literal(&Value::from("it's")), "'it''s'");
        assert_eq!(pg.literal(&Value::Bool(true)), "TRUE");
        assert_eq!(pg.literal(&Value::Int(0)), "0");
        assert_eq!(pg.literal(&Value::Float(1.5)), "1.5");
        assert_eq!(pg.literal(&Value::Null), "NULL");

        let my = MysqlDialect;
        assert_eq!(my.literal(&Value::Bool(false)), "0");
        assert_eq!(my.literal(&Value::from("a\\b'c")), "'a\\\\b''c'");
    }

    #[test]
    fn test_upsert_fragments() {
        let cols = vec!["\"id\"".to_string(), "\"name\"".to_string()];
        let conflict = vec!["\"id\"".to_string()];
        let assignments = vec![("\"deleted\"".to_string(), "0".to_string())];

        assert_eq!(
            PostgresDialect.compose_upsert(&cols, &conflict, &assignments),
            "ON CONFLICT(\"id\") DO UPDATE SET \"deleted\" = 0"
        );
        assert_eq!(
            PostgresDialect.compose_upsert(&cols, &conflict, &[]),
            "ON CONFLICT(\"id\") DO NOTHING"
        );

        let my_cols = vec!["`id`".to_string(), "`name`".to_string()];
        let my_assignments = vec![("`deleted`".to_string(), "0".to_string())];
        assert_eq!(
            MysqlDialect.compose_upsert(&my_cols, &["`id`".to_string()], &my_assignments),
            "ON DUPLICATE KEY UPDATE `deleted` = 0"
        );
        assert_eq!(
            MysqlDialect.compose_upsert(&my_cols, &["`id`".to_string()], &[]),
            "ON DUPLICATE KEY UPDATE `id` = `id`"
        );
        // The self-assignment is the first column as given, already quoted
        let reordered = vec!["`user_name`".to_string(), "`id`".to_string()];
        assert_eq!(
            MysqlDialect.compose_upsert(&reordered, &["`user_name`".to_string()], &[]),
            "ON DUPLICATE KEY UPDATE `user_name` = `user_name`"
        );
    }

    #[test]
    fn test_limit_offset() {
        assert_eq!(PostgresDialect.limit_offset(Some(10), Some(5)), "LIMIT 10 OFFSET 5");
        assert_eq!(PostgresDialect.limit_offset(None, Some(5)), "OFFSET 5");
        assert_eq!(MysqlDialect.limit_offset(Some(10), Some(5)), "LIMIT 5, 10");
        assert_eq!(MysqlDialect.limit_offset(Some(10), None), "LIMIT 10");
        assert_eq!(
            MysqlDialect.limit_offset(None, Some(5)),
            "LIMIT 5, 18446744073709551615"
        );
        assert_eq!(SqliteDialect.limit_offset(None, Some(5)), "LIMIT -1 OFFSET 5");
        assert_eq!(SqliteDialect.limit_offset(None, None), "");
    }

    #[test]
    fn test_proposed_value() {
        assert_eq!(PostgresDialect.proposed_value("name"), "EXCLUDED.\"name\"");
        assert_eq!(MysqlDialect.proposed_value("name"), "VALUES(`name`)");
        assert_eq!(SqliteDialect.proposed_value("name"), "excluded.\"name\"");
    }

    #[test]
    fn test_dialect_lookup() {
        assert_eq!(SqlDialect::from_name("PostgreSQL"), Some(SqlDialect::Postgres));
        assert_eq!(SqlDialect::from_name("mariadb"), Some(SqlDialect::Mysql));
        assert_eq!(SqlDialect::from_name("oracle"), None);
        assert_eq!(get_dialect(SqlDialect::Mysql).dialect(), SqlDialect::Mysql);
    }
}
