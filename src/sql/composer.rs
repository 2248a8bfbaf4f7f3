//! Query composition: query model + schema metadata -> SQL text
//!
//! Composition runs in one pass through [`CompositionStage`]s. Identifiers
//! are bound first, then filters and expressions are compiled in the order
//! they appear in the statement text (so parameters line up with
//! placeholders), then the clauses are assembled.

use std::cell::Cell;

use super::compiler::{BindMode, ClauseCompiler, SubqueryCompiler};
use super::dialect::{get_dialect, SqlDialect, SqlDialectImpl};
use super::error::{ComposeError, ComposeResult};
use super::resolver::IdentifierResolver;
use super::schema::SchemaMetadata;
use crate::ast::{
    Assignment, DeleteQuery, Expression, InsertQuery, InsertSource, OnConflict, Query,
    SelectQuery, UpdateQuery, Value,
};

/// Result of composing one statement
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedQuery {
    /// The generated SQL statement
    pub sql: String,
    /// Bind parameters, in placeholder order (empty in inline mode)
    pub parameters: Vec<Value>,
}

/// Configuration for query composition
#[derive(Debug, Clone)]
pub struct ComposerConfig {
    /// How literal values are rendered
    pub bind_mode: BindMode,
    /// Maximum nesting depth of filter trees, sub-queries included
    pub max_filter_depth: usize,
    /// Whether selects skip soft-deleted rows of entities that declare a
    /// soft-delete field
    pub filter_deleted: bool,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            bind_mode: BindMode::Parameterized,
            max_filter_depth: 32,
            filter_deleted: false,
        }
    }
}

/// Where a composition was when it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionStage {
    ResolvingIdentifiers,
    CompilingFilters,
    AssemblingClauses,
    Done,
}

/// Composes SQL for one schema snapshot and dialect
pub struct QueryComposer<'a> {
    schema: &'a SchemaMetadata,
    dialect: &'static dyn SqlDialectImpl,
    config: ComposerConfig,
    /// Stage of the statement being composed; nested selects leave it alone
    stage: Cell<CompositionStage>,
}

impl<'a> QueryComposer<'a> {
    pub fn new(schema: &'a SchemaMetadata, dialect: SqlDialect, config: ComposerConfig) -> Self {
        Self {
            schema,
            dialect: get_dialect(dialect),
            config,
            stage: Cell::new(CompositionStage::Done),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect.dialect()
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Compose any statement kind
    pub fn compose(&self, query: &Query) -> ComposeResult<ComposedQuery> {
        match query {
            Query::Select(q) => self.compose_select(q),
            Query::Insert(q) => self.compose_insert(q),
            Query::Update(q) => self.compose_update(q),
            Query::Delete(q) => self.compose_delete(q),
        }
    }

    pub fn compose_select(&self, query: &SelectQuery) -> ComposeResult<ComposedQuery> {
        self.run("select", &query.entity, |compiler| {
            self.select_sql(query, None, compiler, true, false)
        })
    }

    pub fn compose_insert(&self, query: &InsertQuery) -> ComposeResult<ComposedQuery> {
        self.run("insert", &query.entity, |compiler| {
            self.insert_sql(query, compiler)
        })
    }

    pub fn compose_update(&self, query: &UpdateQuery) -> ComposeResult<ComposedQuery> {
        self.run("update", &query.entity, |compiler| {
            self.update_sql(query, compiler)
        })
    }

    pub fn compose_delete(&self, query: &DeleteQuery) -> ComposeResult<ComposedQuery> {
        self.run("delete", &query.entity, |compiler| {
            self.delete_sql(query, compiler)
        })
    }

    /// Drive one composition, logging where it stopped on failure
    fn run<F>(&self, kind: &'static str, entity: &str, compose: F) -> ComposeResult<ComposedQuery>
    where
        F: FnOnce(&mut ClauseCompiler<'static>) -> ComposeResult<String>,
    {
        let mut compiler = ClauseCompiler::new(
            self.dialect,
            self.config.bind_mode,
            self.config.max_filter_depth,
        );
        self.stage.set(CompositionStage::ResolvingIdentifiers);

        match compose(&mut compiler) {
            Ok(sql) => {
                self.stage.set(CompositionStage::Done);
                let parameters = compiler.into_parameters();
                tracing::debug!(
                    kind,
                    entity,
                    dialect = self.dialect.dialect().as_str(),
                    parameters = parameters.len(),
                    sql = %sql,
                    "composed statement"
                );
                Ok(ComposedQuery { sql, parameters })
            }
            Err(err) => {
                let stage = self.stage.replace(CompositionStage::Done);
                tracing::debug!(kind, entity, stage = ?stage, error = %err, "composition aborted");
                Err(err)
            }
        }
    }

    fn enter(&self, stage: CompositionStage, top_level: bool) {
        if top_level {
            self.stage.set(stage);
        }
    }

    fn select_sql(
        &self,
        query: &SelectQuery,
        parent: Option<&IdentifierResolver<'_, '_>>,
        compiler: &mut ClauseCompiler<'_>,
        top_level: bool,
        force_where: bool,
    ) -> ComposeResult<String> {
        self.enter(CompositionStage::ResolvingIdentifiers, top_level);
        let (resolver, joins) =
            IdentifierResolver::for_select(self.schema, self.dialect, query, parent)?;
        let entity = resolver.main_entity();

        self.enter(CompositionStage::CompilingFilters, top_level);

        let items = if query.items.is_empty() {
            entity
                .fields()
                .map(|field| -> ComposeResult<String> {
                    let column = resolver.resolve_field(&field.name)?;
                    Ok(format!(
                        "{} AS {}",
                        column.sql,
                        self.dialect.quote_identifier(&field.name)
                    ))
                })
                .collect::<ComposeResult<Vec<_>>>()?
        } else {
            let mut items = Vec::with_capacity(query.items.len());
            for item in &query.items {
                let sql = compiler.compile_expression(&item.expression, &resolver)?;
                let alias = match (&item.alias, &item.expression) {
                    (Some(alias), _) => Some(alias.as_str()),
                    (None, Expression::Column(path)) => Some(path.as_str()),
                    (None, _) => None,
                };
                items.push(match alias {
                    Some(alias) => format!("{} AS {}", sql, self.dialect.quote_identifier(alias)),
                    None => sql,
                });
            }
            items
        };

        let mut join_sql = Vec::with_capacity(joins.len());
        for join in &joins {
            // An ON condition cannot reach joins that come after it
            let scoped = resolver.with_visible_joins(join.visible_joins);
            let condition = match (&join.implied, join.condition) {
                (Some(implied), Some(filter)) => format!(
                    "{} AND {}",
                    implied,
                    compiler.compile_conjunct(filter, &scoped, self)?
                ),
                (Some(implied), None) => implied.clone(),
                (None, Some(filter)) => compiler.compile_filter(filter, &scoped, self)?,
                (None, None) => {
                    return Err(ComposeError::InvalidQuery(format!(
                        "join {} has no condition",
                        join.table
                    )))
                }
            };
            join_sql.push(format!(
                "{} {} ON {}",
                join.join_type.as_sql(),
                join.table,
                condition
            ));
        }

        let mut conditions = Vec::with_capacity(2);
        let soft_delete = match entity.soft_delete_field {
            Some(ref field) if self.config.filter_deleted => Some(field),
            _ => None,
        };
        if let Some(ref filter) = query.filter {
            conditions.push(if soft_delete.is_some() {
                compiler.compile_conjunct(filter, &resolver, self)?
            } else {
                compiler.compile_filter(filter, &resolver, self)?
            });
        }
        if let Some(field) = soft_delete {
            conditions.push(format!(
                "{} = {}",
                resolver.resolve_field(field)?.sql,
                self.dialect.boolean_literal(false)
            ));
        }

        let group_by = query
            .group_by
            .iter()
            .map(|expr| compiler.compile_expression(expr, &resolver))
            .collect::<ComposeResult<Vec<_>>>()?;

        let having = match query.having {
            Some(ref filter) => Some(compiler.compile_filter(filter, &resolver, self)?),
            None => None,
        };

        let order_by = query
            .order_by
            .iter()
            .map(|order| -> ComposeResult<String> {
                Ok(format!(
                    "{} {}",
                    compiler.compile_expression(&order.expression, &resolver)?,
                    order.direction.as_sql()
                ))
            })
            .collect::<ComposeResult<Vec<_>>>()?;

        self.enter(CompositionStage::AssemblingClauses, top_level);

        let mut sql = String::from("SELECT ");
        if query.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&items.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&resolver.main_table());
        for join in &join_sql {
            sql.push(' ');
            sql.push_str(join);
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        } else if force_where {
            sql.push_str(" WHERE 1");
        }
        if !group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&group_by.join(", "));
        }
        if let Some(having) = having {
            sql.push_str(" HAVING ");
            sql.push_str(&having);
        }
        if !order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by.join(", "));
        }
        let limit = self.dialect.limit_offset(query.limit, query.offset);
        if !limit.is_empty() {
            sql.push(' ');
            sql.push_str(&limit);
        }
        if query.for_update {
            match self.dialect.for_update() {
                Some(clause) => {
                    sql.push(' ');
                    sql.push_str(clause);
                }
                None => tracing::warn!(
                    dialect = self.dialect.dialect().as_str(),
                    entity = %query.entity,
                    "FOR UPDATE is not supported by this dialect; clause dropped"
                ),
            }
        }

        Ok(sql)
    }

    fn insert_sql(
        &self,
        query: &InsertQuery,
        compiler: &mut ClauseCompiler<'_>,
    ) -> ComposeResult<String> {
        let resolver = IdentifierResolver::for_entity(self.schema, self.dialect, &query.entity)?;
        let entity = resolver.main_entity();

        let columns = query
            .columns
            .iter()
            .map(|field| resolver.resolve_unqualified(field))
            .collect::<ComposeResult<Vec<_>>>()?;

        // Conflict target and assignment columns are bound before any value
        let upsert = match query.on_conflict {
            Some(ref on_conflict) => {
                let conflict_columns = entity
                    .conflict_key()?
                    .into_iter()
                    .map(|field| self.dialect.quote_identifier(&field.column_name))
                    .collect::<Vec<_>>();
                let assignments: &[Assignment] = match on_conflict {
                    OnConflict::Update(assignments) => assignments,
                    OnConflict::Ignore => &[],
                };
                let targets = assignments
                    .iter()
                    .map(|a| resolver.resolve_unqualified(&a.field))
                    .collect::<ComposeResult<Vec<_>>>()?;
                Some((conflict_columns, assignments, targets))
            }
            None => None,
        };

        self.stage.set(CompositionStage::CompilingFilters);

        let source = match query.source {
            InsertSource::Values(ref rows) => {
                let rows = rows
                    .iter()
                    .map(|row| {
                        let values: Vec<String> = row.iter().map(|v| compiler.bind(v)).collect();
                        format!("({})", values.join(", "))
                    })
                    .collect::<Vec<_>>();
                format!("VALUES {}", rows.join(", "))
            }
            InsertSource::Select(ref select) => {
                // SQLite reads a bare `SELECT ... ON CONFLICT` as a join
                // constraint, so the select needs some WHERE clause
                let force_where =
                    upsert.is_some() && self.dialect.dialect() == SqlDialect::Sqlite;
                self.select_sql(select, None, compiler, false, force_where)?
            }
        };

        let upsert_sql = match upsert {
            Some((conflict_columns, assignments, targets)) => {
                compiler.set_allow_proposed(true);
                let values = assignments
                    .iter()
                    .map(|a| compiler.compile_expression(&a.value, &resolver))
                    .collect::<ComposeResult<Vec<_>>>();
                compiler.set_allow_proposed(false);
                let pairs: Vec<(String, String)> = targets.into_iter().zip(values?).collect();
                Some(
                    self.dialect
                        .compose_upsert(&columns, &conflict_columns, &pairs),
                )
            }
            None => None,
        };

        self.stage.set(CompositionStage::AssemblingClauses);

        let mut sql = format!(
            "INSERT INTO {} ({}) {}",
            resolver.main_table(),
            columns.join(", "),
            source
        );
        if let Some(upsert) = upsert_sql {
            sql.push(' ');
            sql.push_str(&upsert);
        }
        Ok(sql)
    }

    fn update_sql(
        &self,
        query: &UpdateQuery,
        compiler: &mut ClauseCompiler<'_>,
    ) -> ComposeResult<String> {
        let resolver = IdentifierResolver::for_entity(self.schema, self.dialect, &query.entity)?;
        let targets = query
            .assignments
            .iter()
            .map(|a| resolver.resolve_unqualified(&a.field))
            .collect::<ComposeResult<Vec<_>>>()?;

        self.stage.set(CompositionStage::CompilingFilters);
        let mut set = Vec::with_capacity(targets.len());
        for (target, assignment) in targets.iter().zip(&query.assignments) {
            set.push(format!(
                "{} = {}",
                target,
                compiler.compile_expression(&assignment.value, &resolver)?
            ));
        }
        let where_sql = match query.filter {
            Some(ref filter) => Some(compiler.compile_filter(filter, &resolver, self)?),
            None => None,
        };

        self.stage.set(CompositionStage::AssemblingClauses);
        let mut sql = format!("UPDATE {} SET {}", resolver.main_table(), set.join(", "));
        if let Some(w) = where_sql {
            sql.push_str(" WHERE ");
            sql.push_str(&w);
        }
        Ok(sql)
    }

    fn delete_sql(
        &self,
        query: &DeleteQuery,
        compiler: &mut ClauseCompiler<'_>,
    ) -> ComposeResult<String> {
        let resolver = IdentifierResolver::for_entity(self.schema, self.dialect, &query.entity)?;

        self.stage.set(CompositionStage::CompilingFilters);
        let where_sql = match query.filter {
            Some(ref filter) => Some(compiler.compile_filter(filter, &resolver, self)?),
            None => None,
        };

        self.stage.set(CompositionStage::AssemblingClauses);
        let mut sql = format!("DELETE FROM {}", resolver.main_table());
        if let Some(w) = where_sql {
            sql.push_str(" WHERE ");
            sql.push_str(&w);
        }
        Ok(sql)
    }
}

impl SubqueryCompiler for QueryComposer<'_> {
    fn compile_subquery(
        &self,
        query: &SelectQuery,
        parent: &IdentifierResolver<'_, '_>,
        compiler: &mut ClauseCompiler<'_>,
    ) -> ComposeResult<String> {
        self.select_sql(query, Some(parent), compiler, false, false)
    }
}

/// Compose a select with the default configuration
pub fn compose_select(
    query: &SelectQuery,
    schema: &SchemaMetadata,
    dialect: SqlDialect,
) -> ComposeResult<ComposedQuery> {
    QueryComposer::new(schema, dialect, ComposerConfig::default()).compose_select(query)
}

/// Compose an insert with the default configuration
pub fn compose_insert(
    query: &InsertQuery,
    schema: &SchemaMetadata,
    dialect: SqlDialect,
) -> ComposeResult<ComposedQuery> {
    QueryComposer::new(schema, dialect, ComposerConfig::default()).compose_insert(query)
}

/// Compose an update with the default configuration
pub fn compose_update(
    query: &UpdateQuery,
    schema: &SchemaMetadata,
    dialect: SqlDialect,
) -> ComposeResult<ComposedQuery> {
    QueryComposer::new(schema, dialect, ComposerConfig::default()).compose_update(query)
}

/// Compose a delete with the default configuration
pub fn compose_delete(
    query: &DeleteQuery,
    schema: &SchemaMetadata,
    dialect: SqlDialect,
) -> ComposeResult<ComposedQuery> {
    QueryComposer::new(schema, dialect, ComposerConfig::default()).compose_delete(query)
}
