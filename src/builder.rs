//! Builders for the query model
//!
//! Each builder collects clauses and validates their structure in `build()`.
//! Nothing here consults the schema; logical names are checked when the
//! query is composed.

use std::collections::HashSet;

use crate::ast::{
    Assignment, DeleteQuery, Direction, Expression, Filter, InsertQuery, InsertSource, Join,
    JoinTarget, OnConflict, OrderBy, SelectItem, SelectQuery, UpdateQuery, Value,
};
use crate::sql::error::{ComposeError, ComposeResult};

fn and_filter(existing: Option<Filter>, filter: Filter) -> Option<Filter> {
    Some(match existing {
        Some(existing) => existing.and_with(filter),
        None => filter,
    })
}

///
/// SelectBuilder
///

#[derive(Debug, Clone)]
pub struct SelectBuilder {
    query: SelectQuery,
}

impl SelectBuilder {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            query: SelectQuery {
                entity: entity.into(),
                alias: None,
                distinct: false,
                items: Vec::new(),
                joins: Vec::new(),
                filter: None,
                group_by: Vec::new(),
                having: None,
                order_by: Vec::new(),
                limit: None,
                offset: None,
                for_update: false,
            },
        }
    }

    /// Alias the main entity in FROM
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.query.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.query.distinct = true;
        self
    }

    /// Append select items; leaving the list empty selects every field
    #[must_use]
    pub fn select<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        self.query.items.extend(items.into_iter().map(Into::into));
        self
    }

    /// Append one expression under an explicit result name
    #[must_use]
    pub fn select_as(mut self, expression: Expression, alias: impl Into<String>) -> Self {
        self.query.items.push(SelectItem {
            expression,
            alias: Some(alias.into()),
        });
        self
    }

    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.query.joins.push(join);
        self
    }

    /// Add a WHERE condition, AND-ing with any existing one
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filter = and_filter(self.query.filter.take(), filter);
        self
    }

    #[must_use]
    pub fn group_by(mut self, expression: impl Into<Expression>) -> Self {
        self.query.group_by.push(expression.into());
        self
    }

    /// Add a HAVING condition, AND-ing with any existing one
    #[must_use]
    pub fn having(mut self, filter: Filter) -> Self {
        self.query.having = and_filter(self.query.having.take(), filter);
        self
    }

    #[must_use]
    pub fn order_by(mut self, expression: impl Into<Expression>, direction: Direction) -> Self {
        self.query.order_by.push(OrderBy {
            expression: expression.into(),
            direction,
        });
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.query.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn for_update(mut self) -> Self {
        self.query.for_update = true;
        self
    }

    /// Check join aliases and sources, then freeze the query
    pub fn build(self) -> ComposeResult<SelectQuery> {
        let mut aliases: HashSet<&str> = HashSet::new();
        if let Some(ref alias) = self.query.alias {
            aliases.insert(alias);
        }

        for join in &self.query.joins {
            if let Some(ref source) = join.source {
                if !aliases.contains(source.as_str()) {
                    return Err(ComposeError::InvalidQuery(format!(
                        "join '{}' starts from '{}', which is not declared before it",
                        join.alias, source
                    )));
                }
            }
            if matches!(join.target, JoinTarget::Entity(_)) && join.condition.is_none() {
                return Err(ComposeError::InvalidQuery(format!(
                    "join '{}' on an explicit entity needs a condition",
                    join.alias
                )));
            }
            if !aliases.insert(&join.alias) {
                return Err(ComposeError::AmbiguousAlias(join.alias.clone()));
            }
        }

        Ok(self.query)
    }
}

///
/// InsertBuilder
///

#[derive(Debug, Clone)]
pub struct InsertBuilder {
    entity: String,
    columns: Vec<String>,
    rows: Vec<Vec<(String, Value)>>,
    positional_rows: Vec<Vec<Value>>,
    select: Option<SelectQuery>,
    on_conflict: Option<OnConflict>,
    mixed_conflict_actions: bool,
}

impl InsertBuilder {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            positional_rows: Vec::new(),
            select: None,
            on_conflict: None,
            mixed_conflict_actions: false,
        }
    }

    /// Set the inserted fields and their order.
    ///
    /// Optional when rows are given with [`values`](Self::values): the first
    /// row's field order is used then.
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Add one row as `field => value` pairs; call again for more rows
    #[must_use]
    pub fn values<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.rows.push(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Add one row of values already in column order
    #[must_use]
    pub fn row<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.positional_rows
            .push(values.into_iter().map(Into::into).collect());
        self
    }

    /// Insert the rows a query returns (`INSERT ... SELECT`)
    #[must_use]
    pub fn select(mut self, query: SelectQuery) -> Self {
        self.select = Some(query);
        self
    }

    fn set_on_conflict(&mut self, assignment: Option<Assignment>) {
        self.on_conflict = match (self.on_conflict.take(), assignment) {
            (Some(OnConflict::Update(mut assignments)), Some(a)) => {
                assignments.push(a);
                Some(OnConflict::Update(assignments))
            }
            (None, Some(a)) => Some(OnConflict::Update(vec![a])),
            (None | Some(OnConflict::Ignore), None) => Some(OnConflict::Ignore),
            (existing, _) => {
                self.mixed_conflict_actions = true;
                existing
            }
        };
    }

    /// On a duplicate key, update the existing row with these values
    #[must_use]
    pub fn update_set<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (field, value) in pairs {
            self.set_on_conflict(Some(Assignment {
                field: field.into(),
                value: Expression::Value(value.into()),
            }));
        }
        self
    }

    /// On a duplicate key, update a field with an expression, which may
    /// reference the proposed row through [`Expression::Proposed`]
    #[must_use]
    pub fn update_set_expression(mut self, field: impl Into<String>, value: Expression) -> Self {
        self.set_on_conflict(Some(Assignment {
            field: field.into(),
            value,
        }));
        self
    }

    /// On a duplicate key, keep the existing row
    #[must_use]
    pub fn ignore_duplicates(mut self) -> Self {
        self.set_on_conflict(None);
        self
    }

    pub fn build(self) -> ComposeResult<InsertQuery> {
        let invalid = |msg: String| Err(ComposeError::InvalidQuery(msg));

        if self.mixed_conflict_actions {
            return invalid(format!(
                "insert into '{}' both updates and ignores duplicates",
                self.entity
            ));
        }

        let mut columns = self.columns;
        if columns.is_empty() {
            if let Some(first) = self.rows.first() {
                columns = first.iter().map(|(k, _)| k.clone()).collect();
            }
        }
        if columns.is_empty() {
            return invalid(format!("insert into '{}' has no columns", self.entity));
        }
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return invalid(format!(
                    "insert into '{}' lists column '{}' twice",
                    self.entity, column
                ));
            }
        }

        let has_values = !self.rows.is_empty() || !self.positional_rows.is_empty();
        let source = match (self.select, has_values) {
            (Some(_), true) => {
                return invalid(format!(
                    "insert into '{}' has both value rows and a select",
                    self.entity
                ))
            }
            (None, false) => {
                return invalid(format!("insert into '{}' has no rows", self.entity))
            }
            (Some(query), false) => InsertSource::Select(Box::new(query)),
            (None, true) => {
                let mut rows = Vec::with_capacity(self.rows.len() + self.positional_rows.len());
                for pairs in self.rows {
                    rows.push(order_row(&self.entity, &columns, pairs)?);
                }
                for values in self.positional_rows {
                    if values.len() != columns.len() {
                        return invalid(format!(
                            "insert into '{}' has a row of {} values for {} columns",
                            self.entity,
                            values.len(),
                            columns.len()
                        ));
                    }
                    rows.push(values);
                }
                InsertSource::Values(rows)
            }
        };

        if let Some(OnConflict::Update(ref assignments)) = self.on_conflict {
            check_assignments(&self.entity, assignments)?;
        }

        Ok(InsertQuery {
            entity: self.entity,
            columns,
            source,
            on_conflict: self.on_conflict,
        })
    }
}

/// Arrange a `field => value` row in column order
fn order_row(
    entity: &str,
    columns: &[String],
    mut pairs: Vec<(String, Value)>,
) -> ComposeResult<Vec<Value>> {
    let mut row = Vec::with_capacity(columns.len());
    for column in columns {
        match pairs.iter().position(|(k, _)| k == column) {
            Some(pos) => row.push(pairs.swap_remove(pos).1),
            None => {
                return Err(ComposeError::InvalidQuery(format!(
                    "insert into '{}' has a row without a value for '{}'",
                    entity, column
                )))
            }
        }
    }
    if let Some((extra, _)) = pairs.first() {
        return Err(ComposeError::InvalidQuery(format!(
            "insert into '{}' has a row with unexpected field '{}'",
            entity, extra
        )));
    }
    Ok(row)
}

fn check_assignments(entity: &str, assignments: &[Assignment]) -> ComposeResult<()> {
    let mut seen = HashSet::new();
    for assignment in assignments {
        if !seen.insert(assignment.field.as_str()) {
            return Err(ComposeError::InvalidQuery(format!(
                "'{}' assigns field '{}' twice",
                entity, assignment.field
            )));
        }
    }
    Ok(())
}

///
/// UpdateBuilder
///

#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    entity: String,
    assignments: Vec<Assignment>,
    filter: Option<Filter>,
}

impl UpdateBuilder {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            assignments: Vec::new(),
            filter: None,
        }
    }

    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.push(Assignment {
            field: field.into(),
            value: Expression::Value(value.into()),
        });
        self
    }

    #[must_use]
    pub fn set_expression(mut self, field: impl Into<String>, value: Expression) -> Self {
        self.assignments.push(Assignment {
            field: field.into(),
            value,
        });
        self
    }

    /// Add a WHERE condition, AND-ing with any existing one
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = and_filter(self.filter.take(), filter);
        self
    }

    pub fn build(self) -> ComposeResult<UpdateQuery> {
        if self.assignments.is_empty() {
            return Err(ComposeError::InvalidQuery(format!(
                "update of '{}' sets nothing",
                self.entity
            )));
        }
        check_assignments(&self.entity, &self.assignments)?;
        Ok(UpdateQuery {
            entity: self.entity,
            assignments: self.assignments,
            filter: self.filter,
        })
    }
}

///
/// DeleteBuilder
///

#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    entity: String,
    filter: Option<Filter>,
}

impl DeleteBuilder {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            filter: None,
        }
    }

    /// Add a WHERE condition, AND-ing with any existing one
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = and_filter(self.filter.take(), filter);
        self
    }

    pub fn build(self) -> ComposeResult<DeleteQuery> {
        Ok(DeleteQuery {
            entity: self.entity,
            filter: self.filter,
        })
    }
}
