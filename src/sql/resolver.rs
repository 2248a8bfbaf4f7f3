//! Binding of logical names to quoted SQL identifiers
//!
//! A resolver is built per statement. It knows the main entity, every join
//! alias the statement declares and, for sub-queries, the enclosing
//! statement's resolver.

use std::collections::HashSet;

use super::dialect::SqlDialectImpl;
use super::error::{ComposeError, ComposeResult};
use super::schema::{EntityDefinition, FieldDefinition, RelationshipKind, SchemaMetadata};
use crate::ast::{Filter, Join, JoinTarget, JoinType, SelectQuery};

/// A field bound to its qualified SQL column
#[derive(Debug, Clone)]
pub struct ResolvedColumn<'a> {
    /// e.g. `"account"."name"`
    pub sql: String,
    pub field: &'a FieldDefinition,
}

/// One entity in scope under an alias
#[derive(Debug, Clone)]
struct Scope<'a> {
    /// Logical alias used in field paths
    alias: String,
    /// Alias of the scope this one was joined from; `None` for the main entity
    source: Option<String>,
    /// Quoted qualifier used in SQL
    qualifier: String,
    entity: &'a EntityDefinition,
}

/// A join ready to render
#[derive(Debug, Clone)]
pub struct ResolvedJoin<'q> {
    pub join_type: JoinType,
    /// `"table" "alias"`
    pub table: String,
    /// Condition implied by the relationship, if any
    pub implied: Option<String>,
    /// Caller condition, compiled later in text order
    pub condition: Option<&'q Filter>,
    /// Number of joins in scope for `condition`: this one and those before it
    pub visible_joins: usize,
}

pub struct IdentifierResolver<'a, 'p> {
    dialect: &'a dyn SqlDialectImpl,
    main: Scope<'a>,
    /// Main entity name, usable as a path prefix
    main_prefix: String,
    /// Whether FROM renders an explicit alias
    aliased: bool,
    joins: Vec<Scope<'a>>,
    parent: Option<&'p IdentifierResolver<'a, 'p>>,
}

impl<'a, 'p> IdentifierResolver<'a, 'p> {
    /// Resolver for a single-table statement
    pub fn for_entity(
        schema: &'a SchemaMetadata,
        dialect: &'a dyn SqlDialectImpl,
        entity: &str,
    ) -> ComposeResult<Self> {
        let entity = schema.get_entity(entity)?;
        Ok(Self {
            dialect,
            main: Scope {
                alias: entity.name.clone(),
                source: None,
                qualifier: dialect.quote_table(&entity.table_name),
                entity,
            },
            main_prefix: entity.name.clone(),
            aliased: false,
            joins: Vec::new(),
            parent: None,
        })
    }

    /// Resolver for a select, plus its joins in declaration order
    pub fn for_select<'q>(
        schema: &'a SchemaMetadata,
        dialect: &'a dyn SqlDialectImpl,
        query: &'q SelectQuery,
        parent: Option<&'p IdentifierResolver<'a, 'p>>,
    ) -> ComposeResult<(Self, Vec<ResolvedJoin<'q>>)> {
        let entity = schema.get_entity(&query.entity)?;
        let (alias, qualifier) = match query.alias {
            Some(ref alias) => (alias.clone(), dialect.quote_identifier(alias)),
            None => (entity.name.clone(), dialect.quote_table(&entity.table_name)),
        };

        let mut resolver = Self {
            dialect,
            main: Scope {
                alias,
                source: None,
                qualifier,
                entity,
            },
            main_prefix: entity.name.clone(),
            aliased: query.alias.is_some(),
            joins: Vec::with_capacity(query.joins.len()),
            parent,
        };

        // Every qualifier in the FROM clause must be distinct, including the
        // generated join-table aliases
        let mut qualifiers = HashSet::new();
        qualifiers.insert(resolver.main.qualifier.clone());

        let mut resolved = Vec::with_capacity(query.joins.len());
        for join in &query.joins {
            let rendered = resolver.add_join(schema, join)?;
            for (qualifier, _) in &rendered {
                if !qualifiers.insert(qualifier.clone()) {
                    return Err(ComposeError::AmbiguousAlias(join.alias.clone()));
                }
            }
            resolved.extend(rendered.into_iter().map(|(_, join)| join));
        }

        Ok((resolver, resolved))
    }

    /// Put a join's entity in scope and render its table reference and
    /// implied condition. Many-to-many joins yield the join-table join first.
    fn add_join<'q>(
        &mut self,
        schema: &'a SchemaMetadata,
        join: &'q Join,
    ) -> ComposeResult<Vec<(String, ResolvedJoin<'q>)>> {
        let source = match join.source {
            Some(ref source) => self.scope(source).ok_or_else(|| {
                ComposeError::InvalidQuery(format!(
                    "join '{}' starts from undeclared alias '{}'",
                    join.alias, source
                ))
            })?,
            None => &self.main,
        };
        let source_qualifier = source.qualifier.clone();
        let source_entity = source.entity;
        let source_alias = source.alias.clone();

        let qualifier = self.dialect.quote_identifier(&join.alias);
        let visible_joins = self.joins.len() + 1;
        let mut rendered = Vec::with_capacity(2);

        let target = match join.target {
            JoinTarget::Entity(ref name) => {
                let target = schema.get_entity(name)?;
                rendered.push((
                    qualifier.clone(),
                    ResolvedJoin {
                        join_type: join.join_type,
                        table: self.table_reference(target, Some(&join.alias)),
                        implied: None,
                        condition: join.condition.as_ref(),
                        visible_joins,
                    },
                ));
                target
            }
            JoinTarget::Relationship(ref name) => {
                let rel = source_entity.get_relationship(name)?;
                let target = schema.get_entity(&rel.target)?;
                let implied = match rel.kind {
                    RelationshipKind::BelongsTo { ref foreign_key } => format!(
                        "{}.{} = {}.{}",
                        qualifier,
                        self.key_column(target)?,
                        source_qualifier,
                        self.column(source_entity, foreign_key)?
                    ),
                    RelationshipKind::HasMany { ref foreign_key } => format!(
                        "{}.{} = {}.{}",
                        qualifier,
                        self.column(target, foreign_key)?,
                        source_qualifier,
                        self.key_column(source_entity)?
                    ),
                    RelationshipKind::ManyToMany {
                        ref through,
                        ref near_key,
                        ref far_key,
                    } => {
                        let middle = schema.get_entity(through)?;
                        let middle_alias = format!("{}Middle", join.alias);
                        let middle_qualifier = self.dialect.quote_identifier(&middle_alias);
                        rendered.push((
                            middle_qualifier.clone(),
                            ResolvedJoin {
                                join_type: join.join_type,
                                table: self.table_reference(middle, Some(&middle_alias)),
                                implied: Some(format!(
                                    "{}.{} = {}.{}",
                                    middle_qualifier,
                                    self.column(middle, near_key)?,
                                    source_qualifier,
                                    self.key_column(source_entity)?
                                )),
                                condition: None,
                                visible_joins,
                            },
                        ));
                        format!(
                            "{}.{} = {}.{}",
                            qualifier,
                            self.key_column(target)?,
                            middle_qualifier,
                            self.column(middle, far_key)?
                        )
                    }
                };
                rendered.push((
                    qualifier.clone(),
                    ResolvedJoin {
                        join_type: join.join_type,
                        table: self.table_reference(target, Some(&join.alias)),
                        implied: Some(implied),
                        condition: join.condition.as_ref(),
                        visible_joins,
                    },
                ));
                target
            }
        };

        self.joins.push(Scope {
            alias: join.alias.clone(),
            source: Some(source_alias),
            qualifier,
            entity: target,
        });
        Ok(rendered)
    }

    /// The same statement scope with only its first `count` joins visible
    pub fn with_visible_joins(&self, count: usize) -> Self {
        Self {
            dialect: self.dialect,
            main: self.main.clone(),
            main_prefix: self.main_prefix.clone(),
            aliased: self.aliased,
            joins: self.joins.iter().take(count).cloned().collect(),
            parent: self.parent,
        }
    }

    fn scope(&self, alias: &str) -> Option<&Scope<'a>> {
        if alias == self.main.alias {
            return Some(&self.main);
        }
        self.joins.iter().find(|s| s.alias == alias)
    }

    /// Quoted column of an entity's field
    fn column(&self, entity: &EntityDefinition, field: &str) -> ComposeResult<String> {
        Ok(self
            .dialect
            .quote_identifier(&entity.get_field(field)?.column_name))
    }

    /// Quoted single-column primary key
    fn key_column(&self, entity: &EntityDefinition) -> ComposeResult<String> {
        match entity.primary_key.as_slice() {
            [key] => self.column(entity, key),
            _ => Err(ComposeError::InvalidQuery(format!(
                "entity '{}' has no single-column primary key to join on",
                entity.name
            ))),
        }
    }

    /// `"table"` or `"table" "alias"`
    pub fn table_reference(&self, entity: &EntityDefinition, alias: Option<&str>) -> String {
        let table = self.dialect.quote_table(&entity.table_name);
        match alias {
            Some(alias) => format!("{} {}", table, self.dialect.quote_identifier(alias)),
            None => table,
        }
    }

    /// FROM reference of the main entity
    pub fn main_table(&self) -> String {
        if self.aliased {
            self.table_reference(self.main.entity, Some(&self.main.alias))
        } else {
            self.dialect.quote_table(&self.main.entity.table_name)
        }
    }

    /// Quoted qualifier of the main entity
    pub fn main_qualifier(&self) -> &str {
        &self.main.qualifier
    }

    pub fn main_entity(&self) -> &'a EntityDefinition {
        self.main.entity
    }

    /// Bind a field path to its qualified column.
    ///
    /// `"name"` is a field of the main entity. `"account.name"` goes through
    /// the join aliased `account`; longer paths follow joins declared from
    /// the previous alias. Paths this statement cannot bind are tried
    /// against the enclosing statement.
    pub fn resolve_field(&self, path: &str) -> ComposeResult<ResolvedColumn<'a>> {
        let segments: Vec<&str> = path.split('.').collect();
        let (field_name, hops) = match segments.split_last() {
            Some((field, hops)) => (*field, hops),
            None => (path, &[][..]),
        };

        if hops.is_empty() {
            return self.bind(&self.main, field_name);
        }

        match self.walk(path, hops) {
            Ok(scope) => self.bind(scope, field_name),
            Err(err) => match self.parent {
                Some(parent) => parent.resolve_field(path).map_err(|_| err),
                None => Err(err),
            },
        }
    }

    fn bind(&self, scope: &Scope<'a>, field_name: &str) -> ComposeResult<ResolvedColumn<'a>> {
        let field = scope.entity.get_field(field_name)?;
        Ok(ResolvedColumn {
            sql: format!(
                "{}.{}",
                scope.qualifier,
                self.dialect.quote_identifier(&field.column_name)
            ),
            field,
        })
    }

    /// Follow the alias segments of a path to the scope owning its field
    fn walk(&self, path: &str, hops: &[&str]) -> ComposeResult<&Scope<'a>> {
        let first = hops[0];
        let mut current = if first == self.main.alias || first == self.main_prefix {
            &self.main
        } else {
            match self.joins.iter().find(|s| s.alias == first) {
                Some(scope) => scope,
                None => return Err(self.missing_join(&self.main, path, first)),
            }
        };

        for hop in &hops[1..] {
            current = match self
                .joins
                .iter()
                .find(|s| s.alias == *hop && s.source.as_deref() == Some(current.alias.as_str()))
            {
                Some(scope) => scope,
                None => return Err(self.missing_join(current, path, hop)),
            };
        }
        Ok(current)
    }

    /// Error for a path segment with no join: an unknown relationship is
    /// reported as such, a known one as a missing join.
    fn missing_join(&self, scope: &Scope<'a>, path: &str, alias: &str) -> ComposeError {
        match scope.entity.get_relationship(alias) {
            Ok(_) => ComposeError::MissingJoin {
                path: path.to_string(),
                alias: alias.to_string(),
            },
            Err(err) => err,
        }
    }

    /// Unqualified quoted column for SET, INSERT and upsert lists
    pub fn resolve_unqualified(&self, field: &str) -> ComposeResult<String> {
        Ok(self
            .dialect
            .quote_identifier(self.column_name(field)?))
    }

    /// Raw column name of a main-entity field
    pub fn column_name(&self, field: &str) -> ComposeResult<&'a str> {
        if field.contains('.') {
            return Err(ComposeError::InvalidQuery(format!(
                "'{}' must be a field of '{}', not a path",
                field, self.main.entity.name
            )));
        }
        Ok(&self.main.entity.get_field(field)?.column_name)
    }
}
