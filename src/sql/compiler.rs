//! Lowering of filters and expressions to SQL fragments
//!
//! Literals either become placeholders, collected in the order they appear in
//! the statement text, or are rendered inline through the dialect.

use super::dialect::SqlDialectImpl;
use super::error::{ComposeError, ComposeResult};
use super::resolver::IdentifierResolver;
use crate::ast::{ComparisonOp, Expression, Filter, Function, Operand, SelectQuery, Value};

/// How literal values reach the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindMode {
    /// Placeholders plus an ordered parameter list
    #[default]
    Parameterized,
    /// Literals quoted into the SQL text; no parameters
    Inline,
}

/// Renders nested selects for `IN (...)` and `EXISTS (...)`, sharing the
/// caller's parameter list
pub trait SubqueryCompiler {
    fn compile_subquery(
        &self,
        query: &SelectQuery,
        parent: &IdentifierResolver<'_, '_>,
        compiler: &mut ClauseCompiler<'_>,
    ) -> ComposeResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connective {
    And,
    Or,
    None,
}

pub struct ClauseCompiler<'d> {
    dialect: &'d dyn SqlDialectImpl,
    bind_mode: BindMode,
    max_depth: usize,
    depth: usize,
    allow_proposed: bool,
    parameters: Vec<Value>,
}

impl<'d> ClauseCompiler<'d> {
    pub fn new(dialect: &'d dyn SqlDialectImpl, bind_mode: BindMode, max_depth: usize) -> Self {
        Self {
            dialect,
            bind_mode,
            max_depth,
            depth: 0,
            allow_proposed: false,
            parameters: Vec::new(),
        }
    }

    /// Parameters collected so far, in placeholder order
    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    pub fn into_parameters(self) -> Vec<Value> {
        self.parameters
    }

    /// Permit [`Expression::Proposed`] while compiling upsert assignments
    pub fn set_allow_proposed(&mut self, allow: bool) {
        self.allow_proposed = allow;
    }

    /// Placeholder for a value, or the value itself in inline mode
    pub fn bind(&mut self, value: &Value) -> String {
        match self.bind_mode {
            BindMode::Inline => self.dialect.literal(value),
            BindMode::Parameterized => {
                self.parameters.push(value.clone());
                self.dialect.parameter_placeholder(self.parameters.len())
            }
        }
    }

    pub fn compile_expression(
        &mut self,
        expression: &Expression,
        resolver: &IdentifierResolver<'_, '_>,
    ) -> ComposeResult<String> {
        match expression {
            Expression::Column(path) => Ok(resolver.resolve_field(path)?.sql),
            Expression::Value(value) => Ok(self.bind(value)),
            Expression::Function { function, args } => {
                if args.is_empty() {
                    return match function {
                        Function::Count => Ok("COUNT(*)".to_string()),
                        other => Err(ComposeError::InvalidQuery(format!(
                            "{} needs at least one argument",
                            other.as_str()
                        ))),
                    };
                }
                self.descend()?;
                let args = args
                    .iter()
                    .map(|arg| self.compile_expression(arg, resolver))
                    .collect::<ComposeResult<Vec<_>>>();
                self.depth -= 1;
                Ok(format!("{}({})", function.as_str(), args?.join(", ")))
            }
            Expression::Arithmetic {
                left,
                operator,
                right,
            } => {
                self.descend()?;
                let operands = self.compile_operands(left, right, resolver);
                self.depth -= 1;
                let (left, right) = operands?;
                Ok(format!("{} {} {}", left, operator.as_str(), right))
            }
            Expression::Proposed(field) => {
                if !self.allow_proposed {
                    return Err(ComposeError::InvalidQuery(format!(
                        "proposed value of '{}' is only available in upsert assignments",
                        field
                    )));
                }
                Ok(self.dialect.proposed_value(resolver.column_name(field)?))
            }
        }
    }

    fn compile_operands(
        &mut self,
        left: &Expression,
        right: &Expression,
        resolver: &IdentifierResolver<'_, '_>,
    ) -> ComposeResult<(String, String)> {
        let left = self.compile_operand_expression(left, resolver)?;
        let right = self.compile_operand_expression(right, resolver)?;
        Ok((left, right))
    }

    /// Nested arithmetic is parenthesized so precedence survives rendering
    fn compile_operand_expression(
        &mut self,
        expression: &Expression,
        resolver: &IdentifierResolver<'_, '_>,
    ) -> ComposeResult<String> {
        let sql = self.compile_expression(expression, resolver)?;
        if matches!(expression, Expression::Arithmetic { .. }) {
            Ok(format!("({})", sql))
        } else {
            Ok(sql)
        }
    }

    /// One level deeper into a filter or expression tree; the caller steps
    /// back out by decrementing `depth`
    fn descend(&mut self) -> ComposeResult<()> {
        if self.depth >= self.max_depth {
            return Err(ComposeError::FilterDepthExceeded {
                max: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Compile a filter tree
    pub fn compile_filter(
        &mut self,
        filter: &Filter,
        resolver: &IdentifierResolver<'_, '_>,
        subqueries: &dyn SubqueryCompiler,
    ) -> ComposeResult<String> {
        self.compile_node(filter, Connective::None, resolver, subqueries)
    }

    /// Compile a filter that will be AND-ed with other conditions
    pub fn compile_conjunct(
        &mut self,
        filter: &Filter,
        resolver: &IdentifierResolver<'_, '_>,
        subqueries: &dyn SubqueryCompiler,
    ) -> ComposeResult<String> {
        self.compile_node(filter, Connective::And, resolver, subqueries)
    }

    fn compile_node(
        &mut self,
        filter: &Filter,
        parent: Connective,
        resolver: &IdentifierResolver<'_, '_>,
        subqueries: &dyn SubqueryCompiler,
    ) -> ComposeResult<String> {
        self.descend()?;
        let result = self.compile_inner(filter, parent, resolver, subqueries);
        self.depth -= 1;
        result
    }

    fn compile_inner(
        &mut self,
        filter: &Filter,
        parent: Connective,
        resolver: &IdentifierResolver<'_, '_>,
        subqueries: &dyn SubqueryCompiler,
    ) -> ComposeResult<String> {
        match filter {
            Filter::And(children) => {
                self.compile_group(children, Connective::And, parent, resolver, subqueries)
            }
            Filter::Or(children) => {
                self.compile_group(children, Connective::Or, parent, resolver, subqueries)
            }
            Filter::Not(child) => {
                let inner = self.compile_node(child, Connective::None, resolver, subqueries)?;
                Ok(format!("NOT ({})", inner))
            }
            Filter::Compare {
                left,
                operator,
                right,
            } => self.compile_comparison(left, *operator, right, resolver),
            Filter::InSubquery {
                expression,
                negated,
                query,
            } => {
                let left = self.compile_expression(expression, resolver)?;
                let sql = subqueries.compile_subquery(query, resolver, self)?;
                let keyword = if *negated { "NOT IN" } else { "IN" };
                Ok(format!("{} {} ({})", left, keyword, sql))
            }
            Filter::Exists { negated, query } => {
                let sql = subqueries.compile_subquery(query, resolver, self)?;
                let keyword = if *negated { "NOT EXISTS" } else { "EXISTS" };
                Ok(format!("{} ({})", keyword, sql))
            }
        }
    }

    fn compile_group(
        &mut self,
        children: &[Filter],
        connective: Connective,
        parent: Connective,
        resolver: &IdentifierResolver<'_, '_>,
        subqueries: &dyn SubqueryCompiler,
    ) -> ComposeResult<String> {
        let (separator, empty) = match connective {
            Connective::Or => (" OR ", "1=0"),
            _ => (" AND ", "1=1"),
        };
        if children.is_empty() {
            return Ok(empty.to_string());
        }

        let parts = children
            .iter()
            .map(|child| self.compile_node(child, connective, resolver, subqueries))
            .collect::<ComposeResult<Vec<_>>>()?;
        let sql = parts.join(separator);

        if parts.len() > 1 && parent != Connective::None && parent != connective {
            Ok(format!("({})", sql))
        } else {
            Ok(sql)
        }
    }

    fn compile_comparison(
        &mut self,
        left: &Expression,
        operator: ComparisonOp,
        right: &Operand,
        resolver: &IdentifierResolver<'_, '_>,
    ) -> ComposeResult<String> {
        let left_sql = match left {
            Expression::Column(path) => {
                let column = resolver.resolve_field(path)?;
                check_operator(operator, path, column.field.field_type)?;
                column.sql
            }
            other => self.compile_expression(other, resolver)?,
        };

        match operator {
            ComparisonOp::IsNull | ComparisonOp::IsNotNull => {
                return Ok(format!("{} {}", left_sql, operator.as_sql()));
            }
            ComparisonOp::In | ComparisonOp::NotIn => {
                let values: &[Value] = match right {
                    Operand::List(values) => values,
                    Operand::Value(value) => std::slice::from_ref(value),
                    _ => {
                        return Err(ComposeError::InvalidQuery(format!(
                            "{} needs a list of values",
                            operator.as_sql()
                        )))
                    }
                };
                if values.is_empty() {
                    let constant = if operator == ComparisonOp::In { "1=0" } else { "1=1" };
                    return Ok(constant.to_string());
                }
                let placeholders: Vec<String> = values.iter().map(|v| self.bind(v)).collect();
                return Ok(format!(
                    "{} {} ({})",
                    left_sql,
                    operator.as_sql(),
                    placeholders.join(", ")
                ));
            }
            _ => {}
        }

        let right_sql = match right {
            Operand::Value(Value::Null) if operator == ComparisonOp::Equals => {
                return Ok(format!("{} IS NULL", left_sql));
            }
            Operand::Value(Value::Null) if operator == ComparisonOp::NotEquals => {
                return Ok(format!("{} IS NOT NULL", left_sql));
            }
            Operand::Value(value) => self.bind(value),
            Operand::Expression(expression) => self.compile_expression(expression, resolver)?,
            Operand::List(_) | Operand::None => {
                return Err(ComposeError::InvalidQuery(format!(
                    "{} needs a single value",
                    operator.as_sql()
                )))
            }
        };

        Ok(format!("{} {} {}", left_sql, operator.as_sql(), right_sql))
    }
}

/// Reject operators that make no sense for the field's type
fn check_operator(
    operator: ComparisonOp,
    field: &str,
    field_type: super::schema::FieldType,
) -> ComposeResult<()> {
    let valid = match operator {
        ComparisonOp::Like | ComparisonOp::NotLike => field_type.supports_like(),
        ComparisonOp::Greater
        | ComparisonOp::Less
        | ComparisonOp::GreaterOrEqual
        | ComparisonOp::LessOrEqual => field_type.is_ordered(),
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err(ComposeError::InvalidFilterOperator {
            operator,
            field: field.to_string(),
            field_type,
        })
    }
}
