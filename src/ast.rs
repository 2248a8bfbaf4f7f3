//! Entity-oriented query model
//!
//! Queries are built through the builders in [`crate::builder`] and are
//! read-only afterwards. Field references use logical names: `"name"` for a
//! field of the main entity, `"account.name"` for a field reached through the
//! join aliased `account`.

use serde::Serialize;

/// A literal value, bound as a parameter or rendered inline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A value expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Field path: `"name"` or `"account.name"`
    Column(String),
    Value(Value),
    Function {
        function: Function,
        args: Vec<Expression>,
    },
    Arithmetic {
        left: Box<Expression>,
        operator: ArithmeticOp,
        right: Box<Expression>,
    },
    /// The value an upsert tried to insert for this field
    /// (`EXCLUDED.col` / `VALUES(col)`); only valid in upsert assignments
    Proposed(String),
}

impl Expression {
    pub fn column(path: impl Into<String>) -> Self {
        Expression::Column(path.into())
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Expression::Value(value.into())
    }

    pub fn proposed(field: impl Into<String>) -> Self {
        Expression::Proposed(field.into())
    }

    pub fn function(function: Function, args: Vec<Expression>) -> Self {
        Expression::Function { function, args }
    }

    /// `COUNT(*)`
    pub fn count_all() -> Self {
        Expression::function(Function::Count, Vec::new())
    }

    pub fn count(path: impl Into<String>) -> Self {
        Expression::function(Function::Count, vec![Expression::column(path)])
    }

    pub fn sum(path: impl Into<String>) -> Self {
        Expression::function(Function::Sum, vec![Expression::column(path)])
    }

    pub fn max(path: impl Into<String>) -> Self {
        Expression::function(Function::Max, vec![Expression::column(path)])
    }

    pub fn min(path: impl Into<String>) -> Self {
        Expression::function(Function::Min, vec![Expression::column(path)])
    }

    pub fn arithmetic(left: Expression, operator: ArithmeticOp, right: Expression) -> Self {
        Expression::Arithmetic {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }
}

impl From<&str> for Expression {
    fn from(path: &str) -> Self {
        Expression::column(path)
    }
}

impl From<String> for Expression {
    fn from(path: String) -> Self {
        Expression::Column(path)
    }
}

/// SQL functions available in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Lower,
    Upper,
    Coalesce,
}

impl Function {
    pub fn as_str(&self) -> &'static str {
        match self {
            Function::Count => "COUNT",
            Function::Sum => "SUM",
            Function::Avg => "AVG",
            Function::Min => "MIN",
            Function::Max => "MAX",
            Function::Lower => "LOWER",
            Function::Upper => "UPPER",
            Function::Coalesce => "COALESCE",
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Function::Count | Function::Sum | Function::Avg | Function::Min | Function::Max
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
        }
    }
}

/// Comparison operators usable in a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equals,
    NotEquals,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl ComparisonOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ComparisonOp::Equals => "=",
            ComparisonOp::NotEquals => "<>",
            ComparisonOp::Greater => ">",
            ComparisonOp::Less => "<",
            ComparisonOp::GreaterOrEqual => ">=",
            ComparisonOp::LessOrEqual => "<=",
            ComparisonOp::Like => "LIKE",
            ComparisonOp::NotLike => "NOT LIKE",
            ComparisonOp::In => "IN",
            ComparisonOp::NotIn => "NOT IN",
            ComparisonOp::IsNull => "IS NULL",
            ComparisonOp::IsNotNull => "IS NOT NULL",
        }
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    List(Vec<Value>),
    Expression(Expression),
    /// For IS NULL / IS NOT NULL
    None,
}

/// A WHERE / HAVING / ON condition tree
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        left: Expression,
        operator: ComparisonOp,
        right: Operand,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// `<expression> [NOT] IN (<select>)`
    InSubquery {
        expression: Expression,
        negated: bool,
        query: Box<SelectQuery>,
    },
    /// `[NOT] EXISTS (<select>)`
    Exists {
        negated: bool,
        query: Box<SelectQuery>,
    },
}

impl Filter {
    pub fn compare(left: Expression, operator: ComparisonOp, right: Operand) -> Self {
        Filter::Compare {
            left,
            operator,
            right,
        }
    }

    fn field_value(path: impl Into<String>, operator: ComparisonOp, value: Value) -> Self {
        Filter::compare(Expression::column(path), operator, Operand::Value(value))
    }

    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::field_value(path, ComparisonOp::Equals, value.into())
    }

    pub fn ne(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::field_value(path, ComparisonOp::NotEquals, value.into())
    }

    pub fn gt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::field_value(path, ComparisonOp::Greater, value.into())
    }

    pub fn lt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::field_value(path, ComparisonOp::Less, value.into())
    }

    pub fn ge(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::field_value(path, ComparisonOp::GreaterOrEqual, value.into())
    }

    pub fn le(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::field_value(path, ComparisonOp::LessOrEqual, value.into())
    }

    pub fn like(path: impl Into<String>, pattern: impl Into<Value>) -> Self {
        Filter::field_value(path, ComparisonOp::Like, pattern.into())
    }

    pub fn not_like(path: impl Into<String>, pattern: impl Into<Value>) -> Self {
        Filter::field_value(path, ComparisonOp::NotLike, pattern.into())
    }

    pub fn in_list<I, V>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::compare(
            Expression::column(path),
            ComparisonOp::In,
            Operand::List(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn not_in<I, V>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::compare(
            Expression::column(path),
            ComparisonOp::NotIn,
            Operand::List(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn is_null(path: impl Into<String>) -> Self {
        Filter::compare(Expression::column(path), ComparisonOp::IsNull, Operand::None)
    }

    pub fn is_not_null(path: impl Into<String>) -> Self {
        Filter::compare(
            Expression::column(path),
            ComparisonOp::IsNotNull,
            Operand::None,
        )
    }

    /// Column-to-column equality, as used in join conditions
    pub fn columns_eq(left: impl Into<String>, right: impl Into<String>) -> Self {
        Filter::compare(
            Expression::column(left),
            ComparisonOp::Equals,
            Operand::Expression(Expression::column(right)),
        )
    }

    /// AND of `field = value` for every pair, in order
    pub fn matching<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut children: Vec<Filter> = pairs.into_iter().map(|(k, v)| Filter::eq(k, v)).collect();
        if children.len() == 1 {
            children.remove(0)
        } else {
            Filter::And(children)
        }
    }

    pub fn and(children: Vec<Filter>) -> Self {
        Filter::And(children)
    }

    pub fn or(children: Vec<Filter>) -> Self {
        Filter::Or(children)
    }

    pub fn negate(child: Filter) -> Self {
        Filter::Not(Box::new(child))
    }

    pub fn in_subquery(path: impl Into<String>, query: SelectQuery) -> Self {
        Filter::InSubquery {
            expression: Expression::column(path),
            negated: false,
            query: Box::new(query),
        }
    }

    pub fn not_in_subquery(path: impl Into<String>, query: SelectQuery) -> Self {
        Filter::InSubquery {
            expression: Expression::column(path),
            negated: true,
            query: Box::new(query),
        }
    }

    pub fn exists(query: SelectQuery) -> Self {
        Filter::Exists {
            negated: false,
            query: Box::new(query),
        }
    }

    pub fn not_exists(query: SelectQuery) -> Self {
        Filter::Exists {
            negated: true,
            query: Box::new(query),
        }
    }

    /// Combine with another filter under AND, flattening nested ANDs
    pub fn and_with(self, other: Filter) -> Self {
        match self {
            Filter::And(mut children) => {
                children.push(other);
                Filter::And(children)
            }
            first => Filter::And(vec![first, other]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Left,
    Inner,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Left => "LEFT JOIN",
            JoinType::Inner => "INNER JOIN",
        }
    }
}

/// What a join brings into scope
#[derive(Debug, Clone, PartialEq)]
pub enum JoinTarget {
    /// Relationship declared on the source entity; the ON condition is implied
    Relationship(String),
    /// Any entity; the ON condition must be given explicitly
    Entity(String),
}

/// A join declared on a select
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub target: JoinTarget,
    /// Alias other clauses use to reach the joined fields
    pub alias: String,
    /// Alias of the joined-from scope; `None` means the main entity
    pub source: Option<String>,
    /// Explicit condition, AND-ed to the implied one for relationship joins
    pub condition: Option<Filter>,
}

impl Join {
    /// LEFT JOIN through a relationship, aliased by the relationship name
    pub fn left(relationship: impl Into<String>) -> Self {
        let relationship = relationship.into();
        Self {
            join_type: JoinType::Left,
            alias: relationship.clone(),
            target: JoinTarget::Relationship(relationship),
            source: None,
            condition: None,
        }
    }

    /// INNER JOIN through a relationship
    pub fn inner(relationship: impl Into<String>) -> Self {
        Self {
            join_type: JoinType::Inner,
            ..Self::left(relationship)
        }
    }

    /// Join an arbitrary entity on an explicit condition
    pub fn entity(
        join_type: JoinType,
        entity: impl Into<String>,
        alias: impl Into<String>,
        condition: Filter,
    ) -> Self {
        Self {
            join_type,
            target: JoinTarget::Entity(entity.into()),
            alias: alias.into(),
            source: None,
            condition: Some(condition),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Join from an earlier join's alias instead of the main entity
    pub fn from_alias(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn on(mut self, condition: Filter) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// One item of the SELECT list
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expression: Expression,
    /// Result column name; a column's logical path when `None`
    pub alias: Option<String>,
}

impl From<&str> for SelectItem {
    fn from(path: &str) -> Self {
        SelectItem {
            expression: Expression::column(path),
            alias: None,
        }
    }
}

impl From<Expression> for SelectItem {
    fn from(expression: Expression) -> Self {
        SelectItem {
            expression,
            alias: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expression: Expression,
    pub direction: Direction,
}

/// `field = expression` in UPDATE SET or an upsert
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub field: String,
    pub value: Expression,
}

/// SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub(crate) entity: String,
    pub(crate) alias: Option<String>,
    pub(crate) distinct: bool,
    pub(crate) items: Vec<SelectItem>,
    pub(crate) joins: Vec<Join>,
    pub(crate) filter: Option<Filter>,
    pub(crate) group_by: Vec<Expression>,
    pub(crate) having: Option<Filter>,
    pub(crate) order_by: Vec<OrderBy>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) for_update: bool,
}

impl SelectQuery {
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }
}

/// Where inserted rows come from
#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    /// Rows of values, each in column order
    Values(Vec<Vec<Value>>),
    Select(Box<SelectQuery>),
}

/// What an insert does when a row conflicts on the entity's unique key
#[derive(Debug, Clone, PartialEq)]
pub enum OnConflict {
    /// Update the existing row with these assignments
    Update(Vec<Assignment>),
    /// Keep the existing row untouched
    Ignore,
}

/// INSERT statement
#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub(crate) entity: String,
    pub(crate) columns: Vec<String>,
    pub(crate) source: InsertSource,
    pub(crate) on_conflict: Option<OnConflict>,
}

impl InsertQuery {
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_upsert(&self) -> bool {
        self.on_conflict.is_some()
    }
}

/// UPDATE statement
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    pub(crate) entity: String,
    pub(crate) assignments: Vec<Assignment>,
    pub(crate) filter: Option<Filter>,
}

impl UpdateQuery {
    pub fn entity(&self) -> &str {
        &self.entity
    }
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub(crate) entity: String,
    pub(crate) filter: Option<Filter>,
}

impl DeleteQuery {
    pub fn entity(&self) -> &str {
        &self.entity
    }
}

/// Any statement kind
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(SelectQuery),
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
}

impl From<SelectQuery> for Query {
    fn from(query: SelectQuery) -> Self {
        Query::Select(query)
    }
}

impl From<InsertQuery> for Query {
    fn from(query: InsertQuery) -> Self {
        Query::Insert(query)
    }
}

impl From<UpdateQuery> for Query {
    fn from(query: UpdateQuery) -> Self {
        Query::Update(query)
    }
}

impl From<DeleteQuery> for Query {
    fn from(query: DeleteQuery) -> Self {
        Query::Delete(query)
    }
}
