//! Error types for query composition

use thiserror::Error;

use super::schema::FieldType;
use crate::ast::ComparisonOp;

/// Errors that can occur while building or composing a query.
///
/// Every variant points at a caller or configuration bug, so none of them is
/// worth retrying.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Unknown field '{field}' on entity '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("Unknown relationship '{relationship}' on entity '{entity}'")]
    UnknownRelationship { entity: String, relationship: String },

    #[error("Field '{path}' requires a join aliased '{alias}' which the query does not declare")]
    MissingJoin { path: String, alias: String },

    #[error("Operator {operator:?} is not valid for field '{field}' of type {field_type:?}")]
    InvalidFilterOperator {
        operator: ComparisonOp,
        field: String,
        field_type: FieldType,
    },

    #[error("Alias '{0}' is declared more than once")]
    AmbiguousAlias(String),

    #[error("Entity '{entity}' has no usable unique key for upsert: {reason}")]
    UnsupportedUpsertTarget { entity: String, reason: String },

    #[error("Filter nesting depth exceeded (max: {max})")]
    FilterDepthExceeded { max: usize },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

impl From<serde_json::Error> for ComposeError {
    fn from(err: serde_json::Error) -> Self {
        ComposeError::InvalidSchema(err.to_string())
    }
}

/// Result type for composition operations
pub type ComposeResult<T> = Result<T, ComposeError>;
