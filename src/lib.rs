pub mod ast;
pub mod builder;
pub mod sql;

pub use ast::*;
pub use builder::{DeleteBuilder, InsertBuilder, SelectBuilder, UpdateBuilder};
pub use sql::{ComposeError, ComposeResult, ComposedQuery, QueryComposer, SqlDialect};
