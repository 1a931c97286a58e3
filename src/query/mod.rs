//! Translation of HTTP query strings into store read operations.
//!
//! [`QueryParams`] holds the parsed query string, [`adapter::build`] runs the
//! filter, sort, projection and pagination stages against any [`read::Queryable`],
//! and [`ReadQuery`] is the plain description the stores execute.

pub mod adapter;
pub mod filter;
pub mod params;
pub mod read;

use thiserror::Error;

use crate::error::AppError;

pub use adapter::build;
pub use filter::{CompareOp, Condition, Filter};
pub use params::QueryParams;
pub use read::ReadQuery;

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("query parameter '{0}' cannot be both a value and an operator map")]
    ConflictingParam(String),

    #[error("unsupported operator '{operator}' on field '{field}'")]
    UnknownOperator { field: String, operator: String },

    #[error("operator '{operator}' on field '{field}' was given more than once")]
    RepeatedOperator { field: String, operator: String },

    #[error("fields cannot mix inclusion and exclusion")]
    MixedProjection,
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        AppError::Validation(err.to_string())
    }
}
