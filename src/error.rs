//! Error types for index construction and search.

use thiserror::Error;

/// Errors that can occur while building an index.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("dataset shape mismatch: {rows} rows x {cols} cols does not fit a buffer of {len} values")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        len: usize,
    },

    /// A query issued while building or tuning failed.
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Errors that can occur during a query.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("query dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
