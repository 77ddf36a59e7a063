//! Error types for the filter/aggregate pipeline.

use crate::models::ColumnKind;
use thiserror::Error;

/// Errors raised while filtering or aggregating a dataset.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// A grouping or filter dimension is not part of the dataset schema.
    #[error("dimension '{0}' is not part of the dataset schema")]
    InvalidDimension(String),

    /// A constraint or reduction does not fit the column's type.
    #[error("dimension '{dimension}' is {actual}, expected {expected}")]
    KindMismatch {
        dimension: String,
        expected: ColumnKind,
        actual: ColumnKind,
    },

    /// A free-text date filter failed strict dd/mm/yyyy parsing.
    #[error("'{0}' is not a valid date in dd/mm/yyyy format")]
    UnparseableDate(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
