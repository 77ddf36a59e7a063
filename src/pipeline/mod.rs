//! The filter-aggregate pipeline.
//!
//! Filtering narrows a dataset with a [`FilterSpec`]; the aggregation
//! functions summarise the narrowed rows. Nothing here keeps state between
//! calls.

pub mod aggregate;
pub mod error;
pub mod filter;

pub use aggregate::*;
pub use error::PipelineError;
pub use filter::*;

use crate::models::Summary;

/// Result of evaluating one panel.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A summary to hand to the renderer.
    Rendered(Summary),
    /// The selection driving this panel is empty; nothing was aggregated.
    Placeholder { dimension: String },
}

impl Outcome {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Outcome::Placeholder { .. })
    }
}
