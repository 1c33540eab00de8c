//! Field-usage estimation.

pub mod estimator;

pub use estimator::{analyze_fields, EstimatorOptions};
