//! Keyword searches over org metadata surfaces.

pub mod apex;
pub mod fields;
pub mod flows;
pub mod influence;
pub mod matcher;
pub mod objects;
pub mod packages;
pub mod reports;

pub use matcher::{MatchPolicy, Similarity};
