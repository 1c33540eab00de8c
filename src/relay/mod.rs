//! Narrative-analysis relay and outbound integrations.
//!
//! Sends aggregated audit reports to an OpenAI-compatible chat API
//! for narrative analysis, optionally letting the model call back
//! into the keyword searches, and forwards finished analyses to a
//! documentation service or webhook.

pub mod client;
pub mod docs;
pub mod prompt;
pub mod tools;

pub use client::{NarrativeRelay, RelayConfig};
pub use tools::{Toolbox, TruncationPolicy};
