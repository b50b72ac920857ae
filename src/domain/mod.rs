//! Domain layer types and invariants.

pub mod tags;
pub mod types;
