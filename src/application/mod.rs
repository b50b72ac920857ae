//! Application services layer.

pub mod aggregate;
pub mod repos;
pub mod tags;
