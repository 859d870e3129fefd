//! Foundational data structures, error types, and value definitions.

pub mod error;
pub mod models;
pub mod value;
