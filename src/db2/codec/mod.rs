//! Codec layer for bit-level field access and string blocks.
//!
//! # Submodules
//!
//! - [`bits`][]: Reading and writing arbitrary little-endian bit ranges
//! - [`strings`][]: Null-terminated string lookup and string table rebuilding

pub mod bits;
pub mod strings;
