//! File format parsing layer for DB2 table files.
//!
//! This module provides the mid-level layer that bridges between raw bytes
//! and the record decoder/encoder.
//!
//! # Module Organization
//!
//! - [`header`]: Parses and writes the fixed-size header
//! - [`blocks`]: Parses and writes field storage info and auxiliary blocks
//!
//! # Architecture
//!
//! ```text
//! File Structure:
//! ┌─────────────────┐
//! │  Header         │ ← header::read_header()
//! ├─────────────────┤
//! │  Field Info     │ ← blocks::parse_field_info()
//! ├─────────────────┤
//! │  Records        │ ← reader::Db2File
//! ├─────────────────┤
//! │  String Block   │ ← codec::strings
//! ├─────────────────┤
//! │  Pallet Data    │ ← blocks::split_block()
//! │  Common Data    │
//! │  Id List        │
//! └─────────────────┘
//! ```

pub mod blocks;
pub mod header;
