//! Tagtypes Core - Tag hardware definition types
//!
//! This crate provides the foundational types for the tagtypes system:
//! - Tag definition records with defaulting rules for missing fields
//! - Wire-format and storage-format input shapes and their canonicalization
//! - Built-in fallback definitions for offline operation

pub mod fallback;
pub mod record;

pub use fallback::builtin_records;
pub use record::{BufferRotation, ColorTable, StoredRecord, TagRecord, WireRecord};
