//! Core types for suspension-reason decoding: code combinations, decoded
//! results, reference entries and event rows.

/// Raw code pairs and store key validation.
pub mod combo;
/// Decoder output: decoded text plus validity.
pub mod decoded;
/// Persisted reference table entries.
pub mod entry;
/// Ingested event rows and their joined decoded columns.
pub mod row;

pub use combo::{CodeCombination, CodeKind, KeyError, MAX_KEY_BYTES};
pub use decoded::{DecodedResult, MalformedReason, Validity};
pub use entry::ReferenceEntry;
pub use row::{DatasetId, DecodedColumns, DecodedRow, EventRow};
