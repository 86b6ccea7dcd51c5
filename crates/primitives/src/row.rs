use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CodeCombination, DecodedResult};

/// Name of one dataset (a schema of event tables in the source pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
	pub fn new(name: impl Into<String>) -> Self {
		Self(name.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for DatasetId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for DatasetId {
	fn from(name: &str) -> Self {
		Self::new(name)
	}
}

/// Ingested event record. Read-only to the decode engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRow {
	pub dataset: DatasetId,
	pub fixture_key: String,
	pub landed_at: DateTime<Utc>,
	#[serde(flatten)]
	pub combo: CodeCombination,
}

/// Decoded columns produced by joining a row against the reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DecodedColumns {
	/// No reference entry yet: the columns are null.
	Pending,
	Decoded { dlsr: String, dssr: String },
	/// Cached as undecodable. Distinct from null so the row is not picked up
	/// as a gap again.
	Malformed { reason: String },
}

impl DecodedColumns {
	/// Builds the joined columns from an optional reference lookup.
	pub fn from_lookup(result: Option<&DecodedResult>) -> Self {
		let Some(result) = result else {
			return Self::Pending;
		};
		match result.malformation() {
			Some(reason) => Self::Malformed { reason: reason.to_string() },
			None => Self::Decoded {
				dlsr: result.lateness().unwrap_or_default().to_owned(),
				dssr: result.suspension().unwrap_or_default().to_owned(),
			},
		}
	}

	/// Whether the row still has null decoded columns.
	pub fn is_gap(&self) -> bool {
		matches!(self, Self::Pending)
	}
}

/// Event row together with its current decoded columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedRow {
	#[serde(flatten)]
	pub row: EventRow,
	pub columns: DecodedColumns,
}
