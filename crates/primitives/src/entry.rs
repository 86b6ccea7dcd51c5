use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CodeCombination, DecodedResult};

/// One row of the reference table.
///
/// The resolution timestamp lives here rather than on [`DecodedResult`] so
/// that decoding the same combination twice stays bit-identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
	pub combo: CodeCombination,
	pub result: DecodedResult,
	pub resolved_at: DateTime<Utc>,
}

impl ReferenceEntry {
	pub fn new(combo: CodeCombination, result: DecodedResult, resolved_at: DateTime<Utc>) -> Self {
		Self { combo, result, resolved_at }
	}
}
