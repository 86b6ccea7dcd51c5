use std::fmt;

use dssr_primitives::DatasetId;
use serde::{Deserialize, Serialize};

/// What asked for a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
	/// Event rows landed.
	NewData,
	/// The view was refreshed by someone else and may show new gaps.
	PostRefresh,
	/// Operator request.
	Manual,
}

impl fmt::Display for TriggerReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::NewData => "new_data",
			Self::PostRefresh => "post_refresh",
			Self::Manual => "manual",
		})
	}
}

/// A refresh request addressed to one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
	pub dataset: DatasetId,
	pub reason: TriggerReason,
}

impl Trigger {
	pub fn new(dataset: impl Into<DatasetId>, reason: TriggerReason) -> Self {
		Self {
			dataset: dataset.into(),
			reason,
		}
	}
}
