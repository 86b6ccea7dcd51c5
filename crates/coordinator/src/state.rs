use std::fmt;

use dssr_primitives::DatasetId;
use serde::Serialize;

/// Lifecycle of one refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
	#[default]
	Idle,
	Resolving,
	Refreshing,
	Done,
	Failed,
}

impl CycleState {
	/// A cycle is in flight; new triggers coalesce into it.
	pub fn is_active(self) -> bool {
		matches!(self, Self::Resolving | Self::Refreshing)
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Done | Self::Failed)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Idle => "idle",
			Self::Resolving => "resolving",
			Self::Refreshing => "refreshing",
			Self::Done => "done",
			Self::Failed => "failed",
		}
	}
}

impl fmt::Display for CycleState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// State transition broadcast to coordinator subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleEvent {
	pub dataset: DatasetId,
	pub from: CycleState,
	pub to: CycleState,
}
