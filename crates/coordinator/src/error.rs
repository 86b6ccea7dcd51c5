use std::time::Duration;

use dssr_primitives::DatasetId;
use dssr_store::StoreError;
use thiserror::Error;

/// Why a refresh cycle ended in [`CycleState::Failed`](crate::CycleState::Failed).
#[derive(Debug, Error)]
pub enum CycleError {
	/// A non-retryable store or view failure.
	#[error(transparent)]
	Store(StoreError),

	/// A transient failure persisted past the retry budget.
	#[error("giving up after {attempts} attempts: {last}")]
	RetriesExhausted {
		attempts: u32,
		#[source]
		last: StoreError,
	},

	/// The refresh was never acknowledged or the cycle overran its budget.
	#[error("{phase} timed out after {after:?}")]
	Timeout { phase: &'static str, after: Duration },
}

/// Errors routing a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
	#[error("no coordinator registered for dataset {0}")]
	UnknownDataset(DatasetId),
}
