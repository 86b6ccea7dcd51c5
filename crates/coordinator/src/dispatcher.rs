use std::collections::HashMap;
use std::sync::Arc;

use dssr_primitives::DatasetId;

use crate::coordinator::{RefreshCoordinator, RunOutcome};
use crate::error::DispatchError;
use crate::trigger::{Trigger, TriggerReason};

/// Routes triggers to the coordinator owning each dataset.
#[derive(Default, Clone)]
pub struct Dispatcher {
	coordinators: HashMap<DatasetId, Arc<RefreshCoordinator>>,
}

impl Dispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a coordinator, replacing and returning any previous one for
	/// the same dataset.
	pub fn register(&mut self, coordinator: Arc<RefreshCoordinator>) -> Option<Arc<RefreshCoordinator>> {
		self.coordinators.insert(coordinator.dataset().clone(), coordinator)
	}

	pub fn get(&self, dataset: &DatasetId) -> Option<&Arc<RefreshCoordinator>> {
		self.coordinators.get(dataset)
	}

	/// Registered datasets, sorted.
	pub fn datasets(&self) -> Vec<DatasetId> {
		let mut datasets: Vec<_> = self.coordinators.keys().cloned().collect();
		datasets.sort();
		datasets
	}

	pub async fn dispatch(&self, trigger: Trigger) -> Result<RunOutcome, DispatchError> {
		let coordinator = self.get(&trigger.dataset).ok_or_else(|| {
			tracing::warn!(dataset = %trigger.dataset, reason = %trigger.reason, "dispatch.unknown_dataset");
			DispatchError::UnknownDataset(trigger.dataset.clone())
		})?;
		Ok(coordinator.run_cycle(trigger.reason).await)
	}

	/// Runs one cycle per dataset in name order.
	pub async fn dispatch_all(&self, reason: TriggerReason) -> Vec<RunOutcome> {
		let mut outcomes = Vec::with_capacity(self.coordinators.len());
		for dataset in self.datasets() {
			if let Some(coordinator) = self.get(&dataset) {
				outcomes.push(coordinator.run_cycle(reason).await);
			}
		}
		outcomes
	}
}
