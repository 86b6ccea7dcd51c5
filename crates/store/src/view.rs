//! Live view boundary: the join of event rows against the reference table.
//!
//! In production the join is a view in the external query engine. The
//! [`MemoryView`] here materialises the same join in memory: rows land with
//! null ([`DecodedColumns::Pending`]) columns and only pick up decoded values
//! when the view is refreshed.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dssr_primitives::{CodeCombination, DatasetId, DecodedColumns, DecodedRow, EventRow};
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::Result;
use crate::reference::ReferenceStore;

/// Rows considered by one gap scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapScope {
	pub dataset: DatasetId,
	/// Only rows landed at or after this instant. `None` scans everything.
	pub since: Option<DateTime<Utc>>,
}

impl GapScope {
	pub fn dataset(dataset: DatasetId) -> Self {
		Self { dataset, since: None }
	}

	#[must_use]
	pub fn since(mut self, since: DateTime<Utc>) -> Self {
		self.since = Some(since);
		self
	}

	fn covers(&self, row: &EventRow) -> bool {
		row.dataset == self.dataset && self.since.is_none_or(|since| row.landed_at >= since)
	}
}

/// Acknowledgement of a view refresh, with the resulting column states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshAck {
	pub decoded: usize,
	pub malformed: usize,
	pub pending: usize,
}

/// Gap query over the live view.
#[async_trait]
pub trait LiveView: Send + Sync {
	/// Distinct combinations of rows whose decoded columns are null.
	async fn undecoded(&self, scope: &GapScope) -> Result<BTreeSet<CodeCombination>>;
}

/// Re-executes the join so newly stored entries become visible.
#[async_trait]
pub trait ViewRefresher: Send + Sync {
	async fn refresh(&self, dataset: &DatasetId) -> Result<RefreshAck>;
}

/// Materialised in-memory view over one reference store.
pub struct MemoryView {
	store: Arc<dyn ReferenceStore>,
	rows: RwLock<Vec<DecodedRow>>,
}

impl MemoryView {
	pub fn new(store: Arc<dyn ReferenceStore>) -> Self {
		Self {
			store,
			rows: RwLock::new(Vec::new()),
		}
	}

	/// Lands new rows with null decoded columns. Returns the number added.
	pub fn ingest(&self, rows: impl IntoIterator<Item = EventRow>) -> usize {
		let mut guard = self.rows.write();
		let before = guard.len();
		guard.extend(rows.into_iter().map(|row| DecodedRow {
			row,
			columns: DecodedColumns::Pending,
		}));
		guard.len() - before
	}

	/// Current rows of one dataset.
	pub fn rows(&self, dataset: &DatasetId) -> Vec<DecodedRow> {
		self.rows.read().iter().filter(|row| &row.row.dataset == dataset).cloned().collect()
	}

	/// Column state counts for one dataset.
	pub fn summary(&self, dataset: &DatasetId) -> RefreshAck {
		let mut ack = RefreshAck::default();
		for row in self.rows.read().iter().filter(|row| &row.row.dataset == dataset) {
			match row.columns {
				DecodedColumns::Pending => ack.pending += 1,
				DecodedColumns::Decoded { .. } => ack.decoded += 1,
				DecodedColumns::Malformed { .. } => ack.malformed += 1,
			}
		}
		ack
	}
}

#[async_trait]
impl LiveView for MemoryView {
	async fn undecoded(&self, scope: &GapScope) -> Result<BTreeSet<CodeCombination>> {
		Ok(self
			.rows
			.read()
			.iter()
			.filter(|row| row.columns.is_gap() && scope.covers(&row.row))
			.map(|row| row.row.combo.clone())
			.collect())
	}
}

#[async_trait]
impl ViewRefresher for MemoryView {
	async fn refresh(&self, dataset: &DatasetId) -> Result<RefreshAck> {
		let combos: BTreeSet<CodeCombination> = self
			.rows
			.read()
			.iter()
			.filter(|row| &row.row.dataset == dataset)
			.map(|row| row.row.combo.clone())
			.collect();
		let resolved = self.store.lookup_many(&combos).await?;

		{
			let mut rows = self.rows.write();
			for row in rows.iter_mut().filter(|row| &row.row.dataset == dataset) {
				// Rows landed after the lookup stay pending until the next refresh.
				if let Some(result) = resolved.get(&row.row.combo) {
					row.columns = DecodedColumns::from_lookup(result.as_ref());
				}
			}
		}

		let ack = self.summary(dataset);
		tracing::debug!(%dataset, decoded = ack.decoded, malformed = ack.malformed, pending = ack.pending, "view.refreshed");
		Ok(ack)
	}
}
