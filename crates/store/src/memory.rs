use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use dssr_primitives::{CodeCombination, DecodedResult, ReferenceEntry};
use parking_lot::RwLock;

use crate::arena::Arena;
use crate::error::Result;
use crate::reference::{ReferenceStore, UpsertReport, validate_batch};

/// In-process reference store.
///
/// Each batch is applied under a single write lock, so concurrent writers
/// for the same key serialise and readers never see half a batch.
#[derive(Debug, Default)]
pub struct MemoryStore {
	arena: RwLock<Arena>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seeds the store with existing entries.
	pub fn with_entries(entries: Vec<ReferenceEntry>) -> Self {
		Self {
			arena: RwLock::new(Arena::from_entries(entries)),
		}
	}

	/// Copies out every entry in insertion order.
	pub fn snapshot(&self) -> Vec<ReferenceEntry> {
		self.arena.read().entries().to_vec()
	}
}

#[async_trait]
impl ReferenceStore for MemoryStore {
	async fn lookup_many(&self, combos: &BTreeSet<CodeCombination>) -> Result<HashMap<CodeCombination, Option<DecodedResult>>> {
		Ok(self.arena.read().lookup_many(combos))
	}

	async fn upsert_many(&self, entries: Vec<ReferenceEntry>) -> Result<UpsertReport> {
		validate_batch(&entries)?;
		let report = self.arena.write().apply(entries);
		report.log();
		Ok(report)
	}

	async fn malformed_entries(&self) -> Result<Vec<ReferenceEntry>> {
		Ok(self.arena.read().malformed())
	}

	async fn entry_count(&self) -> Result<usize> {
		Ok(self.arena.read().len())
	}
}
