use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use dssr_primitives::{CodeCombination, DecodedResult, ReferenceEntry};
use serde::Serialize;

use crate::error::{Result, StoreError};

/// An upsert that replaced an existing entry with a different result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Correction {
	pub combo: CodeCombination,
	pub previous: DecodedResult,
	pub current: DecodedResult,
}

/// Outcome of one [`ReferenceStore::upsert_many`] batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
	/// Entries for combinations not seen before.
	pub inserted: usize,
	/// Entries already present with an identical result.
	pub unchanged: usize,
	/// Entries already present with a different result (last writer won).
	pub corrections: Vec<Correction>,
}

impl UpsertReport {
	/// Number of entries actually written.
	pub fn written(&self) -> usize {
		self.inserted + self.corrections.len()
	}

	pub(crate) fn log(&self) {
		for correction in &self.corrections {
			tracing::warn!(
				combo = %correction.combo,
				previous = ?correction.previous.validity(),
				current = ?correction.current.validity(),
				"reference.correction"
			);
		}
		tracing::debug!(
			inserted = self.inserted,
			unchanged = self.unchanged,
			corrected = self.corrections.len(),
			"reference.upsert"
		);
	}
}

/// Persisted mapping from code combination to decoded result.
///
/// Implementations enforce one entry per combination and apply each
/// `upsert_many` batch atomically with respect to readers.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
	/// Point lookup.
	async fn lookup(&self, combo: &CodeCombination) -> Result<Option<DecodedResult>> {
		let keys = BTreeSet::from([combo.clone()]);
		Ok(self.lookup_many(&keys).await?.remove(combo).flatten())
	}

	/// Bulk lookup. Every requested key is present in the returned map;
	/// `None` means the combination has not been resolved yet.
	async fn lookup_many(&self, combos: &BTreeSet<CodeCombination>) -> Result<HashMap<CodeCombination, Option<DecodedResult>>>;

	/// Idempotent bulk upsert.
	///
	/// Re-submitting an identical result is a no-op. A different result for
	/// an existing key replaces it and is reported as a [`Correction`].
	/// Keys are validated before anything is written; one invalid key
	/// rejects the whole batch.
	async fn upsert_many(&self, entries: Vec<ReferenceEntry>) -> Result<UpsertReport>;

	/// All cached malformed entries.
	async fn malformed_entries(&self) -> Result<Vec<ReferenceEntry>>;

	/// Number of stored entries.
	async fn entry_count(&self) -> Result<usize>;
}

/// Rejects the batch if any key is unusable.
pub(crate) fn validate_batch(entries: &[ReferenceEntry]) -> Result<()> {
	for entry in entries {
		entry.combo.validate_key().map_err(|source| StoreError::InvalidKey {
			combo: entry.combo.clone(),
			source,
		})?;
	}
	Ok(())
}
