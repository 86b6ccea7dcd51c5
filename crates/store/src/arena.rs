use std::collections::{BTreeSet, HashMap};

use dssr_primitives::{CodeCombination, DecodedResult, ReferenceEntry};

use crate::reference::{Correction, UpsertReport};

/// Arena of reference entries with a key index.
///
/// Entries are never removed, so indices stay valid for the arena's lifetime.
#[derive(Debug, Default, Clone)]
pub(crate) struct Arena {
	entries: Vec<ReferenceEntry>,
	index: HashMap<CodeCombination, usize>,
}

impl Arena {
	/// Builds an arena from persisted rows. Later duplicates win; conflicting
	/// duplicates are logged.
	pub fn from_entries(entries: Vec<ReferenceEntry>) -> Self {
		let (arena, report) = Self::load(entries);
		for correction in &report.corrections {
			tracing::warn!(
				combo = %correction.combo,
				previous = ?correction.previous.validity(),
				current = ?correction.current.validity(),
				"reference.snapshot.duplicate"
			);
		}
		arena
	}

	fn load(entries: Vec<ReferenceEntry>) -> (Self, UpsertReport) {
		let mut arena = Self::default();
		let report = arena.apply(entries);
		(arena, report)
	}

	pub fn get(&self, combo: &CodeCombination) -> Option<&ReferenceEntry> {
		self.index.get(combo).map(|&slot| &self.entries[slot])
	}

	pub fn lookup_many(&self, combos: &BTreeSet<CodeCombination>) -> HashMap<CodeCombination, Option<DecodedResult>> {
		combos
			.iter()
			.map(|combo| (combo.clone(), self.get(combo).map(|entry| entry.result.clone())))
			.collect()
	}

	pub fn entries(&self) -> &[ReferenceEntry] {
		&self.entries
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn malformed(&self) -> Vec<ReferenceEntry> {
		self.entries.iter().filter(|entry| !entry.result.is_valid()).cloned().collect()
	}

	/// Applies a batch in order. Identical results keep the original entry
	/// (and its timestamp); differing results replace it.
	pub fn apply(&mut self, batch: Vec<ReferenceEntry>) -> UpsertReport {
		let mut report = UpsertReport::default();
		for entry in batch {
			match self.index.get(&entry.combo).copied() {
				None => {
					self.index.insert(entry.combo.clone(), self.entries.len());
					self.entries.push(entry);
					report.inserted += 1;
				}
				Some(slot) if self.entries[slot].result == entry.result => {
					report.unchanged += 1;
				}
				Some(slot) => {
					let previous = std::mem::replace(&mut self.entries[slot], entry);
					report.corrections.push(Correction {
						combo: previous.combo,
						previous: previous.result,
						current: self.entries[slot].result.clone(),
					});
				}
			}
		}
		report
	}
}
