//! Gap resolution: the slow path of the decode cache.
//!
//! A gap is an event row whose decoded columns are null because its code
//! combination has no reference entry yet. [`GapResolver::resolve_gaps`]
//! collects the distinct gap combinations, decodes the ones the store does
//! not know, and caches every result (malformed ones included) in a single
//! upsert. It never signals a view refresh; that is the coordinator's job
//! and must happen only after this call returns.

use std::sync::Arc;

use chrono::Utc;
use dssr_decoder::CodeDecoder;
use dssr_primitives::{CodeCombination, MalformedReason, ReferenceEntry};
use dssr_store::{GapScope, LiveView, ReferenceStore, StoreError};
use serde::Serialize;

/// A combination the decoder or the store could not accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedCombo {
	pub combo: CodeCombination,
	pub reason: MalformedReason,
}

/// Outcome of one gap scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GapReport {
	/// Distinct null-producing combinations in scope.
	pub scanned: usize,
	/// Gaps whose combination is already cached; the view has not been
	/// refreshed since it was stored.
	pub awaiting_refresh: usize,
	/// Reference entries written by this scan.
	pub resolved: usize,
	/// Stored entries whose result replaced a different one.
	pub corrections: usize,
	/// Combinations cached as malformed by this scan.
	pub malformed: Vec<MalformedCombo>,
	/// Combinations that are not valid store keys and were not submitted.
	pub rejected: Vec<MalformedCombo>,
}

impl GapReport {
	pub fn resolved_count(&self) -> usize {
		self.resolved
	}

	/// Malformed combinations surfaced to operators by this scan.
	pub fn remaining_malformed_count(&self) -> usize {
		self.malformed.len() + self.rejected.len()
	}

	/// Whether this scan wrote anything the view should pick up. Gaps that
	/// were already cached do not count; they wait for the next refresh.
	pub fn needs_refresh(&self) -> bool {
		self.resolved > 0
	}
}

/// Outcome of re-decoding cached malformed entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclassifyReport {
	pub examined: usize,
	pub corrected: usize,
}

/// Resolves gaps of one live view into one reference store.
#[derive(Clone)]
pub struct GapResolver {
	store: Arc<dyn ReferenceStore>,
	view: Arc<dyn LiveView>,
	decoder: Arc<CodeDecoder>,
}

impl GapResolver {
	pub fn new(store: Arc<dyn ReferenceStore>, view: Arc<dyn LiveView>, decoder: Arc<CodeDecoder>) -> Self {
		Self { store, view, decoder }
	}

	pub fn store(&self) -> &Arc<dyn ReferenceStore> {
		&self.store
	}

	/// Scans `scope` for gaps and caches their decoding.
	///
	/// # Errors
	///
	/// Propagates view and store failures untouched so callers can tell
	/// transient ones apart. Nothing is written unless the whole batch is.
	pub async fn resolve_gaps(&self, scope: &GapScope) -> Result<GapReport, StoreError> {
		let gaps = self.view.undecoded(scope).await?;
		if gaps.is_empty() {
			tracing::debug!(dataset = %scope.dataset, "gap.none");
			return Ok(GapReport::default());
		}

		let cached = self.store.lookup_many(&gaps).await?;
		let mut report = GapReport {
			scanned: gaps.len(),
			..GapReport::default()
		};
		let resolved_at = Utc::now();
		let mut batch = Vec::new();

		for combo in gaps {
			if cached.get(&combo).is_some_and(Option::is_some) {
				report.awaiting_refresh += 1;
				continue;
			}
			if let Err(err) = combo.validate_key() {
				tracing::warn!(dataset = %scope.dataset, combo = %combo, error = %err, "gap.rejected");
				report.rejected.push(MalformedCombo {
					combo,
					reason: MalformedReason::InvalidKey { message: err.to_string() },
				});
				continue;
			}

			let result = self.decoder.decode(&combo);
			if let Some(reason) = result.malformation() {
				tracing::warn!(dataset = %scope.dataset, combo = %combo, reason = %reason, "gap.malformed");
				report.malformed.push(MalformedCombo {
					combo: combo.clone(),
					reason: reason.clone(),
				});
			}
			batch.push(ReferenceEntry::new(combo, result, resolved_at));
		}

		if !batch.is_empty() {
			let upsert = self.store.upsert_many(batch).await?;
			report.resolved = upsert.written();
			report.corrections = upsert.corrections.len();
		}

		tracing::info!(
			dataset = %scope.dataset,
			scanned = report.scanned,
			resolved = report.resolved,
			malformed = report.remaining_malformed_count(),
			awaiting_refresh = report.awaiting_refresh,
			"gap.resolved"
		);
		Ok(report)
	}

	/// Re-decodes every cached malformed entry with the current decoder and
	/// stores the ones whose result changed.
	///
	/// This is an operator action for after the decoding table has been
	/// extended; it is not part of the regular cycle.
	pub async fn reclassify_malformed(&self) -> Result<ReclassifyReport, StoreError> {
		let entries = self.store.malformed_entries().await?;
		let examined = entries.len();
		let resolved_at = Utc::now();
		let changed: Vec<_> = entries
			.into_iter()
			.filter_map(|entry| {
				let result = self.decoder.decode(&entry.combo);
				(result != entry.result).then(|| ReferenceEntry::new(entry.combo, result, resolved_at))
			})
			.collect();

		let corrected = if changed.is_empty() {
			0
		} else {
			self.store.upsert_many(changed).await?.corrections.len()
		};
		tracing::info!(examined, corrected, "reference.reclassified");
		Ok(ReclassifyReport { examined, corrected })
	}
}
