use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use dssr_primitives::{CodeCombination, DatasetId, EventRow};
use serde::Deserialize;

/// One landed row as written by ingestion. The dataset comes from config.
#[derive(Debug, Deserialize)]
struct LandedRow {
	fixture_key: String,
	landed_at: DateTime<Utc>,
	#[serde(flatten)]
	combo: CodeCombination,
}

/// Reads a JSON array of landed rows for `dataset`.
pub async fn load(path: &Path, dataset: &DatasetId) -> anyhow::Result<Vec<EventRow>> {
	let bytes = tokio::fs::read(path).await.with_context(|| format!("reading events {}", path.display()))?;
	let rows: Vec<LandedRow> = serde_json::from_slice(&bytes).with_context(|| format!("parsing events {}", path.display()))?;
	Ok(rows
		.into_iter()
		.map(|row| EventRow {
			dataset: dataset.clone(),
			fixture_key: row.fixture_key,
			landed_at: row.landed_at,
			combo: row.combo,
		})
		.collect())
}
