use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dssr_primitives::{CodeCombination, DecodedResult, ReferenceEntry};
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::arena::Arena;
use crate::error::{Result, StoreError};
use crate::reference::{ReferenceStore, UpsertReport, validate_batch};

/// Reference store exported as a JSON snapshot on disk.
///
/// Reads are served from memory. A batch that writes anything is applied to
/// a copy of the arena, the copy is written to `<path>.tmp` and renamed over
/// the snapshot, and only then swapped in. A failed write leaves both the
/// file and the in-memory table untouched.
#[derive(Debug)]
pub struct JsonFileStore {
	path: PathBuf,
	arena: RwLock<Arena>,
	write_gate: Mutex<()>,
}

impl JsonFileStore {
	/// Opens a snapshot, starting empty if the file does not exist.
	pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let entries = match tokio::fs::read(&path).await {
			Ok(bytes) => serde_json::from_slice::<Vec<ReferenceEntry>>(&bytes).map_err(|source| StoreError::Corrupt {
				path: path.clone(),
				source,
			})?,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
			Err(source) => return Err(StoreError::Io { path, source }),
		};
		tracing::debug!(path = %path.display(), entries = entries.len(), "reference.snapshot.open");
		Ok(Self {
			path,
			arena: RwLock::new(Arena::from_entries(entries)),
			write_gate: Mutex::new(()),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn persist(&self, entries: &[ReferenceEntry]) -> Result<()> {
		let io_err = |source: std::io::Error| StoreError::Io {
			path: self.path.clone(),
			source,
		};
		let json = serde_json::to_vec_pretty(entries).map_err(|err| io_err(err.into()))?;
		let mut tmp = self.path.clone().into_os_string();
		tmp.push(".tmp");
		let tmp = PathBuf::from(tmp);
		tokio::fs::write(&tmp, json).await.map_err(io_err)?;
		tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)
	}
}

#[async_trait]
impl ReferenceStore for JsonFileStore {
	async fn lookup_many(&self, combos: &BTreeSet<CodeCombination>) -> Result<HashMap<CodeCombination, Option<DecodedResult>>> {
		Ok(self.arena.read().lookup_many(combos))
	}

	async fn upsert_many(&self, entries: Vec<ReferenceEntry>) -> Result<UpsertReport> {
		validate_batch(&entries)?;
		let _gate = self.write_gate.lock().await;

		let mut next = self.arena.read().clone();
		let report = next.apply(entries);
		if report.written() > 0 {
			self.persist(next.entries()).await?;
			*self.arena.write() = next;
		}
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
