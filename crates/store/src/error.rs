//! Error types for the storage boundary.

use std::path::PathBuf;
use std::time::Duration;

use dssr_primitives::{CodeCombination, KeyError};
use thiserror::Error;

/// Errors raised by reference stores and live views.
#[derive(Debug, Error)]
pub enum StoreError {
	/// The backing store could not be reached.
	#[error("store unavailable: {0}")]
	Unavailable(String),

	/// The backing store did not answer in time.
	#[error("store timed out after {0:?}")]
	Timeout(Duration),

	/// A combination cannot be used as a key. The whole batch is rejected.
	#[error("invalid key {combo}: {source}")]
	InvalidKey {
		/// Offending combination.
		combo: CodeCombination,
		/// Validation failure.
		#[source]
		source: KeyError,
	},

	/// A persisted snapshot could not be parsed.
	#[error("corrupt reference snapshot {path}: {source}")]
	Corrupt {
		/// Snapshot file.
		path: PathBuf,
		/// Parse failure.
		#[source]
		source: serde_json::Error,
	},

	/// Reading or writing a snapshot failed.
	#[error("I/O error on {path}: {source}")]
	Io {
		/// File being read or written.
		path: PathBuf,
		/// The underlying I/O error.
		#[source]
		source: std::io::Error,
	},
}

impl StoreError {
	/// Whether retrying the same call may succeed.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Unavailable(_) | Self::Timeout(_) | Self::Io { .. })
	}
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
