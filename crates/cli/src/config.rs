//! Engine configuration, read from a TOML file.
//!
//! ```toml
//! [engine]
//! lookback_hours = 25
//!
//! [retry]
//! max_attempts = 4
//!
//! [decoder.flags]
//! G = "GroupSuspended"
//!
//! [[datasets]]
//! name = "baseball_stagingus"
//! events = "events/baseball.json"
//! reference_store = "reasons/baseball.json"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use dssr_coordinator::{CoordinatorConfig, RetryPolicy};
use dssr_decoder::{CodeDecoder, ReasonTable, TableError};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("I/O error reading {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid config {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("dataset {0:?} is configured more than once")]
	DuplicateDataset(String),

	#[error("dataset {0:?} is not configured")]
	UnknownDataset(String),

	#[error("invalid decoder flag: {0}")]
	Flag(#[from] TableError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
	#[serde(default)]
	pub engine: EngineSection,
	#[serde(default)]
	pub retry: RetryPolicy,
	#[serde(default)]
	pub decoder: DecoderSection,
	#[serde(default)]
	pub datasets: Vec<DatasetConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
	/// Gap scans only look at rows landed this recently. `0`, the default,
	/// scans all rows.
	#[serde(default = "default_lookback_hours")]
	pub lookback_hours: u32,
	#[serde(default = "default_cycle_timeout_ms")]
	pub cycle_timeout_ms: u64,
	#[serde(default = "default_refresh_timeout_ms")]
	pub refresh_timeout_ms: u64,
	/// Capacity of the trigger inbox.
	#[serde(default = "default_inbox_capacity")]
	pub inbox_capacity: usize,
}

fn default_lookback_hours() -> u32 {
	0
}

fn default_cycle_timeout_ms() -> u64 {
	300_000
}

fn default_refresh_timeout_ms() -> u64 {
	30_000
}

fn default_inbox_capacity() -> usize {
	64
}

impl Default for EngineSection {
	fn default() -> Self {
		Self {
			lookback_hours: default_lookback_hours(),
			cycle_timeout_ms: default_cycle_timeout_ms(),
			refresh_timeout_ms: default_refresh_timeout_ms(),
			inbox_capacity: default_inbox_capacity(),
		}
	}
}

/// Extra sub-code flags layered over the bundled table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecoderSection {
	#[serde(default)]
	pub flags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
	pub name: String,
	/// JSON array of landed event rows.
	pub events: PathBuf,
	/// JSON snapshot of the dataset's reference table.
	pub reference_store: PathBuf,
}

impl EngineConfig {
	pub fn load(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		let base = path.parent().unwrap_or_else(|| Path::new("."));
		Self::parse(&text, base).map_err(|err| match err {
			ConfigError::Parse { source, .. } => ConfigError::Parse {
				path: path.to_path_buf(),
				source,
			},
			other => other,
		})
	}

	/// Parses `text`, resolving relative dataset paths against `base`.
	pub fn parse(text: &str, base: &Path) -> Result<Self> {
		let mut config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse { path: PathBuf::new(), source })?;

		let mut seen = HashSet::new();
		for dataset in &mut config.datasets {
			if !seen.insert(dataset.name.clone()) {
				return Err(ConfigError::DuplicateDataset(dataset.name.clone()));
			}
			dataset.events = base.join(&dataset.events);
			dataset.reference_store = base.join(&dataset.reference_store);
		}
		Ok(config)
	}

	pub fn dataset(&self, name: &str) -> Result<&DatasetConfig> {
		self.datasets
			.iter()
			.find(|dataset| dataset.name == name)
			.ok_or_else(|| ConfigError::UnknownDataset(name.to_owned()))
	}

	pub fn decoder(&self) -> Result<CodeDecoder> {
		let table = ReasonTable::bundled().extend_from(self.decoder.flags.iter().map(|(key, name)| (key.as_str(), name.as_str())))?;
		Ok(CodeDecoder::new(table))
	}

	pub fn coordinator(&self) -> CoordinatorConfig {
		CoordinatorConfig {
			retry: self.retry,
			cycle_timeout: Duration::from_millis(self.engine.cycle_timeout_ms),
			refresh_timeout: Duration::from_millis(self.engine.refresh_timeout_ms),
			lookback: (self.engine.lookback_hours > 0).then(|| TimeDelta::hours(i64::from(self.engine.lookback_hours))),
		}
	}
}
