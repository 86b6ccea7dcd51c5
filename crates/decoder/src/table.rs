use std::collections::BTreeMap;

use thiserror::Error;

/// Flag sub-codes shipped with the decoder.
const BUNDLED_FLAGS: &[(char, &str)] = &[
	('-', "Unknown"),
	('A', "StalePricing"),
	('B', "Settled"),
	('C', "OutsideLineRange"),
	('D', "BelowMinimumPrice"),
	('E', "NoSelection"),
	('F', "MatchVoided"),
	('H', "NoMainLine"),
	('I', "NoUnsettledLines"),
	('J', "NoUnsuspendedLines"),
	('K', "SettlementCorrection"),
];

/// Errors building a [`ReasonTable`] from user-supplied flags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
	/// Flag keys are single characters.
	#[error("flag key {0:?} must be exactly one character")]
	InvalidKey(String),
	/// Flag names become decoded text and cannot be blank.
	#[error("flag {0:?} has an empty name")]
	EmptyName(char),
}

/// In-memory sub-code table bundled with the decoder.
///
/// Keys are stored upper-cased; lookups fold ASCII case the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonTable {
	flags: BTreeMap<char, String>,
}

impl ReasonTable {
	/// Table with the shipped flag set.
	pub fn bundled() -> Self {
		Self {
			flags: BUNDLED_FLAGS.iter().map(|&(flag, name)| (flag, name.to_owned())).collect(),
		}
	}

	/// Adds or replaces one flag.
	#[must_use]
	pub fn with_flag(mut self, flag: char, name: impl Into<String>) -> Self {
		self.flags.insert(flag.to_ascii_uppercase(), name.into());
		self
	}

	/// Extends the table with string-keyed flags, as read from configuration.
	pub fn extend_from<'a>(mut self, flags: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self, TableError> {
		for (key, name) in flags {
			let mut chars = key.chars();
			let (Some(flag), None) = (chars.next(), chars.next()) else {
				return Err(TableError::InvalidKey(key.to_owned()));
			};
			if name.trim().is_empty() {
				return Err(TableError::EmptyName(flag));
			}
			self = self.with_flag(flag, name);
		}
		Ok(self)
	}

	/// Looks up one sub-code.
	pub fn get(&self, flag: char) -> Option<&str> {
		self.flags.get(&flag.to_ascii_uppercase()).map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.flags.len()
	}

	pub fn is_empty(&self) -> bool {
		self.flags.is_empty()
	}
}

impl Default for ReasonTable {
	fn default() -> Self {
		Self::bundled()
	}
}
