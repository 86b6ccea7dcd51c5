use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum byte length of one code accepted as a reference table key.
pub const MAX_KEY_BYTES: usize = 64;

/// Which half of a [`CodeCombination`] a code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
	/// Lateness-reason code (LSR).
	Lateness,
	/// Suspension-reason code (SSR).
	Suspension,
}

impl CodeKind {
	/// Human-readable label used in diagnostics.
	pub const fn label(self) -> &'static str {
		match self {
			Self::Lateness => "lateness",
			Self::Suspension => "suspension",
		}
	}

	/// Leading character of the numbered code form.
	pub const fn prefix(self) -> char {
		match self {
			Self::Lateness => 'L',
			Self::Suspension => 'S',
		}
	}
}

impl fmt::Display for CodeKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

/// Reason a combination cannot be used as a reference table key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
	/// The code does not fit the key column.
	#[error("{code} code is {len} bytes, limit is {max}")]
	TooLong { code: CodeKind, len: usize, max: usize },
	/// The code contains a control character.
	#[error("{code} code contains a control character at byte {position}")]
	ControlCharacter { code: CodeKind, position: usize },
}

/// Ordered `(lateness, suspension)` pair of raw codes.
///
/// Identity is the exact string pair. Case folding and other normalisation
/// only happen inside the decoder, never on the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeCombination {
	#[serde(rename = "lsr")]
	lateness: String,
	#[serde(rename = "ssr")]
	suspension: String,
}

impl CodeCombination {
	pub fn new(lateness: impl Into<String>, suspension: impl Into<String>) -> Self {
		Self {
			lateness: lateness.into(),
			suspension: suspension.into(),
		}
	}

	/// Raw lateness-reason code.
	pub fn lateness(&self) -> &str {
		&self.lateness
	}

	/// Raw suspension-reason code.
	pub fn suspension(&self) -> &str {
		&self.suspension
	}

	/// Returns the raw code of the given kind.
	pub fn code(&self, kind: CodeKind) -> &str {
		match kind {
			CodeKind::Lateness => &self.lateness,
			CodeKind::Suspension => &self.suspension,
		}
	}

	/// Checks that both codes fit the reference table key columns.
	///
	/// Empty codes are valid keys: they decode to a malformed result which is
	/// cached like any other.
	pub fn validate_key(&self) -> Result<(), KeyError> {
		for kind in [CodeKind::Lateness, CodeKind::Suspension] {
			let code = self.code(kind);
			if code.len() > MAX_KEY_BYTES {
				return Err(KeyError::TooLong {
					code: kind,
					len: code.len(),
					max: MAX_KEY_BYTES,
				});
			}
			if let Some((position, _)) = code.char_indices().find(|(_, ch)| ch.is_control()) {
				return Err(KeyError::ControlCharacter { code: kind, position });
			}
		}
		Ok(())
	}
}

impl fmt::Display for CodeCombination {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "({:?}, {:?})", self.lateness, self.suspension)
	}
}
