use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CodeKind;

/// Diagnostic for a combination the decoder could not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MalformedReason {
	/// The code is the empty string.
	Empty { code: CodeKind },
	/// The code has more characters than any known encoding.
	TooLong { code: CodeKind, len: usize, max: usize },
	/// A character is not a known sub-code.
	UnknownSubCode { code: CodeKind, offending: String, position: usize },
	/// The combination cannot be stored as a key.
	InvalidKey { message: String },
}

impl MalformedReason {
	/// Code the diagnostic refers to, if any.
	pub fn code(&self) -> Option<CodeKind> {
		match self {
			Self::Empty { code } | Self::TooLong { code, .. } | Self::UnknownSubCode { code, .. } => Some(*code),
			Self::InvalidKey { .. } => None,
		}
	}

	/// Offending substring for manual follow-up.
	pub fn offending(&self) -> Option<&str> {
		match self {
			Self::UnknownSubCode { offending, .. } => Some(offending),
			_ => None,
		}
	}
}

impl fmt::Display for MalformedReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Empty { code } => write!(f, "empty {code} code"),
			Self::TooLong { code, len, max } => write!(f, "{code} code too long ({len} > {max} chars)"),
			Self::UnknownSubCode { code, offending, position } => {
				write!(f, "unknown {code} sub-code {offending:?} at position {position}")
			}
			Self::InvalidKey { message } => write!(f, "invalid key: {message}"),
		}
	}
}

/// Validity flag of a [`DecodedResult`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Validity {
	Decodable,
	Malformed { reason: MalformedReason },
}

/// Structured output of decoding one code combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecodedResult {
	/// Decoded lateness reason (DLSR).
	lateness: Option<String>,
	/// Decoded suspension reason (DSSR).
	suspension: Option<String>,
	validity: Validity,
}

impl DecodedResult {
	pub fn decodable(lateness: impl Into<String>, suspension: impl Into<String>) -> Self {
		Self {
			lateness: Some(lateness.into()),
			suspension: Some(suspension.into()),
			validity: Validity::Decodable,
		}
	}

	pub fn malformed(reason: MalformedReason) -> Self {
		Self {
			lateness: None,
			suspension: None,
			validity: Validity::Malformed { reason },
		}
	}

	/// Decoded lateness reason.
	pub fn lateness(&self) -> Option<&str> {
		self.lateness.as_deref()
	}

	/// Decoded suspension reason.
	pub fn suspension(&self) -> Option<&str> {
		self.suspension.as_deref()
	}

	pub fn validity(&self) -> &Validity {
		&self.validity
	}

	pub fn is_valid(&self) -> bool {
		matches!(self.validity, Validity::Decodable)
	}

	/// Diagnostic when the combination was malformed.
	pub fn malformation(&self) -> Option<&MalformedReason> {
		match &self.validity {
			Validity::Decodable => None,
			Validity::Malformed { reason } => Some(reason),
		}
	}

	/// Combined `"<DLSR> / <DSSR>"` text, `None` for malformed results.
	pub fn text(&self) -> Option<String> {
		match (&self.lateness, &self.suspension) {
			(Some(lateness), Some(suspension)) => Some(format!("{lateness} / {suspension}")),
			_ => None,
		}
	}
}
