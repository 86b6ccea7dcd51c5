//! Authoritative decoder for suspension and lateness reason codes.
//!
//! Each code of a [`CodeCombination`] is decoded on its own, by character
//! position:
//!
//! - a numbered code is the kind prefix (`L` for lateness, `S` for
//!   suspension) followed by up to four digits, e.g. `L1` decodes to
//!   `Lateness reason 1`;
//! - any other code is a string of flag sub-codes, one per character, looked
//!   up in a [`ReasonTable`] and joined with `;`, e.g. `AB` decodes to
//!   `StalePricing;Settled`.
//!
//! Decoding never fails: empty, oversized and unknown codes produce a
//! malformed [`DecodedResult`] carrying the offending substring.

use std::sync::OnceLock;

use dssr_primitives::{CodeCombination, CodeKind, DecodedResult, MalformedReason};

mod table;

pub use table::{ReasonTable, TableError};

/// Longest code, in characters, the decoder accepts.
pub const MAX_CODE_CHARS: usize = 16;
const MAX_REASON_DIGITS: usize = 4;

/// Pure decoder over a fixed [`ReasonTable`].
#[derive(Debug, Clone, Default)]
pub struct CodeDecoder {
	table: ReasonTable,
}

impl CodeDecoder {
	pub fn new(table: ReasonTable) -> Self {
		Self { table }
	}

	pub fn table(&self) -> &ReasonTable {
		&self.table
	}

	/// Decodes one combination. The lateness code is checked first, so its
	/// diagnostic wins when both codes are malformed.
	pub fn decode(&self, combo: &CodeCombination) -> DecodedResult {
		let lateness = match self.decode_code(CodeKind::Lateness, combo.lateness()) {
			Ok(text) => text,
			Err(reason) => return DecodedResult::malformed(reason),
		};
		match self.decode_code(CodeKind::Suspension, combo.suspension()) {
			Ok(suspension) => DecodedResult::decodable(lateness, suspension),
			Err(reason) => DecodedResult::malformed(reason),
		}
	}

	fn decode_code(&self, kind: CodeKind, code: &str) -> Result<String, MalformedReason> {
		if code.is_empty() {
			return Err(MalformedReason::Empty { code: kind });
		}
		let len = code.chars().count();
		if len > MAX_CODE_CHARS {
			return Err(MalformedReason::TooLong {
				code: kind,
				len,
				max: MAX_CODE_CHARS,
			});
		}
		if let Some(number) = numbered_reason(kind, code) {
			let title = match kind {
				CodeKind::Lateness => "Lateness",
				CodeKind::Suspension => "Suspension",
			};
			return Ok(format!("{title} reason {number}"));
		}

		let mut names = Vec::with_capacity(len);
		for (position, flag) in code.chars().enumerate() {
			let Some(name) = self.table.get(flag) else {
				return Err(MalformedReason::UnknownSubCode {
					code: kind,
					offending: flag.to_string(),
					position,
				});
			};
			names.push(name);
		}
		Ok(names.join(";"))
	}
}

/// Parses the `<prefix><digits>` form.
fn numbered_reason(kind: CodeKind, code: &str) -> Option<u32> {
	let mut chars = code.chars();
	let first = chars.next()?;
	if !first.eq_ignore_ascii_case(&kind.prefix()) {
		return None;
	}
	let digits = chars.as_str();
	if digits.is_empty() || digits.len() > MAX_REASON_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
		return None;
	}
	digits.parse().ok()
}

/// Decodes with the bundled table.
pub fn decode(combo: &CodeCombination) -> DecodedResult {
	static BUNDLED: OnceLock<CodeDecoder> = OnceLock::new();
	BUNDLED.get_or_init(CodeDecoder::default).decode(combo)
}
