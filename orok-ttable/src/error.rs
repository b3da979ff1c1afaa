//! Error type shared by every fallible operation in the crate.

use crate::{addr::Level, sysreg::SystemRegister};

/// A boxed error coming from one of the caller-supplied capabilities
/// ([`crate::MemoryReader`], [`crate::RegisterReader`]).
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error that aborted a walk or a query.
///
/// No partially built [`crate::Tree`] is ever returned alongside an error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// A string that was expected to be a hex number could not be parsed.
	#[error("{input:?} is not valid; expecting a hex string")]
	InvalidHexInput {
		/// The offending input.
		input: String,
	},
	/// The memory reader could not supply the requested words.
	#[error("failed to read {words} word(s) at {address:#018x}: {source}")]
	MemoryRead {
		/// The first address of the read.
		address: u64,
		/// The number of 8-byte words requested.
		words:   u32,
		/// The reader's own error.
		#[source]
		source:  SourceError,
	},
	/// The memory reader returned a different number of words than requested.
	#[error("short read at {address:#018x}: requested {requested} word(s), received {received}")]
	ShortRead {
		/// The first address of the read.
		address:   u64,
		/// The number of 8-byte words requested.
		requested: u32,
		/// The number of 8-byte words actually returned.
		received:  usize,
	},
	/// A table index was not in `0..512`.
	#[error("table index {index} at level {level} is out of range (max 511)")]
	IndexOutOfRange {
		/// The level the index was meant for.
		level: Level,
		/// The offending index.
		index: usize,
	},
	/// Address arithmetic overflowed a 64-bit value.
	#[error("address arithmetic overflowed while computing a level {level} address")]
	AddressOverflow {
		/// The level being computed when the overflow happened.
		level: Level,
	},
	/// A translation level was outside of the supported range.
	#[error("level {level} is not supported here (expected {expected})")]
	InvalidLevel {
		/// The offending level.
		level:    u8,
		/// A description of the accepted range.
		expected: &'static str,
	},
	/// The register reader could not supply a system register.
	#[error("failed to read system register {register}: {source}")]
	RegisterRead {
		/// The register that was requested.
		register: SystemRegister,
		/// The reader's own error.
		#[source]
		source:   SourceError,
	},
}

/// Parses a hex string (with or without a leading `0x`) into a `u64`.
///
/// Underscores are accepted as digit separators.
pub fn parse_hex(input: &str) -> Result<u64, Error> {
	let trimmed = input.trim();
	let digits = trimmed
		.strip_prefix("0x")
		.or_else(|| trimmed.strip_prefix("0X"))
		.unwrap_or(trimmed)
		.replace('_', "");

	if digits.is_empty() {
		return Err(Error::InvalidHexInput {
			input: input.to_string(),
		});
	}

	u64::from_str_radix(&digits, 16).map_err(|_| {
		Error::InvalidHexInput {
			input: input.to_string(),
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_prefixed_and_bare_hex() {
		assert_eq!(parse_hex("0x4000_0000").unwrap(), 0x4000_0000);
		assert_eq!(parse_hex("ff").unwrap(), 0xFF);
		assert_eq!(parse_hex(" 0XdeadBEEF ").unwrap(), 0xDEAD_BEEF);
	}

	#[test]
	fn rejects_malformed_hex() {
		for bad in ["", "0x", "0xg00", "12 34", "0x1_0000_0000_0000_0000"] {
			let err = parse_hex(bad).unwrap_err();
			assert!(
				matches!(err, Error::InvalidHexInput { ref input } if input == bad),
				"unexpected error for {bad:?}: {err:?}"
			);
		}
	}
}
