//! Memory access capabilities consumed by the walker.

use std::collections::BTreeMap;

/// Reads 8-byte words from the memory the translation tables live in.
///
/// Implementations must return exactly `count` words or fail; the walker
/// treats a short read as an error regardless.
pub trait MemoryReader {
	/// The error type returned by the reader.
	type Error: std::error::Error + Send + Sync + 'static;

	/// Reads `count` consecutive 8-byte words starting at `address`.
	fn read_words(&mut self, address: u64, count: u32) -> Result<Vec<u64>, Self::Error>;
}

impl<R: MemoryReader + ?Sized> MemoryReader for &mut R {
	type Error = R::Error;

	fn read_words(&mut self, address: u64, count: u32) -> Result<Vec<u64>, Self::Error> {
		(**self).read_words(address, count)
	}
}

/// An error returned by [`SparseMemory`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SparseMemoryError {
	/// A word in the requested range has no backing.
	#[error("no memory backs address {0:#018x}")]
	Unbacked(u64),
	/// The requested address was not 8-byte aligned.
	#[error("address {0:#018x} is not 8-byte aligned")]
	Unaligned(u64),
	/// The requested range wrapped past the end of the address space.
	#[error("read of {count} word(s) at {address:#018x} overflows the address space")]
	Overflow {
		/// The first address of the read.
		address: u64,
		/// The number of words requested.
		count:   u32,
	},
}

/// A sparse, word-granular memory image.
///
/// Useful for laying out synthetic translation tables. Reads of any
/// address that was never written fail.
#[derive(Debug, Clone, Default)]
pub struct SparseMemory {
	/// Word-aligned address to word.
	words: BTreeMap<u64, u64>,
}

impl SparseMemory {
	/// Creates an empty memory image.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Writes a single word.
	pub fn write(&mut self, address: u64, word: u64) -> Result<(), SparseMemoryError> {
		if address % 8 != 0 {
			return Err(SparseMemoryError::Unaligned(address));
		}
		self.words.insert(address, word);
		Ok(())
	}

	/// Writes consecutive words starting at `address`.
	pub fn write_words(&mut self, address: u64, words: &[u64]) -> Result<(), SparseMemoryError> {
		for (i, word) in words.iter().enumerate() {
			let at = (i as u64)
				.checked_mul(8)
				.and_then(|offset| address.checked_add(offset))
				.ok_or(SparseMemoryError::Overflow {
					address,
					count: words.len() as u32,
				})?;
			self.write(at, *word)?;
		}
		Ok(())
	}

	/// Writes a full, zeroed 512-entry table at `address`, then places
	/// `entries` (index, descriptor) into it.
	pub fn insert_table(
		&mut self,
		address: u64,
		entries: &[(usize, u64)],
	) -> Result<(), SparseMemoryError> {
		let mut table = [0_u64; crate::addr::ENTRIES_PER_TABLE];
		for &(index, descriptor) in entries {
			if let Some(slot) = table.get_mut(index) {
				*slot = descriptor;
			}
		}
		self.write_words(address, &table)
	}

	/// The number of backed words.
	#[must_use]
	pub fn len(&self) -> usize {
		self.words.len()
	}

	/// Whether or not any word is backed.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.words.is_empty()
	}
}

impl MemoryReader for SparseMemory {
	type Error = SparseMemoryError;

	fn read_words(&mut self, address: u64, count: u32) -> Result<Vec<u64>, Self::Error> {
		if address % 8 != 0 {
			return Err(SparseMemoryError::Unaligned(address));
		}

		(0..u64::from(count))
			.map(|i| {
				let at = address
					.checked_add(i * 8)
					.ok_or(SparseMemoryError::Overflow { address, count })?;
				self.words
					.get(&at)
					.copied()
					.ok_or(SparseMemoryError::Unbacked(at))
			})
			.collect()
	}
}
