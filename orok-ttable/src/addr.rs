//! Address arithmetic for the 4KiB granule, 4-level translation scheme.
//!
//! Every table holds 512 entries. An entry at level 0 spans 512GiB,
//! level 1 spans 1GiB, level 2 spans 2MiB and level 3 spans 4KiB; thus
//! a full level 0 table covers the entire 48-bit virtual address space.

use core::fmt;

use crate::Error;

/// The number of descriptors in a single translation table.
pub const ENTRIES_PER_TABLE: usize = 512;

/// 4KiB; the span of a level 3 entry (the granule).
pub const SIZE_4K: u64 = 0x1000;
/// 2MiB; the span of a level 2 entry.
pub const SIZE_2M: u64 = 0x20_0000;
/// 1GiB; the span of a level 1 entry.
pub const SIZE_1G: u64 = 0x4000_0000;
/// 512GiB; the span of a level 0 entry.
pub const SIZE_512G: u64 = 512 * SIZE_1G;

/// A translation table level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
	/// Level 0; entries span 512GiB.
	L0 = 0,
	/// Level 1; entries span 1GiB.
	L1 = 1,
	/// Level 2; entries span 2MiB.
	L2 = 2,
	/// Level 3; entries span 4KiB. Always leaves.
	L3 = 3,
}

impl Level {
	/// Converts a raw level number into a [`Level`].
	pub fn new(level: u8) -> Result<Self, Error> {
		match level {
			0 => Ok(Self::L0),
			1 => Ok(Self::L1),
			2 => Ok(Self::L2),
			3 => Ok(Self::L3),
			_ => {
				Err(Error::InvalidLevel {
					level,
					expected: "0..=3",
				})
			}
		}
	}

	/// Converts a raw level number into a level at which a walk may start.
	///
	/// Only levels 0 and 1 are accepted.
	pub fn new_start(level: u8) -> Result<Self, Error> {
		match level {
			0 => Ok(Self::L0),
			1 => Ok(Self::L1),
			_ => {
				Err(Error::InvalidLevel {
					level,
					expected: "0 or 1",
				})
			}
		}
	}

	/// Returns the level number.
	#[must_use]
	pub const fn as_u8(self) -> u8 {
		self as u8
	}

	/// Returns the level number as a `usize`, for indexing.
	#[must_use]
	pub const fn as_usize(self) -> usize {
		self as usize
	}

	/// The number of virtual address bits below this level's index field.
	#[must_use]
	pub const fn shift(self) -> u32 {
		match self {
			Self::L0 => 39,
			Self::L1 => 30,
			Self::L2 => 21,
			Self::L3 => 12,
		}
	}

	/// The span of a single entry at this level.
	#[must_use]
	pub const fn entry_span(self) -> u64 {
		match self {
			Self::L0 => SIZE_512G,
			Self::L1 => SIZE_1G,
			Self::L2 => SIZE_2M,
			Self::L3 => SIZE_4K,
		}
	}

	/// The span of a full table (512 entries) at this level.
	#[must_use]
	pub const fn table_span(self) -> u64 {
		self.entry_span() * ENTRIES_PER_TABLE as u64
	}

	/// The next, finer-grained level; `None` for level 3.
	#[must_use]
	pub const fn next(self) -> Option<Self> {
		match self {
			Self::L0 => Some(Self::L1),
			Self::L1 => Some(Self::L2),
			Self::L2 => Some(Self::L3),
			Self::L3 => None,
		}
	}
}

impl fmt::Display for Level {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.as_u8().fmt(f)
	}
}

/// Returns the total span of a full table at `level`.
///
/// 512 * 512GiB, 512 * 1GiB, 512 * 2MiB and 512 * 4KiB for levels 0-3.
#[must_use]
pub const fn table_span(level: Level) -> u64 {
	level.table_span()
}

/// One index per translation level, identifying the path from the root
/// table down to a specific slot.
///
/// The vector is `Copy`; each recursion branch of the walker owns its
/// own copy, so siblings never observe each other's indices.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TableIndices([u16; 4]);

impl TableIndices {
	/// The all-zero index vector (the first slot of every level).
	pub const ROOT: Self = Self([0; 4]);

	/// Creates an index vector, validating every component is `< 512`.
	pub fn new(indices: [usize; 4]) -> Result<Self, Error> {
		let mut checked = [0; 4];
		for ((slot, index), level) in checked.iter_mut().zip(indices).zip([
			Level::L0,
			Level::L1,
			Level::L2,
			Level::L3,
		]) {
			*slot = Self::check(level, index)?;
		}
		Ok(Self(checked))
	}

	/// Returns the index vector that selects `address`.
	///
	/// Bits above 47 are ignored.
	#[must_use]
	pub const fn of_address(address: u64) -> Self {
		/// Extracts the 9-bit index field for `level`.
		const fn index_at(address: u64, level: Level) -> u16 {
			((address >> level.shift()) & 0x1FF) as u16
		}

		Self([
			index_at(address, Level::L0),
			index_at(address, Level::L1),
			index_at(address, Level::L2),
			index_at(address, Level::L3),
		])
	}

	/// Returns the index at `level`.
	#[must_use]
	pub const fn get(self, level: Level) -> usize {
		self.0[level.as_usize()] as usize
	}

	/// Returns a copy with `level` set to `index` and every finer level
	/// reset to 0.
	pub fn descend(self, level: Level, index: usize) -> Result<Self, Error> {
		let mut next = self;
		next.0[level.as_usize()] = Self::check(level, index)?;
		for finer in &mut next.0[level.as_usize() + 1..] {
			*finer = 0;
		}
		Ok(next)
	}

	/// Returns the raw index components, level 0 first.
	#[must_use]
	pub const fn as_array(self) -> [u16; 4] {
		self.0
	}

	/// Checks an index is valid for a table.
	fn check(level: Level, index: usize) -> Result<u16, Error> {
		u16::try_from(index)
			.ok()
			.filter(|_| index < ENTRIES_PER_TABLE)
			.ok_or(Error::IndexOutOfRange { level, index })
	}
}

impl fmt::Debug for TableIndices {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"[{}, {}, {}, {}]",
			self.0[0], self.0[1], self.0[2], self.0[3]
		)
	}
}

/// An inclusive address range.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddrRange {
	/// The first address in the range.
	pub base: u64,
	/// The last address in the range (inclusive).
	pub end:  u64,
}

impl AddrRange {
	/// Creates a range starting at `base` spanning `size` bytes.
	///
	/// `size` must be non-zero.
	pub fn with_size(base: u64, size: u64, level: Level) -> Result<Self, Error> {
		let end = size
			.checked_sub(1)
			.and_then(|last| base.checked_add(last))
			.ok_or(Error::AddressOverflow { level })?;
		Ok(Self { base, end })
	}

	/// The number of bytes covered by the range.
	#[must_use]
	pub const fn size(self) -> u64 {
		self.end - self.base + 1
	}

	/// Whether or not `address` lies within the range.
	#[must_use]
	pub const fn contains(self, address: u64) -> bool {
		address >= self.base && address <= self.end
	}

	/// Whether or not `next` starts on the byte directly after this range.
	#[must_use]
	pub const fn abuts(self, next: Self) -> bool {
		match self.end.checked_add(1) {
			Some(after) => after == next.base,
			None => false,
		}
	}
}

impl fmt::Debug for AddrRange {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:#018x}..={:#018x}", self.base, self.end)
	}
}

/// Computes the virtual address selected by `indices`.
///
/// `idx0 * 512GiB + idx1 * 1GiB + idx2 * 2MiB + idx3 * 4KiB`.
pub fn virtual_address(indices: TableIndices) -> Result<u64, Error> {
	[Level::L0, Level::L1, Level::L2, Level::L3]
		.into_iter()
		.try_fold(0_u64, |acc, level| {
			(indices.get(level) as u64)
				.checked_mul(level.entry_span())
				.and_then(|offset| acc.checked_add(offset))
				.ok_or(Error::AddressOverflow { level })
		})
}

/// Computes the span of the single entry at `level` selected by `indices`.
///
/// The base is [`virtual_address`] of `indices`; the end is one byte short
/// of the address the next index at `level` would select.
pub fn virtual_range(indices: TableIndices, level: Level) -> Result<AddrRange, Error> {
	AddrRange::with_size(virtual_address(indices)?, level.entry_span(), level)
}

/// Computes the span of a full table at `level` whose first entry is
/// selected by `indices`.
pub fn table_range(indices: TableIndices, level: Level) -> Result<AddrRange, Error> {
	AddrRange::with_size(virtual_address(indices)?, level.table_span(), level)
}
