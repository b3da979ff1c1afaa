//! Raw translation table descriptors.
//!
//! Some notes on how descriptors are classified:
//!
//! - A descriptor of exactly `0` is unmapped. Non-zero descriptors with the
//!   valid bit (bit 0) clear are still decoded as blocks, since they're
//!   typically the result of a half-written or corrupted table and are worth
//!   showing; the walker logs a warning for them.
//!
//! - Bits `[1:0] == 0b11` mark a table descriptor at levels 0 through 2. At
//!   level 3 the same encoding is a page (block) descriptor; there is no
//!   level 4 to point to.
//!
//! - The address bits are `[51:12]` for both table and block descriptors.
//!   For blocks at levels 1 and 2 the low address bits are architecturally
//!   RES0, so they're not masked any further here.
//!
//! See D5.3 (VMSAv8-64 translation table format descriptors) of the ARMv8-A
//! Architecture Reference Manual (ARM DDI 0487A.a) for more information.

use core::fmt;

use crate::{
	addr::Level,
	attr::{PageAttributes, TableAttributes},
};

/// A single 64-bit translation table descriptor, as read from memory.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Descriptor(u64);

/// How a descriptor is interpreted at a given level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
	/// The descriptor is `0`.
	Unmapped,
	/// The descriptor points to a next-level table.
	Table,
	/// The descriptor maps a block (or, at level 3, a page).
	Block,
}

impl Descriptor {
	/// The address bits of a descriptor.
	pub const ADDRESS_MASK: u64 = 0x000F_FFFF_FFFF_F000;
	/// The type bits of a descriptor.
	pub const TYPE_MASK: u64 = 0b11;

	/// Wraps a raw descriptor value.
	#[must_use]
	pub const fn new(raw: u64) -> Self {
		Self(raw)
	}

	/// Returns the raw descriptor value.
	#[must_use]
	pub const fn raw(self) -> u64 {
		self.0
	}

	/// Whether or not the descriptor is entirely zero.
	#[must_use]
	pub const fn is_zero(self) -> bool {
		self.0 == 0
	}

	/// Whether or not the valid bit (bit 0) is set.
	#[must_use]
	pub const fn valid(self) -> bool {
		self.0 & 1 != 0
	}

	/// Whether or not this is a table descriptor when found at `level`.
	///
	/// Always false at level 3.
	#[must_use]
	pub const fn is_table(self, level: Level) -> bool {
		self.0 & Self::TYPE_MASK == Self::TYPE_MASK && !matches!(level, Level::L3)
	}

	/// Classifies the descriptor as found at `level`.
	#[must_use]
	pub const fn kind(self, level: Level) -> DescriptorKind {
		if self.is_table(level) {
			DescriptorKind::Table
		} else if self.is_zero() {
			DescriptorKind::Unmapped
		} else {
			DescriptorKind::Block
		}
	}

	/// The next-level table address, or the output (physical) address of
	/// a block.
	#[must_use]
	pub const fn address(self) -> u64 {
		self.0 & Self::ADDRESS_MASK
	}

	/// The descriptor with its address bits cleared.
	///
	/// Two blocks whose attributes are equal are treated as the same
	/// kind of mapping.
	#[must_use]
	pub const fn attributes(self) -> u64 {
		self.0 & !Self::ADDRESS_MASK
	}

	/// Decodes the table descriptor attributes.
	#[must_use]
	pub const fn table_attributes(self) -> TableAttributes {
		TableAttributes::decode(self.0)
	}

	/// Decodes the page/block descriptor attributes.
	#[must_use]
	pub const fn page_attributes(self) -> PageAttributes {
		PageAttributes::decode(self.0)
	}
}

impl fmt::Debug for Descriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Descriptor")
			.field("raw", &format_args!("{:016X?}", &self.0))
			.field("valid", &self.valid())
			.field("address", &format_args!("{:016X?}", &self.address()))
			.finish_non_exhaustive()
	}
}

impl From<u64> for Descriptor {
	fn from(raw: u64) -> Self {
		Self(raw)
	}
}
