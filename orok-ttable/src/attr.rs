//! Decoded descriptor attributes.
//!
//! Table descriptors carry the hierarchical attributes in their upper bits
//! (`NSTable`, `APTable`, `UXNTable`, `PXNTable`) which limit everything
//! mapped below them. Page/block descriptors carry the lower attributes
//! (`AttrIndx`, `NS`, `AP`, `SH`, `AF`, `nG`) and the upper attributes
//! (`Contiguous`, `PXN`, `UXN`).
//!
//! See D4.3.3 (Memory attribute fields in the VMSAv8-64 translation table
//! format descriptors) of the ARMv8-A Architecture Reference Manual
//! (ARM DDI 0487A.a) for more information.

use crate::mair::Mair;

/// Bit masks for the table descriptor attributes.
mod table_bits {
	/// `NSTable`
	pub const NS_TABLE: u64 = 1 << 63;
	/// `APTable` (2 bits).
	pub const AP_TABLE_SHIFT: u64 = 61;
	/// `UXNTable` / `XNTable`
	pub const UXN: u64 = 1 << 60;
	/// `PXNTable`
	pub const PXN: u64 = 1 << 59;
}

/// Bit masks for the page/block descriptor attributes.
mod page_bits {
	/// Unprivileged execute-never.
	pub const UXN: u64 = 1 << 54;
	/// Privileged execute-never.
	pub const PXN: u64 = 1 << 53;
	/// Contiguous hint.
	pub const CONTIGUOUS: u64 = 1 << 52;
	/// Not global.
	pub const NG: u64 = 1 << 11;
	/// Access flag.
	pub const AF: u64 = 1 << 10;
	/// Shareability (2 bits).
	pub const SH_SHIFT: u64 = 8;
	/// Access permissions (2 bits).
	pub const AP_SHIFT: u64 = 6;
	/// Non-secure.
	pub const NS: u64 = 1 << 5;
	/// MAIR attribute index (3 bits).
	pub const ATTR_INDEX_SHIFT: u64 = 2;
}

/// Access protection bits of a table descriptor (`APTable`).
/// These limit the permissions of every subsequent level, even if
/// those levels specify less restrictive permissions.
///
/// Note that these are different from the AP flags
/// for block entry access permission bits ([`BlockAccessPerm`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TableAccessPerm {
	/// No effect on subsequent lookups
	#[default]
	NoEffect       = 0b00,
	/// No access from EL0 (kernel only)
	KernelOnly     = 0b01,
	/// Read-only, but accessible from EL0
	ReadOnly       = 0b10,
	/// Read-only, but not accessible from EL0 (kernel only)
	KernelReadOnly = 0b11,
}

impl TableAccessPerm {
	/// Decodes the two `APTable` bits.
	#[must_use]
	pub const fn from_bits(bits: u64) -> Self {
		match bits & 0b11 {
			0b00 => Self::NoEffect,
			0b01 => Self::KernelOnly,
			0b10 => Self::ReadOnly,
			_ => Self::KernelReadOnly,
		}
	}

	/// The raw two-bit value.
	#[must_use]
	pub const fn bits(self) -> u8 {
		self as u8
	}
}

/// Access protection bits of a page/block descriptor (`AP[2:1]`).
///
/// Note that these are different from the AP flags
/// for table descriptor entry access permission bits
/// ([`TableAccessPerm`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BlockAccessPerm {
	/// EL1 (kernel) read/write, EL0 (user) no access
	#[default]
	KernelRWUserNoAccess = 0b00,
	/// EL1 (kernel) read/write, EL0 (user) read/write
	KernelRWUserRW       = 0b01,
	/// EL1 (kernel) read-only, EL0 (user) no access
	KernelROUserNoAccess = 0b10,
	/// EL1 (kernel) read-only, EL0 (user) read-only
	KernelROUserRO       = 0b11,
}

impl BlockAccessPerm {
	/// Decodes the two `AP` bits.
	#[must_use]
	pub const fn from_bits(bits: u64) -> Self {
		match bits & 0b11 {
			0b00 => Self::KernelRWUserNoAccess,
			0b01 => Self::KernelRWUserRW,
			0b10 => Self::KernelROUserNoAccess,
			_ => Self::KernelROUserRO,
		}
	}

	/// The raw two-bit value.
	#[must_use]
	pub const fn bits(self) -> u8 {
		self as u8
	}
}

/// Shareability of normal memory pages (stage 1).
///
/// More information:
/// <https://developer.arm.com/documentation/den0024/a/Memory-Ordering/Memory-attributes/Cacheable-and-shareable-memory-attributes>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
#[repr(u8)]
pub enum Shareability {
	/// Non-shareable
	#[default]
	#[strum(serialize = "Non-Shareable")]
	NonShareable = 0b00,
	/// Architecturally reserved; never shown.
	#[strum(serialize = "Reserved")]
	Reserved     = 0b01,
	/// Outer shareable
	#[strum(serialize = "Outer Shareable")]
	Outer        = 0b10,
	/// Inner shareable
	#[strum(serialize = "Inner Shareable")]
	Inner        = 0b11,
}

impl Shareability {
	/// Decodes the two `SH` bits.
	#[must_use]
	pub const fn from_bits(bits: u64) -> Self {
		match bits & 0b11 {
			0b00 => Self::NonShareable,
			0b01 => Self::Reserved,
			0b10 => Self::Outer,
			_ => Self::Inner,
		}
	}
}

/// The decoded attributes of a table descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TableAttributes {
	/// `NSTable`; subsequent lookups are non-secure.
	pub ns_table:  bool,
	/// `APTable`; access limits for subsequent levels.
	pub ap_table:  TableAccessPerm,
	/// `UXNTable`; subsequent levels are unprivileged execute-never.
	pub uxn:       bool,
	/// `PXNTable`; subsequent levels are privileged execute-never.
	pub pxn:       bool,
}

impl TableAttributes {
	/// Decodes the attributes of a raw table descriptor.
	#[must_use]
	pub const fn decode(raw: u64) -> Self {
		Self {
			ns_table: raw & table_bits::NS_TABLE != 0,
			ap_table: TableAccessPerm::from_bits(raw >> table_bits::AP_TABLE_SHIFT),
			uxn:      raw & table_bits::UXN != 0,
			pxn:      raw & table_bits::PXN != 0,
		}
	}

	/// Returns the display labels of every attribute that is set.
	///
	/// The list is empty when no attribute bits are set.
	#[must_use]
	pub fn labels(&self) -> Vec<String> {
		let mut labels = Vec::new();
		if self.ns_table {
			labels.push("NSTable".to_string());
		}
		if self.ap_table != TableAccessPerm::NoEffect {
			labels.push(format!("APTable = {}", self.ap_table.bits()));
		}
		if self.uxn {
			labels.push("UXN".to_string());
		}
		if self.pxn {
			labels.push("PXN".to_string());
		}
		labels
	}
}

/// The decoded attributes of a page/block descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PageAttributes {
	/// Unprivileged execute-never.
	pub uxn:         bool,
	/// Privileged execute-never.
	pub pxn:         bool,
	/// Access flag.
	pub af:          bool,
	/// Non-secure.
	pub ns:          bool,
	/// Access permissions.
	pub ap:          BlockAccessPerm,
	/// Shareability.
	pub sh:          Shareability,
	/// Index into the MAIR register (0..=7).
	pub attr_index:  u8,
	/// Not global; the translation is tied to the current ASID.
	pub not_global:  bool,
	/// Contiguous hint.
	pub contiguous:  bool,
}

impl PageAttributes {
	/// Decodes the attributes of a raw page/block descriptor.
	#[must_use]
	pub const fn decode(raw: u64) -> Self {
		Self {
			uxn:        raw & page_bits::UXN != 0,
			pxn:        raw & page_bits::PXN != 0,
			af:         raw & page_bits::AF != 0,
			ns:         raw & page_bits::NS != 0,
			ap:         BlockAccessPerm::from_bits(raw >> page_bits::AP_SHIFT),
			sh:         Shareability::from_bits(raw >> page_bits::SH_SHIFT),
			attr_index: ((raw >> page_bits::ATTR_INDEX_SHIFT) & 0b111) as u8,
			not_global: raw & page_bits::NG != 0,
			contiguous: raw & page_bits::CONTIGUOUS != 0,
		}
	}

	/// Returns the display labels of the attributes.
	///
	/// If `mair` is given, the memory type selected by the attribute index is
	/// described; otherwise the raw index is shown.
	#[must_use]
	pub fn labels(&self, mair: Option<Mair>) -> Vec<String> {
		let mut labels = Vec::new();
		if self.uxn {
			labels.push("UXN".to_string());
		}
		if self.pxn {
			labels.push("PXN".to_string());
		}
		if self.af {
			labels.push("AF".to_string());
		}
		if self.ns {
			labels.push("NS".to_string());
		}
		if self.ap != BlockAccessPerm::KernelRWUserNoAccess {
			labels.push(format!("AP = {}", self.ap.bits()));
		}
		if self.sh != Shareability::Reserved {
			labels.push(self.sh.to_string());
		}
		match mair {
			Some(mair) => labels.push(mair.get(self.attr_index).ty().to_string()),
			None => labels.push(format!("AttrIdx: {}", self.attr_index)),
		}
		if self.not_global {
			labels.push("nG".to_string());
		}
		if self.contiguous {
			labels.push("Contiguous".to_string());
		}
		labels
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_table_attributes() {
		let attrs = TableAttributes::decode(0x0000_0000_4000_0003);
		assert_eq!(attrs, TableAttributes::default());
		assert!(attrs.labels().is_empty());
	}

	#[test]
	fn all_table_attributes() {
		let attrs = TableAttributes::decode(0xF800_0000_0000_0003);
		assert!(attrs.ns_table && attrs.uxn && attrs.pxn);
		assert_eq!(attrs.ap_table, TableAccessPerm::KernelReadOnly);
		assert_eq!(attrs.labels(), ["NSTable", "APTable = 3", "UXN", "PXN"]);

		let attrs = TableAttributes::decode(1 << 62);
		assert_eq!(attrs.labels(), ["APTable = 2"]);
	}

	#[test]
	fn reserved_shareability_is_suppressed() {
		let attrs = PageAttributes::decode(0b01 << 8);
		assert_eq!(attrs.sh, Shareability::Reserved);
		assert_eq!(attrs.labels(None), ["AttrIdx: 0"]);
	}

	#[test]
	fn access_permissions() {
		let attrs = PageAttributes::decode(0b11 << 8);
		assert_eq!(attrs.labels(None), ["Inner Shareable", "AttrIdx: 0"]);

		let attrs = PageAttributes::decode(0b10 << 6);
		assert_eq!(attrs.ap, BlockAccessPerm::KernelROUserNoAccess);
		assert_eq!(attrs.labels(None), ["AP = 2", "Non-Shareable", "AttrIdx: 0"]);
	}

	#[test]
	fn full_page_attributes() {
		// UXN, PXN, AF, NS, AP = 1, outer, idx 3, nG, Contiguous.
		let raw = (1 << 54)
			| (1 << 53)
			| (1 << 52)
			| (1 << 11)
			| (1 << 10)
			| (0b10 << 8)
			| (0b01 << 6)
			| (1 << 5)
			| (3 << 2)
			| 0b01;
		let attrs = PageAttributes::decode(raw);
		assert_eq!(attrs.attr_index, 3);
		assert_eq!(
			attrs.labels(None),
			[
				"UXN",
				"PXN",
				"AF",
				"NS",
				"AP = 1",
				"Outer Shareable",
				"AttrIdx: 3",
				"nG",
				"Contiguous"
			]
		);
	}

	#[test]
	fn mair_description_replaces_index() {
		let mair = Mair::new(0x0000_0000_0000_FF04);
		let device = PageAttributes::decode(0x0000_0000_0000_0400);
		assert_eq!(
			device.labels(Some(mair)),
			["AF", "Non-Shareable", "Device-nGnRE"]
		);

		let normal = PageAttributes::decode(0x0000_0000_0000_0704);
		assert_eq!(
			normal.labels(Some(mair)),
			[
				"AF",
				"Inner Shareable",
				"Outer: Write-Back Non-Transient, WA, RA, Inner: Write-Back Non-Transient, WA, RA"
			]
		);
	}
}
