//! `MAIR_EL1` decoding.
//!
//! # Notes
//! Some notes on the decoding of the aarch64 MAIR register:
//!
//! - The register holds eight one-byte attribute fields. Byte 0 (bits `[7:0]`)
//!   is attribute index 0, byte 7 (bits `[63:56]`) is attribute index 7.
//!   Page/block descriptors select one of them via `AttrIndx` (bits `[4:2]`).
//!
//! - An upper nibble of `0b0000` marks device memory, in which case the lower
//!   nibble selects the gathering/reordering/early-acknowledgement behavior.
//!   Any other upper nibble marks normal memory, with the upper nibble being
//!   the outer and the lower nibble the inner cacheability.
//!
//! - Encodings the architecture leaves UNPREDICTABLE (a normal memory inner
//!   nibble of `0b0000`, or a device lower nibble other than `0bxx00`) are
//!   still decoded, into [`Cacheability::Unpredictable`] and
//!   [`DeviceType::Reserved`] respectively, so that a misconfigured register
//!   can be shown rather than rejected.
//!
//! See section E2.8 (Memory types and attributes) of the ARMv8-A Architecture
//! Reference Manual (ARM DDI 0487A.a) for more information.

use core::fmt;

/// A `MAIR_EL1` register value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Mair(u64);

impl Mair {
	/// Wraps a raw `MAIR_EL1` value.
	#[must_use]
	pub const fn new(raw: u64) -> Self {
		Self(raw)
	}

	/// Returns the raw register value.
	#[must_use]
	pub const fn raw(self) -> u64 {
		self.0
	}

	/// Gets the attribute field at `index`.
	///
	/// Only the lowest three bits of `index` are used, mirroring the
	/// three-bit `AttrIndx` field of a block descriptor.
	#[must_use]
	pub const fn get(self, index: u8) -> MairAttribute {
		let shift = (index & 0b111) as u32 * 8;
		MairAttribute((self.0 >> shift) as u8)
	}

	/// Returns all eight attribute fields, index 0 first.
	#[must_use]
	pub fn attributes(self) -> [MairAttribute; 8] {
		self.0.to_le_bytes().map(MairAttribute)
	}

	/// Returns a human readable description for each of the eight
	/// attribute fields, index 0 first.
	#[must_use]
	pub fn descriptions(self) -> [String; 8] {
		self.attributes().map(|attr| attr.ty().to_string())
	}

	/// Returns the index and decoded type of every attribute field that
	/// uses an UNPREDICTABLE or reserved encoding.
	pub fn anomalies(self) -> impl Iterator<Item = (u8, MemoryType)> {
		(0..8_u8)
			.map(move |index| (index, self.get(index).ty()))
			.filter(|(_, ty)| ty.is_anomalous())
	}
}

impl fmt::Debug for Mair {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.attributes()).finish()
	}
}

impl From<u64> for Mair {
	fn from(raw: u64) -> Self {
		Self(raw)
	}
}

/// Memory attributes for a single MAIR attribute field.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct MairAttribute(u8);

impl MairAttribute {
	/// Wraps a raw attribute byte.
	#[must_use]
	pub const fn new(raw: u8) -> Self {
		Self(raw)
	}

	/// Returns the raw attribute byte.
	#[must_use]
	pub const fn raw(self) -> u8 {
		self.0
	}

	/// The upper (outer) nibble.
	#[must_use]
	pub const fn upper(self) -> u8 {
		self.0 >> 4
	}

	/// The lower (inner) nibble.
	#[must_use]
	pub const fn lower(self) -> u8 {
		self.0 & 0b1111
	}

	/// Decodes the type of memory these attributes represent.
	#[must_use]
	pub const fn ty(self) -> MemoryType {
		if self.upper() == 0 {
			MemoryType::Device(DeviceType::decode(self.lower()))
		} else {
			MemoryType::Normal {
				outer: Cacheability::decode(self.upper()),
				inner: Cacheability::decode(self.lower()),
			}
		}
	}
}

impl fmt::Debug for MairAttribute {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:#04x}:{:?}", self.0, self.ty())
	}
}

/// The type of memory a specific [`MairAttribute`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryType {
	/// Device memory.
	Device(DeviceType),
	/// Normal memory with the given outer and inner cacheability.
	Normal {
		/// Outer cacheability (upper nibble).
		outer: Cacheability,
		/// Inner cacheability (lower nibble).
		inner: Cacheability,
	},
}

impl MemoryType {
	/// Whether or not the encoding is UNPREDICTABLE or reserved.
	///
	/// Only the inner half of normal memory can be UNPREDICTABLE; an upper
	/// nibble of zero selects device memory instead.
	#[must_use]
	pub const fn is_anomalous(self) -> bool {
		matches!(
			self,
			Self::Device(DeviceType::Reserved(_))
				| Self::Normal {
					inner: Cacheability::Unpredictable,
					..
				}
		)
	}
}

impl fmt::Display for MemoryType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Device(device) => write!(f, "Device-{device}"),
			Self::Normal { outer, inner } => write!(f, "Outer: {outer}, Inner: {inner}"),
		}
	}
}

/// Device memory attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
	/// Device non-Gathering, non-Reordering, No Early write acknowledgement.
	NGnRnE,
	/// Device non-Gathering, non-Reordering, Early write acknowledgement.
	NGnRE,
	/// Device non-Gathering, Reordering, Early Write Acknowledgement.
	NGRE,
	/// Device Gathering, Reordering, Early Write Acknowledgement.
	GRE,
	/// An UNPREDICTABLE lower nibble (any value that isn't `0bxx00`).
	Reserved(u8),
}

impl DeviceType {
	/// Decodes the lower nibble of a device memory attribute.
	#[must_use]
	pub const fn decode(lower: u8) -> Self {
		match lower & 0b1111 {
			0b0000 => Self::NGnRnE,
			0b0100 => Self::NGnRE,
			0b1000 => Self::NGRE,
			0b1100 => Self::GRE,
			other => Self::Reserved(other),
		}
	}
}

impl fmt::Display for DeviceType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NGnRnE => f.write_str("nGnRnE"),
			Self::NGnRE => f.write_str("nGnRE"),
			Self::NGRE => f.write_str("nGRE"),
			Self::GRE => f.write_str("GRE"),
			Self::Reserved(bits) => {
				write!(f, "Error (invalid lower half of device memory type: {bits:#06b})")
			}
		}
	}
}

/// Read/write allocation hints of a cacheable normal memory nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Allocation {
	/// Read-allocate (bit 1).
	pub read:  bool,
	/// Write-allocate (bit 0).
	pub write: bool,
}

impl Allocation {
	/// Decodes the low two bits of a cacheability nibble.
	#[must_use]
	pub const fn decode(nibble: u8) -> Self {
		Self {
			read:  nibble & 0b10 != 0,
			write: nibble & 0b01 != 0,
		}
	}
}

impl fmt::Display for Allocation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.write {
			f.write_str(", WA")?;
		}
		if self.read {
			f.write_str(", RA")?;
		}
		Ok(())
	}
}

/// Cacheability of one half (outer or inner) of a normal memory attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cacheability {
	/// `0b00RW` (RW != 0): write-through transient.
	WriteThroughTransient(Allocation),
	/// `0b0100`: non-cacheable.
	NonCacheable,
	/// `0b01RW` (RW != 0): write-back transient.
	WriteBackTransient(Allocation),
	/// `0b10RW`: write-through non-transient.
	WriteThroughNonTransient(Allocation),
	/// `0b11RW`: write-back non-transient.
	WriteBackNonTransient(Allocation),
	/// `0b0000`; UNPREDICTABLE for normal memory.
	Unpredictable,
}

impl Cacheability {
	/// Decodes a four-bit cacheability nibble.
	#[must_use]
	pub const fn decode(nibble: u8) -> Self {
		let nibble = nibble & 0b1111;
		let alloc = Allocation::decode(nibble);
		match (nibble >> 2, nibble & 0b11) {
			(0b00, 0b00) => Self::Unpredictable,
			(0b00, _) => Self::WriteThroughTransient(alloc),
			(0b01, 0b00) => Self::NonCacheable,
			(0b01, _) => Self::WriteBackTransient(alloc),
			(0b10, _) => Self::WriteThroughNonTransient(alloc),
			_ => Self::WriteBackNonTransient(alloc),
		}
	}
}

impl fmt::Display for Cacheability {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::WriteThroughTransient(alloc) => write!(f, "Write-Through Transient{alloc}"),
			Self::NonCacheable => f.write_str("Non-cacheable"),
			Self::WriteBackTransient(alloc) => write!(f, "Write-Back Transient{alloc}"),
			Self::WriteThroughNonTransient(alloc) => {
				write!(f, "Write-Through Non-Transient{alloc}")
			}
			Self::WriteBackNonTransient(alloc) => write!(f, "Write-Back Non-Transient{alloc}"),
			Self::Unpredictable => f.write_str("Unpredictable"),
		}
	}
}
