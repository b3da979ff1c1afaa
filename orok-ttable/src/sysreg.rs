//! System registers relevant to stage 1 EL1 translation.

use crate::error::{Error, SourceError};

/// A system register that can be read through a [`RegisterReader`].
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Hash,
	strum::EnumString,
	strum::Display,
	strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum SystemRegister {
	/// Translation Table Base Register 0 (lower half).
	#[strum(to_string = "TTBR0_EL1", serialize = "ttbr0")]
	Ttbr0El1,
	/// Translation Table Base Register 1 (upper half).
	#[strum(to_string = "TTBR1_EL1", serialize = "ttbr1")]
	Ttbr1El1,
	/// Translation Control Register.
	#[strum(to_string = "TCR_EL1", serialize = "tcr")]
	TcrEl1,
	/// Memory Attribute Indirection Register.
	#[strum(to_string = "MAIR_EL1", serialize = "mair")]
	MairEl1,
	/// System Control Register.
	#[strum(to_string = "SCTLR_EL1", serialize = "sctlr")]
	SctlrEl1,
}

/// The `(op0, op1, CRn, CRm, op2)` encoding of a system register, as used
/// by `MRS`/`MSR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Encoding {
	/// `op0`
	pub op0: u8,
	/// `op1`
	pub op1: u8,
	/// `CRn`
	pub crn: u8,
	/// `CRm`
	pub crm: u8,
	/// `op2`
	pub op2: u8,
}

impl SystemRegister {
	/// Returns the register's `MRS` encoding.
	#[must_use]
	pub const fn encoding(self) -> Encoding {
		let (op0, op1, crn, crm, op2) = match self {
			Self::Ttbr0El1 => (3, 0, 2, 0, 0),
			Self::Ttbr1El1 => (3, 0, 2, 0, 1),
			Self::TcrEl1 => (3, 0, 2, 0, 2),
			Self::MairEl1 => (3, 0, 10, 2, 0),
			Self::SctlrEl1 => (3, 0, 1, 0, 0),
		};
		Encoding {
			op0,
			op1,
			crn,
			crm,
			op2,
		}
	}

	/// Reads the register through `reader`.
	pub fn read<R: RegisterReader + ?Sized>(self, reader: &mut R) -> Result<u64, Error> {
		reader.read_register(self).map_err(|err| {
			Error::RegisterRead {
				register: self,
				source:   Box::new(err) as SourceError,
			}
		})
	}
}

/// Reads system registers from a (typically halted) target.
pub trait RegisterReader {
	/// The error type returned by the reader.
	type Error: std::error::Error + Send + Sync + 'static;

	/// Reads the current value of `register`.
	fn read_register(&mut self, register: SystemRegister) -> Result<u64, Self::Error>;
}

/// The `BADDR` field of a `TTBRn_EL1` value.
const TTBR_BADDR_MASK: u64 = 0x0000_FFFF_FFFF_FFFE;

/// Extracts the root table address from a `TTBRn_EL1` value, dropping the
/// ASID (`[63:48]`) and `CnP` (`[0]`) fields.
#[must_use]
pub const fn ttbr_base_address(ttbr: u64) -> u64 {
	ttbr & TTBR_BADDR_MASK
}
