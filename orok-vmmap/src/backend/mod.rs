//! Memory and register back ends.

mod image;
mod openocd;

use std::time::Duration;

use anyhow::{Context, Result};
use orok_ttable::{MemoryReader, RegisterReader, SystemRegister};

pub use self::{
	image::{ImageError, ImageMemory},
	openocd::{DEFAULT_PORT, OpenOcd, OpenOcdError},
};
#[cfg(test)]
pub(crate) use self::openocd::tests::fake_openocd;

/// An error from whichever back end is in use.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
	/// From a memory image.
	#[error(transparent)]
	Image(#[from] ImageError),
	/// From an OpenOCD connection.
	#[error(transparent)]
	OpenOcd(#[from] OpenOcdError),
	/// The back end has no access to system registers.
	#[error("the {0} back end cannot read system registers; pass the values explicitly")]
	NoRegisters(&'static str),
}

/// The source of target memory (and, where available, registers).
pub enum Backend {
	/// A memory image file.
	Image(ImageMemory),
	/// A live target through OpenOCD.
	OpenOcd(OpenOcd),
}

impl Backend {
	/// Opens the back end selected on the command line.
	///
	/// Without an image, connects to OpenOCD (on localhost by default).
	pub fn open(target: &crate::TargetArgs) -> Result<Self> {
		if let Some(path) = &target.image {
			return Ok(Self::Image(ImageMemory::load(path, target.image_base)?));
		}

		let addr = target
			.openocd
			.clone()
			.unwrap_or_else(|| format!("127.0.0.1:{DEFAULT_PORT}"));
		let ocd = OpenOcd::connect(&addr, !target.virt)
			.with_context(|| "failed to open OpenOCD back end (use --image for memory dumps)")?
			.with_timeout(Duration::from_secs(target.timeout));
		Ok(Self::OpenOcd(ocd))
	}

	/// A short name for messages.
	pub fn name(&self) -> &'static str {
		match self {
			Self::Image(_) => "image",
			Self::OpenOcd(_) => "openocd",
		}
	}
}

impl MemoryReader for Backend {
	type Error = BackendError;

	fn read_words(&mut self, address: u64, count: u32) -> Result<Vec<u64>, Self::Error> {
		match self {
			Self::Image(image) => Ok(image.read_words(address, count)?),
			Self::OpenOcd(ocd) => Ok(ocd.read_words(address, count)?),
		}
	}
}

impl RegisterReader for Backend {
	type Error = BackendError;

	fn read_register(&mut self, register: SystemRegister) -> Result<u64, Self::Error> {
		match self {
			Self::Image(_) => Err(BackendError::NoRegisters("image")),
			Self::OpenOcd(ocd) => Ok(ocd.read_register(register)?),
		}
	}
}
