//! Raw memory image back end.

use std::path::Path;

use anyhow::{Context, Result};
use orok_ttable::MemoryReader;

/// An error returned when reading from a [`ImageMemory`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
	/// The requested range isn't (entirely) covered by the image.
	#[error(
		"read of {count} word(s) at {address:#018x} falls outside of the image \
		 ({base:#018x}, {len:#x} bytes)"
	)]
	OutOfRange {
		/// The first address of the read.
		address: u64,
		/// The number of words requested.
		count:   u32,
		/// The physical address the image is loaded at.
		base:    u64,
		/// The image size in bytes.
		len:     usize,
	},
}

/// A little-endian dump of physical memory, loaded at a base address.
#[derive(Debug, Clone)]
pub struct ImageMemory {
	/// The physical address of the first byte of `data`.
	base: u64,
	/// The image contents.
	data: Vec<u8>,
}

impl ImageMemory {
	/// Loads an image file.
	pub fn load(path: &Path, base: u64) -> Result<Self> {
		let data = std::fs::read(path)
			.with_context(|| format!("failed to read memory image {}", path.display()))?;
		log::debug!(
			"loaded {} byte memory image from {} at {base:#018x}",
			data.len(),
			path.display()
		);
		Ok(Self::from_bytes(base, data))
	}

	/// Wraps an in-memory image.
	pub fn from_bytes(base: u64, data: Vec<u8>) -> Self {
		Self { base, data }
	}

	/// Returns the byte range within the image backing the read, if any.
	fn span(&self, address: u64, count: u32) -> Option<std::ops::Range<usize>> {
		let start = usize::try_from(address.checked_sub(self.base)?).ok()?;
		let end = start.checked_add(usize::try_from(count).ok()?.checked_mul(8)?)?;
		(end <= self.data.len()).then_some(start..end)
	}
}

impl MemoryReader for ImageMemory {
	type Error = ImageError;

	fn read_words(&mut self, address: u64, count: u32) -> Result<Vec<u64>, Self::Error> {
		let span = self.span(address, count).ok_or(ImageError::OutOfRange {
			address,
			count,
			base: self.base,
			len: self.data.len(),
		})?;

		Ok(self.data[span]
			.chunks_exact(8)
			.map(|chunk| {
				let mut word = [0; 8];
				word.copy_from_slice(chunk);
				u64::from_le_bytes(word)
			})
			.collect())
	}
}
