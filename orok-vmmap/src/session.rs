//! Caching of resolved trees across commands.

use orok_ttable::{Error, Level, Mair, MemoryReader, Tree, WalkConfig, format_hex, walk};

/// Everything a cached tree (and its rendering) depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
	/// The root table address.
	pub root:         u64,
	/// The `MAIR_EL1` value, if known.
	pub mair:         Option<Mair>,
	/// The level of the root table's entries.
	pub start_level:  Level,
	/// Added to next-level table addresses before reading them.
	pub table_offset: u64,
}

impl CacheKey {
	/// The walk configuration this key describes.
	pub const fn config(&self) -> WalkConfig {
		WalkConfig {
			start_level:  self.start_level,
			table_offset: self.table_offset,
		}
	}
}

/// Remembers the last root/MAIR given and the tree built from them.
#[derive(Debug, Default)]
pub struct Session {
	/// The last tree walked, along with the key it was walked for.
	cached: Option<(CacheKey, Tree)>,
	/// The last root address given.
	root:   Option<u64>,
	/// The last MAIR value given.
	mair:   Option<Mair>,
}

impl Session {
	/// Creates an empty session.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a cache key, falling back to the last root and MAIR values
	/// when they are not given.
	///
	/// Returns `None` if no root has ever been given.
	pub fn key(
		&mut self,
		root: Option<u64>,
		mair: Option<Mair>,
		start_level: Level,
		table_offset: u64,
	) -> Option<CacheKey> {
		if root.is_some() {
			self.root = root;
		}
		if mair.is_some() {
			self.mair = mair;
		}

		Some(CacheKey {
			root: self.root?,
			mair: self.mair,
			start_level,
			table_offset,
		})
	}

	/// Drops the cached tree, forcing the next request to walk again.
	pub fn invalidate(&mut self) {
		if self.cached.take().is_some() {
			log::debug!("cleared cached translation tables");
		}
	}

	/// Returns the tree for `key`, walking the tables only if the key
	/// differs from the cached one.
	pub fn tree<R: MemoryReader + ?Sized>(
		&mut self,
		key: CacheKey,
		reader: &mut R,
	) -> Result<&Tree, Error> {
		let cached = match self.cached.take() {
			Some((cached_key, tree)) if cached_key == key => {
				log::info!(
					"root {} was also used in the last invocation; using cached values (use -c to \
					 force recomputation)",
					format_hex(key.root)
				);
				tree
			}
			_ => {
				match key.mair {
					Some(mair) => log::info!("MAIR: {}", format_hex(mair.raw())),
					None => log::info!("MAIR not given; memory attributes won't be decoded"),
				}
				log::info!("reading translation tables at {}...", format_hex(key.root));
				let tree = walk(key.root, &key.config(), reader)?;
				log::debug!("walked {} translation table(s)", tree.tables().count());
				tree
			}
		};

		Ok(&self.cached.insert((key, cached)).1)
	}
}

#[cfg(test)]
mod tests {
	use orok_ttable::{SparseMemory, SparseMemoryError};

	use super::*;

	/// Counts the tables read through it.
	struct Counting {
		inner: SparseMemory,
		reads: usize,
	}

	impl MemoryReader for Counting {
		type Error = SparseMemoryError;

		fn read_words(&mut self, address: u64, count: u32) -> Result<Vec<u64>, Self::Error> {
			self.reads += 1;
			self.inner.read_words(address, count)
		}
	}

	fn memory() -> Counting {
		let mut inner = SparseMemory::new();
		inner.insert_table(0x1000, &[(0, 0x4000_0701)]).unwrap();
		inner.insert_table(0x2000, &[(1, 0x8000_0701)]).unwrap();
		Counting { inner, reads: 0 }
	}

	#[test]
	fn requires_a_root() {
		let mut session = Session::new();
		assert_eq!(session.key(None, None, Level::L0, 0), None);
	}

	#[test]
	fn remembers_root_and_mair() {
		let mut session = Session::new();
		let first = session
			.key(Some(0x1000), Some(Mair::new(0xFF)), Level::L1, 0)
			.unwrap();
		let second = session.key(None, None, Level::L1, 0).unwrap();
		assert_eq!(first, second);

		let third = session.key(Some(0x2000), None, Level::L1, 0).unwrap();
		assert_eq!(third.root, 0x2000);
		assert_eq!(third.mair, Some(Mair::new(0xFF)));
	}

	#[test]
	fn walks_only_when_the_key_changes() {
		let mut mem = memory();
		let mut session = Session::new();

		let key = session.key(Some(0x1000), None, Level::L1, 0).unwrap();
		session.tree(key, &mut mem).unwrap();
		session.tree(key, &mut mem).unwrap();
		assert_eq!(mem.reads, 1);

		let other = session.key(Some(0x2000), None, Level::L1, 0).unwrap();
		let tree = session.tree(other, &mut mem).unwrap();
		assert_eq!(tree.translate(0x4000_0000), Some(0x8000_0000));
		assert_eq!(mem.reads, 2);

		// A different MAIR is a different key.
		let with_mair = session
			.key(None, Some(Mair::new(0x44)), Level::L1, 0)
			.unwrap();
		session.tree(with_mair, &mut mem).unwrap();
		assert_eq!(mem.reads, 3);

		session.invalidate();
		session.tree(with_mair, &mut mem).unwrap();
		assert_eq!(mem.reads, 4);
	}

	#[test]
	fn failed_walks_are_not_cached() {
		let mut mem = memory();
		let mut session = Session::new();

		let bad = session.key(Some(0x9000), None, Level::L1, 0).unwrap();
		assert!(session.tree(bad, &mut mem).is_err());
		assert!(session.tree(bad, &mut mem).is_err());
		assert_eq!(mem.reads, 2);
	}
}
