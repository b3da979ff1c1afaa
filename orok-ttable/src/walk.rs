//! The translation table walker.

use log::{debug, trace, warn};

use crate::{
	Error,
	addr::{AddrRange, ENTRIES_PER_TABLE, Level, TableIndices, table_range, virtual_range},
	attr::TableAttributes,
	compress::compress_children,
	descriptor::{Descriptor, DescriptorKind},
	entry::{Block, Entry, EntryId, Table, Tree, Unmapped},
	mem::MemoryReader,
};

/// Parameters of a single walk, fixed for its duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalkConfig {
	/// The level of the entries in the root table (0 or 1).
	pub start_level:  Level,
	/// Added to every next-level table address before it is read. Used
	/// when tables are only reachable through an offset mapping of
	/// physical memory. The root address is never offset.
	pub table_offset: u64,
}

impl WalkConfig {
	/// Creates a walk configuration, validating the start level.
	pub fn new(start_level: u8, table_offset: u64) -> Result<Self, Error> {
		Ok(Self {
			start_level: Level::new_start(start_level)?,
			table_offset,
		})
	}
}

impl Default for WalkConfig {
	fn default() -> Self {
		Self {
			start_level:  Level::L0,
			table_offset: 0,
		}
	}
}

/// Walks the translation tables rooted at `root`, resolving every slot.
///
/// `root` is the address of the root table itself (not a descriptor).
/// Every table is fetched with a single 512-word read. Any read failure
/// aborts the whole walk.
pub fn walk<R: MemoryReader + ?Sized>(
	root: u64,
	config: &WalkConfig,
	reader: &mut R,
) -> Result<Tree, Error> {
	debug!(
		"walking translation tables at {root:#018x} (start level {}, table offset {:#x})",
		config.start_level, config.table_offset
	);

	let mut walker = Walker {
		reader,
		config: *config,
		entries: Vec::new(),
	};

	let root_id = walker.table(
		Descriptor::new(root),
		config.start_level,
		TableIndices::ROOT,
		None,
	)?;

	debug!(
		"walk complete: {} entries across {} table(s)",
		walker.entries.len(),
		walker
			.entries
			.iter()
			.filter(|e| matches!(e, Entry::Table(_)))
			.count()
	);

	Ok(Tree {
		entries: walker.entries,
		root:    root_id,
	})
}

/// In-progress walk state.
struct Walker<'a, R: ?Sized> {
	/// Where table words come from.
	reader:  &'a mut R,
	/// The walk's parameters.
	config:  WalkConfig,
	/// The arena being filled.
	entries: Vec<Entry>,
}

impl<R: MemoryReader + ?Sized> Walker<'_, R> {
	/// Pushes an entry into the arena, returning its ID.
	fn push(&mut self, entry: Entry) -> EntryId {
		let id = EntryId(self.entries.len());
		self.entries.push(entry);
		id
	}

	/// Reads a full table's worth of descriptors.
	fn read_table(&mut self, address: u64) -> Result<Vec<u64>, Error> {
		let count = ENTRIES_PER_TABLE as u32;

		let words = self.reader.read_words(address, count).map_err(|err| {
			Error::MemoryRead {
				address,
				words: count,
				source: Box::new(err),
			}
		})?;

		if words.len() != ENTRIES_PER_TABLE {
			return Err(Error::ShortRead {
				address,
				requested: count,
				received: words.len(),
			});
		}

		Ok(words)
	}

	/// Resolves the table described by `descriptor` whose entries are at
	/// `level`, along with everything below it.
	///
	/// `indices` selects the table's first entry. A table without a parent
	/// is the root; its descriptor is the table address verbatim.
	fn table(
		&mut self,
		descriptor: Descriptor,
		level: Level,
		indices: TableIndices,
		parent: Option<EntryId>,
	) -> Result<EntryId, Error> {
		let (table_addr, read_at, attributes) = if parent.is_none() {
			(descriptor.raw(), descriptor.raw(), TableAttributes::default())
		} else {
			let table_addr = descriptor.address();
			let read_at = table_addr
				.checked_add(self.config.table_offset)
				.ok_or(Error::AddressOverflow { level })?;
			(table_addr, read_at, descriptor.table_attributes())
		};

		let virt = table_range(indices, level)?;

		debug!(
			"level {level} table at {read_at:#018x} covering {virt:?} (indices {indices:?})"
		);

		// Reserve the table's slot first so that children can refer to it.
		let id = self.push(Entry::Table(Table {
			virt,
			descriptor,
			level,
			table_addr,
			attributes,
			children: Vec::new(),
			compressed: Vec::new(),
			parent,
		}));

		let words = self.read_table(read_at)?;
		let mut children = Vec::with_capacity(ENTRIES_PER_TABLE);

		for (index, raw) in words.into_iter().enumerate() {
			// Each slot gets its own copy of the index vector.
			let indices = indices.descend(level, index)?;
			let descriptor = Descriptor::new(raw);

			let child = match descriptor.kind(level) {
				DescriptorKind::Table => {
					let next = level.next().ok_or(Error::InvalidLevel {
						level:    level.as_u8(),
						expected: "0..=2 for table descriptors",
					})?;
					trace!("L{level}[{index}] {raw:#018x}: table -> {next}");
					self.table(descriptor, next, indices, Some(id))?
				}
				DescriptorKind::Unmapped => {
					let virt = virtual_range(indices, level)?;
					self.push(Entry::Unmapped(Unmapped {
						virt,
						level,
						parent: id,
					}))
				}
				DescriptorKind::Block => {
					let virt = virtual_range(indices, level)?;
					let phys =
						AddrRange::with_size(descriptor.address(), level.entry_span(), level)?;

					if !descriptor.valid() {
						warn!(
							"L{level}[{index}] {raw:#018x}: non-zero descriptor without the valid \
							 bit; decoding as a block"
						);
					} else if level == Level::L0 {
						warn!("L{level}[{index}] {raw:#018x}: block descriptor at level 0");
					}

					trace!("L{level}[{index}] {raw:#018x}: block {virt:?} -> {phys:?}");

					self.push(Entry::Block(Block {
						virt,
						phys,
						descriptor,
						level,
						parent: id,
					}))
				}
			};

			children.push(child);
		}

		let compressed = compress_children(&self.entries, &children);
		if let Some(Entry::Table(table)) = self.entries.get_mut(id.0) {
			table.children = children;
			table.compressed = compressed;
		}

		Ok(id)
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::{
		addr::{SIZE_1G, SIZE_2M, SIZE_4K, SIZE_512G},
		entry::CompressedEntry,
		mem::{SparseMemory, SparseMemoryError},
	};

	/// A table descriptor's type bits.
	pub const TABLE: u64 = 0b11;
	/// AF, inner shareable, valid block.
	pub const BLOCK: u64 = 0x701;
	/// AF, inner shareable, valid level 3 page.
	pub const PAGE: u64 = 0x703;

	/// Lays out an L0 root at 0x1000 whose first entry points to an
	/// L1 table at 0x2000; slots 1 and 3 of the L1 table point to L2
	/// tables at 0x3000 and 0x4000, each of which maps slot 2 as a 2MiB
	/// block, and the L2 table at 0x3000 also points slot 7 to an
	/// identity mapped L3 table at 0x5000.
	pub fn nested_memory() -> SparseMemory {
		let mut mem = SparseMemory::new();
		mem.insert_table(0x1000, &[(0, 0x2000 | TABLE)]).unwrap();
		mem.insert_table(0x2000, &[(1, 0x3000 | TABLE), (3, 0x4000 | TABLE)])
			.unwrap();
		mem.insert_table(0x3000, &[
			(2, 0x8000_0000 | BLOCK),
			(7, 0x5000 | TABLE),
		])
		.unwrap();
		mem.insert_table(0x4000, &[(2, 0x9000_0000 | BLOCK)]).unwrap();

		let l3_base = SIZE_1G + 7 * SIZE_2M;
		let pages = (0..512)
			.map(|i| (i, (l3_base + i as u64 * SIZE_4K) | PAGE))
			.collect::<Vec<_>>();
		mem.insert_table(0x5000, &pages).unwrap();
		mem
	}

	/// Finds the block whose virtual base is `base`.
	fn block_at(tree: &Tree, base: u64) -> Option<Block> {
		tree.iter()
			.filter_map(|(_, e)| e.as_block().copied())
			.find(|b| b.virt.base == base)
	}

	#[test]
	fn single_block_at_level_zero() {
		let mut mem = SparseMemory::new();
		mem.insert_table(0x1000, &[(5, 0x8000_0000 | BLOCK)]).unwrap();

		let tree = walk(0x1000, &WalkConfig::default(), &mut mem).unwrap();
		let root = tree.root_table();
		assert!(root.is_root());
		assert_eq!(root.level, Level::L0);
		assert_eq!(root.table_addr, 0x1000);
		assert_eq!(root.virt, AddrRange {
			base: 0,
			end:  0xFFFF_FFFF_FFFF,
		});
		assert_eq!(root.children.len(), 512);
		assert_eq!(tree.iter().count(), 513);

		let Entry::Block(block) = tree[root.children[5]] else {
			panic!("expected a block at index 5");
		};
		assert_eq!(block.virt.base, 5 * SIZE_512G);
		assert_eq!(block.size(), SIZE_512G);
		assert_eq!(block.phys.base, 0x8000_0000);
		assert_eq!(block.phys.end, 0x8000_0000 + SIZE_512G - 1);

		assert_eq!(root.compressed, vec![CompressedEntry::Block(block)]);
	}

	#[test]
	fn start_level_one_root() {
		let mut mem = SparseMemory::new();
		mem.insert_table(0x1000, &[(2, 0x4000_0000 | BLOCK)]).unwrap();

		let config = WalkConfig::new(1, 0).unwrap();
		let tree = walk(0x1000, &config, &mut mem).unwrap();
		let root = tree.root_table();
		assert_eq!(root.level, Level::L1);
		assert_eq!(root.size(), SIZE_512G);

		let block = block_at(&tree, 2 * SIZE_1G).unwrap();
		assert_eq!(block.size(), SIZE_1G);
		assert_eq!(block.level, Level::L1);

		assert!(matches!(
			WalkConfig::new(2, 0),
			Err(Error::InvalidLevel { level: 2, .. })
		));
	}

	#[test]
	fn nested_tables() {
		let mut mem = nested_memory();
		let tree = walk(0x1000, &WalkConfig::default(), &mut mem).unwrap();

		// root + L1 + 2 L2 + 1 L3 tables, each with 512 children.
		assert_eq!(tree.tables().count(), 5);
		assert_eq!(tree.iter().count(), 5 + 5 * 512 - 4);

		let a = block_at(&tree, SIZE_1G + 2 * SIZE_2M).unwrap();
		assert_eq!(a.phys.base, 0x8000_0000);
		assert_eq!(a.level, Level::L2);

		let b = block_at(&tree, 3 * SIZE_1G + 2 * SIZE_2M).unwrap();
		assert_eq!(b.phys.base, 0x9000_0000);

		let l3 = tree
			.tables()
			.find(|(_, t)| t.level == Level::L3)
			.map(|(_, t)| t)
			.unwrap();
		assert_eq!(l3.table_addr, 0x5000);
		assert_eq!(l3.virt.base, SIZE_1G + 7 * SIZE_2M);
		assert_eq!(l3.size(), SIZE_2M);
		// One identity mapped, uniformly attributed run.
		assert_eq!(l3.compressed.len(), 1);
		let CompressedEntry::Block(run) = l3.compressed[0] else {
			panic!("expected a block");
		};
		assert_eq!(run.virt, l3.virt);
		assert_eq!(run.phys, l3.virt);
	}

	#[test]
	fn siblings_do_not_share_indices() {
		let mut mem = nested_memory();
		let tree = walk(0x1000, &WalkConfig::default(), &mut mem).unwrap();

		for (id, table) in tree.tables() {
			let span = table.level.entry_span();
			for (i, child) in table.children.iter().enumerate() {
				let entry = &tree[*child];
				assert_eq!(entry.parent(), Some(id));
				assert_eq!(entry.virt().base, table.virt.base + i as u64 * span);
				assert_eq!(entry.virt().size(), span);
			}
		}
	}

	#[test]
	fn table_offset_overflow_aborts_the_walk() {
		let mut mem = SparseMemory::new();
		mem.insert_table(0x1000, &[(0, 0x2000 | TABLE)]).unwrap();

		let config = WalkConfig {
			start_level:  Level::L0,
			table_offset: u64::MAX,
		};
		let err = walk(0x1000, &config, &mut mem).unwrap_err();
		assert!(matches!(err, Error::AddressOverflow { level: Level::L1 }));
	}

	#[test]
	fn table_offset_applies_below_the_root() {
		let offset = 0x4_0000_0000;
		let mut mem = SparseMemory::new();
		mem.insert_table(0x1000, &[(0, 0x2000 | TABLE | (1 << 63))])
			.unwrap();
		mem.insert_table(0x2000 + offset, &[(0, BLOCK)]).unwrap();

		let config = WalkConfig {
			start_level:  Level::L0,
			table_offset: offset,
		};
		let tree = walk(0x1000, &config, &mut mem).unwrap();
		let l1 = tree
			.tables()
			.find(|(_, t)| !t.is_root())
			.map(|(_, t)| t)
			.unwrap();
		assert_eq!(l1.table_addr, 0x2000);
		assert!(l1.attributes.ns_table);
		assert_eq!(l1.compressed.len(), 1);
	}

	#[test]
	fn read_failure_aborts_the_walk() {
		let mut mem = SparseMemory::new();
		mem.insert_table(0x1000, &[(0, 0x6000 | TABLE)]).unwrap();

		let err = walk(0x1000, &WalkConfig::default(), &mut mem).unwrap_err();
		let Error::MemoryRead {
			address,
			words,
			ref source,
		} = err
		else {
			panic!("unexpected error: {err:?}");
		};
		assert_eq!(address, 0x6000);
		assert_eq!(words, 512);
		assert_eq!(
			source.downcast_ref::<SparseMemoryError>(),
			Some(&SparseMemoryError::Unbacked(0x6000))
		);
	}

	#[test]
	fn short_reads_are_rejected() {
		struct Truncating;

		impl MemoryReader for Truncating {
			type Error = SparseMemoryError;

			fn read_words(&mut self, _address: u64, count: u32) -> Result<Vec<u64>, Self::Error> {
				Ok(vec![0; count as usize - 1])
			}
		}

		let err = walk(0x1000, &WalkConfig::default(), &mut Truncating).unwrap_err();
		assert!(matches!(
			err,
			Error::ShortRead {
				address: 0x1000,
				requested: 512,
				received: 511,
			}
		));
	}
}
