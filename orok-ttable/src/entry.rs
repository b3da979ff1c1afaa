//! The resolved translation table tree.
//!
//! Every entry lives in a single arena owned by the [`Tree`]. Tables refer
//! to their children, and every entry refers to its parent table, by
//! [`EntryId`]. Parent links are relations only; the arena owns every node.

use core::ops::Index;

use crate::{
	addr::{AddrRange, Level},
	attr::{PageAttributes, TableAttributes},
	descriptor::Descriptor,
};

/// The position of an entry in its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub(crate) usize);

/// A single resolved translation table slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
	/// A zero descriptor.
	Unmapped(Unmapped),
	/// A leaf mapping (block or page).
	Block(Block),
	/// A pointer to a next-level table, or the root table.
	Table(Table),
}

/// A zero descriptor; nothing is mapped in its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unmapped {
	/// The virtual range the slot covers.
	pub virt:   AddrRange,
	/// The level of the table the slot is in.
	pub level:  Level,
	/// The table the slot is in.
	pub parent: EntryId,
}

/// A leaf mapping of a virtual range onto a physical range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
	/// The mapped virtual range.
	pub virt:       AddrRange,
	/// The physical range it maps to.
	pub phys:       AddrRange,
	/// The raw descriptor. For merged runs, that of the first block.
	pub descriptor: Descriptor,
	/// The level of the table the block is in.
	pub level:      Level,
	/// The table the block is in.
	pub parent:     EntryId,
}

impl Block {
	/// The size of the mapping in bytes.
	#[must_use]
	pub const fn size(&self) -> u64 {
		self.virt.size()
	}

	/// Decodes the block's attributes.
	#[must_use]
	pub const fn attributes(&self) -> PageAttributes {
		self.descriptor.page_attributes()
	}
}

/// A translation table and its 512 entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
	/// The virtual range covered by the whole table.
	pub virt:       AddrRange,
	/// The descriptor that points to this table. For the root, the root
	/// address itself.
	pub descriptor: Descriptor,
	/// The level of the entries in this table.
	pub level:      Level,
	/// The physical address of the table, as held by the descriptor.
	pub table_addr: u64,
	/// The decoded table descriptor attributes (empty for the root).
	pub attributes: TableAttributes,
	/// All 512 entries, in index order.
	pub children:   Vec<EntryId>,
	/// The entries with unmapped slots dropped and runs of contiguous,
	/// identically attributed blocks merged.
	pub compressed: Vec<CompressedEntry>,
	/// The table that points to this one; `None` for the root.
	pub parent:     Option<EntryId>,
}

impl Table {
	/// The size of the table's virtual range in bytes.
	#[must_use]
	pub const fn size(&self) -> u64 {
		self.virt.size()
	}

	/// Whether or not this is the root table.
	#[must_use]
	pub const fn is_root(&self) -> bool {
		self.parent.is_none()
	}
}

/// An element of a table's compressed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressedEntry {
	/// A block, or a run of merged blocks.
	Block(Block),
	/// A next-level table, never merged.
	Table(EntryId),
}

impl Entry {
	/// The virtual range covered by the entry.
	#[must_use]
	pub const fn virt(&self) -> AddrRange {
		match self {
			Self::Unmapped(unmapped) => unmapped.virt,
			Self::Block(block) => block.virt,
			Self::Table(table) => table.virt,
		}
	}

	/// The table the entry is in, if any.
	#[must_use]
	pub const fn parent(&self) -> Option<EntryId> {
		match self {
			Self::Unmapped(unmapped) => Some(unmapped.parent),
			Self::Block(block) => Some(block.parent),
			Self::Table(table) => table.parent,
		}
	}

	/// Returns the table, if this entry is one.
	#[must_use]
	pub const fn as_table(&self) -> Option<&Table> {
		match self {
			Self::Table(table) => Some(table),
			_ => None,
		}
	}

	/// Returns the block, if this entry is one.
	#[must_use]
	pub const fn as_block(&self) -> Option<&Block> {
		match self {
			Self::Block(block) => Some(block),
			_ => None,
		}
	}
}

/// A fully resolved translation table tree.
///
/// Built once by [`crate::walk()`] and never modified afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
	/// Arena of all entries.
	pub(crate) entries: Vec<Entry>,
	/// The root table.
	pub(crate) root:    EntryId,
}

impl Tree {
	/// The root table's ID.
	#[must_use]
	pub const fn root(&self) -> EntryId {
		self.root
	}

	/// The root table.
	#[must_use]
	pub fn root_table(&self) -> &Table {
		match &self[self.root] {
			Entry::Table(table) => table,
			// The walker always places a table at the root.
			_ => unreachable!("root entry is not a table"),
		}
	}

	/// Gets an entry, if the ID belongs to this tree.
	#[must_use]
	pub fn get(&self, id: EntryId) -> Option<&Entry> {
		self.entries.get(id.0)
	}

	/// Iterates over every entry along with its ID, in arena order
	/// (each table precedes its children).
	pub fn iter(&self) -> impl Iterator<Item = (EntryId, &Entry)> {
		self.entries
			.iter()
			.enumerate()
			.map(|(i, entry)| (EntryId(i), entry))
	}

	/// Iterates over every table in the tree.
	pub fn tables(&self) -> impl Iterator<Item = (EntryId, &Table)> {
		self.iter()
			.filter_map(|(id, entry)| entry.as_table().map(|table| (id, table)))
	}
}

impl Index<EntryId> for Tree {
	type Output = Entry;

	fn index(&self, id: EntryId) -> &Self::Output {
		&self.entries[id.0]
	}
}
