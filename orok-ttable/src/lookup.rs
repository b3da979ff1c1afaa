//! Point and ancestry queries over a resolved tree.

use crate::{
	addr::TableIndices,
	entry::{Entry, EntryId, Tree},
};

impl Tree {
	/// Finds the leaf (block or unmapped slot) whose virtual range contains
	/// `address`.
	///
	/// Returns `None` if `address` is outside of the root table's range.
	#[must_use]
	pub fn find(&self, address: u64) -> Option<EntryId> {
		let indices = TableIndices::of_address(address);
		let mut current = self.root;
		loop {
			let Entry::Table(table) = self.get(current)? else {
				return Some(current);
			};

			if !table.virt.contains(address) {
				return None;
			}

			current = *table.children.get(indices.get(table.level))?;
		}
	}

	/// Like [`Tree::find`], but returns the entry itself.
	#[must_use]
	pub fn find_entry(&self, address: u64) -> Option<&Entry> {
		self.find(address).and_then(|id| self.get(id))
	}

	/// Translates a virtual address to the physical address it maps to.
	///
	/// Returns `None` if the address isn't mapped by a block.
	#[must_use]
	pub fn translate(&self, address: u64) -> Option<u64> {
		let block = self.find_entry(address)?.as_block()?;
		Some(block.phys.base + (address - block.virt.base))
	}

	/// Returns the tables enclosing `id`, from its immediate parent up to
	/// and including the root.
	///
	/// Empty for the root itself.
	#[must_use]
	pub fn ancestors(&self, id: EntryId) -> Vec<EntryId> {
		let mut chain = Vec::new();
		let mut current = self.get(id).and_then(Entry::parent);
		while let Some(parent) = current {
			chain.push(parent);
			current = self.get(parent).and_then(Entry::parent);
		}
		chain
	}
}
