//! Text rendering of a resolved tree.

use core::fmt::{self, Write};

use crate::{
	entry::{Block, CompressedEntry, Entry, EntryId, Table, Tree},
	mair::Mair,
};

/// One level of hierarchy indentation.
const INDENT: &str = "  ";

/// Formats an address or descriptor as a zero-padded 64-bit hex number.
#[must_use]
pub fn format_hex(value: u64) -> String {
	format!("{value:#018x}")
}

/// Options controlling how a tree is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
	/// Show every block individually rather than merged runs.
	pub all:       bool,
	/// Show table headers, indented by level.
	pub hierarchy: bool,
}

/// Renders a single block (or merged run of blocks) on one line.
#[must_use]
pub fn block_line(block: &Block, mair: Option<Mair>) -> String {
	format!(
		"Virtual Addr: {} - {} Size: {} Physical Addr: {} - {} Attributes: {} Page/Block [{}]",
		format_hex(block.virt.base),
		format_hex(block.virt.end),
		format_hex(block.size()),
		format_hex(block.phys.base),
		format_hex(block.phys.end),
		format_hex(block.descriptor.raw()),
		block.attributes().labels(mair).join(", "),
	)
}

/// Renders a table header on one line.
#[must_use]
pub fn table_header(table: &Table) -> String {
	let mut line = format!("Level {} TABLE ", table.level);
	if !table.is_root() {
		line.push_str(&format!("(@ phys. {:#x}) ", table.table_addr));
	}
	line.push_str(&format!(
		"Virtual Addr: {} - {} Size: {} Attributes: {} Table: [{}]",
		format_hex(table.virt.base),
		format_hex(table.virt.end),
		format_hex(table.size()),
		format_hex(table.descriptor.attributes()),
		table.attributes.labels().join(", "),
	));
	line
}

/// Renders the whole tree.
///
/// Unmapped slots never produce output.
pub fn render<W: Write + ?Sized>(
	tree: &Tree,
	mair: Option<Mair>,
	options: RenderOptions,
	out: &mut W,
) -> fmt::Result {
	Renderer {
		tree,
		mair,
		options,
	}
	.table(tree.root_table(), out)
}

/// Renders the mapping containing `address`: the enclosing table headers,
/// root first, followed by the block itself.
///
/// Writes `No mapping!` if the address isn't mapped.
pub fn render_mapping_at<W: Write + ?Sized>(
	tree: &Tree,
	mair: Option<Mair>,
	address: u64,
	out: &mut W,
) -> fmt::Result {
	let Some((id, Entry::Block(block))) = tree.find(address).map(|id| (id, &tree[id])) else {
		return writeln!(out, "No mapping!");
	};

	for ancestor in tree.ancestors(id).into_iter().rev() {
		if let Entry::Table(table) = &tree[ancestor] {
			writeln!(out, "{}", table_header(table))?;
		}
	}

	writeln!(out, "{}", block_line(block, mair))
}

/// Shared rendering state.
struct Renderer<'a> {
	/// The tree being rendered.
	tree:    &'a Tree,
	/// Used to describe memory types, if known.
	mair:    Option<Mair>,
	/// What to show.
	options: RenderOptions,
}

impl Renderer<'_> {
	/// Renders a table and everything below it.
	fn table<W: Write + ?Sized>(&self, table: &Table, out: &mut W) -> fmt::Result {
		let indent = INDENT.repeat(table.level.as_usize());

		if self.options.hierarchy {
			writeln!(out, "{indent}{}", table_header(table))?;
		}

		let entries: Vec<CompressedEntry> = if self.options.all {
			table
				.children
				.iter()
				.filter_map(|&id| self.visible(id))
				.collect()
		} else {
			table.compressed.clone()
		};

		for entry in entries {
			match entry {
				CompressedEntry::Block(block) => self.block(&block, out)?,
				CompressedEntry::Table(id) => {
					if let Some(child) = self.tree.get(id).and_then(Entry::as_table) {
						self.table(child, out)?;
					}
				}
			}
		}

		if self.options.hierarchy {
			if let Some(parent) = table
				.parent
				.and_then(|id| self.tree.get(id))
				.and_then(Entry::as_table)
			{
				writeln!(out, "{indent}Continuation of Lvl {} Table...", parent.level)?;
			}
		}

		Ok(())
	}

	/// Renders a block line, indented one past its table when showing
	/// the hierarchy.
	fn block<W: Write + ?Sized>(&self, block: &Block, out: &mut W) -> fmt::Result {
		if self.options.hierarchy {
			let depth = self
				.tree
				.get(block.parent)
				.and_then(Entry::as_table)
				.map_or(0, |parent| parent.level.as_usize() + 1);
			out.write_str(&INDENT.repeat(depth))?;
		}
		writeln!(out, "{}", block_line(block, self.mair))
	}

	/// Maps a child to what the uncompressed view shows for it.
	fn visible(&self, id: EntryId) -> Option<CompressedEntry> {
		match self.tree.get(id)? {
			Entry::Unmapped(_) => None,
			Entry::Block(block) => Some(CompressedEntry::Block(*block)),
			Entry::Table(_) => Some(CompressedEntry::Table(id)),
		}
	}
}
