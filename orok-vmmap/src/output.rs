//! Machine readable (JSON) output.

use orok_ttable::{
	Block,
	CompressedEntry,
	Entry,
	EntryId,
	Mair,
	Table,
	TableIndices,
	Tree,
	format_hex,
};
use serde::Serialize;

/// A single mapping (block, page or merged run).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingRecord {
	/// First virtual address.
	pub vbase:      String,
	/// Last virtual address (inclusive).
	pub vend:       String,
	/// Size in bytes.
	pub size:       String,
	/// First physical address.
	pub pbase:      String,
	/// Last physical address (inclusive).
	pub pend:       String,
	/// Level of the table holding the mapping.
	pub level:      u8,
	/// The raw descriptor.
	pub descriptor: String,
	/// Decoded attributes.
	pub attributes: Vec<String>,
}

impl MappingRecord {
	/// Describes a block.
	pub fn new(block: &Block, mair: Option<Mair>) -> Self {
		Self {
			vbase:      format_hex(block.virt.base),
			vend:       format_hex(block.virt.end),
			size:       format_hex(block.size()),
			pbase:      format_hex(block.phys.base),
			pend:       format_hex(block.phys.end),
			level:      block.level.as_u8(),
			descriptor: format_hex(block.descriptor.raw()),
			attributes: block.attributes().labels(mair),
		}
	}
}

/// A translation table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRecord {
	/// Level of the table's entries.
	pub level:      u8,
	/// Physical address of the table.
	pub table_addr: String,
	/// First virtual address covered.
	pub vbase:      String,
	/// Last virtual address covered (inclusive).
	pub vend:       String,
	/// Size of the covered range in bytes.
	pub size:       String,
	/// Decoded table attributes.
	pub attributes: Vec<String>,
}

impl TableRecord {
	/// Describes a table.
	pub fn new(table: &Table) -> Self {
		Self {
			level:      table.level.as_u8(),
			table_addr: format_hex(table.table_addr),
			vbase:      format_hex(table.virt.base),
			vend:       format_hex(table.virt.end),
			size:       format_hex(table.size()),
			attributes: table.attributes.labels(),
		}
	}
}

/// The result of a point query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupRecord {
	/// The queried address.
	pub address: String,
	/// The table index selecting the address at each level, level 0 first.
	pub indices: [u16; 4],
	/// Enclosing tables, root first.
	pub tables:  Vec<TableRecord>,
	/// The mapping, or `null` if the address isn't mapped.
	pub mapping: Option<MappingRecord>,
}

/// Collects every mapping in address order; merged runs unless `all`.
pub fn mappings(tree: &Tree, mair: Option<Mair>, all: bool) -> Vec<MappingRecord> {
	let mut out = Vec::new();
	collect(tree, tree.root_table(), mair, all, &mut out);
	out
}

/// Appends the mappings below `table` to `out`.
fn collect(
	tree: &Tree,
	table: &Table,
	mair: Option<Mair>,
	all: bool,
	out: &mut Vec<MappingRecord>,
) {
	let visit = |entry: CompressedEntry, out: &mut Vec<MappingRecord>| {
		match entry {
			CompressedEntry::Block(block) => out.push(MappingRecord::new(&block, mair)),
			CompressedEntry::Table(id) => {
				if let Some(child) = tree.get(id).and_then(Entry::as_table) {
					collect(tree, child, mair, all, out);
				}
			}
		}
	};

	if all {
		for &id in &table.children {
			match tree.get(id) {
				Some(Entry::Block(block)) => visit(CompressedEntry::Block(*block), out),
				Some(Entry::Table(_)) => visit(CompressedEntry::Table(id), out),
				Some(Entry::Unmapped(_)) | None => {}
			}
		}
	} else {
		for entry in &table.compressed {
			visit(*entry, out);
		}
	}
}

/// Describes the mapping at `address`.
pub fn lookup(tree: &Tree, mair: Option<Mair>, address: u64) -> LookupRecord {
	let found: Option<(EntryId, &Block)> = tree
		.find(address)
		.and_then(|id| tree.get(id)?.as_block().map(|block| (id, block)));

	LookupRecord {
		address: format_hex(address),
		indices: TableIndices::of_address(address).as_array(),
		tables:  found
			.map(|(id, _)| {
				tree.ancestors(id)
					.into_iter()
					.rev()
					.filter_map(|id| tree.get(id)?.as_table().map(TableRecord::new))
					.collect()
			})
			.unwrap_or_default(),
		mapping: found.map(|(_, block)| MappingRecord::new(block, mair)),
	}
}

#[cfg(test)]
mod tests {
	use orok_ttable::{SparseMemory, WalkConfig, walk};
	use serde_json::json;

	use super::*;

	/// L1 root at 0x1000 -> L2 at 0x2000 -> L3 at 0x3000 mapping four
	/// contiguous pages at 0x8000_0000.
	fn tree() -> Tree {
		let mut mem = SparseMemory::new();
		mem.insert_table(0x1000, &[(0, 0x2003)]).unwrap();
		mem.insert_table(0x2000, &[(0, 0x3003)]).unwrap();
		let pages = (0..4)
			.map(|i| (i, (0x8000_0000 + i as u64 * 0x1000) | 0x703))
			.collect::<Vec<_>>();
		mem.insert_table(0x3000, &pages).unwrap();
		walk(0x1000, &WalkConfig::new(1, 0).unwrap(), &mut mem).unwrap()
	}

	#[test]
	fn merged_and_full_mappings() {
		let tree = tree();

		let merged = mappings(&tree, None, false);
		assert_eq!(merged.len(), 1);
		assert_eq!(merged[0].vbase, "0x0000000000000000");
		assert_eq!(merged[0].size, "0x0000000000004000");
		assert_eq!(merged[0].pend, "0x0000000080003fff");

		let all = mappings(&tree, None, true);
		assert_eq!(all.len(), 4);
		assert_eq!(all[3].pbase, "0x0000000080003000");
		assert_eq!(all[3].level, 3);
	}

	#[test]
	fn lookup_json() {
		let tree = tree();
		let record = lookup(&tree, Some(Mair::new(0x04)), 0x1010);

		let value = serde_json::to_value(&record).unwrap();
		assert_eq!(value["address"], json!("0x0000000000001010"));
		assert_eq!(value["indices"], json!([0, 0, 0, 1]));
		assert_eq!(value["tables"].as_array().map(Vec::len), Some(3));
		assert_eq!(value["tables"][0]["level"], json!(1));
		assert_eq!(value["tables"][2]["table_addr"], json!("0x0000000000003000"));
		assert_eq!(value["mapping"]["pbase"], json!("0x0000000080001000"));
		assert_eq!(
			value["mapping"]["attributes"],
			json!(["AF", "Inner Shareable", "Device-nGnRE"])
		);

		let missing = lookup(&tree, None, 0x10_0000);
		assert_eq!(missing.indices, [0, 0, 0, 256]);
		assert!(missing.tables.is_empty());
		assert_eq!(serde_json::to_value(&missing).unwrap()["mapping"], json!(null));
	}
}
