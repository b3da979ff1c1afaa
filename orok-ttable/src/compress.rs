//! Run-length compression of a table's entries.

use crate::entry::{Block, CompressedEntry, Entry, EntryId};

/// Merges runs of contiguous, identically attributed blocks.
///
/// A single greedy left-to-right pass: a block extends the current run if
/// its attribute bits equal the run's and both its virtual and physical
/// ranges start directly after the run's. Tables are never merged and
/// always end the current run.
///
/// Compressing an already compressed sequence yields the same sequence.
pub fn compress<I>(entries: I) -> Vec<CompressedEntry>
where
	I: IntoIterator<Item = CompressedEntry>,
{
	let mut out: Vec<CompressedEntry> = Vec::new();

	for entry in entries {
		if let (Some(CompressedEntry::Block(run)), CompressedEntry::Block(next)) =
			(out.last_mut(), &entry)
		{
			if extends(run, next) {
				run.virt.end = next.virt.end;
				run.phys.end = next.phys.end;
				continue;
			}
		}

		out.push(entry);
	}

	out
}

/// Compresses a table's children, dropping unmapped entries first.
pub(crate) fn compress_children(
	tree_entries: &[Entry],
	children: &[EntryId],
) -> Vec<CompressedEntry> {
	compress(children.iter().filter_map(|&id| {
		match tree_entries.get(id.0)? {
			Entry::Unmapped(_) => None,
			Entry::Block(block) => Some(CompressedEntry::Block(*block)),
			Entry::Table(_) => Some(CompressedEntry::Table(id)),
		}
	}))
}

/// Whether or not `next` continues the run `run`.
fn extends(run: &Block, next: &Block) -> bool {
	run.descriptor.attributes() == next.descriptor.attributes()
		&& run.virt.abuts(next.virt)
		&& run.phys.abuts(next.phys)
}
