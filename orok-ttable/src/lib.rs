#![cfg_attr(
	not(doc),
	expect(missing_docs, reason = "docs are enabled only under `doc` cfg")
)]
#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod addr;
pub mod attr;
mod compress;
pub mod descriptor;
mod entry;
mod error;
mod lookup;
pub mod mair;
mod mem;
mod render;
pub mod sysreg;
mod walk;

pub use self::{
	addr::{AddrRange, Level, TableIndices, table_span, virtual_address, virtual_range},
	attr::{PageAttributes, Shareability, TableAttributes},
	compress::compress,
	descriptor::Descriptor,
	entry::{Block, CompressedEntry, Entry, EntryId, Table, Tree, Unmapped},
	error::{Error, SourceError, parse_hex},
	mair::Mair,
	mem::{MemoryReader, SparseMemory, SparseMemoryError},
	render::{
		RenderOptions,
		block_line,
		format_hex,
		render,
		render_mapping_at,
		table_header,
	},
	sysreg::{RegisterReader, SystemRegister, ttbr_base_address},
	walk::{WalkConfig, walk},
};
