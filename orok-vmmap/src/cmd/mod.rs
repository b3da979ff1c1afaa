//! All subcommand implementations for vmmap.

pub mod at;
pub mod map;
pub mod shell;
pub mod sysregs;

use anyhow::{Context, Result};
use orok_ttable::{Mair, SystemRegister, Tree, parse_hex, ttbr_base_address};

use crate::{TargetArgs, WalkArgs, backend::Backend, session::Session, symbols::SymbolTable};

/// State shared by every command: the back end, the symbols and the
/// cached walk.
pub struct App {
	/// Where memory and registers come from.
	backend: Backend,
	/// Symbols from `--elf`, if given.
	symbols: Option<SymbolTable>,
	/// The last walked tree.
	session: Session,
}

impl App {
	/// Opens the back end and loads symbols as requested on the command line.
	pub fn open(target: &TargetArgs) -> Result<Self> {
		let symbols = target
			.elf
			.as_deref()
			.map(SymbolTable::load)
			.transpose()?;
		if let Some(symbols) = &symbols {
			if symbols.is_empty() {
				log::warn!("no symbols found in ELF file; symbol lookups will fail");
			} else {
				log::info!("loaded {} symbol(s)", symbols.len());
			}
		}
		Ok(Self::new(Backend::open(target)?, symbols))
	}

	/// Creates an app around an already opened back end.
	pub fn new(backend: Backend, symbols: Option<SymbolTable>) -> Self {
		log::debug!("using the {} back end", backend.name());
		Self {
			backend,
			symbols,
			session: Session::new(),
		}
	}

	/// Resolves an ELF symbol.
	pub fn symbol(&self, name: &str) -> Result<u64> {
		let symbols = self
			.symbols
			.as_ref()
			.with_context(|| format!("cannot resolve symbol `{name}` without --elf"))?;
		symbols
			.resolve(name)
			.with_context(|| format!("symbol `{name}` not found"))
	}

	/// The back end, for commands that talk to it directly.
	pub fn backend(&mut self) -> &mut Backend {
		&mut self.backend
	}

	/// Determines the root table address given (if any).
	fn root(&mut self, args: &WalkArgs) -> Result<Option<u64>> {
		match &args.ttbr {
			Some(ttbr) if ttbr.starts_with("0x") || ttbr.starts_with("0X") => {
				Ok(Some(parse_hex(ttbr)?))
			}
			Some(name) => Ok(Some(self.symbol(name)?)),
			None if args.from_target => {
				let ttbr = SystemRegister::Ttbr0El1.read(&mut self.backend)?;
				let root = ttbr_base_address(ttbr);
				log::info!("TTBR0_EL1: {ttbr:#018x} (root table at {root:#018x})");
				Ok(Some(root))
			}
			None => Ok(None),
		}
	}

	/// Determines the MAIR value given (if any).
	fn mair(&mut self, args: &WalkArgs) -> Result<Option<Mair>> {
		let mair = match args.mair {
			Some(raw) => Mair::new(raw),
			None if args.from_target => Mair::new(SystemRegister::MairEl1.read(&mut self.backend)?),
			None => return Ok(None),
		};

		for (index, ty) in mair.anomalies() {
			log::warn!("MAIR attribute {index} is anomalous: {ty}");
		}

		Ok(Some(mair))
	}

	/// Returns the tree described by `args`, walking it only if it isn't
	/// cached, along with the MAIR value to describe it with.
	pub fn tree(&mut self, args: &WalkArgs) -> Result<(&Tree, Option<Mair>)> {
		if args.clear {
			self.session.invalidate();
		}

		let root = self.root(args)?;
		let mair = self.mair(args)?;
		let key = self
			.session
			.key(root, mair, args.level, args.table_offset)
			.context("no root table given; pass --ttbr or --from-target")?;

		let tree = self
			.session
			.tree(key, &mut self.backend)
			.with_context(|| format!("failed to walk translation tables at {:#018x}", key.root))?;

		Ok((tree, key.mair))
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use orok_ttable::{Level, MemoryReader, SparseMemory};

	use super::*;
	use crate::{OutputFormat, backend::ImageMemory};

	/// An image based at 0x1000 holding an L1 root table at 0x1000 whose
	/// slot 1 maps the 1GiB block at 0x4000_0000, followed by an L1 table
	/// at 0x2000 whose slot 2 maps 0x8000_0000.
	pub fn app() -> App {
		let mut mem = SparseMemory::new();
		mem.insert_table(0x1000, &[(1, 0x4000_0701)]).unwrap();
		mem.insert_table(0x2000, &[(2, 0x8000_0701)]).unwrap();

		let mut data = Vec::new();
		for word in mem.read_words(0x1000, 1024).unwrap() {
			data.extend_from_slice(&word.to_le_bytes());
		}

		let symbols = [("root_table".to_string(), 0x2000)].into_iter().collect();
		App::new(
			Backend::Image(ImageMemory::from_bytes(0x1000, data)),
			Some(symbols),
		)
	}

	/// Walk options starting at level 1.
	pub fn walk_args(ttbr: Option<&str>) -> WalkArgs {
		WalkArgs {
			ttbr:         ttbr.map(str::to_string),
			from_target:  false,
			mair:         None,
			level:        Level::L1,
			table_offset: 0,
			all:          false,
			hierarchy:    false,
			clear:        false,
			format:       OutputFormat::Text,
		}
	}

	#[test]
	fn roots_from_hex_and_symbols() {
		let mut app = app();

		let (tree, mair) = app.tree(&walk_args(Some("0x1000"))).unwrap();
		assert_eq!(tree.translate(0x4000_1234), Some(0x4000_1234));
		assert_eq!(mair, None);

		let (tree, _) = app.tree(&walk_args(Some("root_table"))).unwrap();
		assert_eq!(tree.translate(0x8000_0000), Some(0x8000_0000));
		assert_eq!(tree.translate(0x4000_0000), None);
	}

	#[test]
	fn reuses_the_last_root() {
		let mut app = app();
		app.tree(&walk_args(Some("0x1000"))).unwrap();

		let mut args = walk_args(None);
		args.mair = Some(0xFF);
		let (tree, mair) = app.tree(&args).unwrap();
		assert_eq!(tree.translate(0x4000_0000), Some(0x4000_0000));
		assert_eq!(mair, Some(Mair::new(0xFF)));
	}

	#[test]
	fn resolution_failures() {
		let mut app = app();

		let err = app.tree(&walk_args(None)).unwrap_err();
		assert!(err.to_string().contains("no root table given"));

		let err = app.tree(&walk_args(Some("nope"))).unwrap_err();
		assert_eq!(err.to_string(), "symbol `nope` not found");

		let mut args = walk_args(None);
		args.from_target = true;
		let err = app.tree(&args).unwrap_err();
		assert!(format!("{err:#}").contains("cannot read system registers"));

		let err = app.tree(&walk_args(Some("0x9000"))).unwrap_err();
		assert!(format!("{err:#}").contains("failed to walk translation tables"));
	}
}
