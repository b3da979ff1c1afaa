//! ELF symbol resolution.

use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};

/// Symbol name to address mapping loaded from an ELF file.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
	/// Defined symbols by name.
	symbols: HashMap<String, u64>,
}

impl SymbolTable {
	/// Loads the defined symbols of an ELF file.
	pub fn load(path: &Path) -> Result<Self> {
		let data = std::fs::read(path)
			.with_context(|| format!("failed to read ELF file {}", path.display()))?;
		Self::parse(&data)
			.with_context(|| format!("failed to load symbols from {}", path.display()))
	}

	/// Parses the symbol table (falling back to the dynamic symbol table)
	/// of an in-memory ELF file.
	pub fn parse(data: &[u8]) -> Result<Self> {
		let elf = elf::ElfBytes::<elf::endian::AnyEndian>::minimal_parse(data)
			.context("failed to parse ELF file")?;

		let tables = match elf
			.symbol_table()
			.context("failed to read ELF symbol table")?
		{
			Some(tables) => Some(tables),
			None => {
				elf.dynamic_symbol_table()
					.context("failed to read ELF dynamic symbol table")?
			}
		};

		let (symtab, strtab) = tables.context("ELF file has no symbol table")?;

		let symbols = symtab
			.iter()
			.filter(|sym| !sym.is_undefined() && sym.st_name != 0)
			.filter_map(|sym| {
				strtab
					.get(sym.st_name as usize)
					.ok()
					.map(|name| (name.to_string(), sym.st_value))
			})
			.collect::<HashMap<_, _>>();

		log::debug!("loaded {} ELF symbol(s)", symbols.len());

		Ok(Self { symbols })
	}

	/// Looks up the address of `name`.
	pub fn resolve(&self, name: &str) -> Option<u64> {
		self.symbols.get(name).copied()
	}

	/// The number of known symbols.
	pub fn len(&self) -> usize {
		self.symbols.len()
	}

	/// Whether or not no symbols are known.
	pub fn is_empty(&self) -> bool {
		self.symbols.is_empty()
	}
}

impl FromIterator<(String, u64)> for SymbolTable {
	fn from_iter<T: IntoIterator<Item = (String, u64)>>(iter: T) -> Self {
		Self {
			symbols: iter.into_iter().collect(),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn resolves_known_symbols() {
		let table = [("kernel_l0".to_string(), 0x4008_0000)]
			.into_iter()
			.collect::<SymbolTable>();
		assert_eq!(table.len(), 1);
		assert_eq!(table.resolve("kernel_l0"), Some(0x4008_0000));
		assert_eq!(table.resolve("missing"), None);
	}

	#[test]
	fn rejects_non_elf_files() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(b"definitely not an ELF file").unwrap();
		file.flush().unwrap();

		let err = SymbolTable::load(file.path()).unwrap_err();
		assert!(format!("{err:#}").contains("failed to parse ELF file"));
	}

	#[test]
	fn loads_own_test_binary() {
		// Test binaries are unstripped ELF files on the platforms this tool
		// targets; skip elsewhere.
		let Ok(exe) = std::env::current_exe() else {
			return;
		};
		let Ok(data) = std::fs::read(exe) else {
			return;
		};
		if !data.starts_with(b"\x7fELF") {
			return;
		}

		let table = SymbolTable::parse(&data).unwrap();
		assert!(!table.is_empty());
	}
}
