//! Inspects the AArch64 MMU translation tables of a memory image or a
//! halted target.

pub(crate) mod backend;
pub(crate) mod cmd;
pub(crate) mod output;
pub(crate) mod session;
pub(crate) mod symbols;

use std::path::PathBuf;

use clap::Parser;
use orok_ttable::{Level, parse_hex};

/// vmmap: AArch64 translation table inspector
///
/// Walks a 4-level, 4KiB granule translation table tree starting at a
/// root table and prints the resulting virtual to physical mappings.
#[derive(Parser, Debug)]
struct Args {
	/// Log verbosely. Specify multiple times for more verbosity.
	#[clap(long, short = 'v', action = clap::ArgAction::Count)]
	pub verbose: u8,
	/// Where memory (and registers) come from.
	#[clap(flatten)]
	pub target:  TargetArgs,
	/// The command to execute
	#[clap(subcommand)]
	command:     Command,
}

/// Subcommands for vmmap
#[derive(Parser, Debug)]
enum Command {
	/// Prints every mapping in the tree
	Map(WalkArgs),
	/// Prints the mapping containing a single address
	At(AtArgs),
	/// Prints the translation-related system registers
	Sysregs(SysregsArgs),
	/// Reads commands from stdin, keeping walked tables between them
	Shell,
}

/// Selects the memory and register back end.
#[derive(Parser, Debug)]
pub(crate) struct TargetArgs {
	/// Read memory from a raw little-endian memory dump.
	#[clap(long, conflicts_with = "openocd")]
	pub image:      Option<PathBuf>,
	/// The physical address the first byte of `--image` was dumped from.
	#[clap(long, default_value = "0", value_parser = parse_hex)]
	pub image_base: u64,
	/// Read memory and registers through OpenOCD's TCL RPC server
	/// (`HOST[:PORT]`). This is the default, on `127.0.0.1:6666`.
	#[clap(long)]
	pub openocd:    Option<String>,
	/// Read target memory by virtual rather than physical address.
	#[clap(long, conflicts_with = "image")]
	pub virt:       bool,
	/// Seconds to wait for each OpenOCD response.
	#[clap(long, default_value = "10")]
	pub timeout:    u64,
	/// Resolve symbol names through this ELF file.
	#[clap(long)]
	pub elf:        Option<PathBuf>,
}

/// Options controlling how the tree is found, walked and printed.
#[derive(Parser, Debug, Clone)]
pub(crate) struct WalkArgs {
	/// The root table: a hex address (`0x...`) or an ELF symbol.
	#[clap(long, short = 't')]
	pub ttbr:         Option<String>,
	/// Read `TTBR0_EL1` and `MAIR_EL1` from the target when not given.
	#[clap(long)]
	pub from_target:  bool,
	/// The `MAIR_EL1` value used to describe memory types.
	#[clap(long, short = 'm', value_parser = parse_hex)]
	pub mair:         Option<u64>,
	/// The level of the root table's entries (0 or 1).
	#[clap(long, short = 'l', default_value = "0", value_parser = start_level)]
	pub level:        Level,
	/// Added to every next-level table address before it is read.
	#[clap(long, default_value = "0", value_parser = parse_hex)]
	pub table_offset: u64,
	/// Show every entry rather than merged runs.
	#[clap(long, short = 'a')]
	pub all:          bool,
	/// Show the table hierarchy.
	#[clap(long, short = 'H')]
	pub hierarchy:    bool,
	/// Discard cached tables and walk again.
	#[clap(long, short = 'c')]
	pub clear:        bool,
	/// The output format.
	#[clap(long, default_value = "text")]
	pub format:       OutputFormat,
}

/// Arguments for the `at` command
#[derive(Parser, Debug, Clone)]
pub(crate) struct AtArgs {
	/// Walk options.
	#[clap(flatten)]
	pub walk:    WalkArgs,
	/// The virtual address to look up.
	#[clap(value_parser = parse_hex, required_unless_present = "symbol")]
	pub address: Option<u64>,
	/// Look up the address of this ELF symbol instead.
	#[clap(long, short = 's', conflicts_with = "address")]
	pub symbol:  Option<String>,
}

/// Arguments for the `sysregs` command
#[derive(Parser, Debug, Clone)]
pub(crate) struct SysregsArgs {
	/// The output format.
	#[clap(long, default_value = "text")]
	pub format: OutputFormat,
}

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
pub(crate) enum OutputFormat {
	/// Human readable lines.
	#[strum(serialize = "text")]
	Text,
	/// Pretty-printed JSON.
	#[strum(serialize = "json")]
	Json,
}

/// Parses a starting level.
fn start_level(input: &str) -> Result<Level, String> {
	let level = input.parse::<u8>().map_err(|e| e.to_string())?;
	Level::new_start(level).map_err(|e| e.to_string())
}

fn pmain() -> anyhow::Result<()> {
	let args = Args::parse();

	let verbosity = match args.verbose {
		0 => log::LevelFilter::Info,
		1 => log::LevelFilter::Debug,
		_ => log::LevelFilter::Trace,
	};

	log::set_max_level(verbosity);
	colog::default_builder().filter_level(verbosity).init();

	let mut app = cmd::App::open(&args.target)?;

	match args.command {
		Command::Map(args) => cmd::map::run(&mut app, &args)?,
		Command::At(args) => cmd::at::run(&mut app, &args)?,
		Command::Sysregs(args) => cmd::sysregs::run(&mut app, &args)?,
		Command::Shell => cmd::shell::run(&mut app)?,
	}

	Ok(())
}

fn main() {
	if let Err(e) = pmain() {
		log::error!("fatal: {e:#}");
		std::process::exit(1);
	}
}
