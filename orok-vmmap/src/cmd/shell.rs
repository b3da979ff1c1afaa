//! Implements the interactive `shell` command.
//!
//! Each line is parsed like a command line of its own; the walked tree is
//! kept between lines so repeated queries against the same root don't
//! re-read target memory.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use clap::Parser;

use super::App;
use crate::{AtArgs, SysregsArgs, WalkArgs};

/// A single shell line.
#[derive(Parser, Debug)]
#[clap(no_binary_name = true)]
struct Line {
	/// The command to execute
	#[clap(subcommand)]
	command: LineCommand,
}

/// Commands understood by the shell.
#[derive(Parser, Debug)]
enum LineCommand {
	/// Prints every mapping in the tree
	Map(WalkArgs),
	/// Prints the mapping containing a single address
	At(AtArgs),
	/// Prints the translation-related system registers
	Sysregs(SysregsArgs),
	/// Leaves the shell
	#[clap(alias = "quit")]
	Exit,
}

pub fn run(app: &mut App) -> Result<()> {
	let stdin = std::io::stdin();
	let mut stdout = std::io::stdout();
	run_with(app, stdin.lock(), &mut stdout)
}

/// Runs the shell over `input`, writing results to `out`.
///
/// Command failures are logged and the shell carries on; only I/O
/// failures end it early.
fn run_with<R: BufRead, W: Write>(app: &mut App, input: R, out: &mut W) -> Result<()> {
	write!(out, "vmmap> ")?;
	out.flush()?;

	for line in input.lines() {
		let line = line.context("failed to read command")?;
		let words = line.split_whitespace().collect::<Vec<_>>();

		if !words.is_empty() {
			match Line::try_parse_from(words.iter().copied()) {
				Ok(Line {
					command: LineCommand::Exit,
				}) => return Ok(()),
				Ok(Line { command }) => {
					if let Err(err) = execute(app, command, out) {
						log::error!("{err:#}");
					}
				}
				Err(err) => write!(out, "{}", err.render())?,
			}
		}

		write!(out, "vmmap> ")?;
		out.flush()?;
	}

	writeln!(out)?;
	Ok(())
}

/// Executes one command.
fn execute<W: Write>(app: &mut App, command: LineCommand, out: &mut W) -> Result<()> {
	match command {
		LineCommand::Map(args) => write!(out, "{}", super::map::report(app, &args)?)?,
		LineCommand::At(args) => write!(out, "{}", super::at::report(app, &args)?)?,
		LineCommand::Sysregs(args) => write!(out, "{}", super::sysregs::report(app, &args)?)?,
		LineCommand::Exit => {}
	}
	Ok(())
}
