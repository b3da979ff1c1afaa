//! Implements the `sysregs` command.

use std::fmt::Write;

use anyhow::Result;
use orok_ttable::{SystemRegister, format_hex};
use serde::Serialize;
use strum::IntoEnumIterator;

use super::App;
use crate::{OutputFormat, SysregsArgs};

/// A system register and its value.
#[derive(Debug, Serialize)]
struct RegisterRecord {
	/// The architectural register name.
	name:  String,
	/// The register's value.
	value: String,
}

pub fn run(app: &mut App, args: &SysregsArgs) -> Result<()> {
	print!("{}", report(app, args)?);
	Ok(())
}

/// Reads and formats every translation-related system register.
pub fn report(app: &mut App, args: &SysregsArgs) -> Result<String> {
	let mut records = Vec::new();
	for register in SystemRegister::iter() {
		let value = register.read(app.backend())?;
		records.push(RegisterRecord {
			name:  register.to_string(),
			value: format_hex(value),
		});
	}

	let mut out = String::new();
	match args.format {
		OutputFormat::Text => {
			for record in &records {
				writeln!(out, "{}\t{}", record.name, record.value)?;
			}
		}
		OutputFormat::Json => {
			out = serde_json::to_string_pretty(&records)?;
			out.push('\n');
		}
	}

	Ok(out)
}
