//! Implements the `map` command.

use anyhow::Result;
use orok_ttable::{RenderOptions, render};

use super::App;
use crate::{OutputFormat, WalkArgs, output};

pub fn run(app: &mut App, args: &WalkArgs) -> Result<()> {
	print!("{}", report(app, args)?);
	Ok(())
}

/// Produces the full mapping listing.
pub fn report(app: &mut App, args: &WalkArgs) -> Result<String> {
	let (tree, mair) = app.tree(args)?;

	let mut out = String::new();
	match args.format {
		OutputFormat::Text => {
			let options = RenderOptions {
				all:       args.all,
				hierarchy: args.hierarchy,
			};
			render(tree, mair, options, &mut out)?;
		}
		OutputFormat::Json => {
			out = serde_json::to_string_pretty(&output::mappings(tree, mair, args.all))?;
			out.push('\n');
		}
	}

	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cmd::tests::{app, walk_args};

	#[test]
	fn text_listing() {
		let mut app = app();
		let out = report(&mut app, &walk_args(Some("0x1000"))).unwrap();
		assert_eq!(out.lines().count(), 1);
		assert!(out.starts_with(
			"Virtual Addr: 0x0000000040000000 - 0x000000007fffffff Size: 0x0000000040000000 \
			 Physical Addr: 0x0000000040000000 - 0x000000007fffffff"
		));
	}

	#[test]
	fn json_listing() {
		let mut app = app();
		let mut args = walk_args(Some("root_table"));
		args.format = OutputFormat::Json;

		let out = report(&mut app, &args).unwrap();
		let value: serde_json::Value = serde_json::from_str(&out).unwrap();
		assert_eq!(value.as_array().map(Vec::len), Some(1));
		assert_eq!(value[0]["vbase"], "0x0000000080000000");
		assert_eq!(value[0]["level"], 1);
	}
}
