//! Implements the `at` command.

use anyhow::Result;
use orok_ttable::render_mapping_at;

use super::App;
use crate::{AtArgs, OutputFormat, output};

pub fn run(app: &mut App, args: &AtArgs) -> Result<()> {
	print!("{}", report(app, args)?);
	Ok(())
}

/// Describes the mapping containing the requested address.
pub fn report(app: &mut App, args: &AtArgs) -> Result<String> {
	let address = match (&args.symbol, args.address) {
		(Some(symbol), _) => {
			let address = app.symbol(symbol)?;
			log::info!("{symbol} is at {address:#018x}");
			address
		}
		(None, Some(address)) => address,
		(None, None) => anyhow::bail!("no address given"),
	};

	let (tree, mair) = app.tree(&args.walk)?;

	let mut out = String::new();
	match args.walk.format {
		OutputFormat::Text => render_mapping_at(tree, mair, address, &mut out)?,
		OutputFormat::Json => {
			out = serde_json::to_string_pretty(&output::lookup(tree, mair, address))?;
			out.push('\n');
		}
	}

	Ok(out)
}
