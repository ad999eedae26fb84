use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use rsp2h::writer::Dataset;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Converts NIST CAVP AES-GCM response files into a C header of test vectors.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
	#[arg(
		short = 'i',
		long = "in",
		required = true,
		value_name = "FILE.rsp",
		help = "Comma separated list of input RSP files"
	)]
	input_files: String,

	#[arg(
		short = 'o',
		long = "out",
		required = true,
		value_name = "FILE.h",
		help = "Output C header file"
	)]
	output_file: String,
}

impl Args {
	/// Input paths in the order they were listed.
	fn inputs(&self) -> Vec<&str> {
		self.input_files.split(',').collect()
	}
}

// Loads every input in order, then writes the header. One progress line per input.
fn run<W: Write>(args: &Args, progress: &mut W) -> Result<usize> {
	let inputs = args.inputs();

	let mut data = Dataset::default();
	for input in &inputs {
		writeln!(progress, "Processing: {}", input)?;
		data.load(input)
			.with_context(|| format!("failed to parse {}", input))?;
	}

	let rows = data.write_to_path(&args.output_file, &inputs)
		.with_context(|| format!("failed to write {}", args.output_file))?;
	Ok(rows)
}

fn main() -> Result<()> {
	// Logs go to stderr, stdout only carries the progress lines.
	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
		.with(fmt::layer().with_writer(std::io::stderr))
		.init();

	let args = Args::parse();
	run(&args, &mut std::io::stdout())?;
	Ok(())
}
