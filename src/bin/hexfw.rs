use std::fs;
use std::io::Write;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use log::{error, info, LevelFilter};
use tempfile::NamedTempFile;

use hexfw::carray;
use hexfw::config::Config;
use hexfw::firmware::Patcher;
use hexfw::image::MemoryImage;

#[derive(Parser, Debug)]
#[command(version, about = "Edits Intel HEX firmware images and patches the firmware descriptor CRC32")]
struct Args
{
	/// TOML file with the target constants
	#[arg(short, long, global = true)]
	config: Option<PathBuf>,

	/// More output, repeat for trace level (RUST_LOG takes precedence)
	#[arg(short, long, action = ArgAction::Count, global = true)]
	verbose: u8,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command
{
	/// Compute the firmware CRC32 and write it into the firmware descriptor
	Crc
	{
		input: PathBuf,
		/// Write the result here instead of patching the input in place
		#[arg(short, long)]
		output: Option<PathBuf>,
		#[arg(long, value_parser = parse_u32)]
		descriptor: Option<u32>,
		#[arg(long, value_parser = parse_u32)]
		page_size: Option<u32>,
		/// Address of page 0 in the descriptor's page numbers
		#[arg(long, value_parser = parse_u32)]
		flash_base: Option<u32>,
		#[arg(long, value_parser = parse_u32)]
		app_min: Option<u32>,
		#[arg(long, value_parser = parse_u32)]
		polynomial: Option<u32>,
	},
	/// Write every non-blank page as a C byte array
	CArray
	{
		input: PathBuf,
		#[arg(short, long)]
		output: Option<PathBuf>,
		#[arg(long, value_parser = parse_u32)]
		page_size: Option<u32>,
		#[arg(long, value_parser = parse_u32)]
		max_address: Option<u32>,
	},
	/// Print the value stored at an address
	Get
	{
		input: PathBuf,
		#[arg(value_parser = parse_u32)]
		address: u32,
		#[arg(short, long, value_enum, default_value_t = Width::Byte)]
		width: Width,
	},
	/// Overwrite the value stored at an address
	Set
	{
		input: PathBuf,
		#[arg(value_parser = parse_u32)]
		address: u32,
		#[arg(value_parser = parse_u32)]
		value: u32,
		#[arg(short, long, value_enum, default_value_t = Width::Byte)]
		width: Width,
		#[arg(short, long)]
		output: Option<PathBuf>,
	},
	/// Drop a record line (counted from 1) from the file
	DeleteLine
	{
		input: PathBuf,
		line: usize,
		#[arg(short, long)]
		output: Option<PathBuf>,
	},
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum Width
{
	#[value(name = "8")]
	Byte,
	#[value(name = "16")]
	Half,
	#[value(name = "32")]
	Word,
}

fn parse_u32(input: &str) -> Result<u32, ParseIntError>
{
	parse_int::parse(input)
}

fn load(path: &Path, page_size: u32) -> Result<MemoryImage>
{
	let text = fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))?;
	MemoryImage::parse(&text, page_size).with_context(|| format!("could not parse {}", path.display()))
}

/// Replaces `path` only once the whole text is on disk next to it.
fn store(path: &Path, text: &str) -> Result<()>
{
	let dir = match path.parent()
	{
		Some(dir) if !dir.as_os_str().is_empty() => dir,
		_ => Path::new("."),
	};
	let mut temp = NamedTempFile::new_in(dir).with_context(|| format!("could not create a temporary file in {}", dir.display()))?;
	temp.write_all(text.as_bytes()).context("could not write temporary file")?;
	temp.persist(path).with_context(|| format!("could not write {}", path.display()))?;
	info!("wrote {}", path.display());
	Ok(())
}

fn run(args: Args) -> Result<()>
{
	let config = match args.config
	{
		Some(ref path) => Config::load(path)?,
		None => Config::default(),
	};

	match args.command
	{
		Command::Crc{input, output, descriptor, page_size, flash_base, app_min, polynomial} =>
		{
			let mut firmware = config.firmware;
			if let Some(descriptor) = descriptor {firmware.descriptor = descriptor;}
			if let Some(page_size) = page_size {firmware.page_size = page_size;}
			if let Some(flash_base) = flash_base {firmware.flash_base = flash_base;}
			if let Some(app_min) = app_min {firmware.app_min_address = app_min;}
			if let Some(polynomial) = polynomial {firmware.polynomial = polynomial;}
			let patcher = Patcher::new(firmware.patch_config()).context("invalid firmware configuration")?;

			let mut image = load(&input, firmware.page_size)?;
			let report = patcher.patch(&mut image).with_context(|| format!("could not patch {}", input.display()))?;
			info!("firmware pages {} to {}, CRC32 0x{:08X} over {} bytes", report.start_page, report.end_page, report.crc, report.hashed);
			info!("rewrote {} line(s)", image.patched_lines());
			store(output.as_deref().unwrap_or(&input), &image.to_text())
		},
		Command::CArray{input, output, page_size, max_address} =>
		{
			let mut emit = config.carray.emit_config();
			if let Some(page_size) = page_size {emit.page_size = page_size;}
			if let Some(max_address) = max_address {emit.max_address = max_address;}

			let image = load(&input, emit.page_size)?;
			info!("first address 0x{:08X}, last address 0x{:08X}", image.min_address(), image.max_address());
			let source = carray::emit(&image, &emit).with_context(|| format!("could not convert {}", input.display()))?;
			info!("{} page(s) converted", source.pages.len());
			store(output.as_deref().unwrap_or(&config.carray.output), &source.to_string())
		},
		Command::Get{input, address, width} =>
		{
			let image = load(&input, config.firmware.page_size)?;
			match width
			{
				Width::Byte => println!("0x{:02X}", image.get_byte(address)?),
				Width::Half => println!("0x{:04X}", image.get16(address)?),
				Width::Word => println!("0x{:08X}", image.get32(address)?),
			}
			Ok(())
		},
		Command::Set{input, address, value, width, output} =>
		{
			let mut image = load(&input, config.firmware.page_size)?;
			let written = match width
			{
				Width::Byte => image.set_byte(address, u8::try_from(value).with_context(|| format!("0x{value:X} does not fit a byte"))?),
				Width::Half => image.set16(address, u16::try_from(value).with_context(|| format!("0x{value:X} does not fit 16 bits"))?),
				Width::Word => image.set32(address, value),
			};
			if !written
			{
				bail!("address 0x{address:08X} is not programmed in {}", input.display());
			}
			store(output.as_deref().unwrap_or(&input), &image.to_text())
		},
		Command::DeleteLine{input, line, output} =>
		{
			let mut image = load(&input, config.firmware.page_size)?;
			if line == 0 || !image.delete_line(line - 1)
			{
				bail!("{} has no line {line}", input.display());
			}
			store(output.as_deref().unwrap_or(&input), &image.to_text())
		},
	}
}

fn main() -> ExitCode
{
	let args = Args::parse();
	let level = match args.verbose
	{
		0 => LevelFilter::Info,
		1 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	};
	env_logger::Builder::new().filter_level(level).format_timestamp(None).parse_default_env().init();

	match run(args)
	{
		Ok(()) => ExitCode::SUCCESS,
		Err(err) =>
		{
			error!("{err}");
			for source in err.chain().skip(1)
			{
				error!("\tsource: {source}");
			}
			ExitCode::FAILURE
		},
	}
}
