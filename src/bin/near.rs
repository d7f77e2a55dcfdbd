//! near - print the disassembly window around an address of a binary image.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use disasm_window::decoder::CapstoneDecoder;
use disasm_window::format::OutputFormat;
use disasm_window::parser::GoblinParser;
use disasm_window::{Address, Disassembler, NearOptions, Settings, Syntax};

/// Branch-aware disassembly around an address
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// ELF, PE or Mach-O image
    file: PathBuf,

    /// Center address (hex); defaults to the entry point
    #[arg(short, long, value_parser = parse_address)]
    address: Option<Address>,

    /// Instructions shown on each side of the center
    #[arg(short, long)]
    radius: Option<usize>,

    /// Walk memory sequentially instead of following branches
    #[arg(long, default_value_t = false)]
    linear: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// x86 assembly syntax
    #[arg(long, value_enum)]
    syntax: Option<Syntax>,

    /// JSON settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_address(s: &str) -> Result<Address, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    Address::from_str_radix(digits, 16).map_err(|e| format!("invalid address {s:?}: {e}"))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        },
    ))
    .init();

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(syntax) = args.syntax {
        settings.syntax = syntax;
    }

    let image = GoblinParser::new()
        .load_file(&args.file)
        .with_context(|| format!("loading {}", args.file.display()))?;
    log::info!(
        "{}: {} {:?}, entry {:#x}",
        args.file.display(),
        image.architecture(),
        image.endian(),
        image.entry()
    );

    let address = args.address.unwrap_or_else(|| image.entry());
    let image = image.with_pc(address);
    let radius = args.radius.unwrap_or(settings.context_lines);

    let decoder = CapstoneDecoder::new(settings.syntax);
    let options = NearOptions {
        linear: args.linear,
        ..NearOptions::from_settings(&settings)
    };
    let mut disasm =
        Disassembler::new(image.architecture(), image.endian(), decoder).with_settings(settings);

    let window = disasm.near(&image, address, radius, options);
    if window.is_empty() {
        anyhow::bail!("no instruction decodes at {address:#x}");
    }

    print!("{}", args.format.get_formatter().format(&window)?);
    Ok(())
}
