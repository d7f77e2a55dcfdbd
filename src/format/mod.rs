//! Rendering of disassembly windows.

mod csv;
mod json;

pub use self::csv::*;
pub use self::json::*;

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::Serialize;

use crate::{DisasmError, Instruction, SplitType, Window};

/// Supported output formats for windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text listing (default)
    #[default]
    Text,
    /// A single JSON document
    Json,
    /// One JSON object per instruction
    JsonLines,
    /// Comma-separated values with a header row
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "jsonlines" => Ok(OutputFormat::JsonLines),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl OutputFormat {
    /// Get all available output formats
    pub fn available_formats() -> &'static [Self] {
        &[
            OutputFormat::Text,
            OutputFormat::Json,
            OutputFormat::JsonLines,
            OutputFormat::Csv,
        ]
    }

    /// Get a formatter for this output format
    pub fn get_formatter(&self) -> Box<dyn WindowFormatter> {
        match self {
            OutputFormat::Text => Box::new(TextFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::JsonLines => Box::new(JsonLinesFormatter),
            OutputFormat::Csv => Box::new(CsvFormatter),
        }
    }
}

/// Formatter trait for window output
pub trait WindowFormatter {
    fn format(&self, window: &Window) -> Result<String, DisasmError>;
}

/// Format windows as a plain text listing
pub struct TextFormatter;

/// Format windows as one JSON document
pub struct JsonFormatter;

/// Format windows as JSON Lines
pub struct JsonLinesFormatter;

/// Format windows as CSV
pub struct CsvFormatter;

/// Flat, serializable view of one window entry shared by the structured
/// formats.
#[derive(Debug, Serialize)]
pub struct InstructionRecord {
    pub address: String,
    pub size: u8,
    pub bytes: String,
    pub mnemonic: String,
    pub operands: String,
    pub next: String,
    pub target: Option<String>,
    pub split: SplitType,
    pub current: bool,
}

impl InstructionRecord {
    pub fn new(insn: &Instruction, current: bool) -> Self {
        Self {
            address: format!("0x{:x}", insn.address),
            size: insn.size,
            bytes: hex_bytes(insn.bytes()),
            mnemonic: insn.mnemonic().to_string(),
            operands: insn.operands().to_string(),
            next: format!("0x{:x}", insn.next),
            target: insn.target.map(|t| format!("0x{:x}", t)),
            split: insn.split,
            current,
        }
    }
}

/// Records for every entry of `window`, with the current one flagged.
pub fn records(window: &Window) -> Vec<InstructionRecord> {
    window
        .instructions()
        .iter()
        .enumerate()
        .map(|(i, insn)| InstructionRecord::new(insn, Some(i) == window.current_index()))
        .collect()
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

impl WindowFormatter for TextFormatter {
    fn format(&self, window: &Window) -> Result<String, DisasmError> {
        let mut output = String::new();

        for (i, insn) in window.instructions().iter().enumerate() {
            let marker = if Some(i) == window.current_index() {
                " ► "
            } else {
                "   "
            };
            output.push_str(&format!(
                "{}0x{:08x}: {:<10} {:<30} ; {}\n",
                marker,
                insn.address,
                insn.mnemonic(),
                insn.operands(),
                hex_bytes(insn.bytes())
            ));

            // Control leaves straight-line memory here.
            if insn.split == SplitType::BranchTaken {
                output.push('\n');
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::testing::{jcc, jmp, nop, ToyDecoder, ToyTarget};
    use crate::{Architecture, Disassembler, Endian, NearOptions};

    /// jmp at 0x1000 to 0x2000, then a conditional branch and a nop.
    pub(crate) fn sample_window() -> Window {
        let mut target = ToyTarget::new();
        target.assemble(0x1000, &[jmp(0x2000)]);
        target.assemble(0x2000, &[jcc(0x3000), nop()]);

        let mut d = Disassembler::new(Architecture::X86_64, Endian::Little, ToyDecoder::new());
        d.near(&target, 0x1000, 1, NearOptions::default())
    }

    #[test]
    fn test_text_formatter() {
        let result = TextFormatter.format(&sample_window()).unwrap();
        let lines: Vec<&str> = result.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with(" ► 0x00001000: jmp"));
        assert!(lines[0].ends_with("; 01 00 20 00"));
        assert!(lines[1].is_empty());
        assert!(lines[2].starts_with("   0x00002000: je"));
    }

    #[test]
    fn test_records() {
        let recs = records(&sample_window());
        assert_eq!(recs.len(), 3);
        assert!(recs[0].current);
        assert_eq!(recs[0].split, SplitType::BranchTaken);
        assert_eq!(recs[0].target.as_deref(), Some("0x2000"));
        assert_eq!(recs[1].next, "0x2004");
        assert!(!recs[2].current);
    }

    #[test]
    fn test_empty_window_renders_nothing() {
        for format in OutputFormat::available_formats() {
            let out = format.get_formatter().format(&Window::empty()).unwrap();
            if *format == OutputFormat::Json {
                assert!(out.contains("\"instructions\": []"));
            } else if *format == OutputFormat::Csv {
                assert_eq!(out.lines().count(), 1);
            } else {
                assert!(out.is_empty(), "{format}");
            }
        }
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSONL".parse::<OutputFormat>(), Ok(OutputFormat::JsonLines));
        assert_eq!("csv".parse::<OutputFormat>(), Ok(OutputFormat::Csv));
        assert!("ngram".parse::<OutputFormat>().is_err());
    }
}
