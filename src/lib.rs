//! Branch-aware disassembly windows for interactive debuggers.
//!
//! This library builds the instruction listing a debugger shows around the
//! program counter: a few instructions that already executed, the current
//! one, and the instructions that will execute next. Branch outcomes are
//! predicted by single-stepping an optional emulator, the listing is split
//! where control flow leaves straight-line memory, and results are cached so
//! that a single-step re-renders without re-decoding.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use disasm_window::{
//!     decoder::CapstoneDecoder,
//!     parser::GoblinParser,
//!     resolver::Disassembler,
//!     window::NearOptions,
//!     Settings,
//! };
//!
//! let data = std::fs::read("path/to/binary").unwrap();
//! let image = GoblinParser::new().load(&data).unwrap();
//!
//! let decoder = CapstoneDecoder::new(Settings::default().syntax);
//! let mut disasm = Disassembler::new(image.architecture(), image.endian(), decoder);
//!
//! let window = disasm.near(&image, image.entry(), 5, NearOptions::default());
//! for insn in window.instructions() {
//!     println!("{:#x}: {}", insn.address, insn.insn);
//! }
//! ```

pub mod arch;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod emulator;
pub mod enhance;
pub mod format;
pub mod instruction;
pub mod invalidate;
pub mod parser;
pub mod resolver;
pub mod target;
pub mod window;

#[cfg(test)]
mod testing;

pub use config::{Settings, Syntax};
pub use instruction::{Instruction, SplitType};
pub use resolver::{Disassembler, ResolveOptions};
pub use window::{NearOptions, Window};

/// Represents an address in the debuggee's address space
pub type Address = u64;

use std::fmt;

/// Instruction groups reported by the decoder.
///
/// These are the raw classification bits; the enhancer combines them with
/// per-architecture mnemonic rules to decide how control flow continues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsnGroups {
    pub jump: bool,
    pub call: bool,
    pub ret: bool,
    pub iret: bool,
    pub int: bool,
    pub branch_relative: bool,
}

impl InsnGroups {
    /// True if any group says the instruction writes the program counter.
    pub fn any_control_flow(&self) -> bool {
        self.jump || self.call || self.ret || self.iret || self.branch_relative
    }
}

/// One decoded instruction, before control-flow enhancement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    /// Address of the instruction
    pub addr: Address,
    /// Size of the instruction in bytes
    pub size: u8,
    /// Instruction mnemonic (e.g., "mov", "b.eq")
    pub mnemonic: String,
    /// Instruction operands as string representation
    pub operands: String,
    /// Raw encoding
    pub bytes: Vec<u8>,
    /// Decoder group membership
    pub groups: InsnGroups,
    /// Immediate branch/call target, when the encoding carries one
    pub imm_target: Option<Address>,
}

impl Insn {
    /// Returns the instruction bytes, up to the actual instruction size.
    pub fn bytes(&self) -> &[u8] {
        let len = (self.size as usize).min(self.bytes.len());
        &self.bytes[..len]
    }

    /// Address of the instruction that follows this one in memory.
    pub fn fallthrough(&self) -> Address {
        self.addr.wrapping_add(self.size as Address)
    }

    /// Extract an absolute branch target from the operand text.
    ///
    /// Capstone prints resolved branch targets as the last hexadecimal
    /// operand (`jmp 0x401000`, `b #0x8000`, `beq $a0, $zero, 0x400120`).
    pub fn branch_targets(&self) -> Vec<Address> {
        let ops = self.operands.to_lowercase();

        if let Some(idx) = ops.rfind("0x") {
            let hex_str = &ops[idx + 2..];
            let end_idx = hex_str
                .find(|c: char| !c.is_ascii_hexdigit())
                .unwrap_or(hex_str.len());

            if let Ok(val) = u64::from_str_radix(&hex_str[..end_idx], 16) {
                return vec![val];
            }
        }

        Vec::new()
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operands.is_empty() {
            write!(f, "{}", self.mnemonic)
        } else {
            write!(f, "{}\t{}", self.mnemonic, self.operands)
        }
    }
}

/// Supported architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Architecture {
    /// 32-bit x86
    X86_32,
    /// 64-bit x86
    X86_64,
    /// 16-bit real-mode x86
    I8086,
    /// ARM (A32, with Thumb interworking)
    Arm,
    /// ARM Cortex-M (M-profile)
    ArmCortexM,
    /// AArch64 (ARM 64-bit)
    AArch64,
    /// MIPS 32-bit
    Mips32,
    /// MIPS32 Release 6
    Mips32R6,
    /// SPARC (32-bit)
    Sparc,
    /// SPARC V9
    SparcV9,
    /// PowerPC 32-bit
    Ppc32,
    /// RISC-V 32-bit
    RiscV32,
    /// RISC-V 64-bit
    RiscV64,
    /// Unknown architecture
    Unknown,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86_32 => write!(f, "x86-32"),
            Architecture::X86_64 => write!(f, "x86-64"),
            Architecture::I8086 => write!(f, "i8086"),
            Architecture::Arm => write!(f, "ARM"),
            Architecture::ArmCortexM => write!(f, "ARM Cortex-M"),
            Architecture::AArch64 => write!(f, "AArch64"),
            Architecture::Mips32 => write!(f, "MIPS32"),
            Architecture::Mips32R6 => write!(f, "MIPS32r6"),
            Architecture::Sparc => write!(f, "SPARC"),
            Architecture::SparcV9 => write!(f, "SPARC V9"),
            Architecture::Ppc32 => write!(f, "PowerPC 32"),
            Architecture::RiscV32 => write!(f, "RISC-V 32"),
            Architecture::RiscV64 => write!(f, "RISC-V 64"),
            Architecture::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Byte order of the debuggee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Instruction encoding selected for an address.
///
/// Only ARM has a runtime-switchable encoding; every other architecture
/// always decodes in `Native`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsaMode {
    #[default]
    Native,
    Thumb,
}

impl IsaMode {
    pub fn from_thumb_bit(thumb: bool) -> Self {
        if thumb {
            IsaMode::Thumb
        } else {
            IsaMode::Native
        }
    }
}

/// Error type for disassembly operations
#[derive(Debug, thiserror::Error)]
pub enum DisasmError {
    /// Decoder error
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// Capstone refused a handle configuration
    #[error("Capstone error: {0}")]
    Capstone(#[from] capstone::Error),

    /// Unsupported architecture
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(Architecture),

    /// Failed to parse binary format
    #[error("Failed to parse binary format: {0}")]
    Parsing(String),

    /// Invalid settings
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV serialization error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Generic error
    #[error("{0}")]
    Generic(String),
}
