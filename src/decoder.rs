//! Capstone-based instruction decoding for every supported ISA.

use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use capstone::{Arch, Capstone, Endian as CsEndian, ExtraMode, Mode, Syntax as CsSyntax};

use crate::{Address, Architecture, Endian, Insn, InsnGroups, IsaMode, Syntax};

/// Errors that can occur while configuring a decoder
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    /// Capstone error
    #[error("Capstone error: {0}")]
    CapstoneError(#[from] capstone::Error),

    /// Unsupported architecture
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(Architecture),
}

/// Decoder trait: turns raw bytes into at most one instruction.
pub trait Decoder {
    /// Decode a single instruction located at `address`.
    ///
    /// # Arguments
    /// * `bytes` - Memory starting at `address`, at most one instruction's worth
    /// * `address` - Address of the first byte
    /// * `arch`, `mode`, `endian` - Encoding to decode with
    ///
    /// # Returns
    /// Some(Insn) if the bytes form a valid instruction, None otherwise
    fn decode(
        &self,
        bytes: &[u8],
        address: Address,
        arch: Architecture,
        mode: IsaMode,
        endian: Endian,
    ) -> Option<Insn>;

    /// Forget any memoised per-mode state.
    fn reset(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct HandleKey {
    arch: Architecture,
    mode: IsaMode,
    endian: Endian,
}

/// A Capstone decoder that lazily builds one handle per encoding.
pub struct CapstoneDecoder {
    syntax: Syntax,
    pool: RefCell<HashMap<HandleKey, Capstone>>,
}

impl CapstoneDecoder {
    pub fn new(syntax: Syntax) -> Self {
        Self {
            syntax,
            pool: RefCell::new(HashMap::new()),
        }
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// Number of handles currently built
    pub fn handle_count(&self) -> usize {
        self.pool.borrow().len()
    }

    /// Capstone arch, mode and extra modes for an encoding.
    fn capstone_modes(
        arch: Architecture,
        mode: IsaMode,
    ) -> Result<(Arch, Mode, Vec<ExtraMode>), DecoderError> {
        let thumb = mode == IsaMode::Thumb;
        Ok(match arch {
            Architecture::X86_32 => (Arch::X86, Mode::Mode32, vec![]),
            Architecture::X86_64 => (Arch::X86, Mode::Mode64, vec![]),
            Architecture::I8086 => (Arch::X86, Mode::Mode16, vec![]),
            Architecture::Arm if thumb => (Arch::ARM, Mode::Thumb, vec![]),
            Architecture::Arm => (Arch::ARM, Mode::Arm, vec![]),
            Architecture::ArmCortexM if thumb => {
                (Arch::ARM, Mode::Thumb, vec![ExtraMode::MClass])
            }
            Architecture::ArmCortexM => (Arch::ARM, Mode::Arm, vec![ExtraMode::MClass]),
            Architecture::AArch64 => (Arch::ARM64, Mode::Arm, vec![]),
            Architecture::Mips32 => (Arch::MIPS, Mode::Mips32, vec![]),
            Architecture::Mips32R6 => (Arch::MIPS, Mode::Mips32R6, vec![]),
            // The pointer-size modes are rejected by Capstone for SPARC.
            Architecture::Sparc => (Arch::SPARC, Mode::Default, vec![]),
            Architecture::SparcV9 => (Arch::SPARC, Mode::V9, vec![]),
            Architecture::Ppc32 => (Arch::PPC, Mode::Mode32, vec![]),
            Architecture::RiscV32 => (Arch::RISCV, Mode::RiscV32, vec![ExtraMode::RiscVC]),
            Architecture::RiscV64 => (Arch::RISCV, Mode::RiscV64, vec![ExtraMode::RiscVC]),
            Architecture::Unknown => return Err(DecoderError::UnsupportedArchitecture(arch)),
        })
    }

    /// Build a configured `Capstone` handle.
    fn build_handle(&self, key: HandleKey) -> Result<Capstone, DecoderError> {
        let (arch, mode, extra) = Self::capstone_modes(key.arch, key.mode)?;
        let endian = match key.endian {
            Endian::Little => CsEndian::Little,
            Endian::Big => CsEndian::Big,
        };

        let mut cs = Capstone::new_raw(arch, mode, extra.into_iter(), Some(endian))?;
        cs.set_detail(true)?;

        if matches!(
            key.arch,
            Architecture::X86_32 | Architecture::X86_64 | Architecture::I8086
        ) {
            let syntax = match self.syntax {
                Syntax::Intel => CsSyntax::Intel,
                Syntax::Att => CsSyntax::Att,
            };
            // Not every Capstone build ships the AT&T printer.
            if let Err(e) = cs.set_syntax(syntax) {
                log::debug!("Keeping default x86 syntax: {}", e);
            }
        }

        log::debug!(
            "Built Capstone handle for {} ({:?}, {:?})",
            key.arch,
            key.mode,
            key.endian
        );
        Ok(cs)
    }
}

impl Default for CapstoneDecoder {
    fn default() -> Self {
        Self::new(Syntax::default())
    }
}

impl fmt::Debug for CapstoneDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapstoneDecoder")
            .field("syntax", &self.syntax)
            .field("handles", &self.handle_count())
            .finish()
    }
}

impl Decoder for CapstoneDecoder {
    fn decode(
        &self,
        bytes: &[u8],
        address: Address,
        arch: Architecture,
        mode: IsaMode,
        endian: Endian,
    ) -> Option<Insn> {
        if bytes.is_empty() {
            return None;
        }

        let key = HandleKey { arch, mode, endian };
        let mut pool = self.pool.borrow_mut();
        let cs: &Capstone = match pool.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => match self.build_handle(key) {
                Ok(cs) => v.insert(cs),
                Err(e) => {
                    log::warn!("Cannot decode {} at {:#x}: {}", arch, address, e);
                    return None;
                }
            },
        };

        let disasm_result = cs.disasm_count(bytes, address, 1).ok()?;
        let i = disasm_result.iter().next()?;

        // Ensure instruction starts at the address we requested
        if i.address() != address {
            return None;
        }

        let mut groups = InsnGroups::default();
        if let Ok(detail) = cs.insn_detail(&i) {
            for g in detail.groups() {
                match cs.group_name(*g).as_deref() {
                    Some("jump") => groups.jump = true,
                    Some("call") => groups.call = true,
                    Some("ret") => groups.ret = true,
                    Some("iret") => groups.iret = true,
                    Some("int") => groups.int = true,
                    Some("branch_relative") => groups.branch_relative = true,
                    _ => {}
                }
            }
        }

        let mut insn = Insn {
            addr: i.address(),
            size: i.bytes().len() as u8,
            mnemonic: i.mnemonic().unwrap_or("").to_string(),
            operands: i.op_str().unwrap_or("").to_string(),
            bytes: i.bytes().to_vec(),
            groups,
            imm_target: None,
        };
        insn.imm_target = immediate_target(arch, &insn);
        Some(insn)
    }

    fn reset(&self) {
        self.pool.borrow_mut().clear();
    }
}

/// Statically encoded destination of a direct branch or call.
fn immediate_target(arch: Architecture, insn: &Insn) -> Option<Address> {
    let g = insn.groups;
    if !(g.jump || g.call || g.branch_relative) || g.ret {
        return None;
    }
    // Memory-indirect operands carry displacements, not destinations.
    if insn.operands.contains('[') || insn.operands.contains('(') {
        return None;
    }

    match arch {
        // RISC-V prints branch immediates relative to the instruction.
        Architecture::RiscV32 | Architecture::RiscV64 => {
            let last = insn.operands.rsplit(',').next()?.trim();
            let offset = parse_signed(last)?;
            Some(insn.addr.wrapping_add(offset as u64))
        }
        _ => insn.branch_targets().first().copied(),
    }
}

fn parse_signed(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -value } else { value })
}
