//! In-memory stand-ins for the debuggee, decoder and emulator.
//!
//! The toy ISA is fixed-width: four bytes per instruction (two in Thumb
//! mode), opcode in the first byte, 24-bit big-endian absolute target in the
//! other three.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};

use crate::decoder::Decoder;
use crate::emulator::{Emulator, EmulatorError, ResourceProbe};
use crate::target::{Memory, Registers, Target};
use crate::{Address, Architecture, Endian, Insn, InsnGroups, IsaMode};

pub const OP_NOP: u8 = 0x00;
pub const OP_JMP: u8 = 0x01;
pub const OP_JCC: u8 = 0x02;
pub const OP_CALL: u8 = 0x03;
pub const OP_RET: u8 = 0x04;
/// Never decodes.
pub const OP_BAD: u8 = 0xff;

fn encode(op: u8, target: Address) -> [u8; 4] {
    [op, (target >> 16) as u8, (target >> 8) as u8, target as u8]
}

pub fn nop() -> [u8; 4] {
    encode(OP_NOP, 0)
}

pub fn jmp(target: Address) -> [u8; 4] {
    encode(OP_JMP, target)
}

pub fn jcc(target: Address) -> [u8; 4] {
    encode(OP_JCC, target)
}

pub fn call(target: Address) -> [u8; 4] {
    encode(OP_CALL, target)
}

pub fn ret() -> [u8; 4] {
    encode(OP_RET, 0)
}

pub fn bad() -> [u8; 4] {
    encode(OP_BAD, 0)
}

/// Build a raw decode by hand.
pub fn insn(
    addr: Address,
    size: u8,
    mnemonic: &str,
    operands: &str,
    groups: InsnGroups,
    imm_target: Option<Address>,
) -> Insn {
    Insn {
        addr,
        size,
        mnemonic: mnemonic.to_string(),
        operands: operands.to_string(),
        bytes: vec![0; size as usize],
        groups,
        imm_target,
    }
}

/// Mnemonics for (nop, jmp, jcc, call, ret) per architecture family.
fn mnemonics(arch: Architecture) -> [&'static str; 5] {
    match arch {
        Architecture::X86_32 | Architecture::X86_64 | Architecture::I8086 => {
            ["nop", "jmp", "je", "call", "ret"]
        }
        Architecture::Arm | Architecture::ArmCortexM => ["nop", "b", "beq", "bl", "bx"],
        Architecture::AArch64 => ["nop", "b", "b.eq", "bl", "ret"],
        Architecture::Mips32 | Architecture::Mips32R6 => ["nop", "j", "beq", "jal", "jr"],
        Architecture::Sparc | Architecture::SparcV9 => ["nop", "ba", "bne", "call", "retl"],
        Architecture::RiscV32 | Architecture::RiscV64 => ["nop", "j", "beq", "jal", "ret"],
        Architecture::Ppc32 => ["nop", "b", "beq", "bl", "blr"],
        _ => ["nop", "jmp", "jcc", "call", "ret"],
    }
}

/// Decoder for the toy ISA. Counts calls so tests can see cache hits.
#[derive(Debug, Default)]
pub struct ToyDecoder {
    decodes: Cell<usize>,
    resets: Cell<usize>,
}

impl ToyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decodes(&self) -> usize {
        self.decodes.get()
    }

    pub fn resets(&self) -> usize {
        self.resets.get()
    }
}

impl Decoder for ToyDecoder {
    fn decode(
        &self,
        bytes: &[u8],
        address: Address,
        arch: Architecture,
        mode: IsaMode,
        _endian: Endian,
    ) -> Option<Insn> {
        self.decodes.set(self.decodes.get() + 1);

        let size: u8 = if mode == IsaMode::Thumb { 2 } else { 4 };
        if bytes.len() < size as usize || bytes[0] == OP_BAD {
            return None;
        }
        let names = mnemonics(arch);

        if mode == IsaMode::Thumb {
            return Some(Insn {
                addr: address,
                size,
                mnemonic: "movs".to_string(),
                operands: "r0, r0".to_string(),
                bytes: bytes[..2].to_vec(),
                groups: InsnGroups::default(),
                imm_target: None,
            });
        }

        let target = ((bytes[1] as Address) << 16) | ((bytes[2] as Address) << 8) | bytes[3] as Address;
        let branch = InsnGroups {
            jump: true,
            branch_relative: true,
            ..Default::default()
        };
        let (mnemonic, operands, groups, imm_target) = match bytes[0] {
            OP_JMP => (names[1], format!("{target:#x}"), branch, Some(target)),
            OP_JCC => (names[2], format!("{target:#x}"), branch, Some(target)),
            OP_CALL => (
                names[3],
                format!("{target:#x}"),
                InsnGroups { call: true, ..Default::default() },
                Some(target),
            ),
            OP_RET => (
                names[4],
                String::new(),
                InsnGroups { ret: true, ..Default::default() },
                None,
            ),
            _ => (names[0], String::new(), InsnGroups::default(), None),
        };

        Some(Insn {
            addr: address,
            size,
            mnemonic: mnemonic.to_string(),
            operands,
            bytes: bytes[..size as usize].to_vec(),
            groups,
            imm_target,
        })
    }

    fn reset(&self) {
        self.resets.set(self.resets.get() + 1);
    }
}

/// Follows a pre-recorded program-counter trace.
#[derive(Debug, Clone)]
pub struct ScriptedEmulator {
    pc: Address,
    trace: VecDeque<Address>,
    fail_at_step: Option<usize>,
    steps: usize,
    valid: bool,
    last_ok: bool,
    thumb: Option<bool>,
}

impl ScriptedEmulator {
    /// `trace[i]` is the program counter after step `i`.
    pub fn new(start: Address, trace: &[Address]) -> Self {
        Self {
            pc: start,
            trace: trace.iter().copied().collect(),
            fail_at_step: None,
            steps: 0,
            valid: true,
            last_ok: true,
            thumb: None,
        }
    }

    /// Make step number `step` (0-based) fault.
    pub fn failing_at(mut self, step: usize) -> Self {
        self.fail_at_step = Some(step);
        self
    }

    pub fn with_thumb(mut self, thumb: bool) -> Self {
        self.thumb = Some(thumb);
        self
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}

impl Emulator for ScriptedEmulator {
    fn pc(&self) -> Address {
        self.pc
    }

    fn single_step(&mut self) -> bool {
        if !self.valid || self.fail_at_step == Some(self.steps) {
            self.last_ok = false;
            self.valid = false;
            return false;
        }
        match self.trace.pop_front() {
            Some(pc) => {
                self.pc = pc;
                self.steps += 1;
                self.last_ok = true;
                true
            }
            None => {
                self.last_ok = false;
                self.valid = false;
                false
            }
        }
    }

    fn last_step_succeeded(&self) -> bool {
        self.last_ok
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn invalidate(&mut self) {
        self.valid = false;
    }

    fn read_mode_bit(&self) -> Option<bool> {
        self.thumb
    }
}

/// What `ToyTarget::create_emulator` hands out.
#[derive(Debug, Clone)]
pub enum EmulatorSetup {
    Unsupported,
    Scripted(ScriptedEmulator),
    MemoryUnavailable(Address),
    Failed,
}

/// Sparse byte map plus a register file.
#[derive(Debug)]
pub struct ToyTarget {
    memory: HashMap<Address, u8>,
    registers: HashMap<String, u64>,
    emulator: EmulatorSetup,
    emulators_created: Cell<usize>,
    register_cache_clears: Cell<usize>,
}

impl ToyTarget {
    pub fn new() -> Self {
        Self {
            memory: HashMap::new(),
            registers: HashMap::new(),
            emulator: EmulatorSetup::Unsupported,
            emulators_created: Cell::new(0),
            register_cache_clears: Cell::new(0),
        }
    }

    pub fn map(&mut self, address: Address, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.memory.insert(address + i as Address, *b);
        }
    }

    /// Map consecutive toy instructions starting at `address`.
    pub fn assemble(&mut self, address: Address, program: &[[u8; 4]]) {
        for (i, word) in program.iter().enumerate() {
            self.map(address + 4 * i as Address, word);
        }
    }

    pub fn set_register(&mut self, name: &str, value: u64) {
        self.registers.insert(name.to_string(), value);
    }

    pub fn set_emulator(&mut self, setup: EmulatorSetup) {
        self.emulator = setup;
    }

    pub fn emulators_created(&self) -> usize {
        self.emulators_created.get()
    }

    pub fn register_cache_clears(&self) -> usize {
        self.register_cache_clears.get()
    }
}

impl Memory for ToyTarget {
    fn read(&self, address: Address, len: usize, partial: bool) -> Option<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        for i in 0..len as Address {
            match self.memory.get(&(address + i)) {
                Some(b) => out.push(*b),
                None if partial && !out.is_empty() => return Some(out),
                None => return None,
            }
        }
        Some(out)
    }
}

impl Registers for ToyTarget {
    fn read_register(&self, name: &str) -> Option<u64> {
        self.registers.get(name).copied()
    }

    fn clear_register_cache(&self) {
        self.register_cache_clears
            .set(self.register_cache_clears.get() + 1);
    }
}

impl Target for ToyTarget {
    fn create_emulator(&self, arch: Architecture) -> Result<Box<dyn Emulator>, EmulatorError> {
        match &self.emulator {
            EmulatorSetup::Unsupported => Err(EmulatorError::Unsupported(arch)),
            EmulatorSetup::Scripted(emu) => {
                self.emulators_created.set(self.emulators_created.get() + 1);
                Ok(Box::new(emu.clone()))
            }
            EmulatorSetup::MemoryUnavailable(addr) => Err(EmulatorError::MemoryUnavailable(*addr)),
            EmulatorSetup::Failed => Err(EmulatorError::Failed("scripted failure".to_string())),
        }
    }
}

/// Resource probe with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub bool);

impl ResourceProbe for FixedProbe {
    fn executable_memory_available(&self) -> bool {
        self.0
    }
}
