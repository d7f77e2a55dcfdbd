//! Control-flow enhancement of decoded instructions.
//!
//! Each architecture contributes a `classify` function that reads the
//! decoder's groups and mnemonic and answers four questions: does this
//! instruction write the program counter, is it a call, does it always
//! transfer control, and does it have a delay slot. The shared code here
//! turns that classification into `next`/`target` and, when a live
//! emulator is supplied, replaces the static guesses with the observed
//! outcome of executing it.

mod arm;
mod mips;
mod ppc;
mod riscv;
mod x86;

use crate::emulator::Emulator;
use crate::{Address, Architecture, Insn, Instruction};

/// Architecture-specific answers about a single instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Classification {
    pub jump_like: bool,
    pub call_like: bool,
    /// Always transfers control when executed (jump, call or return)
    pub unconditional: bool,
    pub delay_slot: bool,
}

/// The per-architecture enhancers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enhancer {
    X86,
    Arm,
    AArch64,
    Mips,
    Sparc,
    RiscV,
    PowerPc,
    /// Trusts decoder groups only
    Generic,
}

impl Enhancer {
    pub fn for_architecture(arch: Architecture) -> Self {
        match arch {
            Architecture::X86_32 | Architecture::X86_64 | Architecture::I8086 => Enhancer::X86,
            Architecture::Arm | Architecture::ArmCortexM => Enhancer::Arm,
            Architecture::AArch64 => Enhancer::AArch64,
            Architecture::Mips32 | Architecture::Mips32R6 => Enhancer::Mips,
            Architecture::Sparc | Architecture::SparcV9 => Enhancer::Sparc,
            Architecture::RiscV32 | Architecture::RiscV64 => Enhancer::RiscV,
            Architecture::Ppc32 => Enhancer::PowerPc,
            _ => Enhancer::Generic,
        }
    }

    pub(crate) fn classify(&self, insn: &Insn) -> Classification {
        match self {
            Enhancer::X86 => x86::classify(insn),
            Enhancer::Arm => arm::classify_a32(insn),
            Enhancer::AArch64 => arm::classify_a64(insn),
            Enhancer::Mips => mips::classify_mips(insn),
            Enhancer::Sparc => mips::classify_sparc(insn),
            Enhancer::RiscV => riscv::classify(insn),
            Enhancer::PowerPc => ppc::classify(insn),
            Enhancer::Generic => {
                let g = insn.groups;
                Classification {
                    jump_like: g.any_control_flow(),
                    call_like: g.call,
                    unconditional: g.call || g.ret || g.iret,
                    delay_slot: false,
                }
            }
        }
    }

    /// Attach control-flow metadata to `insn`.
    ///
    /// With an emulator positioned at this instruction, the emulator is
    /// stepped exactly once and the observed program counter decides
    /// `next`, `target` and whether a conditional branch was taken. An
    /// emulator positioned elsewhere is left untouched.
    pub fn enhance(&self, insn: Insn, emu: Option<&mut (dyn Emulator + '_)>) -> Instruction {
        let class = self.classify(&insn);
        let mut ins = Instruction::from_insn(insn);

        ins.jump_like = class.jump_like;
        ins.call_like = class.jump_like && class.call_like;
        ins.causes_branch_delay = class.jump_like && class.delay_slot;
        ins.is_unconditional_jump = class.jump_like && !class.call_like && class.unconditional;
        if class.jump_like {
            ins.target = ins.insn.imm_target;
        }
        if ins.is_unconditional_jump {
            if let Some(target) = ins.target {
                ins.next = target;
            }
        }

        if let Some(emu) = emu {
            if !emu.is_valid() {
                log::trace!("emulator invalid, static enhancement at {:#x}", ins.address);
            } else if emu.pc() != ins.address {
                log::trace!(
                    "emulator at {:#x} but instruction at {:#x}, not stepping",
                    emu.pc(),
                    ins.address
                );
            } else if emu.single_step() {
                apply_observed(&mut ins, emu.pc());
            } else {
                log::debug!("emulator failed to step {:#x}", ins.address);
            }
        }

        let fallthrough = ins.fallthrough();
        ins.has_jump_target = matches!(ins.target, Some(t) if t != fallthrough);
        ins.force_unconditional_jump_target =
            ins.is_unconditional_jump && ins.target == Some(fallthrough);
        ins
    }
}

/// Refine a statically enhanced instruction with the program counter the
/// emulator reached after executing it.
fn apply_observed(ins: &mut Instruction, pc_after: Address) {
    let fallthrough = ins.fallthrough();

    if ins.causes_branch_delay {
        // The step covers the slot as well, so the emulator lands either on
        // the branch destination or just past the slot.
        let past_slot = fallthrough.wrapping_add(ins.size as Address);
        let taken = match ins.target {
            Some(target) => pc_after == target,
            None => pc_after != fallthrough && pc_after != past_slot,
        };
        if taken {
            let target = ins.target.unwrap_or(pc_after);
            ins.target = Some(target);
            if !ins.call_like {
                ins.next = target;
                ins.is_conditional_jump_taken = !ins.is_unconditional_jump;
            }
        }
        return;
    }

    if ins.call_like {
        // Listings continue after the call; the callee is only a target.
        ins.target = Some(ins.target.unwrap_or(pc_after));
        ins.next = fallthrough;
        return;
    }

    ins.next = pc_after;
    if ins.jump_like && pc_after != fallthrough {
        ins.target = Some(pc_after);
        ins.is_conditional_jump_taken = !ins.is_unconditional_jump;
    }
}

/// Lowercased mnemonic with assembler width/hint suffixes removed.
pub(crate) fn base_mnemonic(insn: &Insn) -> String {
    let m = insn.mnemonic.to_lowercase();
    let m = m.strip_suffix(".w").or_else(|| m.strip_suffix(".n")).unwrap_or(&m);
    m.split(',').next().unwrap_or(m).to_string()
}
