//! Static per-architecture facts used by the resolver and window builder.

use crate::{Architecture, Endian};

/// Register holding the runtime encoding-mode bit, and the bit's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeRegister {
    pub name: &'static str,
    pub bit: u32,
}

impl ModeRegister {
    /// Extract the mode bit from a raw register value.
    pub fn bit_set(&self, value: u64) -> bool {
        value & (1 << self.bit) != 0
    }
}

impl Architecture {
    /// Upper bound on the encoding width, in bytes.
    ///
    /// This is how many bytes the resolver asks memory for before decoding.
    pub fn max_instruction_size(&self) -> usize {
        match self {
            Architecture::X86_32 | Architecture::X86_64 | Architecture::I8086 => 16,
            Architecture::Mips32 | Architecture::Mips32R6 => 8,
            Architecture::RiscV32 | Architecture::RiscV64 => 22,
            _ => 4,
        }
    }

    pub fn default_endian(&self) -> Endian {
        match self {
            Architecture::Sparc | Architecture::SparcV9 | Architecture::Ppc32 => Endian::Big,
            _ => Endian::Little,
        }
    }

    /// Name of the program counter as the debugger's register API spells it.
    pub fn pc_register(&self) -> &'static str {
        match self {
            Architecture::X86_32 => "eip",
            Architecture::X86_64 => "rip",
            Architecture::I8086 => "ip",
            _ => "pc",
        }
    }

    /// Where the Thumb bit lives, for architectures that can switch encodings.
    pub fn mode_register(&self) -> Option<ModeRegister> {
        match self {
            Architecture::Arm => Some(ModeRegister { name: "cpsr", bit: 5 }),
            Architecture::ArmCortexM => Some(ModeRegister { name: "xpsr", bit: 24 }),
            _ => None,
        }
    }

    /// Whether the encoding mode can change from one instruction to the next.
    pub fn has_switchable_mode(&self) -> bool {
        self.mode_register().is_some()
    }

    /// Whether speculative emulation is available for this architecture.
    pub fn supports_emulation(&self) -> bool {
        !matches!(self, Architecture::Ppc32 | Architecture::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Architecture::X86_64, 16)]
    #[case(Architecture::I8086, 16)]
    #[case(Architecture::Mips32, 8)]
    #[case(Architecture::RiscV64, 22)]
    #[case(Architecture::AArch64, 4)]
    #[case(Architecture::Sparc, 4)]
    fn test_max_instruction_size(#[case] arch: Architecture, #[case] size: usize) {
        assert_eq!(arch.max_instruction_size(), size);
    }

    #[test]
    fn test_mode_register() {
        let arm = Architecture::Arm.mode_register().unwrap();
        assert_eq!(arm.name, "cpsr");
        assert!(arm.bit_set(0x20));
        assert!(!arm.bit_set(0x10));

        let m = Architecture::ArmCortexM.mode_register().unwrap();
        assert!(m.bit_set(1 << 24));

        assert!(Architecture::AArch64.mode_register().is_none());
        assert!(!Architecture::X86_64.has_switchable_mode());
    }

    #[test]
    fn test_emulation_support() {
        assert!(!Architecture::Ppc32.supports_emulation());
        assert!(Architecture::X86_64.supports_emulation());
    }

    #[test]
    fn test_register_names() {
        assert_eq!(Architecture::X86_64.pc_register(), "rip");
        assert_eq!(Architecture::Mips32.pc_register(), "pc");
        assert_eq!(Architecture::Ppc32.default_endian(), Endian::Big);
    }
}
