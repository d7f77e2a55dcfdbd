//! Enhanced instructions: a decoded `Insn` plus control-flow metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Address, Insn};

/// Where the listing visually forks away from straight-line memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitType {
    #[default]
    NoSplit,
    BranchTaken,
    BranchNotTaken,
}

impl fmt::Display for SplitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitType::NoSplit => write!(f, "none"),
            SplitType::BranchTaken => write!(f, "taken"),
            SplitType::BranchNotTaken => write!(f, "not_taken"),
        }
    }
}

/// A decoded instruction annotated with how control leaves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Raw decoder output
    pub insn: Insn,
    pub address: Address,
    pub size: u8,
    /// Address executed after this one: static when unambiguous, else emulated.
    pub next: Address,
    /// Branch or call destination, if known.
    pub target: Option<Address>,
    pub jump_like: bool,
    pub call_like: bool,
    pub has_jump_target: bool,
    pub is_unconditional_jump: bool,
    pub is_conditional_jump_taken: bool,
    pub causes_branch_delay: bool,
    /// Always show a split, even when the target is the fall-through address.
    pub force_unconditional_jump_target: bool,
    pub split: SplitType,
}

impl Instruction {
    /// Wrap a raw decode with straight-line defaults.
    pub fn from_insn(insn: Insn) -> Self {
        let next = insn.fallthrough();
        Self {
            address: insn.addr,
            size: insn.size,
            next,
            target: None,
            jump_like: false,
            call_like: false,
            has_jump_target: false,
            is_unconditional_jump: false,
            is_conditional_jump_taken: false,
            causes_branch_delay: false,
            force_unconditional_jump_target: false,
            split: SplitType::NoSplit,
            insn,
        }
    }

    /// Address of the instruction physically following this one.
    pub fn fallthrough(&self) -> Address {
        self.address.wrapping_add(self.size as Address)
    }

    pub fn bytes(&self) -> &[u8] {
        self.insn.bytes()
    }

    pub fn mnemonic(&self) -> &str {
        &self.insn.mnemonic
    }

    pub fn operands(&self) -> &str {
        &self.insn.operands
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}: {}", self.address, self.insn)
    }
}
