use super::{base_mnemonic, Classification};
use crate::Insn;

const UNCONDITIONAL: &[&str] = &["b", "ba", "bl", "bla", "blr", "blrl", "bctr", "bctrl"];

pub(super) fn classify(insn: &Insn) -> Classification {
    let full = base_mnemonic(insn);
    // Static prediction hints: "beq+", "bdnz-".
    let m = full.trim_end_matches(['+', '-']);

    // Every PowerPC mnemonic starting with `b` is a branch except SPE's "brinc".
    let branch = m.starts_with('b') && m != "brinc";
    let links = branch && (m.ends_with('l') || m.ends_with("la"));

    Classification {
        jump_like: branch || insn.groups.any_control_flow(),
        call_like: links || insn.groups.call,
        unconditional: UNCONDITIONAL.contains(&m),
        delay_slot: false,
    }
}
