use super::{base_mnemonic, Classification};
use crate::Insn;

const UNCONDITIONAL: &[&str] = &["jmp", "ljmp"];

pub(super) fn classify(insn: &Insn) -> Classification {
    let g = insn.groups;
    let m = base_mnemonic(insn);

    let call_like = g.call || m.starts_with("call") || m == "lcall";
    let returns = g.ret || g.iret || m.starts_with("ret") || m.starts_with("iret");
    let jump_like = g.any_control_flow() || call_like || returns || m.starts_with('j') || m.starts_with("loop");

    Classification {
        jump_like,
        call_like,
        unconditional: call_like || returns || UNCONDITIONAL.contains(&m.as_str()),
        delay_slot: false,
    }
}
