use super::{base_mnemonic, Classification};
use crate::Insn;

const UNCONDITIONAL: &[&str] = &["j", "jal", "jr", "jalr", "ret", "mret", "sret", "uret"];

pub(super) fn classify(insn: &Insn) -> Classification {
    let full = base_mnemonic(insn);
    let compressed = full.starts_with("c.");
    let m = full.strip_prefix("c.").unwrap_or(&full);

    let conditional = m.starts_with('b');
    let unconditional = UNCONDITIONAL.contains(&m);
    // `jal`/`jalr` link unless the destination is x0; the compressed forms
    // always link through ra.
    let links = matches!(m, "jal" | "jalr")
        && (compressed || !insn.operands.trim_start().starts_with("zero"));

    Classification {
        jump_like: conditional || unconditional || insn.groups.any_control_flow(),
        call_like: links || insn.groups.call,
        unconditional,
        delay_slot: false,
    }
}
