//! MIPS and SPARC: the delay-slot architectures.

use super::{base_mnemonic, Classification};
use crate::Insn;

const MIPS_UNCONDITIONAL: &[&str] = &[
    "j", "jal", "jr", "jalr", "jalx", "jr.hb", "jalr.hb", "b", "bal", "bc", "balc", "jic",
    "jialc", "eret", "deret",
];

/// Mnemonics starting with `b` that are not branches.
const MIPS_NOT_BRANCHES: &[&str] = &["break", "bitswap", "balign", "bposge32"];

pub(super) fn classify_mips(insn: &Insn) -> Classification {
    let m = base_mnemonic(insn);

    let exception_return = m == "eret" || m == "deret";
    let branch = m.starts_with('j')
        || (m.starts_with('b') && !MIPS_NOT_BRANCHES.contains(&m.as_str()))
        || exception_return;
    let jump_like = branch || insn.groups.any_control_flow();
    // Release 6 compact branches ("bc", "beqzc", "jic", ...) have no slot.
    let compact = m.ends_with('c');

    Classification {
        jump_like,
        call_like: branch && m.contains("al"),
        unconditional: MIPS_UNCONDITIONAL.contains(&m.as_str()),
        delay_slot: jump_like && !compact && !exception_return,
    }
}

const SPARC_UNCONDITIONAL: &[&str] = &[
    "ba", "b", "fba", "cba", "call", "jmp", "jmpl", "ret", "retl", "rett", "retry", "done",
];

pub(super) fn classify_sparc(insn: &Insn) -> Classification {
    let m = base_mnemonic(insn);

    let trap_return = m == "retry" || m == "done";
    let branch = (m.starts_with('b') && m != "bshuffle")
        || m.starts_with("fb")
        || m.starts_with("cb")
        || SPARC_UNCONDITIONAL.contains(&m.as_str());
    let jump_like = branch || insn.groups.any_control_flow();

    Classification {
        jump_like,
        call_like: m == "call" || (m == "jmpl" && insn.operands.trim_end().ends_with("%o7")),
        unconditional: SPARC_UNCONDITIONAL.contains(&m.as_str()),
        delay_slot: jump_like && !trap_return,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::insn;
    use crate::InsnGroups;
    use rstest::rstest;

    fn flags(c: Classification) -> (bool, bool, bool, bool) {
        (c.jump_like, c.call_like, c.unconditional, c.delay_slot)
    }

    #[rstest]
    #[case("j", (true, false, true, true))]
    #[case("jal", (true, true, true, true))]
    #[case("jalr", (true, true, true, true))]
    #[case("jr", (true, false, true, true))]
    #[case("beq", (true, false, false, true))]
    #[case("bgezal", (true, true, false, true))]
    #[case("bal", (true, true, true, true))]
    #[case("beqzc", (true, false, false, false))]
    #[case("balc", (true, true, true, false))]
    #[case("eret", (true, false, true, false))]
    #[case("break", (false, false, false, false))]
    #[case("addiu", (false, false, false, false))]
    fn test_classify_mips(#[case] m: &str, #[case] expected: (bool, bool, bool, bool)) {
        let c = classify_mips(&insn(0x400000, 4, m, "", InsnGroups::default(), None));
        assert_eq!(flags(c), expected, "{m}");
    }

    #[rstest]
    #[case("ba", "0x1000", (true, false, true, true))]
    #[case("bne,a", "0x1000", (true, false, false, true))]
    #[case("call", "0x2000", (true, true, true, true))]
    #[case("jmpl", "%g1, %o7", (true, true, true, true))]
    #[case("retl", "", (true, false, true, true))]
    #[case("retry", "", (true, false, true, false))]
    #[case("add", "%g1, 1, %g1", (false, false, false, false))]
    fn test_classify_sparc(
        #[case] m: &str,
        #[case] ops: &str,
        #[case] expected: (bool, bool, bool, bool),
    ) {
        let c = classify_sparc(&insn(0x1000, 4, m, ops, InsnGroups::default(), None));
        assert_eq!(flags(c), expected, "{m}");
    }
}
