use super::{base_mnemonic, Classification};
use crate::Insn;

const CONDITIONS: &[&str] = &[
    "eq", "ne", "cs", "hs", "cc", "lo", "mi", "pl", "vs", "vc", "hi", "ls", "ge", "lt", "gt", "le",
];

/// Longest first, so "blx" is not read as "bl" + "x".
const A32_BRANCHES: &[&str] = &["blx", "bxj", "bl", "bx", "b"];

/// Instructions that branch only when they name `pc` as a destination.
const PC_WRITERS: &[&str] = &["pop", "ldm", "ldr", "mov", "add", "sub"];

/// Split `m` into (base, conditional) if it is `base` followed by an
/// optional condition code.
fn conditional_form<'a>(m: &str, bases: &[&'a str]) -> Option<(&'a str, bool)> {
    bases.iter().find_map(|base| {
        let rest = m.strip_prefix(base)?;
        match rest {
            "" | "al" => Some((*base, false)),
            _ if CONDITIONS.contains(&rest) => Some((*base, true)),
            _ => None,
        }
    })
}

fn writes_pc(m: &str, operands: &str) -> Option<bool> {
    let (_, conditional) = conditional_form(m, PC_WRITERS)?;
    let ops = operands.to_lowercase();
    let hit = if m.starts_with("pop") || m.starts_with("ldm") {
        ops.contains("pc}")
    } else {
        ops.split(',').next().map(str::trim) == Some("pc")
    };
    hit.then_some(conditional)
}

pub(super) fn classify_a32(insn: &Insn) -> Classification {
    let g = insn.groups;
    let m = base_mnemonic(insn);

    if let Some((base, conditional)) = conditional_form(&m, A32_BRANCHES) {
        return Classification {
            jump_like: true,
            call_like: base == "bl" || base == "blx",
            unconditional: !conditional,
            delay_slot: false,
        };
    }
    if m == "cbz" || m == "cbnz" {
        return Classification {
            jump_like: true,
            ..Default::default()
        };
    }
    if m == "tbb" || m == "tbh" {
        return Classification {
            jump_like: true,
            unconditional: true,
            ..Default::default()
        };
    }
    if let Some(conditional) = writes_pc(&m, &insn.operands) {
        return Classification {
            jump_like: true,
            unconditional: !conditional,
            ..Default::default()
        };
    }

    Classification {
        jump_like: g.any_control_flow(),
        call_like: g.call,
        unconditional: g.call || g.ret,
        delay_slot: false,
    }
}

pub(super) fn classify_a64(insn: &Insn) -> Classification {
    let g = insn.groups;
    let m = base_mnemonic(insn);

    let conditional =
        m.starts_with("b.") || matches!(m.as_str(), "cbz" | "cbnz" | "tbz" | "tbnz");
    let call_like = !m.starts_with("b.") && m.starts_with("bl");
    let direct = matches!(m.as_str(), "b" | "br" | "ret" | "eret")
        || m.starts_with("bra")
        || m.starts_with("reta");

    Classification {
        jump_like: conditional || call_like || direct || g.any_control_flow(),
        call_like: call_like || g.call,
        unconditional: !conditional && (call_like || direct || g.ret || g.call),
        delay_slot: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::insn;
    use crate::InsnGroups;
    use rstest::rstest;

    fn a32(m: &str, ops: &str) -> Classification {
        classify_a32(&insn(0x8000, 4, m, ops, InsnGroups::default(), None))
    }

    fn a64(m: &str) -> Classification {
        classify_a64(&insn(0x8000, 4, m, "", InsnGroups::default(), None))
    }

    #[rstest]
    #[case("b", "#0x8010", true, false, true)]
    #[case("beq", "#0x8010", true, false, false)]
    #[case("bl", "#0x9000", true, true, true)]
    #[case("blx", "r3", true, true, true)]
    #[case("bxne", "lr", true, false, false)]
    #[case("b.w", "#0x8010", true, false, true)]
    #[case("cbz", "r0, #0x8010", true, false, false)]
    #[case("pop", "{r4, pc}", true, false, true)]
    #[case("pop", "{r4, r5}", false, false, false)]
    #[case("ldr", "pc, [sp], #4", true, false, true)]
    #[case("moveq", "pc, lr", true, false, false)]
    #[case("bic", "r0, r0, #1", false, false, false)]
    #[case("mov", "r0, r1", false, false, false)]
    fn test_classify_a32(
        #[case] m: &str,
        #[case] ops: &str,
        #[case] jump_like: bool,
        #[case] call_like: bool,
        #[case] unconditional: bool,
    ) {
        let c = a32(m, ops);
        assert_eq!(
            (c.jump_like, c.call_like, c.unconditional),
            (jump_like, call_like, unconditional),
            "{m} {ops}"
        );
    }

    #[rstest]
    #[case("b", true, false, true)]
    #[case("b.eq", true, false, false)]
    #[case("b.le", true, false, false)]
    #[case("bl", true, true, true)]
    #[case("blr", true, true, true)]
    #[case("br", true, false, true)]
    #[case("ret", true, false, true)]
    #[case("tbnz", true, false, false)]
    #[case("bic", false, false, false)]
    #[case("add", false, false, false)]
    fn test_classify_a64(
        #[case] m: &str,
        #[case] jump_like: bool,
        #[case] call_like: bool,
        #[case] unconditional: bool,
    ) {
        let c = a64(m);
        assert_eq!(
            (c.jump_like, c.call_like, c.unconditional),
            (jump_like, call_like, unconditional),
            "{m}"
        );
    }
}
