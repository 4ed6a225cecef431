// Lowering that needs physical registers. After allocation a copy may have become a move of a
// register onto itself; those are dropped unless they are part of an issue chain or would leave
// their block empty. END is a pseudo op: it becomes the end flag of the instruction right before
// it when that instruction can carry the flag (a non-control, non-pseudo instruction with the
// same execution condition that does not already end the block), and otherwise a NOP with the
// end flag set.

use crate::core::{AluOp, BuildContext, CtrlOp, Cursor, InstrId, Op, Shader};

pub fn lower_late_ops(_ctx: &BuildContext<'_>, shader: &mut Shader) -> bool {
    let mut progress = false;

    for id in shader.instrs_in_order() {
        if is_identity_move(shader, id) {
            log::trace!("lower_late_ops: dropping {}", shader.display_instr(id));
            shader.delete_instr(id);
            progress = true;
        }
    }

    for id in shader.instrs_in_order() {
        if shader.instr(id).op == Op::Ctrl(CtrlOp::End) {
            lower_end(shader, id);
            progress = true;
        }
    }

    progress
}

fn is_identity_move(shader: &Shader, id: InstrId) -> bool {
    let instr = shader.instr(id);
    if instr.op != Op::Alu(AluOp::Mbyp) || instr.mods != 0 || instr.group_next || instr.end {
        return false;
    }
    let (dst, src) = (&instr.dsts[0], &instr.srcs[0]);
    if dst.r != src.r || dst.mods != 0 || src.mods != 0 || shader.is_ssa(dst.r) {
        return false;
    }
    let pos = shader.position_in_block(id);
    let block = &shader.block(instr.block).instrs;
    block.len() > 1 && (pos == 0 || !shader.instr(block[pos - 1]).group_next)
}

fn lower_end(shader: &mut Shader, end: InstrId) {
    let (block, cond) = {
        let instr = shader.instr(end);
        (instr.block, instr.exec_cond)
    };
    let pos = shader.position_in_block(end);
    let prev = pos
        .checked_sub(1)
        .map(|p| shader.block(block).instrs[p])
        .filter(|&p| can_carry_end(shader, p, end));

    match prev {
        Some(prev) => {
            shader.edit(prev).set_end(true);
            log::trace!("lower_late_ops: end folded into {}", shader.display_instr(prev));
        }
        None => {
            let nop = shader.insert_instr(Cursor::Before(end), Op::Ctrl(CtrlOp::Nop), &[], &[]);
            shader.edit(nop).set_exec_cond(cond).set_end(true);
        }
    }
    shader.delete_instr(end);
}

fn can_carry_end(shader: &Shader, id: InstrId, end: InstrId) -> bool {
    let instr = shader.instr(id);
    !matches!(instr.op, Op::Ctrl(_))
        && !instr.info().is_pseudo
        && !instr.is_block_end()
        && instr.exec_cond == shader.instr(end).exec_cond
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExecCond, RegClass, Ref, Stage};
    use crate::passes::test_util::{run_pass, text};

    #[test]
    fn test_end_folded_and_identity_moves_dropped() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = Shader::new(Stage::Fragment, "late");
        let block = shader.push_block_after(None, None);
        let (r0, r1) = (
            shader.reg_ref(RegClass::Temp, 0),
            shader.reg_ref(RegClass::Temp, 1),
        );
        let o0 = shader.reg_ref(RegClass::Pixout, 0);
        let at = Cursor::BlockEnd(block);
        shader.insert_instr(at, Op::Alu(AluOp::Mbyp), &[r0], &[r0]);
        shader.insert_instr(at, Op::Alu(AluOp::Fadd), &[r1], &[r0, r0]);
        shader.insert_instr(at, Op::Alu(AluOp::Mbyp), &[o0], &[r1]);
        shader.insert_instr(at, Op::Ctrl(CtrlOp::End), &[], &[]);

        assert!(run_pass(&mut shader, lower_late_ops));
        let out = text(&shader);
        assert!(!out.contains("mbyp r0, r0"), "{out}");
        assert!(out.contains("0: fadd r1, r0, r0"), "{out}");
        assert!(out.contains("1: mbyp.end o0, r1"), "{out}");
        assert!(!out.contains(": end"), "{out}");
        assert_eq!(shader.num_instrs(), 2);
        assert!(!run_pass(&mut shader, lower_late_ops));
    }

    #[test]
    fn test_end_after_control_becomes_nop() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = Shader::new(Stage::Compute, "late");
        let block = shader.push_block_after(None, None);
        let at = Cursor::BlockEnd(block);
        shader.insert_instr(at, Op::Ctrl(CtrlOp::Wdf), &[], &[Ref::drc(0)]);
        shader.insert_instr(at, Op::Ctrl(CtrlOp::End), &[], &[]);

        assert!(run_pass(&mut shader, lower_late_ops));
        let out = text(&shader);
        assert!(out.contains("1: nop.end"), "{out}");
    }

    #[test]
    fn test_end_keeps_distinct_condition() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = Shader::new(Stage::Fragment, "late");
        let block = shader.push_block_after(None, None);
        let (r0, r1) = (
            shader.reg_ref(RegClass::Temp, 0),
            shader.reg_ref(RegClass::Temp, 1),
        );
        let at = Cursor::BlockEnd(block);
        let fadd = shader.insert_instr(at, Op::Alu(AluOp::Fadd), &[r1], &[r0, r0]);
        shader.edit(fadd).set_exec_cond(ExecCond::P0True);
        shader.insert_instr(at, Op::Ctrl(CtrlOp::End), &[], &[]);

        assert!(run_pass(&mut shader, lower_late_ops));
        assert!(!shader.instr(fadd).end);
        let last = *shader.block(block).instrs.last().unwrap();
        assert_eq!(shader.instr(last).op, Op::Ctrl(CtrlOp::Nop));
        assert!(shader.instr(last).end);
    }
}
