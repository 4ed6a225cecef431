// Constant register selection. ALU sources holding an immediate are switched to the CONST
// register that holds the same bit pattern when the hardware table has one. Immediates without
// a table entry are materialized into a fresh SSA register with a bitwise bypass placed ahead
// of the instruction (ahead of its whole issue chain when it is chained), provided the source
// slot accepts a register. MOV is left alone: pseudo op lowering turns an immediate move into a
// bypass directly.

use crate::core::error::unsupported;
use crate::core::{AluOp, BitwiseOp, BuildContext, Cursor, InstrId, Op, Ref, RefTypes, Shader};

pub fn constreg(_ctx: &BuildContext<'_>, shader: &mut Shader) -> bool {
    let mut progress = false;

    for id in shader.instrs_in_order() {
        let op = shader.instr(id).op;
        if !matches!(op, Op::Alu(_)) {
            continue;
        }

        for i in 0..shader.instr(id).srcs.len() {
            let Some(value) = shader.instr(id).src(i).as_imm() else {
                continue;
            };

            if let Some(reg) = shader.const_ref(value) {
                shader.set_src(id, i, reg);
                progress = true;
                continue;
            }

            if op == Op::Alu(AluOp::Mov) {
                continue;
            }
            if !op.info().src_types[i].contains(RefTypes::REG) {
                unsupported(format!(
                    "immediate 0x{value:08x} in src {i} of {}",
                    op.name()
                ));
            }

            let tmp = shader.new_ssa();
            let head = chain_head(shader, id);
            let byp = shader.insert_instr(
                Cursor::Before(head),
                Op::Bitwise(BitwiseOp::Byp0s),
                &[tmp],
                &[Ref::imm(value)],
            );
            let cond = shader.instr(id).exec_cond;
            shader
                .edit(byp)
                .set_exec_cond(cond)
                .set_comment(format!("imm 0x{value:08x}"));
            shader.set_src(id, i, tmp);
            progress = true;
        }
    }

    progress
}

/// First instruction of the issue chain `id` belongs to.
pub(super) fn chain_head(shader: &Shader, id: InstrId) -> InstrId {
    let block = shader.instr(id).block;
    let instrs = &shader.block(block).instrs;
    let mut pos = shader.position_in_block(id);
    while pos > 0 && shader.instr(instrs[pos - 1]).group_next {
        pos -= 1;
    }
    instrs[pos]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CtrlOp, RegClass, Stage};
    use crate::passes::test_util::{run_pass, text};

    fn shader_with(srcs: &[Ref]) -> (Shader, InstrId) {
        let mut shader = Shader::new(Stage::Compute, "constreg");
        let block = shader.push_block_after(None, None);
        let dst = shader.new_ssa();
        let id = shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Fadd), &[dst], srcs);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Ctrl(CtrlOp::End), &[], &[]);
        (shader, id)
    }

    #[test]
    fn test_table_constants_use_const_regs() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, id) = shader_with(&[Ref::imm(5), Ref::imm_f32(1.0)]);
        assert!(run_pass(&mut shader, constreg));

        let sc5 = shader.regs.find_reg(RegClass::Const, 5).unwrap();
        let sc32 = shader.regs.find_reg(RegClass::Const, 32).unwrap();
        assert_eq!(shader.instr(id).src(0), Ref::Reg(sc5));
        assert_eq!(shader.instr(id).src(1), Ref::Reg(sc32));
        assert_eq!(shader.num_instrs(), 2);
        assert!(!run_pass(&mut shader, constreg));
    }

    #[test]
    fn test_other_immediates_materialized() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, id) = shader_with(&[Ref::imm_f32(3.0), Ref::imm(0)]);
        assert!(run_pass(&mut shader, constreg));

        let out = text(&shader);
        assert!(out.contains("byp0s %r1, 0x40400000 {imm 0x40400000}"), "{out}");
        assert!(out.contains("fadd %r0, %r1, sc0"), "{out}");
        assert_eq!(shader.position_in_block(id), 1);
    }

    #[test]
    fn test_chained_instruction_materializes_before_chain() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = Shader::new(Stage::Compute, "constreg");
        let block = shader.push_block_after(None, None);
        let dst = shader.new_ssa();
        let first = shader.insert_instr(
            Cursor::BlockEnd(block),
            Op::Alu(AluOp::Fadd),
            &[dst],
            &[Ref::imm(1), Ref::imm(2)],
        );
        shader.edit(first).set_group_next(true);
        let second = shader.insert_instr(
            Cursor::BlockEnd(block),
            Op::Alu(AluOp::Fmul),
            &[dst],
            &[Ref::imm(0x1234), Ref::imm(2)],
        );
        assert_eq!(chain_head(&shader, second), first);

        assert!(run_pass(&mut shader, constreg));
        let instrs = &shader.block(block).instrs;
        assert_eq!(instrs.len(), 3);
        assert_eq!(shader.instr(instrs[0]).op, Op::Bitwise(BitwiseOp::Byp0s));
        assert_eq!(instrs[1], first);
        assert_eq!(instrs[2], second);
    }

    #[test]
    fn test_mov_immediates_left_for_lowering() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = Shader::new(Stage::Compute, "constreg");
        let block = shader.push_block_after(None, None);
        let dst = shader.ssa(0);
        let id = shader.insert_instr(
            Cursor::BlockEnd(block),
            Op::Alu(AluOp::Mov),
            &[dst],
            &[Ref::imm(0x1234_5678)],
        );
        assert!(!run_pass(&mut shader, constreg));
        assert_eq!(shader.instr(id).src(0), Ref::imm(0x1234_5678));
    }
}
