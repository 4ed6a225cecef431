// Dead code elimination. An instruction is dead when it has no side effects, does not end its
// block, is not part of an issue chain and every destination is either absent or an SSA
// register (or SSA register array) that nothing reads. Deleting an instruction can make the
// definitions of its sources dead in turn, so the walk runs backwards and repeats until a
// sweep deletes nothing. Writes to hardware registers and to the execution mask counter are
// never considered dead.

use crate::core::{BuildContext, InstrId, Ref, Shader};

pub fn dce(_ctx: &BuildContext<'_>, shader: &mut Shader) -> bool {
    let mut progress = false;
    let mut sweeps = 0;

    loop {
        let mut deleted = 0;
        for id in shader.instrs_in_order().into_iter().rev() {
            if is_dead(shader, id) {
                log::trace!("dce: {}", shader.display_instr(id));
                shader.delete_instr(id);
                deleted += 1;
            }
        }
        sweeps += 1;
        if deleted == 0 {
            break;
        }
        progress = true;
    }

    log::trace!("dce: {sweeps} sweep(s)");
    progress
}

fn is_dead(shader: &Shader, id: InstrId) -> bool {
    let instr = shader.instr(id);
    if instr.has_side_effects()
        || instr.is_block_end()
        || instr.group_next
        || instr.dsts.is_empty()
        || chained_from_previous(shader, id)
    {
        return false;
    }

    instr.dsts.iter().all(|d| match d.r {
        Ref::None => true,
        Ref::Reg(_) | Ref::Regarray(_) if shader.is_ssa(d.r) => shader
            .ref_regs(d.r)
            .iter()
            .all(|&reg| shader.regs.reg(reg).uses.is_empty()),
        _ => false,
    })
}

fn chained_from_previous(shader: &Shader, id: InstrId) -> bool {
    let pos = shader.position_in_block(id);
    pos > 0 && {
        let block = &shader.block(shader.instr(id).block).instrs;
        shader.instr(block[pos - 1]).group_next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AluOp, Cursor, CtrlOp, Op, RegClass, Stage};
    use crate::passes::test_util::{run_pass, select, text};

    #[test]
    fn test_unused_chain_removed_and_idempotent() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = select(
            "shader fs \"dce\"\n\
             %0:32 = @load_preamble() [base=0]\n\
             %1:32 = fmul %0, %0\n\
             %2:32 = fadd %1, %0\n\
             %3:32 = fadd %0, %0\n\
             @store_output(%3) [base=0, component=0]\n",
        );
        assert!(run_pass(&mut shader, dce));
        let out = text(&shader);
        assert!(!out.contains("fmul"), "{out}");
        assert!(!out.contains("fadd %r2"), "{out}");
        assert!(out.contains("fadd %r3, %r0, %r0"), "{out}");
        assert!(out.contains("mov o0, %r3"), "{out}");

        assert!(!run_pass(&mut shader, dce));
        assert_eq!(text(&shader), out);
    }

    #[test]
    fn test_hardware_and_chained_writes_kept() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = Shader::new(Stage::Compute, "dce");
        let block = shader.push_block_after(None, None);
        let temp = shader.reg_ref(RegClass::Temp, 0);
        let (a, b) = (shader.ssa(0), shader.ssa(1));
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Mov), &[temp], &[Ref::imm(1)]);
        let head = shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Mov), &[a], &[Ref::imm(2)]);
        shader.edit(head).set_group_next(true);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Mov), &[b], &[Ref::imm(3)]);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Ctrl(CtrlOp::End), &[], &[]);

        assert!(!run_pass(&mut shader, dce));
        assert_eq!(shader.num_instrs(), 4);
    }
}
