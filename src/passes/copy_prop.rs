// Copy propagation over SSA moves. A MOV between two free-standing SSA registers, unconditional
// and without modifiers, is removed after every reader of its destination is pointed at its
// source. Registers that belong to a register array are left alone since their placement is
// tied to the array's.

use crate::core::{AluOp, BuildContext, ExecCond, Op, Ref, RegClass, RegId, Shader};

pub fn copy_prop(_ctx: &BuildContext<'_>, shader: &mut Shader) -> bool {
    let mut progress = false;

    for id in shader.instrs_in_order() {
        let instr = shader.instr(id);
        if instr.op != Op::Alu(AluOp::Mov)
            || instr.exec_cond != ExecCond::PeTrue
            || instr.mods != 0
            || instr.group_next
            || instr.end
            || instr.dsts[0].mods != 0
            || instr.srcs[0].mods != 0
        {
            continue;
        }
        let (Some(dst), Some(src)) = (instr.dst(0).as_reg(), instr.src(0).as_reg()) else {
            continue;
        };
        if dst == src || !is_plain_ssa(shader, dst) || !is_plain_ssa(shader, src) {
            continue;
        }
        if shader.regs.reg(dst).writes.len() != 1 {
            continue;
        }

        let replaced = shader.replace_reg_uses(dst, Ref::Reg(src));
        if shader.regs.reg(dst).uses.is_empty() {
            log::trace!("copy_prop: forwarded {replaced} use(s) of {}", shader.display_instr(id));
            shader.delete_instr(id);
            progress = true;
        } else if replaced > 0 {
            progress = true;
        }
    }

    progress
}

fn is_plain_ssa(shader: &Shader, reg: RegId) -> bool {
    let r = shader.regs.reg(reg);
    r.class == RegClass::Ssa && r.regarray.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::test_util::{run_pass, select, text};

    #[test]
    fn test_ssa_moves_forwarded() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = select(
            "shader fs \"copy\"\n\
             %0:32 = @load_preamble() [base=0]\n\
             %1:32 = mov %0\n\
             %2:32 = fadd %1, %1\n\
             @store_output(%2) [base=0, component=0]\n",
        );
        let before = shader.num_instrs();
        assert!(run_pass(&mut shader, copy_prop));
        assert_eq!(shader.num_instrs(), before - 1);

        let out = text(&shader);
        assert!(out.contains("fadd %r2, %r0, %r0"), "{out}");
        assert!(!out.contains("mov %r1"), "{out}");
    }

    #[test]
    fn test_moves_to_hardware_registers_kept() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = select(
            "shader fs \"copy\"\n\
             %0:32 = @load_preamble() [base=0]\n\
             @store_output(%0) [base=0, component=0]\n",
        );
        assert!(!run_pass(&mut shader, copy_prop));
    }
}
