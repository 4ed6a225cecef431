// ST reads its 64-bit address and the data words from one register range: the address in the
// first two registers and the data immediately after. This pass gives every ST a fresh SSA
// vector of address plus data words, copies both operands into it ahead of the store and points
// the store's address and data operands at the two halves of it. The vector's root array keeps
// both halves in one allocation unit.

use crate::core::error::invalid;
use crate::core::{BackendOp, BuildContext, Builder, Cursor, InstrId, Op, Ref, Shader};

pub fn schedule_st_regs(_ctx: &BuildContext<'_>, shader: &mut Shader) -> bool {
    let mut progress = false;

    for id in shader.instrs_in_order() {
        if shader.instr(id).op != Op::Backend(BackendOp::St) || is_packed(shader, id) {
            continue;
        }
        pack(shader, id);
        progress = true;
    }

    progress
}

fn pack(shader: &mut Shader, id: InstrId) {
    let instr = shader.instr(id);
    let (data, addr, cond) = (instr.src(0), instr.src(4), instr.exec_cond);
    let Some(words) = instr.src(2).as_val() else {
        invalid("ST without a word count");
    };

    let addr_words = operand_words(shader, addr, 2);
    let data_words = operand_words(shader, data, words);

    let index = shader.next_ssa_idx;
    shader.next_ssa_idx += 1;
    shader.ssa_vec(words + 2, index, 0);

    let mut b = Builder::new(shader, Cursor::Before(id));
    for (c, &word) in addr_words.iter().chain(data_words.iter()).enumerate() {
        let dst = b.shader.ssa_vec(1, index, c as u32);
        let mov = b.mov(dst, word);
        b.edit(mov).set_exec_cond(cond).set_comment("st operand");
    }

    let packed_addr = shader.ssa_vec(2, index, 0);
    let packed_data = shader.ssa_vec(words, index, 2);
    shader.set_src(id, 4, packed_addr);
    shader.set_src(id, 0, packed_data);
    log::trace!("schedule_st_regs: {}", shader.display_instr(id));
}

/// Whether the store already reads one contiguous SSA range.
fn is_packed(shader: &Shader, id: InstrId) -> bool {
    let instr = shader.instr(id);
    let (Some(addr), Some(data)) = (instr.src(4).as_regarray(), instr.src(0).as_regarray()) else {
        return false;
    };
    if !shader.is_ssa(instr.src(4)) {
        return false;
    }
    let (addr, data) = (shader.regs.regarray(addr), shader.regs.regarray(data));
    addr.parent.is_some() && addr.parent == data.parent && data.start == addr.start + 2
}

/// The registers of `r` as `n` single-word operands.
fn operand_words(shader: &mut Shader, r: Ref, n: u32) -> Vec<Ref> {
    match r {
        Ref::Regarray(_) => {
            let regs = shader.ref_regs(r);
            if regs.len() != n as usize {
                invalid(format!("ST operand covers {} words, expected {n}", regs.len()));
            }
            regs.into_iter().map(Ref::Reg).collect()
        }
        Ref::Reg(reg) => {
            let (class, index) = {
                let reg = shader.regs.reg(reg);
                (reg.class, reg.index)
            };
            (0..n).map(|w| shader.reg_ref(class, index + w)).collect()
        }
        other if n == 1 => vec![other],
        _ => invalid(format!("ST operand {} is not a register", shader.display_ref(r))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::register_file::ssa_vec_index;
    use crate::core::{CtrlOp, RegClass, Stage};
    use crate::passes::test_util::{run_pass, text};

    #[test]
    fn test_store_operands_packed() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = Shader::new(Stage::Compute, "st");
        let block = shader.push_block_after(None, None);
        let addr = shader.ssa_vec(2, 0, 0);
        let data = shader.ssa_vec(2, 1, 0);
        shader.next_ssa_idx = 2;
        let st = shader.insert_instr(
            Cursor::BlockEnd(block),
            Op::Backend(BackendOp::St),
            &[],
            &[data, Ref::drc(0), Ref::val(2), Ref::val(0), addr],
        );
        shader.insert_instr(Cursor::BlockEnd(block), Op::Ctrl(CtrlOp::End), &[], &[]);

        assert!(run_pass(&mut shader, schedule_st_regs));
        let out = text(&shader);
        assert!(out.contains("mov %r2[0], %r0.0"), "{out}");
        assert!(out.contains("mov %r2[1], %r0.1"), "{out}");
        assert!(out.contains("mov %r2[2], %r1.0"), "{out}");
        assert!(out.contains("mov %r2[3], %r1.1"), "{out}");
        assert!(out.contains("st %r2[2..3], drc0, 2, 0, %r2[0..1]"), "{out}");
        assert_eq!(shader.position_in_block(st), 4);

        assert!(!run_pass(&mut shader, schedule_st_regs));
        // Address and data share one root array.
        let root = shader
            .regs
            .find_regarray(4, RegClass::Ssa, ssa_vec_index(2, 0))
            .unwrap();
        let addr = shader.instr(st).src(4).as_regarray().unwrap();
        assert_eq!(shader.regs.regarray(addr).parent, Some(root));
    }
}
