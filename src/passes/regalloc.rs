// Register allocation. Live intervals come from the Analyzer, one per allocation unit: a
// free-standing SSA register or a root SSA register array with everything inside it. Units are
// assigned in order of interval start by a linear scan over the TEMP file. Units whose interval
// ended before the current start release their registers; a unit receives the lowest run of
// free registers as wide as it is. TEMP registers the shader already uses (front-end registers)
// are never handed out. When no run fits in the hardware TEMP count, allocation aborts.
//
// Operands are then rewritten in place: a member register maps to its root's base plus its
// offset in the root, and a register array maps to the TEMP array at the same offset. Finally
// the SSA registers and arrays, now unreferenced, are removed from the register file.

use hashbrown::HashMap;

use crate::core::error::{abort, invalid, CompileError};
use crate::core::{
    AllocUnit, Analyzer, BuildContext, LiveInterval, Ref, RegClass, RegId, RegarrayId, Shader,
};

pub fn regalloc(ctx: &BuildContext<'_>, shader: &mut Shader) -> bool {
    let mut analyzer = Analyzer::new(ctx.arena());
    analyzer.analyze(shader);
    let intervals = analyzer.intervals();
    if intervals.is_empty() {
        return false;
    }

    let units = intervals.len();
    let bases = assign(shader, intervals);
    rewrite(shader, &bases);

    let regarrays: Vec<RegarrayId> = shader
        .regs
        .live_regarrays()
        .filter(|(_, ra)| ra.class == RegClass::Ssa)
        .map(|(id, _)| id)
        .collect();
    for id in regarrays {
        shader.regs.delete_regarray(id);
    }
    let regs: Vec<RegId> = shader.regs.class_regs(RegClass::Ssa).to_vec();
    for id in regs {
        shader.regs.delete_reg(id);
    }

    log::debug!(
        "regalloc: {units} unit(s) in {} temp(s)",
        shader.regs.count_used(RegClass::Temp)
    );
    true
}

/// Linear scan; returns the first TEMP index of every unit.
fn assign(shader: &Shader, intervals: &[LiveInterval]) -> HashMap<AllocUnit, u32> {
    let limit = RegClass::Temp.capacity().unwrap_or(0);
    let mut occupied = shader.regs.used(RegClass::Temp).clone();
    // (end, base, size) of units holding registers.
    let mut active: Vec<(u32, u32, u32)> = Vec::new();
    let mut bases = HashMap::new();

    for iv in intervals {
        active.retain(|&(end, base, size)| {
            if end < iv.start {
                occupied.clear_range(base, size);
                false
            } else {
                true
            }
        });

        let Some(base) = occupied.find_clear_run(iv.size, limit) else {
            abort(CompileError::RegisterAllocation {
                reason: format!(
                    "no run of {} free temp(s) at instruction {} with {} unit(s) live",
                    iv.size,
                    iv.start,
                    active.len()
                ),
            });
        };
        occupied.set_range(base, iv.size);
        active.push((iv.end, base, iv.size));
        bases.insert(iv.unit, base);
        log::trace!("regalloc: {:?} [{}, {}] -> r{base}", iv.unit, iv.start, iv.end);
    }

    bases
}

fn rewrite(shader: &mut Shader, bases: &HashMap<AllocUnit, u32>) {
    for id in shader.instrs_in_order() {
        for i in 0..shader.instr(id).dsts.len() {
            if let Some(r) = temp_ref(shader, bases, shader.instr(id).dst(i)) {
                shader.set_dst(id, i, r);
            }
        }
        for i in 0..shader.instr(id).srcs.len() {
            if let Some(r) = temp_ref(shader, bases, shader.instr(id).src(i)) {
                shader.set_src(id, i, r);
            }
        }
    }
}

/// TEMP operand replacing the SSA operand `r`.
fn temp_ref(shader: &mut Shader, bases: &HashMap<AllocUnit, u32>, r: Ref) -> Option<Ref> {
    if !shader.is_ssa(r) {
        return None;
    }
    let base_of = |unit: AllocUnit| match bases.get(&unit) {
        Some(&base) => base,
        None => invalid(format!("no registers assigned to {unit:?}")),
    };

    match r {
        Ref::Reg(reg) => {
            let (index, regarray) = {
                let reg = shader.regs.reg(reg);
                (reg.index, reg.regarray)
            };
            let temp = match regarray {
                Some(root) => {
                    let start = shader.regs.regarray(root).start;
                    base_of(AllocUnit::Regarray(root)) + (index - start)
                }
                None => base_of(AllocUnit::Reg(reg)),
            };
            Some(shader.reg_ref(RegClass::Temp, temp))
        }
        Ref::Regarray(ra) => {
            let (size, start, parent) = {
                let ra = shader.regs.regarray(ra);
                (ra.size, ra.start, ra.parent)
            };
            let root = parent.unwrap_or(ra);
            let root_start = shader.regs.regarray(root).start;
            let temp = base_of(AllocUnit::Regarray(root)) + (start - root_start);
            Some(shader.regarray_ref(size, RegClass::Temp, temp))
        }
        _ => invalid(format!("SSA operand {} cannot be allocated", shader.display_ref(r))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AluOp, BackendOp, Cursor, CtrlOp, Op, Stage};
    use crate::passes::test_util::{run_pass, text};

    fn fs_shader() -> (Shader, crate::core::BlockId) {
        let mut shader = Shader::new(Stage::Fragment, "ra");
        let block = shader.push_block_after(None, None);
        (shader, block)
    }

    #[test]
    fn test_expired_registers_reused() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, block) = fs_shader();
        let (a, b, c, d) = (shader.ssa(0), shader.ssa(1), shader.ssa(2), shader.ssa(3));
        let (sh0, sh1) = (
            shader.reg_ref(RegClass::Shared, 0),
            shader.reg_ref(RegClass::Shared, 1),
        );
        let o0 = shader.reg_ref(RegClass::Pixout, 0);
        let at = Cursor::BlockEnd(block);
        shader.insert_instr(at, Op::Alu(AluOp::Mbyp), &[a], &[sh0]);
        shader.insert_instr(at, Op::Alu(AluOp::Mbyp), &[b], &[sh1]);
        shader.insert_instr(at, Op::Alu(AluOp::Fadd), &[c], &[a, b]);
        shader.insert_instr(at, Op::Alu(AluOp::Fadd), &[d], &[c, c]);
        shader.insert_instr(at, Op::Alu(AluOp::Mbyp), &[o0], &[d]);
        shader.insert_instr(at, Op::Ctrl(CtrlOp::End), &[], &[]);

        assert!(run_pass(&mut shader, regalloc));
        let out = text(&shader);
        assert!(out.contains("fadd r2, r0, r1"), "{out}");
        assert!(out.contains("fadd r0, r2, r2"), "{out}");
        assert!(out.contains("mbyp o0, r0"), "{out}");
        assert!(shader.regs.class_regs(RegClass::Ssa).is_empty());
        assert_eq!(shader.regs.count_used(RegClass::Temp), 3);
        assert!(!run_pass(&mut shader, regalloc));
    }

    #[test]
    fn test_vectors_get_contiguous_ranges() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, block) = fs_shader();
        let scalar = shader.ssa(0);
        let addr = shader.ssa_vec(2, 1, 0);
        let value = shader.ssa_vec(2, 2, 0);
        let (lo, hi) = (shader.ssa_vec(1, 1, 0), shader.ssa_vec(1, 1, 1));
        let (sh0, sh1) = (
            shader.reg_ref(RegClass::Shared, 0),
            shader.reg_ref(RegClass::Shared, 1),
        );
        let at = Cursor::BlockEnd(block);
        shader.insert_instr(at, Op::Alu(AluOp::Mbyp), &[scalar], &[sh0]);
        shader.insert_instr(at, Op::Alu(AluOp::Mbyp), &[lo], &[scalar]);
        shader.insert_instr(at, Op::Alu(AluOp::Mbyp), &[hi], &[sh1]);
        shader.insert_instr(
            at,
            Op::Backend(BackendOp::Ld),
            &[value],
            &[Ref::drc(0), Ref::val(2), addr],
        );
        shader.insert_instr(at, Op::Ctrl(CtrlOp::End), &[], &[]);

        assert!(run_pass(&mut shader, regalloc));
        let out = text(&shader);
        // The scalar is still live when the address starts, so the address lands after it.
        assert!(out.contains("mbyp r[1], r0"), "{out}");
        assert!(out.contains("mbyp r[2], sh1"), "{out}");
        // r0 is free again but too narrow for the loaded pair.
        assert!(out.contains("ld r[3..4], drc0, 2, r[1..2]"), "{out}");
    }

    #[test]
    fn test_front_end_temps_avoided() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, block) = fs_shader();
        let r0 = shader.reg_ref(RegClass::Temp, 0);
        let a = shader.ssa(0);
        let sh0 = shader.reg_ref(RegClass::Shared, 0);
        let at = Cursor::BlockEnd(block);
        shader.insert_instr(at, Op::Alu(AluOp::Mbyp), &[r0], &[sh0]);
        shader.insert_instr(at, Op::Alu(AluOp::Fadd), &[a], &[r0, r0]);
        shader.insert_instr(at, Op::Alu(AluOp::Mbyp), &[r0], &[a]);
        shader.insert_instr(at, Op::Ctrl(CtrlOp::End), &[], &[]);

        assert!(run_pass(&mut shader, regalloc));
        assert!(text(&shader).contains("fadd r1, r0, r0"));
    }

    #[test]
    #[should_panic(expected = "Register allocation failed")]
    fn test_exhaustion_aborts() {
        let (mut shader, block) = fs_shader();
        let sh0 = shader.reg_ref(RegClass::Shared, 0);
        let at = Cursor::BlockEnd(block);
        let values: Vec<Ref> = (0..249).map(|i| shader.ssa(i)).collect();
        for &v in &values {
            shader.insert_instr(at, Op::Alu(AluOp::Mbyp), &[v], &[sh0]);
        }
        let o0 = shader.reg_ref(RegClass::Pixout, 0);
        for &v in &values {
            shader.insert_instr(at, Op::Alu(AluOp::Mbyp), &[o0], &[v]);
        }
        run_pass(&mut shader, regalloc);
    }
}
