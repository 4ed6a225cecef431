// This module implements the liveness analysis that drives register allocation. The Analyzer
// walks the shader in block layout order, numbers every instruction linearly and records for
// each allocation unit (a free-standing SSA register, or a root SSA register array together
// with all its member registers and sub-arrays) the first and last instruction positions that
// touch it. Lowered loops are found through their back-edge branches: any unit that is live on
// entry to a loop body and referenced inside it is extended to the back-edge, since the body
// may execute again after the last textual use. Nested loops are handled by iterating the
// extension to a fixed point. All scratch data (instruction order, intervals and loop ranges)
// is allocated in the build context's bumpalo arena and dropped with it.

//! Linear live intervals over SSA allocation units.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use hashbrown::HashMap;

use super::instr::InstrId;
use super::register_file::{RegClass, RegId, RegarrayId};
use super::shader::Shader;

/// Something that receives one contiguous register range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocUnit {
    Reg(RegId),
    Regarray(RegarrayId),
}

/// Inclusive instruction position range in which a unit is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveInterval {
    pub unit: AllocUnit,
    pub start: u32,
    pub end: u32,
    /// Number of registers the unit occupies.
    pub size: u32,
}

/// Computes live intervals for the SSA registers of a shader.
pub struct Analyzer<'a> {
    order: BumpVec<'a, InstrId>,
    intervals: BumpVec<'a, LiveInterval>,
    loops: BumpVec<'a, (u32, u32)>,
}

impl<'a> Analyzer<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        Self {
            order: BumpVec::new_in(arena),
            intervals: BumpVec::new_in(arena),
            loops: BumpVec::new_in(arena),
        }
    }

    /// Instructions in linear order; an interval position indexes this slice.
    pub fn order(&self) -> &[InstrId] {
        &self.order
    }

    /// Intervals sorted by start position.
    pub fn intervals(&self) -> &[LiveInterval] {
        &self.intervals
    }

    /// Loop body ranges as (first position, back-edge position).
    pub fn loops(&self) -> &[(u32, u32)] {
        &self.loops
    }

    pub fn analyze(&mut self, shader: &Shader) {
        self.order.clear();
        self.intervals.clear();
        self.loops.clear();

        let mut block_start: HashMap<u32, u32> = HashMap::new();
        for &block in shader.layout() {
            block_start.insert(block.0, self.order.len() as u32);
            self.order.extend(shader.block(block).instrs.iter().copied());
        }

        // -------- collect loop ranges from back-edges ---------
        for (pos, &id) in self.order.iter().enumerate() {
            let instr = shader.instr(id);
            if let Some(target) = instr.target {
                if let Some(&start) = block_start.get(&target.0) {
                    if start <= pos as u32 && instr.loop_link.is_some() {
                        self.loops.push((start, pos as u32));
                    }
                }
            }
        }

        // -------- record first/last touch per unit ---------
        let mut index: HashMap<AllocUnit, usize> = HashMap::new();
        for (pos, &id) in self.order.iter().enumerate() {
            let instr = shader.instr(id);
            let refs = instr.dsts.iter().chain(instr.srcs.iter()).map(|o| o.r);
            for r in refs {
                for reg in shader.ref_regs(r) {
                    let Some((unit, size)) = Self::unit_of(shader, reg) else {
                        continue;
                    };
                    let pos = pos as u32;
                    match index.get(&unit) {
                        Some(&i) => {
                            let iv = &mut self.intervals[i];
                            iv.start = iv.start.min(pos);
                            iv.end = iv.end.max(pos);
                        }
                        None => {
                            index.insert(unit, self.intervals.len());
                            self.intervals.push(LiveInterval {
                                unit,
                                start: pos,
                                end: pos,
                                size,
                            });
                        }
                    }
                }
            }
        }

        // -------- extend across loops until stable ---------
        let mut changed = true;
        while changed {
            changed = false;
            for &(start, end) in self.loops.iter() {
                for iv in self.intervals.iter_mut() {
                    if iv.start < start && iv.end >= start && iv.end < end {
                        iv.end = end;
                        changed = true;
                    }
                }
            }
        }

        self.intervals.sort_by_key(|iv| (iv.start, iv.end));
        log::trace!(
            "liveness: {} instructions, {} units, {} loops",
            self.order.len(),
            self.intervals.len(),
            self.loops.len()
        );
    }

    fn unit_of(shader: &Shader, reg: RegId) -> Option<(AllocUnit, u32)> {
        let r = shader.regs.reg(reg);
        if r.class != RegClass::Ssa {
            return None;
        }
        Some(match r.regarray {
            Some(ra) => (AllocUnit::Regarray(ra), shader.regs.regarray(ra).size),
            None => (AllocUnit::Reg(reg), 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::{Builder, Cursor};
    use crate::core::op_info::{AluOp, CtrlOp};
    use crate::core::shader::Stage;
    use crate::core::value_ref::Ref;

    #[test]
    fn test_intervals_cover_def_to_last_use() {
        let mut shader = Shader::new(Stage::Fragment, "live");
        let block = shader.push_block_after(None, None);
        let (a, b, c) = (shader.ssa(0), shader.ssa(1), shader.ssa(2));
        let mut builder = Builder::new(&mut shader, Cursor::BlockEnd(block));
        builder.mov(a, Ref::imm(1));
        builder.mov(b, Ref::imm(2));
        builder.alu(AluOp::Fadd, &[c], &[a, b]);
        builder.ctrl(CtrlOp::End, &[], &[]);

        let arena = Bump::new();
        let mut analyzer = Analyzer::new(&arena);
        analyzer.analyze(&shader);

        let ivs = analyzer.intervals();
        assert_eq!(ivs.len(), 3);
        assert_eq!((ivs[0].start, ivs[0].end), (0, 2));
        assert_eq!((ivs[1].start, ivs[1].end), (1, 2));
        assert_eq!((ivs[2].start, ivs[2].end), (2, 2));
    }

    #[test]
    fn test_loop_extends_live_in_values() {
        let mut shader = Shader::new(Stage::Compute, "loop");
        let entry = shader.push_block_after(None, None);
        let (a, t) = (shader.ssa(0), shader.ssa(1));

        let mut builder = Builder::new(&mut shader, Cursor::BlockEnd(entry));
        builder.mov(a, Ref::imm(3));
        let body = builder.push_block(None);
        builder.alu(AluOp::Fadd, &[t], &[a, a]);
        builder.mov(t, t);
        let br = builder.ctrl(CtrlOp::Br, &[], &[]);
        let tail = builder.push_block(None);
        let end = builder.ctrl(CtrlOp::End, &[], &[]);
        shader.set_target(br, body);
        shader.link_loop(br, end);
        let _ = tail;

        let arena = Bump::new();
        let mut analyzer = Analyzer::new(&arena);
        analyzer.analyze(&shader);

        assert_eq!(analyzer.loops(), &[(1, 3)]);
        let a_iv = analyzer
            .intervals()
            .iter()
            .find(|iv| iv.unit == AllocUnit::Reg(a.as_reg().unwrap()))
            .copied()
            .unwrap();
        assert_eq!((a_iv.start, a_iv.end), (0, 3));
    }
}
