// Pseudo op lowering. Every pseudo ALU and bitwise op is replaced in place by the real
// instruction sequence that implements it, carrying over the execution condition, the
// provenance comment and the issue chain link of the original. Moves pick their instruction
// from the destination and source: vertex outputs are written through the USC vertex store,
// immediates go through a bitwise bypass unless they target the mask counter, and everything
// else is a main ALU bypass. Integer arithmetic maps onto the 32- and 64-bit multiply-add units, with
// narrow results masked back to their width, and bitwise pseudo ops map onto the logical and
// shift stages. END is left for late lowering, which folds it into the last instruction.

use crate::core::error::unsupported;
use crate::core::{
    AluOp, AluOpMod, BackendOp, BitwiseOp, BuildContext, Builder, Cursor, Instr, InstrId, Io, Op,
    Ref, RegClass, Shader, SrcMod,
};

pub fn lower_pseudo_ops(_ctx: &BuildContext<'_>, shader: &mut Shader) -> bool {
    let mut progress = false;

    for id in shader.instrs_in_order() {
        let instr = shader.instr(id);
        if !instr.info().is_pseudo {
            continue;
        }
        match instr.op {
            Op::Alu(op) => {
                let mut l = Lowering::new(shader, id);
                l.alu(op);
                l.finish(id);
            }
            Op::Bitwise(op) => {
                let mut l = Lowering::new(shader, id);
                l.bitwise(op);
                l.finish(id);
            }
            _ => continue,
        }
        progress = true;
    }

    progress
}

/// Replacement of one pseudo instruction.
struct Lowering<'s> {
    b: Builder<'s>,
    old: Instr,
    emitted: Vec<InstrId>,
}

impl<'s> Lowering<'s> {
    fn new(shader: &'s mut Shader, id: InstrId) -> Self {
        let old = shader.instr(id).clone();
        Self {
            b: Builder::new(shader, Cursor::Before(id)),
            old,
            emitted: Vec::new(),
        }
    }

    fn dst(&self, i: usize) -> Ref {
        self.old.dst(i)
    }

    fn src(&self, i: usize) -> Ref {
        self.old.src(i)
    }

    fn tmp(&mut self) -> Ref {
        self.b.shader.new_ssa()
    }

    fn emit(&mut self, op: impl Into<Op>, dsts: &[Ref], srcs: &[Ref]) -> InstrId {
        let id = self.b.emit(op, dsts, srcs);
        let edit = self.b.edit(id).set_exec_cond(self.old.exec_cond);
        if let Some(comment) = &self.old.comment {
            edit.set_comment(comment.clone());
        }
        self.emitted.push(id);
        id
    }

    fn finish(self, id: InstrId) {
        let Lowering { b, old, emitted } = self;
        if let Some(&last) = emitted.last() {
            if old.group_next {
                b.shader.edit(last).set_group_next(true);
            }
        }
        log::trace!(
            "lowered {} into {} instruction(s)",
            b.shader.display_instr(id),
            emitted.len()
        );
        b.shader.delete_instr(id);
    }

    fn alu(&mut self, op: AluOp) {
        use AluOp::*;

        match op {
            Mov => self.mov(),

            Fabs | Fneg => {
                let m = if op == Fabs { SrcMod::Abs } else { SrcMod::Neg };
                let id = self.emit(Mbyp, &[self.dst(0)], &[self.src(0)]);
                self.b.edit(id).set_src_mod(0, m.bit());
            }

            Cmp => {
                let tst = self.emit(Tst, &[Ref::io(Io::Ftt), Ref::None], &[self.src(0), self.src(1)]);
                self.b
                    .edit(tst)
                    .set_mod(self.old.mods)
                    .set_src_mods(0, self.old.srcs[0].mods)
                    .set_src_mods(1, self.old.srcs[1].mods)
                    .set_group_next(true);
                self.emit(
                    Movc,
                    &[self.dst(0), Ref::None],
                    &[Ref::io(Io::Ftt), Ref::imm(!0), Ref::imm(0), Ref::None, Ref::None],
                );
            }

            Iadd8 | Iadd16 | Iadd32 => {
                let bits = int_bits(op);
                self.narrow(bits, |l, dst| {
                    l.emit(
                        Madd32,
                        &[dst, Ref::None],
                        &[l.src(0), Ref::imm(1), l.src(1), Ref::None],
                    );
                });
            }

            Imul8 | Imul16 | Imul32 | ImulLow | UmulLow => {
                let bits = int_bits(op);
                let signed = matches!(op, Imul8 | Imul16 | Imul32 | ImulLow);
                self.narrow(bits, |l, dst| {
                    let id = l.emit(
                        Madd32,
                        &[dst, Ref::None],
                        &[l.src(0), l.src(1), Ref::imm(0), Ref::None],
                    );
                    if signed {
                        l.b.edit(id).set_mod(AluOpMod::S.bit());
                    }
                });
            }

            ImulHigh | UmulHigh => {
                let low = self.tmp();
                let id = self.emit(
                    Madd64,
                    &[low, self.dst(0)],
                    &[self.src(0), self.src(1), Ref::imm(0), Ref::imm(0), Ref::None],
                );
                if op == ImulHigh {
                    self.b.edit(id).set_mod(AluOpMod::S.bit());
                }
            }

            Iadd64 => {
                self.emit(
                    Add64,
                    &[self.dst(0), self.dst(1)],
                    &[self.src(0), self.src(1), self.src(2), self.src(3), Ref::None],
                );
            }

            Ineg8 | Ineg16 | Ineg32 | Iabs8 | Iabs16 | Iabs32 => {
                let bits = int_bits(op);
                let m = if matches!(op, Ineg8 | Ineg16 | Ineg32) {
                    SrcMod::Neg
                } else {
                    SrcMod::Abs
                };
                self.narrow(bits, |l, dst| {
                    let id = l.emit(
                        Madd32,
                        &[dst, Ref::None],
                        &[l.src(0), Ref::imm(1), Ref::imm(0), Ref::None],
                    );
                    l.b.edit(id).set_src_mod(0, m.bit());
                });
            }

            // The modifier applies to the 64-bit pair formed by the first two sources.
            Ineg64 | Iabs64 => {
                let m = if op == Ineg64 { SrcMod::Neg } else { SrcMod::Abs };
                let id = self.emit(
                    Add64,
                    &[self.dst(0), self.dst(1)],
                    &[self.src(0), self.src(1), Ref::imm(0), Ref::imm(0), Ref::None],
                );
                self.b
                    .edit(id)
                    .set_src_mod(0, m.bit())
                    .set_src_mod(1, m.bit());
            }

            _ => unsupported(format!("lowering of {}", Op::Alu(op).name())),
        }
    }

    fn mov(&mut self) {
        let (dst, src) = (self.dst(0), self.src(0));
        if self.b.shader.ref_class(dst) == Some(RegClass::Vtxout) {
            self.emit(BackendOp::UvswWrite, &[dst], &[src]);
        } else if src.as_imm().is_some() && dst != Ref::Emc {
            self.emit(BitwiseOp::Byp0s, &[dst], &[src]);
        } else {
            self.emit(AluOp::Mbyp, &[dst], &[src]);
        }
    }

    /// Emits the sequence produced by `body`, masking the result when `bits` is below 32.
    fn narrow(&mut self, bits: u32, body: impl FnOnce(&mut Self, Ref)) {
        if bits >= 32 {
            let dst = self.dst(0);
            body(self, dst);
            return;
        }
        let wide = self.tmp();
        body(self, wide);
        self.emit(
            BitwiseOp::Or,
            &[self.dst(0)],
            &[wide, Ref::imm((1 << bits) - 1), Ref::imm(!0), Ref::imm(0)],
        );
    }

    fn bitwise(&mut self, op: BitwiseOp) {
        use BitwiseOp::*;

        // OR computes (s0 & s1) | (~s2 & s3).
        match op {
            Iand => {
                self.emit(
                    Or,
                    &[self.dst(0)],
                    &[self.src(0), self.src(1), Ref::imm(!0), Ref::imm(0)],
                );
            }
            Ior => {
                self.emit(
                    Or,
                    &[self.dst(0)],
                    &[self.src(0), Ref::imm(!0), Ref::imm(0), self.src(1)],
                );
            }
            Ixor => {
                self.emit(Xor, &[self.dst(0)], &[self.src(0), self.src(1)]);
            }
            Inot => {
                self.emit(Xor, &[self.dst(0)], &[self.src(0), Ref::imm(!0)]);
            }
            Ishl => {
                self.emit(Lsl0, &[self.dst(0)], &[self.src(0), self.src(1)]);
            }
            Ushr => {
                self.emit(Shr, &[self.dst(0)], &[self.src(0), self.src(1)]);
            }
            Ishr => {
                self.emit(Asr, &[self.dst(0)], &[self.src(0), self.src(1)]);
            }
            Isxt => self.sign_extend(),
            Irev => {
                self.emit(Rev, &[self.dst(0)], &[self.src(0)]);
            }
            Icbs => {
                self.emit(Cbs, &[self.dst(0)], &[self.src(0)]);
            }
            Iftb => {
                self.emit(Ftb, &[self.dst(0)], &[self.src(0)]);
            }
            _ => unsupported(format!("lowering of {}", Op::Bitwise(op).name())),
        }
    }

    /// `dst = (value sign-extended from bit top) >> shift`, arithmetic.
    fn sign_extend(&mut self) {
        let Some(top) = self.src(1).as_imm() else {
            unsupported("sign extension from a variable bit");
        };
        let up = 31 - top.min(31);
        let shifted = self.tmp();
        self.emit(BitwiseOp::Lsl0, &[shifted], &[self.src(0), Ref::imm(up)]);

        match self.src(2).as_imm() {
            Some(shift) => {
                let total = (up + shift).min(31);
                self.emit(BitwiseOp::Asr, &[self.dst(0)], &[shifted, Ref::imm(total)]);
            }
            None => {
                let extended = self.tmp();
                self.emit(BitwiseOp::Asr, &[extended], &[shifted, Ref::imm(up)]);
                self.emit(BitwiseOp::Asr, &[self.dst(0)], &[extended, self.src(2)]);
            }
        }
    }
}

fn int_bits(op: AluOp) -> u32 {
    use AluOp::*;
    match op {
        Iadd8 | Imul8 | Ineg8 | Iabs8 => 8,
        Iadd16 | Imul16 | Ineg16 | Iabs16 => 16,
        _ => 32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CtrlOp, Stage};
    use crate::passes::test_util::{run_pass, select, text};

    fn lower(src: &str) -> String {
        let mut shader = select(src);
        assert!(run_pass(&mut shader, lower_pseudo_ops));
        assert!(shader
            .instrs_in_order()
            .iter()
            .all(|&id| !shader.instr(id).info().is_pseudo || shader.instr(id).op == Op::Ctrl(CtrlOp::End)));
        text(&shader)
    }

    #[test]
    fn test_moves_become_bypasses() {
        let _ = env_logger::builder().is_test(true).try_init();
        let out = lower(
            "shader fs \"mov\"\n\
             %0:32 = @load_preamble() [base=0]\n\
             %1:32 = fneg %0\n\
             @store_output(%1) [base=0, component=0]\n",
        );
        assert!(out.contains("mbyp %r0, sh0"), "{out}");
        assert!(out.contains("mbyp %r1, %r0.neg"), "{out}");
        assert!(out.contains("mbyp o0, %r1"), "{out}");
    }

    #[test]
    fn test_vertex_output_uses_uvsw_write() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = Shader::new(Stage::Vertex, "vs");
        let block = shader.push_block_after(None, None);
        let out = shader.reg_ref(RegClass::Vtxout, 0);
        let big = shader.ssa(0);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Mov), &[big], &[Ref::imm(0x1234)]);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Mov), &[out], &[big]);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Ctrl(CtrlOp::End), &[], &[]);

        assert!(run_pass(&mut shader, lower_pseudo_ops));
        let out = text(&shader);
        assert!(out.contains("byp0s %r0, 0x1234"), "{out}");
        assert!(out.contains("uvsw.write vo0, %r0"), "{out}");
    }

    #[test]
    fn test_mask_counter_writes_use_main_bypass() {
        let _ = env_logger::builder().is_test(true).try_init();
        let out = lower("shader cs \"loop\"\nloop {\n  break\n}\n");
        assert!(out.contains("mbyp emc, 0x2 {break}"), "{out}");
        assert!(!out.contains("byp0s emc"), "{out}");
    }

    #[test]
    fn test_compare_becomes_test_and_select() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = Shader::new(Stage::Compute, "cmp");
        let block = shader.push_block_after(None, None);
        let (a, b, dst) = (shader.ssa(0), shader.ssa(1), shader.ssa(2));
        let cmp = shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Cmp), &[dst], &[a, b]);
        shader
            .edit(cmp)
            .set_mod(AluOpMod::G.bit() | AluOpMod::F32.bit())
            .set_src_mod(1, SrcMod::Abs.bit());

        assert!(run_pass(&mut shader, lower_pseudo_ops));
        let instrs = shader.block(block).instrs.clone();
        assert_eq!(instrs.len(), 2);
        let (tst, movc) = (shader.instr(instrs[0]), shader.instr(instrs[1]));
        assert_eq!(tst.op, Op::Alu(AluOp::Tst));
        assert!(tst.group_next);
        assert!(tst.has_op_mod(AluOpMod::G.bit()));
        assert_eq!(tst.srcs[1].mods, SrcMod::Abs.bit());
        assert_eq!(tst.dst(0), Ref::io(Io::Ftt));
        assert_eq!(movc.op, Op::Alu(AluOp::Movc));
        assert_eq!(movc.dst(0), dst);
        assert_eq!(movc.src(1), Ref::imm(0xffff_ffff));
        assert!(!movc.group_next);
    }

    #[test]
    fn test_integer_arithmetic() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = Shader::new(Stage::Compute, "int");
        let block = shader.push_block_after(None, None);
        let (a, b) = (shader.ssa(0), shader.ssa(1));
        let (sum, prod, narrow) = (shader.ssa(2), shader.ssa(3), shader.ssa(4));
        shader.next_ssa_idx = 5;
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Iadd32), &[sum], &[a, b]);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Imul32), &[prod], &[a, b]);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Iadd8), &[narrow], &[a, b]);

        assert!(run_pass(&mut shader, lower_pseudo_ops));
        let out = text(&shader);
        assert!(out.contains("madd32 %r2, _, %r0, 0x1, %r1, _"), "{out}");
        assert!(out.contains("madd32.s %r3, _, %r0, %r1, 0x0, _"), "{out}");
        assert!(out.contains("madd32 %r5, _, %r0, 0x1, %r1, _"), "{out}");
        assert!(out.contains("or %r4, %r5, 0xff, 0xffffffff, 0x0"), "{out}");
    }

    #[test]
    fn test_sign_extension() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = Shader::new(Stage::Compute, "sxt");
        let block = shader.push_block_after(None, None);
        let (v, dst) = (shader.ssa(0), shader.ssa(1));
        shader.next_ssa_idx = 2;
        shader.insert_instr(
            Cursor::BlockEnd(block),
            Op::Bitwise(BitwiseOp::Isxt),
            &[dst],
            &[v, Ref::imm(7), Ref::imm(2)],
        );

        assert!(run_pass(&mut shader, lower_pseudo_ops));
        let out = text(&shader);
        assert!(out.contains("lsl0 %r2, %r0, 0x18"), "{out}");
        assert!(out.contains("asr %r1, %r2, 0x1a"), "{out}");
    }

    #[test]
    #[should_panic(expected = "Unsupported sign extension from a variable bit")]
    fn test_variable_sign_bit_aborts() {
        let mut shader = Shader::new(Stage::Compute, "sxt");
        let block = shader.push_block_after(None, None);
        let (v, top, dst) = (shader.ssa(0), shader.ssa(1), shader.ssa(2));
        shader.insert_instr(
            Cursor::BlockEnd(block),
            Op::Bitwise(BitwiseOp::Isxt),
            &[dst],
            &[v, top, Ref::imm(0)],
        );
        run_pass(&mut shader, lower_pseudo_ops);
    }
}
