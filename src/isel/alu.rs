// ALU operation selection. Float arithmetic maps onto the main ALU ops with abs/neg source
// modifiers carried over from the IR sources; integer arithmetic, comparisons and the bitwise
// family go through pseudo ops that lower_pseudo_ops expands once constants are in place.
// Values narrower than 32 bits live zero-extended in 32-bit registers, so every bitwise or
// shift result on them is computed into a scratch register and masked back to its width.
// 64-bit values are word pairs; only the operations with a paired-word lowering accept them.

use crate::core::error::{invalid, unsupported, unsupported_bits};
use crate::core::{
    AluOp, AluOpMod, BitwiseOp, BitwiseOpMod, DstMod, InstrId, Io, Op, Ref,
};
use crate::ir::{AluOpcode, Dest, Src};

use super::Isel;

/// Low `bits` bits set.
pub(super) const fn width_mask(bits: u32) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1 << bits) - 1
    }
}

/// Op modifiers of the comparison an opcode performs, and whether it is a float compare.
fn compare_mods(op: AluOpcode) -> Option<(u64, bool)> {
    use AluOpcode::*;
    let (cmp, ty, float) = match op {
        Feq => (AluOpMod::E, AluOpMod::F32, true),
        Fneu => (AluOpMod::Ne, AluOpMod::F32, true),
        Flt => (AluOpMod::L, AluOpMod::F32, true),
        Fge => (AluOpMod::Ge, AluOpMod::F32, true),
        Ieq => (AluOpMod::E, AluOpMod::S32, false),
        Ine => (AluOpMod::Ne, AluOpMod::S32, false),
        Ilt => (AluOpMod::L, AluOpMod::S32, false),
        Ige => (AluOpMod::Ge, AluOpMod::S32, false),
        Ult => (AluOpMod::L, AluOpMod::U32, false),
        Uge => (AluOpMod::Ge, AluOpMod::U32, false),
        _ => return None,
    };
    Some((cmp.bit() | ty.bit(), float))
}

/// Test modifiers of a conditional select and whether its value operands come in reverse order.
fn select_mods(op: AluOpcode) -> Option<(u64, bool)> {
    use AluOpcode::*;
    let (cmp, ty, reversed) = match op {
        Fcsel => (AluOpMod::Z, AluOpMod::F32, true),
        FcselGt => (AluOpMod::Gz, AluOpMod::F32, false),
        FcselGe => (AluOpMod::Gez, AluOpMod::F32, false),
        B32csel => (AluOpMod::Z, AluOpMod::U32, true),
        I32cselGt => (AluOpMod::Gz, AluOpMod::S32, false),
        I32cselGe => (AluOpMod::Gez, AluOpMod::S32, false),
        _ => return None,
    };
    Some((cmp.bit() | ty.bit(), reversed))
}

impl Isel<'_, '_> {
    /// Emits `op` and copies source modifiers onto it, refusing any the op cannot encode.
    pub(super) fn emit_with_mods(
        &mut self,
        op: impl Into<Op>,
        dsts: &[Ref],
        srcs: &[Ref],
        src_mods: &[u64],
    ) -> InstrId {
        let op = op.into();
        let info = op.info();
        let id = self.b.emit(op, dsts, srcs);
        for (i, &mods) in src_mods.iter().enumerate() {
            if mods == 0 {
                continue;
            }
            if mods & !info.supported_src_mods[i] != 0 {
                unsupported(format!("source modifiers on {}", info.name));
            }
            self.b.edit(id).set_src_mods(i, mods);
        }
        id
    }

    /// Scalar destination of a single-component operation.
    fn scalar_dst(&mut self, op: AluOpcode, dest: &Dest) -> Ref {
        if dest.num_components != 1 {
            unsupported(format!("{}-component {}", dest.num_components, op.name()));
        }
        self.dest_ref(dest)
    }

    /// First component of each source together with its modifiers.
    fn scalar_srcs(&mut self, srcs: &[Src]) -> (Vec<Ref>, Vec<u64>) {
        let refs = srcs.iter().map(|s| self.src_comp(s, 0)).collect();
        let mods = srcs.iter().map(Self::src_mods).collect();
        (refs, mods)
    }

    fn require_bits(&self, op: AluOpcode, bits: u32, allowed: &[u32]) {
        if !allowed.contains(&bits) {
            unsupported_bits(op.name(), bits);
        }
    }

    pub(super) fn translate_alu(&mut self, op: AluOpcode, dest: &Dest, srcs: &[Src]) {
        use AluOpcode::*;

        if let Some((mods, float)) = compare_mods(op) {
            return self.translate_compare(op, mods, float, dest, srcs);
        }
        if let Some((mods, reversed)) = select_mods(op) {
            return self.translate_select(op, mods, reversed, dest, srcs);
        }

        match op {
            Mov => {
                let wide = dest.bit_size == 64;
                for w in 0..self.words(dest.value) {
                    let dst = self.dest_comp(dest, w);
                    let src = if wide {
                        self.value_word(srcs[0].value, w)
                    } else {
                        self.src_comp(&srcs[0], w)
                    };
                    self.b.mov(dst, src);
                }
            }

            Vec2 | Vec3 | Vec4 => {
                for (u, src) in srcs.iter().enumerate() {
                    let dst = self.dest_comp(dest, u as u32);
                    let src = self.src_comp(src, 0);
                    self.b.mov(dst, src);
                }
            }

            Fadd | Fmul | Ffma | Frcp | Frsq | Flog2 | Fexp2 | Fddx | FddxFine | Fddy | FddyFine
            | Ffloor => {
                self.require_bits(op, dest.bit_size, &[32]);
                let dst = self.scalar_dst(op, dest);
                let target = match op {
                    Fadd => AluOp::Fadd,
                    Fmul => AluOp::Fmul,
                    Ffma => AluOp::Fmad,
                    Frcp => AluOp::Frcp,
                    Frsq => AluOp::Frsq,
                    Flog2 => AluOp::Flog2,
                    Fexp2 => AluOp::Fexp2,
                    Fddx => AluOp::Fdsx,
                    FddxFine => AluOp::Fdsxf,
                    Fddy => AluOp::Fdsy,
                    FddyFine => AluOp::Fdsyf,
                    _ => AluOp::Fflr,
                };
                // A lone negate goes on the first operand of commutative ops.
                let swap = matches!(op, Fadd | Fmul) && srcs[1].negate && !srcs[0].negate;
                let ordered: Vec<Src> = if swap {
                    vec![srcs[1].clone(), srcs[0].clone()]
                } else {
                    srcs.to_vec()
                };
                let (refs, mods) = self.scalar_srcs(&ordered);
                self.emit_with_mods(target, &[dst], &refs, &mods);
            }

            Fabs | Fneg => {
                self.require_bits(op, dest.bit_size, &[32]);
                let dst = self.scalar_dst(op, dest);
                let (refs, mods) = self.scalar_srcs(srcs);
                let target = if op == Fabs { AluOp::Fabs } else { AluOp::Fneg };
                self.emit_with_mods(target, &[dst], &refs, &mods);
            }

            Fsin | Fcos => self.translate_trig(op, dest, &srcs[0]),

            Fmin | Fmax | Imin | Imax | Umin | Umax => {
                let bits = dest.bit_size;
                let ty = match (op, bits) {
                    (Fmin | Fmax, 32) => AluOpMod::F32,
                    (Imin | Imax, 8) => AluOpMod::S8,
                    (Imin | Imax, 16) => AluOpMod::S16,
                    (Imin | Imax, 32) => AluOpMod::S32,
                    (Umin | Umax, 8) => AluOpMod::U8,
                    (Umin | Umax, 16) => AluOpMod::U16,
                    (Umin | Umax, 32) => AluOpMod::U32,
                    _ => unsupported_bits(op.name(), bits),
                };
                let target = if matches!(op, Fmin | Imin | Umin) {
                    AluOp::Min
                } else {
                    AluOp::Max
                };
                let dst = self.scalar_dst(op, dest);
                let (refs, mods) = self.scalar_srcs(srcs);
                let id = self.emit_with_mods(target, &[dst], &refs, &mods);
                self.b.edit(id).set_mod(ty.bit());
            }

            Iadd => match dest.bit_size {
                64 => {
                    let dst = self.dest64(dest);
                    let a = self.src64(&srcs[0]);
                    let b = self.src64(&srcs[1]);
                    self.b
                        .alu(AluOp::Iadd64, &[dst.lo, dst.hi], &[a.lo, a.hi, b.lo, b.hi]);
                }
                bits => {
                    let target = match bits {
                        8 => AluOp::Iadd8,
                        16 => AluOp::Iadd16,
                        32 => AluOp::Iadd32,
                        _ => unsupported_bits(op.name(), bits),
                    };
                    self.int_op(op, target, dest, srcs);
                }
            },

            Imul => {
                let target = match dest.bit_size {
                    8 => AluOp::Imul8,
                    16 => AluOp::Imul16,
                    32 => AluOp::Imul32,
                    bits => unsupported_bits(op.name(), bits),
                };
                self.int_op(op, target, dest, srcs);
            }

            ImulHigh | UmulHigh | UmulLow => {
                self.require_bits(op, dest.bit_size, &[32]);
                let target = match op {
                    ImulHigh => AluOp::ImulHigh,
                    UmulHigh => AluOp::UmulHigh,
                    _ => AluOp::UmulLow,
                };
                self.int_op(op, target, dest, srcs);
            }

            Ineg | Iabs => match dest.bit_size {
                64 => {
                    let dst = self.dest64(dest);
                    let a = self.src64(&srcs[0]);
                    let target = if op == Ineg { AluOp::Ineg64 } else { AluOp::Iabs64 };
                    self.b.alu(target, &[dst.lo, dst.hi], &[a.lo, a.hi]);
                }
                bits => {
                    let target = match (op, bits) {
                        (Ineg, 8) => AluOp::Ineg8,
                        (Ineg, 16) => AluOp::Ineg16,
                        (Ineg, 32) => AluOp::Ineg32,
                        (Iabs, 8) => AluOp::Iabs8,
                        (Iabs, 16) => AluOp::Iabs16,
                        (Iabs, 32) => AluOp::Iabs32,
                        _ => unsupported_bits(op.name(), bits),
                    };
                    self.int_op(op, target, dest, srcs);
                }
            },

            Iand | Ior | Ixor | Inot => {
                let target = match op {
                    Iand => BitwiseOp::Iand,
                    Ior => BitwiseOp::Ior,
                    Ixor => BitwiseOp::Ixor,
                    _ => BitwiseOp::Inot,
                };
                self.translate_logical(op, target, dest, srcs);
            }

            Ishl | Ishr | Ushr => self.translate_shift(op, dest, srcs),

            BitfieldInsert => self.translate_bitfield_insert(dest, srcs),
            IbitfieldExtract | UbitfieldExtract => {
                self.translate_bitfield_extract(dest, srcs, op == IbitfieldExtract)
            }

            BitfieldReverse | BitCount | UfindMsb => {
                self.require_bits(op, dest.bit_size, &[32]);
                let target = match op {
                    BitfieldReverse => BitwiseOp::Irev,
                    BitCount => BitwiseOp::Icbs,
                    _ => BitwiseOp::Iftb,
                };
                let dst = self.scalar_dst(op, dest);
                let (refs, mods) = self.scalar_srcs(srcs);
                self.emit_with_mods(target, &[dst], &refs, &mods);
            }

            PackUnorm4x8 | PackSnorm4x8 | PackUnorm2x16 | PackSnorm2x16 | PackHalf2x16 => {
                let (target, n, scale) = match op {
                    PackUnorm4x8 => (AluOp::PckU8888, 4, true),
                    PackSnorm4x8 => (AluOp::PckS8888, 4, true),
                    PackUnorm2x16 => (AluOp::PckU1616, 2, true),
                    PackSnorm2x16 => (AluOp::PckS1616, 2, true),
                    _ => (AluOp::PckF16F16, 2, false),
                };
                let dst = self.scalar_dst(op, dest);
                let src = self.src_ref(&srcs[0], n);
                let id = self.b.alu(target, &[dst], &[src]);
                let edit = self.b.edit(id).set_repeat(n);
                if scale {
                    edit.set_mod(AluOpMod::Scale.bit());
                }
            }

            UnpackUnorm4x8 | UnpackSnorm4x8 | UnpackUnorm2x16 | UnpackSnorm2x16 | UnpackHalf2x16 => {
                let (target, n, scale) = match op {
                    UnpackUnorm4x8 => (AluOp::UpckU8888, 4, true),
                    UnpackSnorm4x8 => (AluOp::UpckS8888, 4, true),
                    UnpackUnorm2x16 => (AluOp::UpckU1616, 2, true),
                    UnpackSnorm2x16 => (AluOp::UpckS1616, 2, true),
                    _ => (AluOp::UpckF16F16, 2, false),
                };
                if dest.num_components != n {
                    invalid(format!("{} writes {} components", op.name(), dest.num_components));
                }
                let dst = self.dest_ref(dest);
                let src = self.src_comp(&srcs[0], 0);
                let id = self.b.alu(target, &[dst], &[src]);
                let edit = self.b.edit(id).set_repeat(n);
                if scale {
                    edit.set_mod(AluOpMod::Scale.bit());
                }
            }

            PackHalf2x16Split => {
                let dst = self.scalar_dst(op, dest);
                let lo = self.src_comp(&srcs[0], 0);
                let hi = self.src_comp(&srcs[1], 0);
                let tmp = self.shader().new_ssa();
                self.pack_f16_half(tmp, lo, DstMod::E0.bit() | DstMod::E1.bit(), Ref::imm(0));
                self.pack_f16_half(dst, hi, DstMod::E2.bit() | DstMod::E3.bit(), tmp);
            }

            Unpack64_2x32SplitX | Unpack64_2x32SplitY => {
                let dst = self.scalar_dst(op, dest);
                let src = self.src64(&srcs[0]);
                let word = if op == Unpack64_2x32SplitX { src.lo } else { src.hi };
                self.b.mov(dst, word);
            }

            Pack64_2x32Split => {
                let dst = self.dest64(dest);
                let lo = self.src_comp(&srcs[0], 0);
                let hi = self.src_comp(&srcs[1], 0);
                self.b.mov(dst.lo, lo);
                self.b.mov(dst.hi, hi);
            }

            Pack64_2x32 => {
                let dst = self.dest64(dest);
                let lo = self.src_comp(&srcs[0], 0);
                let hi = self.src_comp(&srcs[0], 1);
                self.b.mov(dst.lo, lo);
                self.b.mov(dst.hi, hi);
            }

            Unpack32_2x16SplitX => {
                let dst = self.scalar_dst(op, dest);
                let src = self.src_comp(&srcs[0], 0);
                self.b.bitwise(BitwiseOp::Iand, &[dst], &[src, Ref::imm(0xffff)]);
            }

            Unpack32_2x16SplitY => {
                let dst = self.scalar_dst(op, dest);
                let src = self.src_comp(&srcs[0], 0);
                self.b.bitwise(BitwiseOp::Ushr, &[dst], &[src, Ref::imm(16)]);
            }

            _ => unsupported(format!("ALU op {}", op.name())),
        }
    }

    /// Integer pseudo op on scalar operands.
    fn int_op(&mut self, op: AluOpcode, target: AluOp, dest: &Dest, srcs: &[Src]) {
        let dst = self.scalar_dst(op, dest);
        let (refs, mods) = self.scalar_srcs(srcs);
        self.emit_with_mods(target, &[dst], &refs, &mods);
    }

    fn translate_compare(&mut self, op: AluOpcode, mods: u64, float: bool, dest: &Dest, srcs: &[Src]) {
        let bits = self.bits(srcs[0].value);
        if bits != 32 {
            unsupported_bits(op.name(), bits);
        }
        let dst = self.scalar_dst(op, dest);
        let (refs, src_mods) = self.scalar_srcs(srcs);
        if !float && src_mods.iter().any(|&m| m != 0) {
            unsupported(format!("float source modifiers on {}", op.name()));
        }
        let id = self.emit_with_mods(AluOp::Cmp, &[dst], &refs, &src_mods);
        self.b.edit(id).set_mod(mods);
    }

    fn translate_select(&mut self, op: AluOpcode, mods: u64, reversed: bool, dest: &Dest, srcs: &[Src]) {
        self.require_bits(op, dest.bit_size, &[32]);
        let dst = self.scalar_dst(op, dest);
        let (mut refs, mut src_mods) = self.scalar_srcs(srcs);
        // The hardware picks src1 when the test passes; a zero test inverts the IR's order,
        // and the modifiers travel with their operands.
        if reversed {
            refs.swap(1, 2);
            src_mods.swap(1, 2);
        }
        let id = self.emit_with_mods(AluOp::Csel, &[dst], &refs, &src_mods);
        self.b.edit(id).set_mod(mods);
    }

    /// Range reduction followed by the sinc evaluation.
    fn translate_trig(&mut self, op: AluOpcode, dest: &Dest, src: &Src) {
        self.require_bits(op, dest.bit_size, &[32]);
        let dst = self.scalar_dst(op, dest);
        let value = self.src_comp(src, 0);
        let mods = Self::src_mods(src);
        let trig = if op == AluOpcode::Fsin {
            AluOpMod::Sin
        } else {
            AluOpMod::Cos
        };

        let rred_a = self.shader().new_ssa();
        let id = self.emit_with_mods(
            AluOp::Fred,
            &[Ref::None, rred_a, Ref::None],
            &[Ref::val(0), value, Ref::None],
            &[0, mods, 0],
        );
        self.b.edit(id).set_mod(AluOpMod::PartA.bit() | trig.bit());

        let rred_b = self.shader().new_ssa();
        let id = self.emit_with_mods(
            AluOp::Fred,
            &[rred_b, Ref::None, Ref::None],
            &[Ref::val(0), value, rred_a],
            &[0, mods, 0],
        );
        self.b.edit(id).set_mod(AluOpMod::PartB.bit() | trig.bit());

        let sinc = self.shader().new_ssa();
        self.b.alu(AluOp::Fsinc, &[sinc, Ref::io(Io::P0)], &[rred_b]);

        let pred = self.shader().new_ssa();
        self.b.alu(AluOp::Getpred, &[pred], &[Ref::io(Io::P0)]);

        let product = self.shader().new_ssa();
        self.b.alu(AluOp::Fmul, &[product], &[rred_b, sinc]);

        let id = self.b.alu(AluOp::Csel, &[dst], &[pred, product, sinc]);
        self.b
            .edit(id)
            .set_mod(AluOpMod::Gz.bit() | AluOpMod::U32.bit());
    }

    fn translate_logical(&mut self, op: AluOpcode, target: BitwiseOp, dest: &Dest, srcs: &[Src]) {
        match dest.bit_size {
            64 => {
                let dst = self.dest64(dest);
                let words: Vec<_> = srcs.iter().map(|s| self.src64(s)).collect();
                let lo: Vec<Ref> = words.iter().map(|w| w.lo).collect();
                let hi: Vec<Ref> = words.iter().map(|w| w.hi).collect();
                self.b.bitwise(target, &[dst.lo], &lo);
                self.b.bitwise(target, &[dst.hi], &hi);
            }
            32 => {
                let dst = self.scalar_dst(op, dest);
                let (refs, mods) = self.scalar_srcs(srcs);
                self.emit_with_mods(target, &[dst], &refs, &mods);
            }
            bits => {
                let dst = self.scalar_dst(op, dest);
                let (refs, mods) = self.scalar_srcs(srcs);
                let tmp = self.shader().new_ssa();
                self.emit_with_mods(target, &[tmp], &refs, &mods);
                let id = self
                    .b
                    .bitwise(BitwiseOp::Iand, &[dst], &[tmp, Ref::imm(width_mask(bits))]);
                self.b.edit(id).set_comment(format!("i_mask_{bits}"));
            }
        }
    }

    fn translate_shift(&mut self, op: AluOpcode, dest: &Dest, srcs: &[Src]) {
        let bits = dest.bit_size;
        if bits == 64 {
            unsupported_bits(op.name(), bits);
        }
        let dst = self.scalar_dst(op, dest);
        let (refs, mods) = self.scalar_srcs(srcs);
        let target = match op {
            AluOpcode::Ishl => BitwiseOp::Ishl,
            AluOpcode::Ishr => BitwiseOp::Ishr,
            _ => BitwiseOp::Ushr,
        };
        if bits == 32 {
            self.emit_with_mods(target, &[dst], &refs, &mods);
            return;
        }

        let tmp = self.shader().new_ssa();
        if op == AluOpcode::Ishr {
            // Sign-extend from the narrow width before shifting.
            self.b.bitwise(
                BitwiseOp::Isxt,
                &[tmp],
                &[refs[0], Ref::imm(bits - 1), refs[1]],
            );
        } else {
            self.emit_with_mods(target, &[tmp], &refs, &mods);
        }
        let id = self
            .b
            .bitwise(BitwiseOp::Iand, &[dst], &[tmp, Ref::imm(width_mask(bits))]);
        self.b
            .edit(id)
            .set_comment(format!("{}_mask_{bits}", op.name()));
    }

    fn translate_bitfield_insert(&mut self, dest: &Dest, srcs: &[Src]) {
        self.require_bits(AluOpcode::BitfieldInsert, dest.bit_size, &[32]);
        let dst = self.scalar_dst(AluOpcode::BitfieldInsert, dest);
        let (refs, _) = self.scalar_srcs(srcs);
        let (base, insert, offset, bits) = (refs[0], refs[1], refs[2], refs[3]);

        let msk = self.b.bitwise(
            BitwiseOp::Msk,
            &[Ref::io(Io::Ft0), Ref::io(Io::Ft1)],
            &[bits, offset],
        );
        self.b.edit(msk).set_group_next(true);
        let lsl = self
            .b
            .bitwise(BitwiseOp::Lsl0, &[Ref::io(Io::Ft2)], &[insert, Ref::io(Io::S1)]);
        self.b.edit(lsl).set_group_next(true);
        let or = self.b.bitwise(
            BitwiseOp::Or,
            &[dst],
            &[Ref::io(Io::Ft1), Ref::io(Io::Ft2), Ref::io(Io::Ft1), base],
        );
        self.b.edit(or).set_comment("bitfield_insert");
    }

    fn translate_bitfield_extract(&mut self, dest: &Dest, srcs: &[Src], signed: bool) {
        let op = if signed {
            AluOpcode::IbitfieldExtract
        } else {
            AluOpcode::UbitfieldExtract
        };
        self.require_bits(op, dest.bit_size, &[32]);
        let dst = self.scalar_dst(op, dest);
        let (refs, _) = self.scalar_srcs(srcs);
        let (base, offset, bits) = (refs[0], refs[1], refs[2]);

        let msk = self.b.bitwise(
            BitwiseOp::Msk,
            &[Ref::io(Io::Ft0), Ref::io(Io::Ft1)],
            &[bits, offset],
        );
        self.b.edit(msk).set_group_next(true);
        let byp = self.b.bitwise(BitwiseOp::Byp0s, &[Ref::io(Io::Ft2)], &[base]);
        self.b.edit(byp).set_group_next(true);
        let or = self.b.bitwise(
            BitwiseOp::Or,
            &[Ref::io(Io::Ft4)],
            &[Ref::io(Io::Ft1), Ref::io(Io::Ft2), Ref::io(Io::Ft1), Ref::imm(0)],
        );
        self.b.edit(or).set_group_next(true);

        let shift = if signed {
            let id = self
                .b
                .bitwise(BitwiseOp::Asr, &[dst], &[Ref::io(Io::Ft4), offset]);
            self.b.edit(id).set_mod(BitwiseOpMod::Mtb.bit());
            id
        } else {
            self.b
                .bitwise(BitwiseOp::Shr, &[dst], &[Ref::io(Io::Ft4), offset])
        };
        self.b.edit(shift).set_comment(op.name());
    }

    /// Packs `value` to half precision into the elements `elements` of `dst`, keeping the
    /// other half from `keep`.
    fn pack_f16_half(&mut self, dst: Ref, value: Ref, elements: u64, keep: Ref) {
        let byp = self.b.alu(AluOp::Mbyp0, &[Ref::io(Io::Ft0)], &[keep]);
        self.b.edit(byp).set_group_next(true);
        let pck = self.b.alu(AluOp::PckF16F16, &[Ref::io(Io::Ft2)], &[value]);
        self.b.edit(pck).set_group_next(true);
        let movc = self.b.alu(
            AluOp::Movc,
            &[dst, Ref::None],
            &[Ref::None, Ref::io(Io::Ft2), Ref::io(Io::Ft0), Ref::None, Ref::None],
        );
        self.b.edit(movc).set_dst_mod(0, elements);
    }
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;

    use crate::core::{BuildContext, CompilerOptions, Shader};
    use crate::ir::parse_ir;

    fn select_text(src: &str) -> String {
        let ir = parse_ir(src).unwrap();
        let arena = Bump::new();
        let ctx = BuildContext::new(&arena, CompilerOptions::default());
        let shader: Shader = super::super::select(&ctx, &ir);
        shader.display(false).to_string()
    }

    #[test]
    fn test_width_mask() {
        assert_eq!(super::width_mask(8), 0xff);
        assert_eq!(super::width_mask(16), 0xffff);
        assert_eq!(super::width_mask(32), 0xffff_ffff);
    }

    #[test]
    fn test_narrow_logical_is_masked() {
        let _ = env_logger::builder().is_test(true).try_init();
        let text = select_text(
            "shader cs \"narrow\"\n\
             %0:16 = load_const 3\n\
             %1:16 = load_const 5\n\
             %2:16 = ixor %0, %1\n",
        );
        assert!(text.contains("ixor"), "{text}");
        assert!(text.contains("0xffff {i_mask_16}"), "{text}");
    }

    #[test]
    fn test_reversed_select_swaps_operands_and_mods() {
        let _ = env_logger::builder().is_test(true).try_init();
        let text = select_text(
            "shader cs \"csel\"\n\
             %0:32 = load_const 1\n\
             %1:32 = load_const 2.0\n\
             %2:32 = load_const 3.0\n\
             %3:32 = fcsel %0, -%1, %2\n",
        );
        assert!(text.contains("csel.z.f32 %r3, %r0, %r2, %r1.neg"), "{text}");
    }

    #[test]
    #[should_panic(expected = "Unsupported 64-bit imul")]
    fn test_wide_imul_aborts() {
        let _ = env_logger::builder().is_test(true).try_init();
        select_text(
            "shader cs \"imul\"\n\
             %0:64 = load_const 3\n\
             %1:64 = imul %0, %0\n",
        );
    }
}
