// Type conversions. The table is keyed on the full conversion: source type and width,
// destination type and width, rounding mode, saturation and component counts. Every
// combination without an entry aborts with the rendered description; nothing falls back to a
// plain move. Narrowing out of float packs through the feedthrough registers and masks the
// write with MOVC element selects so the untouched bytes come from a zero bypass.

use crate::core::error::{abort, CompileError};
use crate::core::{AluOp, AluOpMod, BitwiseOp, DstMod, Io, Ref, SrcMod};
use crate::ir::{BaseType, Conversion, Dest, Rounding, Src};

use super::alu::width_mask;
use super::Isel;

use BaseType::*;

/// Full key of one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConvKey {
    src: BaseType,
    src_bits: u32,
    src_components: u32,
    dst: BaseType,
    dst_bits: u32,
    dst_components: u32,
    rounding: Rounding,
    saturate: bool,
}

impl ConvKey {
    fn describe(&self) -> String {
        format!(
            "{}{}x{} -> {}{}x{} (rnd: {}, sat: {})",
            self.src.name(),
            self.src_bits,
            self.src_components,
            self.dst.name(),
            self.dst_bits,
            self.dst_components,
            self.rounding.name(),
            if self.saturate { 'y' } else { 'n' }
        )
    }
}

/// Lowering chosen for a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConvLowering {
    /// Select between two immediates on a boolean.
    BoolSelect { zero: u32, one: u32 },
    /// Zero extension is free.
    Move,
    /// Sign extension from the source width.
    SignExtend,
    /// Truncation to the destination width.
    Mask,
    /// Integer to float through an unpack of the low element.
    Unpack(AluOp),
    /// Float to a narrower or integer type through a pack and a masked write.
    Pack { op: AluOp, round_zero: bool },
}

/// Looks a conversion up in the table.
fn lookup(key: &ConvKey) -> Option<ConvLowering> {
    if key.src_components != 1 || key.dst_components != 1 || key.saturate {
        return None;
    }
    let lowering = match (key.src, key.src_bits, key.dst, key.dst_bits, key.rounding) {
        (Bool, 32, Uint | Int, 8 | 16 | 32, Rounding::Undef) => {
            ConvLowering::BoolSelect { zero: 0, one: 1 }
        }
        (Bool, 32, Float, 32, Rounding::Undef) => ConvLowering::BoolSelect {
            zero: 0f32.to_bits(),
            one: 1f32.to_bits(),
        },

        (Uint, s, Uint, d, Rounding::Undef) if s < d && is_int_width(s) && is_int_width(d) => {
            ConvLowering::Move
        }
        (Int, s, Int, d, Rounding::Undef) if s < d && is_int_width(s) && is_int_width(d) => {
            ConvLowering::SignExtend
        }
        (Int, s, Int, d, Rounding::Undef) | (Uint, s, Uint, d, Rounding::Undef)
            if s > d && is_int_width(s) && is_int_width(d) =>
        {
            ConvLowering::Mask
        }

        (Uint, 8, Float, 32, Rounding::Undef) => ConvLowering::Unpack(AluOp::UpckU8888),
        (Uint, 16, Float, 32, Rounding::Undef) => ConvLowering::Unpack(AluOp::UpckU1616),
        (Uint, 32, Float, 32, Rounding::Undef) => ConvLowering::Unpack(AluOp::UpckU32),
        (Int, 8, Float, 32, Rounding::Undef) => ConvLowering::Unpack(AluOp::UpckS8888),
        (Int, 16, Float, 32, Rounding::Undef) => ConvLowering::Unpack(AluOp::UpckS1616),
        (Int, 32, Float, 32, Rounding::Undef) => ConvLowering::Unpack(AluOp::UpckS32),
        (Float, 16, Float, 32, Rounding::Undef) => ConvLowering::Unpack(AluOp::UpckF16F16),

        (Float, 32, Uint | Int, d, Rounding::Undef) => {
            let op = match (key.dst, d) {
                (Uint, 8) => AluOp::PckU8888,
                (Uint, 16) => AluOp::PckU1616,
                (Uint, 32) => AluOp::PckU32,
                (Int, 8) => AluOp::PckS8888,
                (Int, 16) => AluOp::PckS1616,
                (Int, 32) => AluOp::PckS32,
                _ => return None,
            };
            ConvLowering::Pack {
                op,
                round_zero: true,
            }
        }
        // Packing rounds to nearest even unless told otherwise; undefined rounding picks rtz.
        (Float, 32, Float, 16, rounding) => ConvLowering::Pack {
            op: AluOp::PckF16F16,
            round_zero: rounding != Rounding::Rtne,
        },

        _ => return None,
    };
    Some(lowering)
}

fn is_int_width(bits: u32) -> bool {
    matches!(bits, 8 | 16 | 32)
}

impl Isel<'_, '_> {
    pub(super) fn translate_conversion(&mut self, conv: Conversion, dest: &Dest, srcs: &[Src]) {
        let src = &srcs[0];
        let src_info = self.info(src.value);
        let src_components = if src.swizzle.is_empty() {
            src_info.num_components
        } else {
            src.swizzle.len() as u32
        };
        let key = ConvKey {
            src: conv.src,
            src_bits: src_info.bit_size,
            src_components,
            dst: conv.dst,
            dst_bits: conv.dst_bits,
            dst_components: dest.num_components,
            rounding: conv.rounding,
            saturate: conv.saturate,
        };
        if dest.bit_size != conv.dst_bits {
            crate::core::error::invalid(format!(
                "{conv} writes a {}-bit value",
                dest.bit_size
            ));
        }

        let Some(lowering) = lookup(&key) else {
            abort(CompileError::UnsupportedConversion {
                description: key.describe(),
            });
        };

        let dst = self.dest_ref(dest);
        let value = self.src_comp(src, 0);
        let main = match lowering {
            ConvLowering::BoolSelect { zero, one } => {
                let id = self
                    .b
                    .alu(AluOp::Csel, &[dst], &[value, Ref::imm(zero), Ref::imm(one)]);
                self.b
                    .edit(id)
                    .set_mod(AluOpMod::Z.bit() | AluOpMod::U32.bit());
                id
            }
            ConvLowering::Move => self.b.mov(dst, value),
            ConvLowering::SignExtend => self.b.bitwise(
                BitwiseOp::Isxt,
                &[dst],
                &[value, Ref::imm(key.src_bits - 1), Ref::imm(0)],
            ),
            ConvLowering::Mask => self.b.bitwise(
                BitwiseOp::Iand,
                &[dst],
                &[value, Ref::imm(width_mask(key.dst_bits))],
            ),
            ConvLowering::Unpack(op) => {
                let id = self.b.alu(op, &[dst], &[value]);
                if !matches!(op, AluOp::UpckU32 | AluOp::UpckS32) {
                    self.b.edit(id).set_src_mod(0, SrcMod::E0.bit());
                }
                if op == AluOp::UpckF16F16 {
                    self.b.edit(id).set_mod(AluOpMod::RoundZero.bit());
                }
                id
            }
            ConvLowering::Pack { op, round_zero } => {
                let byp = self.b.alu(AluOp::Mbyp0, &[Ref::io(Io::Ft0)], &[Ref::imm(0)]);
                self.b.edit(byp).set_group_next(true);
                let pck = self.b.alu(op, &[Ref::io(Io::Ft2)], &[value]);
                let edit = self.b.edit(pck).set_group_next(true);
                if round_zero {
                    edit.set_mod(AluOpMod::RoundZero.bit());
                }
                let movc = self.b.alu(
                    AluOp::Movc,
                    &[dst, Ref::None],
                    &[Ref::None, Ref::io(Io::Ft2), Ref::io(Io::Ft0), Ref::None, Ref::None],
                );
                self.b
                    .edit(movc)
                    .set_dst_mod(0, DstMod::elements_for_bits(key.dst_bits));
                pck
            }
        };
        self.b.edit(main).set_comment(key.describe());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(src: BaseType, src_bits: u32, dst: BaseType, dst_bits: u32) -> ConvKey {
        ConvKey {
            src,
            src_bits,
            src_components: 1,
            dst,
            dst_bits,
            dst_components: 1,
            rounding: Rounding::Undef,
            saturate: false,
        }
    }

    #[test]
    fn test_integer_widening_and_narrowing() {
        assert_eq!(lookup(&key(Uint, 8, Uint, 32)), Some(ConvLowering::Move));
        assert_eq!(lookup(&key(Int, 16, Int, 32)), Some(ConvLowering::SignExtend));
        assert_eq!(lookup(&key(Int, 32, Int, 8)), Some(ConvLowering::Mask));
        assert_eq!(lookup(&key(Uint, 32, Uint, 16)), Some(ConvLowering::Mask));
        // Same-width integer conversions have no entry.
        assert_eq!(lookup(&key(Uint, 32, Uint, 32)), None);
    }

    #[test]
    fn test_float_narrowing_rounding() {
        let mut k = key(Float, 32, Float, 16);
        assert_eq!(
            lookup(&k),
            Some(ConvLowering::Pack {
                op: AluOp::PckF16F16,
                round_zero: true
            })
        );
        k.rounding = Rounding::Rtne;
        assert_eq!(
            lookup(&k),
            Some(ConvLowering::Pack {
                op: AluOp::PckF16F16,
                round_zero: false
            })
        );
    }

    #[test]
    fn test_unmatched_combinations() {
        let mut k = key(Float, 32, Int, 32);
        k.saturate = true;
        assert_eq!(lookup(&k), None);
        assert_eq!(lookup(&key(Float, 64, Float, 32)), None);
        let mut k = key(Uint, 8, Float, 32);
        k.src_components = 2;
        assert_eq!(lookup(&k), None);
    }

    #[test]
    fn test_description_format() {
        let mut k = key(Float, 32, Uint, 8);
        k.saturate = true;
        assert_eq!(k.describe(), "float32x1 -> uint8x1 (rnd: undef, sat: y)");
    }
}
