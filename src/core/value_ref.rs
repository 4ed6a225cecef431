// This module defines the operand value references of the Rogue IR. A Ref is a small Copy tagged
// union over everything an instruction operand can name: nothing (explicitly absent), unset
// (never assigned, always a validation error), a register or register array by arena ID, an
// immediate bit pattern, a fixed hardware I/O slot (pipeline sources S0-S5, W0/W1, internal
// sources, feedthrough FT0-FT5/FTT/FTE and the P0/PE predicate slots), a data-request token
// (drc) for asynchronous memory operations, a small literal value operand, the execution mask
// counter, and a register addressed through an index register. RefTypes is the bit set over ref
// kinds used by the op info tables to describe which kinds each operand slot accepts. Ref64 is
// the double-word reference used to express 64-bit values as independent low/high 32-bit words.

//! Instruction operand references.

use std::fmt;
use std::ops::BitOr;

use super::register_file::{RegId, RegarrayId};

/// Fixed hardware I/O slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Io {
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
    W0,
    W1,
    Is0,
    Is1,
    Is2,
    Is3,
    Is4,
    Is5,
    Ft0,
    Ft1,
    Ft2,
    Ft3,
    Ft4,
    Ft5,
    Ftt,
    Fte,
    P0,
    Pe,
}

impl Io {
    pub const fn name(self) -> &'static str {
        match self {
            Io::S0 => "s0",
            Io::S1 => "s1",
            Io::S2 => "s2",
            Io::S3 => "s3",
            Io::S4 => "s4",
            Io::S5 => "s5",
            Io::W0 => "w0",
            Io::W1 => "w1",
            Io::Is0 => "is0",
            Io::Is1 => "is1",
            Io::Is2 => "is2",
            Io::Is3 => "is3",
            Io::Is4 => "is4",
            Io::Is5 => "is5",
            Io::Ft0 => "ft0",
            Io::Ft1 => "ft1",
            Io::Ft2 => "ft2",
            Io::Ft3 => "ft3",
            Io::Ft4 => "ft4",
            Io::Ft5 => "ft5",
            Io::Ftt => "ftt",
            Io::Fte => "fte",
            Io::P0 => "p0",
            Io::Pe => "pe",
        }
    }

    /// Feedthrough slot FT`n`.
    pub fn ft(n: u32) -> Io {
        match n {
            0 => Io::Ft0,
            1 => Io::Ft1,
            2 => Io::Ft2,
            3 => Io::Ft3,
            4 => Io::Ft4,
            5 => Io::Ft5,
            _ => super::error::invalid(format!("no feedthrough slot ft{n}")),
        }
    }

    /// True for slots that are pipeline feedthroughs, readable only inside the producing group.
    pub const fn is_feedthrough(self) -> bool {
        matches!(
            self,
            Io::Ft0 | Io::Ft1 | Io::Ft2 | Io::Ft3 | Io::Ft4 | Io::Ft5 | Io::Ftt | Io::Fte
        )
    }

    pub const fn is_predicate(self) -> bool {
        matches!(self, Io::P0 | Io::Pe)
    }
}

impl fmt::Display for Io {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An operand value reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Ref {
    /// Never assigned.
    #[default]
    Unset,
    /// Explicitly absent operand.
    None,
    Reg(RegId),
    Regarray(RegarrayId),
    Imm(u32),
    Io(Io),
    Drc(u32),
    Val(u32),
    Emc,
    /// Register addressed through index register `idx<index>`.
    RegIndexed { reg: RegId, index: u32 },
}

impl Ref {
    pub const fn imm(value: u32) -> Ref {
        Ref::Imm(value)
    }

    pub fn imm_f32(value: f32) -> Ref {
        Ref::Imm(value.to_bits())
    }

    pub const fn val(value: u32) -> Ref {
        Ref::Val(value)
    }

    pub const fn drc(index: u32) -> Ref {
        Ref::Drc(index)
    }

    pub const fn io(io: Io) -> Ref {
        Ref::Io(io)
    }

    pub const fn ty(&self) -> RefTypes {
        match self {
            Ref::Unset => RefTypes::EMPTY,
            Ref::None => RefTypes::NONE,
            Ref::Reg(_) => RefTypes::REG,
            Ref::Regarray(_) => RefTypes::REGARRAY,
            Ref::Imm(_) => RefTypes::IMM,
            Ref::Io(_) => RefTypes::IO,
            Ref::Drc(_) => RefTypes::DRC,
            Ref::Val(_) => RefTypes::VAL,
            Ref::Emc => RefTypes::EMC,
            Ref::RegIndexed { .. } => RefTypes::REG_INDEXED,
        }
    }

    pub const fn is_unset(&self) -> bool {
        matches!(self, Ref::Unset)
    }

    pub const fn is_none(&self) -> bool {
        matches!(self, Ref::None)
    }

    pub const fn as_reg(&self) -> Option<RegId> {
        match *self {
            Ref::Reg(r) => Some(r),
            _ => None,
        }
    }

    pub const fn as_regarray(&self) -> Option<RegarrayId> {
        match *self {
            Ref::Regarray(r) => Some(r),
            _ => None,
        }
    }

    pub const fn as_imm(&self) -> Option<u32> {
        match *self {
            Ref::Imm(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_val(&self) -> Option<u32> {
        match *self {
            Ref::Val(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_drc(&self) -> Option<u32> {
        match *self {
            Ref::Drc(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_io(&self, io: Io) -> bool {
        *self == Ref::Io(io)
    }
}

/// Bit set of reference kinds an operand slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RefTypes(pub u16);

impl RefTypes {
    pub const EMPTY: RefTypes = RefTypes(0);
    pub const NONE: RefTypes = RefTypes(1 << 0);
    pub const REG: RefTypes = RefTypes(1 << 1);
    pub const REGARRAY: RefTypes = RefTypes(1 << 2);
    pub const IMM: RefTypes = RefTypes(1 << 3);
    pub const IO: RefTypes = RefTypes(1 << 4);
    pub const DRC: RefTypes = RefTypes(1 << 5);
    pub const VAL: RefTypes = RefTypes(1 << 6);
    pub const EMC: RefTypes = RefTypes(1 << 7);
    pub const REG_INDEXED: RefTypes = RefTypes(1 << 8);

    const NAMES: [&'static str; 9] = [
        "none", "reg", "regarray", "imm", "io", "drc", "val", "emc", "reg_indexed",
    ];

    pub const fn union(self, other: RefTypes) -> RefTypes {
        RefTypes(self.0 | other.0)
    }

    pub const fn contains(self, other: RefTypes) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for RefTypes {
    type Output = RefTypes;

    fn bitor(self, rhs: RefTypes) -> RefTypes {
        self.union(rhs)
    }
}

impl fmt::Display for RefTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("unset");
        }
        let mut first = true;
        for (bit, name) in Self::NAMES.iter().enumerate() {
            if self.0 & (1 << bit) != 0 {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// A 64-bit value expressed as two 32-bit word references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ref64 {
    pub lo: Ref,
    pub hi: Ref,
}

impl Ref64 {
    pub const fn new(lo: Ref, hi: Ref) -> Self {
        Self { lo, hi }
    }

    /// Splits a 64-bit immediate into its low and high words.
    pub const fn imm(value: u64) -> Self {
        Self {
            lo: Ref::Imm(value as u32),
            hi: Ref::Imm((value >> 32) as u32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_types() {
        let types = RefTypes::REG | RefTypes::REGARRAY | RefTypes::IMM;
        assert!(types.contains(Ref::Imm(3).ty()));
        assert!(!types.contains(Ref::Io(Io::Ft0).ty()));
        assert!(!types.contains(Ref::Unset.ty()));
        assert_eq!(types.to_string(), "reg|regarray|imm");
    }

    #[test]
    fn test_ref64_imm_split() {
        let r = Ref64::imm(0x0123_4567_89AB_CDEF);
        assert_eq!(r.lo, Ref::Imm(0x89AB_CDEF));
        assert_eq!(r.hi, Ref::Imm(0x0123_4567));
    }

    #[test]
    fn test_io_names() {
        assert_eq!(Io::ft(4).to_string(), "ft4");
        assert!(Io::Ftt.is_feedthrough());
        assert!(Io::P0.is_predicate());
    }
}
