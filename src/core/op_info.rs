// This module holds the static opcode information of the Rogue instruction set. Operations fall
// into four disjoint families (ALU, backend/fixed-function, control and bitwise), each with its
// own opcode enum and op-modifier enum; ALU destinations and sources additionally carry operand
// modifiers (element selects, abs/neg/floor). For every opcode a const `info()` table entry gives
// the operand counts, the legal ref kinds and modifiers per operand slot, the operand strides
// (register array width minus one per repeat/value unit), which operands scale with the repeat
// count or with a value-number source operand, the maximum repeat, the issue phase, and the
// pseudo/whole-pipeline/target/block-ending/side-effect flags. Modifiers declare their own
// mutual-exclusion and requirement sets. The validator and the passes consult these tables
// instead of hard-coding operand shapes.

//! Static op and modifier tables.

use std::fmt;

use super::value_ref::RefTypes;

pub const MAX_DSTS: usize = 3;
pub const MAX_SRCS: usize = 6;

/// Stride value meaning "any register array width".
pub const STRIDE_ANY: u32 = u32::MAX;

/// Name and rules of one modifier bit.
#[derive(Debug, Clone, Copy)]
pub struct ModInfo {
    pub name: &'static str,
    /// Modifiers that may not be combined with this one.
    pub exclude: u64,
    /// At least one of these must accompany this modifier.
    pub require: u64,
}

/// Common interface of the modifier enums.
pub trait OpModifier: Copy + fmt::Debug + 'static {
    fn all() -> &'static [Self];
    fn bit(self) -> u64;
    fn info(self) -> ModInfo;

    fn name(self) -> &'static str {
        self.info().name
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|m| m.name() == name)
    }

    /// Modifiers set in `bits`, in declaration order.
    fn iter_bits(bits: u64) -> impl Iterator<Item = Self> {
        Self::all().iter().copied().filter(move |m| bits & m.bit() != 0)
    }
}

macro_rules! define_mods {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $str:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            pub const fn bit(self) -> u64 {
                1u64 << (self as u32)
            }

            pub const fn str(self) -> &'static str {
                match self {
                    $($name::$variant => $str),*
                }
            }
        }

        impl OpModifier for $name {
            fn all() -> &'static [Self] {
                Self::ALL
            }

            fn bit(self) -> u64 {
                $name::bit(self)
            }

            fn info(self) -> ModInfo {
                let (exclude, require) = self.rules();
                ModInfo { name: self.str(), exclude, require }
            }
        }
    };
}

const fn bits<const N: usize>(list: [u64; N]) -> u64 {
    let mut out = 0;
    let mut i = 0;
    while i < N {
        out |= list[i];
        i += 1;
    }
    out
}

define_mods! {
    /// ALU op modifiers.
    AluOpMod {
        Lp = "lp",
        Sat = "sat",
        Scale = "scale",
        RoundZero = "roundzero",
        Z = "z",
        Gz = "gz",
        Gez = "gez",
        C = "c",
        E = "e",
        G = "g",
        Ge = "ge",
        Ne = "ne",
        L = "l",
        Le = "le",
        F32 = "f32",
        U8 = "u8",
        U16 = "u16",
        U32 = "u32",
        S8 = "s8",
        S16 = "s16",
        S32 = "s32",
        S = "s",
        PartA = "parta",
        PartB = "partb",
        Sin = "sin",
        Cos = "cos",
    }
}

impl AluOpMod {
    pub const COMPARISONS: u64 = bits([
        Self::Z.bit(),
        Self::Gz.bit(),
        Self::Gez.bit(),
        Self::C.bit(),
        Self::E.bit(),
        Self::G.bit(),
        Self::Ge.bit(),
        Self::Ne.bit(),
        Self::L.bit(),
        Self::Le.bit(),
    ]);

    pub const TYPES: u64 = bits([
        Self::F32.bit(),
        Self::U8.bit(),
        Self::U16.bit(),
        Self::U32.bit(),
        Self::S8.bit(),
        Self::S16.bit(),
        Self::S32.bit(),
    ]);

    const PARTS: u64 = bits([Self::PartA.bit(), Self::PartB.bit()]);
    const TRIG: u64 = bits([Self::Sin.bit(), Self::Cos.bit()]);

    const fn rules(self) -> (u64, u64) {
        let b = self.bit();
        if Self::COMPARISONS & b != 0 {
            (Self::COMPARISONS & !b, 0)
        } else if Self::TYPES & b != 0 {
            (Self::TYPES & !b, 0)
        } else if Self::PARTS & b != 0 {
            (Self::PARTS & !b, Self::TRIG)
        } else if Self::TRIG & b != 0 {
            (Self::TRIG & !b, 0)
        } else {
            (0, 0)
        }
    }
}

define_mods! {
    /// Backend op modifiers.
    BackendOpMod {
        Proj = "proj",
        Fcnorm = "fcnorm",
        NnCoords = "nncoords",
        Bias = "bias",
        Replace = "replace",
        Gradient = "gradient",
        PpLod = "pplod",
        Tao = "tao",
        Soo = "soo",
        Sno = "sno",
        Wrt = "wrt",
        Data = "data",
        Integer = "integer",
        Array = "array",
        F16 = "f16",
        Never = "never",
        Less = "less",
        Equal = "equal",
        LessEqual = "lessequal",
        Greater = "greater",
        NotEqual = "notequal",
        GreaterEqual = "greaterequal",
        Always = "always",
        Ifb = "ifb",
        Vm = "vm",
        Icm = "icm",
        Iadd = "iadd",
        Imin = "imin",
        Umin = "umin",
        Imax = "imax",
        Umax = "umax",
        And = "and",
        Or = "or",
        Xor = "xor",
        Xchg = "xchg",
    }
}

impl BackendOpMod {
    pub const ATST_FUNCS: u64 = bits([
        Self::Never.bit(),
        Self::Less.bit(),
        Self::Equal.bit(),
        Self::LessEqual.bit(),
        Self::Greater.bit(),
        Self::NotEqual.bit(),
        Self::GreaterEqual.bit(),
        Self::Always.bit(),
    ]);

    pub const ATOMIC_OPS: u64 = bits([
        Self::Iadd.bit(),
        Self::Imin.bit(),
        Self::Umin.bit(),
        Self::Imax.bit(),
        Self::Umax.bit(),
        Self::And.bit(),
        Self::Or.bit(),
        Self::Xor.bit(),
        Self::Xchg.bit(),
    ]);

    const LOD_MODES: u64 = bits([Self::Bias.bit(), Self::Replace.bit(), Self::Gradient.bit()]);

    const fn rules(self) -> (u64, u64) {
        let b = self.bit();
        match self {
            Self::Bias | Self::Replace => (Self::LOD_MODES & !b, Self::PpLod.bit()),
            Self::Gradient => (bits([Self::Bias.bit(), Self::Replace.bit(), Self::PpLod.bit()]), 0),
            Self::PpLod => (Self::Gradient.bit(), 0),
            Self::Vm => (Self::Icm.bit(), 0),
            Self::Icm => (Self::Vm.bit(), 0),
            _ if Self::ATST_FUNCS & b != 0 => (Self::ATST_FUNCS & !b, 0),
            _ if Self::ATOMIC_OPS & b != 0 => (Self::ATOMIC_OPS & !b, 0),
            _ => (0, 0),
        }
    }
}

define_mods! {
    /// Control op modifiers.
    CtrlOpMod {
        AllInst = "allinst",
        AnyInst = "anyinst",
        Always = "always",
        Never = "never",
        P0True = "p0_true",
        P0False = "p0_false",
        Lock = "lock",
        Release = "release",
    }
}

impl CtrlOpMod {
    pub const CONDITIONS: u64 = bits([
        Self::Always.bit(),
        Self::Never.bit(),
        Self::P0True.bit(),
        Self::P0False.bit(),
    ]);

    const fn rules(self) -> (u64, u64) {
        let b = self.bit();
        match self {
            Self::AllInst => (Self::AnyInst.bit(), 0),
            Self::AnyInst => (Self::AllInst.bit(), 0),
            Self::Lock => (Self::Release.bit(), 0),
            Self::Release => (Self::Lock.bit(), 0),
            _ => (Self::CONDITIONS & !b, 0),
        }
    }
}

define_mods! {
    /// Bitwise op modifiers.
    BitwiseOpMod {
        Mtb = "mtb",
    }
}

impl BitwiseOpMod {
    const fn rules(self) -> (u64, u64) {
        (0, 0)
    }
}

define_mods! {
    /// ALU destination modifiers.
    DstMod {
        E0 = "e0",
        E1 = "e1",
        E2 = "e2",
        E3 = "e3",
    }
}

impl DstMod {
    pub const ELEMENTS: u64 = bits([Self::E0.bit(), Self::E1.bit(), Self::E2.bit(), Self::E3.bit()]);

    const fn rules(self) -> (u64, u64) {
        (0, 0)
    }

    /// Element selects covering the low `bits` bits of a word.
    pub const fn elements_for_bits(bits: u32) -> u64 {
        match bits {
            8 => Self::E0.bit(),
            16 => Self::E0.bit() | Self::E1.bit(),
            _ => Self::ELEMENTS,
        }
    }
}

define_mods! {
    /// ALU source modifiers.
    SrcMod {
        Flr = "flr",
        Abs = "abs",
        Neg = "neg",
        E0 = "e0",
        E1 = "e1",
        E2 = "e2",
        E3 = "e3",
    }
}

impl SrcMod {
    pub const ELEMENTS: u64 = bits([Self::E0.bit(), Self::E1.bit(), Self::E2.bit(), Self::E3.bit()]);

    const fn rules(self) -> (u64, u64) {
        (0, 0)
    }

    /// Element select for byte `index`.
    pub fn element(index: u32) -> SrcMod {
        match index {
            0 => SrcMod::E0,
            1 => SrcMod::E1,
            2 => SrcMod::E2,
            3 => SrcMod::E3,
            _ => super::error::invalid(format!("no element select e{index}")),
        }
    }
}

/// Checks `mods` against the supported set and each modifier's exclude/require rules.
pub fn check_mods<M: OpModifier>(mods: u64, supported: u64) -> Result<(), String> {
    if mods & !supported != 0 {
        let bad: Vec<&str> = M::iter_bits(mods & !supported).map(|m| m.name()).collect();
        return Err(format!("Unsupported modifier(s) set: {}.", bad.join(", ")));
    }
    for m in M::iter_bits(mods) {
        let info = m.info();
        if mods & info.exclude != 0 {
            return Err(format!("Modifier \"{}\" has excluded modifier(s) set.", info.name));
        }
        if info.require != 0 && mods & info.require == 0 {
            return Err(format!("Modifier \"{}\" is missing required modifier(s).", info.name));
        }
    }
    Ok(())
}

/// Renders a modifier set as `.a.b` suffixes.
pub fn mod_suffix<M: OpModifier>(mods: u64) -> String {
    M::iter_bits(mods).fold(String::new(), |mut s, m| {
        s.push('.');
        s.push_str(m.name());
        s
    })
}

/// Issue phases inside an instruction group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    P0,
    P1,
    P2Pck,
    P2Tst,
    P2Mov,
    Backend,
    Ctrl,
    P0Bitmask,
    P0Shift1,
    P1Logical,
    P2Shift2,
}

/// Execution unit kind of an instruction group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluType {
    Main,
    Bitwise,
    Control,
}

impl Phase {
    pub const fn alu_type(self) -> AluType {
        match self {
            Phase::Ctrl => AluType::Control,
            Phase::P0Bitmask | Phase::P0Shift1 | Phase::P1Logical | Phase::P2Shift2 => AluType::Bitwise,
            _ => AluType::Main,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Phase::P0 => "p0",
            Phase::P1 => "p1",
            Phase::P2Pck => "p2_pck",
            Phase::P2Tst => "p2_tst",
            Phase::P2Mov => "p2_mov",
            Phase::Backend => "backend",
            Phase::Ctrl => "ctrl",
            Phase::P0Bitmask => "p0_bm",
            Phase::P0Shift1 => "p0_shft1",
            Phase::P1Logical => "p1_lgcl",
            Phase::P2Shift2 => "p2_shft2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    // Real ops.
    Mbyp,
    Mbyp0,
    Fadd,
    Fmul,
    Fmad,
    Frcp,
    Frsq,
    Flog2,
    Fexp2,
    Fred,
    Fsinc,
    Fdsx,
    Fdsxf,
    Fdsy,
    Fdsyf,
    Fflr,
    Min,
    Max,
    Tst,
    Movc,
    Csel,
    Setpred,
    Getpred,
    Madd32,
    Madd64,
    Add64,
    PckU8888,
    PckS8888,
    PckU1616,
    PckS1616,
    PckU32,
    PckS32,
    PckF16F16,
    UpckU8888,
    UpckS8888,
    UpckU1616,
    UpckS1616,
    UpckU32,
    UpckS32,
    UpckF16F16,

    // Pseudo ops.
    Mov,
    Cmp,
    Fabs,
    Fneg,
    Iadd8,
    Iadd16,
    Iadd32,
    Iadd64,
    Imul8,
    Imul16,
    Imul32,
    ImulHigh,
    ImulLow,
    UmulHigh,
    UmulLow,
    Ineg8,
    Ineg16,
    Ineg32,
    Ineg64,
    Iabs8,
    Iabs16,
    Iabs32,
    Iabs64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    FitrPixel,
    FitrpPixel,
    Ld,
    St,
    Smp1d,
    Smp2d,
    Smp3d,
    Atst,
    Atomic,
    Savmsk,
    UvswWrite,
    UvswEmit,
    UvswEndtask,
    UvswEmitthenendtask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CtrlOp {
    Nop,
    Br,
    End,
    Cndst,
    Cndef,
    Cndlt,
    Cndend,
    Wdf,
    Mutex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitwiseOp {
    Msk,
    Byp0s,
    Lsl0,
    Shr,
    Asr,
    Or,
    Xor,
    Rev,
    Cbs,
    Ftb,

    // Pseudo ops.
    Iand,
    Ior,
    Ixor,
    Inot,
    Ishl,
    Ishr,
    Ushr,
    Isxt,
    Irev,
    Icbs,
    Iftb,
}

/// An opcode with its family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Alu(AluOp),
    Backend(BackendOp),
    Ctrl(CtrlOp),
    Bitwise(BitwiseOp),
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    pub num_dsts: usize,
    pub num_srcs: usize,
    pub supported_op_mods: u64,
    pub supported_dst_mods: [u64; MAX_DSTS],
    pub supported_src_mods: [u64; MAX_SRCS],
    pub dst_types: [RefTypes; MAX_DSTS],
    pub src_types: [RefTypes; MAX_SRCS],
    pub dst_stride: [u32; MAX_DSTS],
    pub src_stride: [u32; MAX_SRCS],
    /// Operands whose width scales with the repeat count, one bit per slot.
    pub dst_repeat_mask: u8,
    pub src_repeat_mask: u8,
    /// Source slot holding the value-number multiplier.
    pub valnum_src: Option<usize>,
    pub dst_valnum_mask: u8,
    pub src_valnum_mask: u8,
    pub max_repeat: u32,
    pub phase: Phase,
    /// Occupies every phase of its group.
    pub whole_pipeline: bool,
    pub is_pseudo: bool,
    pub has_target: bool,
    pub ends_block: bool,
    pub side_effects: bool,
}

const X: RefTypes = RefTypes::EMPTY;
const NONE: RefTypes = RefTypes::NONE;
const REG: RefTypes = RefTypes(RefTypes::REG.0 | RefTypes::REGARRAY.0);
const REG_IDX: RefTypes = RefTypes(REG.0 | RefTypes::REG_INDEXED.0);
const SRC: RefTypes = RefTypes(REG_IDX.0 | RefTypes::IMM.0);
const SRC_IO: RefTypes = RefTypes(SRC.0 | RefTypes::IO.0);
const DST_IO: RefTypes = RefTypes(REG.0 | RefTypes::IO.0);
const IO: RefTypes = RefTypes::IO;
const IMM: RefTypes = RefTypes::IMM;
const DRC: RefTypes = RefTypes::DRC;
const VAL: RefTypes = RefTypes::VAL;
const EMC: RefTypes = RefTypes::EMC;
const ARR: RefTypes = RefTypes::REGARRAY;
const ARR_IDX: RefTypes = RefTypes(RefTypes::REGARRAY.0 | RefTypes::REG_INDEXED.0);

const ABS_NEG: u64 = SrcMod::Abs.bit() | SrcMod::Neg.bit();
const FLOAT_SRC: u64 = ABS_NEG | SrcMod::Flr.bit();

const LP_SAT: u64 = AluOpMod::Lp.bit() | AluOpMod::Sat.bit();
const PCK_MODS: u64 = AluOpMod::Scale.bit() | AluOpMod::RoundZero.bit();
const TEST_MODS: u64 = AluOpMod::COMPARISONS | AluOpMod::TYPES;
const SMP_MODS: u64 = bits([
    BackendOpMod::Proj.bit(),
    BackendOpMod::Fcnorm.bit(),
    BackendOpMod::NnCoords.bit(),
    BackendOpMod::Bias.bit(),
    BackendOpMod::Replace.bit(),
    BackendOpMod::Gradient.bit(),
    BackendOpMod::PpLod.bit(),
    BackendOpMod::Tao.bit(),
    BackendOpMod::Soo.bit(),
    BackendOpMod::Sno.bit(),
    BackendOpMod::Wrt.bit(),
    BackendOpMod::Data.bit(),
    BackendOpMod::Integer.bit(),
    BackendOpMod::Array.bit(),
    BackendOpMod::F16.bit(),
]);

impl OpInfo {
    const BASE: OpInfo = OpInfo {
        name: "",
        num_dsts: 0,
        num_srcs: 0,
        supported_op_mods: 0,
        supported_dst_mods: [0; MAX_DSTS],
        supported_src_mods: [0; MAX_SRCS],
        dst_types: [X; MAX_DSTS],
        src_types: [X; MAX_SRCS],
        dst_stride: [0; MAX_DSTS],
        src_stride: [0; MAX_SRCS],
        dst_repeat_mask: 0,
        src_repeat_mask: 0,
        valnum_src: None,
        dst_valnum_mask: 0,
        src_valnum_mask: 0,
        max_repeat: 1,
        phase: Phase::P0,
        whole_pipeline: false,
        is_pseudo: false,
        has_target: false,
        ends_block: false,
        side_effects: false,
    };

    /// One register destination, `n` register/immediate sources.
    const fn alu(name: &'static str, n: usize, src_mods: u64) -> OpInfo {
        let mut src_types = [X; MAX_SRCS];
        let mut supported_src_mods = [0; MAX_SRCS];
        let mut i = 0;
        while i < n {
            src_types[i] = SRC;
            supported_src_mods[i] = src_mods;
            i += 1;
        }
        OpInfo {
            name,
            num_dsts: 1,
            num_srcs: n,
            dst_types: [REG, X, X],
            src_types,
            supported_src_mods,
            ..Self::BASE
        }
    }

    const fn bitwise(name: &'static str, n: usize, phase: Phase) -> OpInfo {
        let mut src_types = [X; MAX_SRCS];
        let mut i = 0;
        while i < n {
            src_types[i] = SRC_IO;
            i += 1;
        }
        OpInfo {
            name,
            num_dsts: 1,
            num_srcs: n,
            dst_types: [DST_IO, X, X],
            src_types,
            phase,
            ..Self::BASE
        }
    }

    const fn pseudo(self) -> OpInfo {
        OpInfo {
            is_pseudo: true,
            ..self
        }
    }

    const fn pck(name: &'static str) -> OpInfo {
        OpInfo {
            name,
            num_dsts: 1,
            num_srcs: 1,
            supported_op_mods: PCK_MODS,
            dst_types: [DST_IO, X, X],
            src_types: [REG, X, X, X, X, X],
            src_repeat_mask: 1,
            max_repeat: 4,
            phase: Phase::P2Pck,
            ..Self::BASE
        }
    }

    const fn upck(name: &'static str) -> OpInfo {
        OpInfo {
            name,
            num_dsts: 1,
            num_srcs: 1,
            supported_op_mods: PCK_MODS,
            supported_src_mods: [SrcMod::ELEMENTS, 0, 0, 0, 0, 0],
            dst_types: [REG, X, X],
            src_types: [SRC, X, X, X, X, X],
            dst_repeat_mask: 1,
            max_repeat: 4,
            ..Self::BASE
        }
    }

    const fn ctrl(name: &'static str) -> OpInfo {
        OpInfo {
            name,
            phase: Phase::Ctrl,
            side_effects: true,
            ..Self::BASE
        }
    }

    /// Conditional mask counter ops: `pe, emc = op emc|imm, val`.
    const fn cnd(name: &'static str) -> OpInfo {
        OpInfo {
            num_dsts: 2,
            num_srcs: 2,
            supported_op_mods: CtrlOpMod::CONDITIONS,
            dst_types: [IO, EMC, X],
            src_types: [RefTypes(EMC.0 | IMM.0), VAL, X, X, X, X],
            ends_block: true,
            ..Self::ctrl(name)
        }
    }

    const fn smp(name: &'static str) -> OpInfo {
        OpInfo {
            name,
            num_dsts: 1,
            num_srcs: 6,
            supported_op_mods: SMP_MODS,
            dst_types: [RefTypes(REG.0 | NONE.0), X, X],
            src_types: [DRC, ARR_IDX, REG, ARR_IDX, RefTypes(NONE.0 | REG.0), VAL, ],
            dst_stride: [STRIDE_ANY, 0, 0],
            src_stride: [0, 3, STRIDE_ANY, 3, 0, 0],
            phase: Phase::Backend,
            ..Self::BASE
        }
    }

    const fn uvsw(name: &'static str) -> OpInfo {
        OpInfo {
            name,
            phase: Phase::Backend,
            side_effects: true,
            ..Self::BASE
        }
    }

    pub const fn is_block_end(&self) -> bool {
        self.ends_block
    }
}

impl AluOp {
    pub const fn info(self) -> OpInfo {
        use AluOp::*;
        match self {
            Mbyp => OpInfo {
                dst_types: [RefTypes(DST_IO.0 | EMC.0), X, X],
                src_types: [SRC_IO, X, X, X, X, X],
                ..OpInfo::alu("mbyp", 1, FLOAT_SRC)
            },
            Mbyp0 => OpInfo {
                dst_types: [DST_IO, X, X],
                src_types: [SRC_IO, X, X, X, X, X],
                ..OpInfo::alu("mbyp0", 1, FLOAT_SRC)
            },
            Fadd => OpInfo {
                supported_op_mods: LP_SAT,
                ..OpInfo::alu("fadd", 2, FLOAT_SRC)
            },
            Fmul => OpInfo {
                supported_op_mods: LP_SAT,
                ..OpInfo::alu("fmul", 2, FLOAT_SRC)
            },
            Fmad => OpInfo {
                supported_op_mods: LP_SAT,
                ..OpInfo::alu("fmad", 3, FLOAT_SRC)
            },
            Frcp => OpInfo::alu("frcp", 1, ABS_NEG),
            Frsq => OpInfo::alu("frsq", 1, ABS_NEG),
            Flog2 => OpInfo::alu("flog2", 1, ABS_NEG),
            Fexp2 => OpInfo::alu("fexp2", 1, ABS_NEG),
            Fred => OpInfo {
                name: "fred",
                num_dsts: 3,
                num_srcs: 3,
                supported_op_mods: AluOpMod::PARTS | AluOpMod::TRIG,
                dst_types: [
                    RefTypes(REG.0 | NONE.0),
                    RefTypes(REG.0 | NONE.0),
                    RefTypes(REG.0 | NONE.0),
                ],
                src_types: [VAL, SRC, RefTypes(REG.0 | NONE.0), X, X, X],
                supported_src_mods: [0, ABS_NEG, 0, 0, 0, 0],
                whole_pipeline: true,
                ..OpInfo::BASE
            },
            Fsinc => OpInfo {
                name: "fsinc",
                num_dsts: 2,
                num_srcs: 1,
                dst_types: [REG, IO, X],
                src_types: [REG, X, X, X, X, X],
                whole_pipeline: true,
                ..OpInfo::BASE
            },
            Fdsx => OpInfo::alu("fdsx", 1, ABS_NEG),
            Fdsxf => OpInfo::alu("fdsxf", 1, ABS_NEG),
            Fdsy => OpInfo::alu("fdsy", 1, ABS_NEG),
            Fdsyf => OpInfo::alu("fdsyf", 1, ABS_NEG),
            Fflr => OpInfo::alu("fflr", 1, ABS_NEG),
            Min => OpInfo {
                supported_op_mods: AluOpMod::TYPES,
                ..OpInfo::alu("min", 2, ABS_NEG)
            },
            Max => OpInfo {
                supported_op_mods: AluOpMod::TYPES,
                ..OpInfo::alu("max", 2, ABS_NEG)
            },
            Tst => OpInfo {
                name: "tst",
                num_dsts: 2,
                num_srcs: 2,
                supported_op_mods: TEST_MODS,
                dst_types: [IO, RefTypes(NONE.0 | IO.0), X],
                src_types: [SRC_IO, SRC_IO, X, X, X, X],
                supported_src_mods: [FLOAT_SRC, FLOAT_SRC, 0, 0, 0, 0],
                phase: Phase::P2Tst,
                ..OpInfo::BASE
            },
            Movc => OpInfo {
                name: "movc",
                num_dsts: 2,
                num_srcs: 5,
                supported_dst_mods: [DstMod::ELEMENTS, 0, 0],
                dst_types: [DST_IO, RefTypes(NONE.0 | REG.0 | IO.0), X],
                src_types: [
                    RefTypes(IO.0 | REG.0 | NONE.0),
                    RefTypes(SRC_IO.0 | NONE.0),
                    RefTypes(SRC_IO.0 | NONE.0),
                    RefTypes(SRC_IO.0 | NONE.0),
                    RefTypes(SRC_IO.0 | NONE.0),
                    X,
                ],
                phase: Phase::P2Mov,
                ..OpInfo::BASE
            },
            Csel => OpInfo {
                supported_op_mods: TEST_MODS,
                ..OpInfo::alu("csel", 3, ABS_NEG)
            },
            Setpred => OpInfo {
                name: "setpred",
                num_dsts: 1,
                num_srcs: 1,
                dst_types: [IO, X, X],
                src_types: [SRC, X, X, X, X, X],
                phase: Phase::P2Mov,
                ..OpInfo::BASE
            },
            Getpred => OpInfo {
                name: "getpred",
                num_dsts: 1,
                num_srcs: 1,
                dst_types: [REG, X, X],
                src_types: [IO, X, X, X, X, X],
                phase: Phase::P2Mov,
                ..OpInfo::BASE
            },
            Madd32 => OpInfo {
                name: "madd32",
                num_dsts: 2,
                num_srcs: 4,
                supported_op_mods: AluOpMod::S.bit(),
                dst_types: [REG, RefTypes(NONE.0 | REG.0), X],
                src_types: [SRC, SRC, SRC, RefTypes(NONE.0 | SRC.0), X, X],
                supported_src_mods: [ABS_NEG, ABS_NEG, ABS_NEG, 0, 0, 0],
                ..OpInfo::BASE
            },
            Madd64 => OpInfo {
                name: "madd64",
                num_dsts: 2,
                num_srcs: 5,
                supported_op_mods: AluOpMod::S.bit(),
                dst_types: [REG, REG, X],
                src_types: [SRC, SRC, SRC, SRC, RefTypes(NONE.0 | SRC.0), X],
                supported_src_mods: [ABS_NEG, ABS_NEG, ABS_NEG, ABS_NEG, 0, 0],
                whole_pipeline: true,
                ..OpInfo::BASE
            },
            Add64 => OpInfo {
                name: "add64",
                num_dsts: 2,
                num_srcs: 5,
                dst_types: [REG, REG, X],
                src_types: [SRC, SRC, SRC, SRC, RefTypes(NONE.0 | SRC.0), X],
                supported_src_mods: [ABS_NEG, ABS_NEG, ABS_NEG, ABS_NEG, 0, 0],
                whole_pipeline: true,
                ..OpInfo::BASE
            },
            PckU8888 => OpInfo::pck("pck_u8888"),
            PckS8888 => OpInfo::pck("pck_s8888"),
            PckU1616 => OpInfo::pck("pck_u1616"),
            PckS1616 => OpInfo::pck("pck_s1616"),
            PckU32 => OpInfo::pck("pck_u32"),
            PckS32 => OpInfo::pck("pck_s32"),
            PckF16F16 => OpInfo::pck("pck_f16f16"),
            UpckU8888 => OpInfo::upck("upck_u8888"),
            UpckS8888 => OpInfo::upck("upck_s8888"),
            UpckU1616 => OpInfo::upck("upck_u1616"),
            UpckS1616 => OpInfo::upck("upck_s1616"),
            UpckU32 => OpInfo::upck("upck_u32"),
            UpckS32 => OpInfo::upck("upck_s32"),
            UpckF16F16 => OpInfo::upck("upck_f16f16"),

            Mov => OpInfo {
                dst_types: [RefTypes(REG.0 | EMC.0), X, X],
                ..OpInfo::alu("mov", 1, 0).pseudo()
            },
            Cmp => OpInfo {
                supported_op_mods: TEST_MODS,
                ..OpInfo::alu("cmp", 2, ABS_NEG).pseudo()
            },
            Fabs => OpInfo::alu("fabs", 1, 0).pseudo(),
            Fneg => OpInfo::alu("fneg", 1, 0).pseudo(),
            Iadd8 => OpInfo::alu("iadd8", 2, 0).pseudo(),
            Iadd16 => OpInfo::alu("iadd16", 2, 0).pseudo(),
            Iadd32 => OpInfo::alu("iadd32", 2, 0).pseudo(),
            Iadd64 => OpInfo {
                num_dsts: 2,
                dst_types: [REG, REG, X],
                ..OpInfo::alu("iadd64", 4, 0).pseudo()
            },
            Imul8 => OpInfo::alu("imul8", 2, 0).pseudo(),
            Imul16 => OpInfo::alu("imul16", 2, 0).pseudo(),
            Imul32 => OpInfo::alu("imul32", 2, 0).pseudo(),
            ImulHigh => OpInfo::alu("imul_high", 2, 0).pseudo(),
            ImulLow => OpInfo::alu("imul_low", 2, 0).pseudo(),
            UmulHigh => OpInfo::alu("umul_high", 2, 0).pseudo(),
            UmulLow => OpInfo::alu("umul_low", 2, 0).pseudo(),
            Ineg8 => OpInfo::alu("ineg8", 1, 0).pseudo(),
            Ineg16 => OpInfo::alu("ineg16", 1, 0).pseudo(),
            Ineg32 => OpInfo::alu("ineg32", 1, 0).pseudo(),
            Ineg64 => OpInfo {
                num_dsts: 2,
                dst_types: [REG, REG, X],
                ..OpInfo::alu("ineg64", 2, 0).pseudo()
            },
            Iabs8 => OpInfo::alu("iabs8", 1, 0).pseudo(),
            Iabs16 => OpInfo::alu("iabs16", 1, 0).pseudo(),
            Iabs32 => OpInfo::alu("iabs32", 1, 0).pseudo(),
            Iabs64 => OpInfo {
                num_dsts: 2,
                dst_types: [REG, REG, X],
                ..OpInfo::alu("iabs64", 2, 0).pseudo()
            },
        }
    }
}

impl BackendOp {
    pub const fn info(self) -> OpInfo {
        use BackendOp::*;
        match self {
            FitrPixel => OpInfo {
                name: "fitr.pixel",
                num_dsts: 1,
                num_srcs: 3,
                dst_types: [REG, X, X],
                src_types: [DRC, ARR, VAL, X, X, X],
                src_stride: [0, 3, 0, 0, 0, 0],
                valnum_src: Some(2),
                dst_valnum_mask: 1,
                src_valnum_mask: 1 << 1,
                phase: Phase::Backend,
                ..OpInfo::BASE
            },
            FitrpPixel => OpInfo {
                name: "fitrp.pixel",
                num_dsts: 1,
                num_srcs: 4,
                dst_types: [REG, X, X],
                src_types: [DRC, ARR, ARR, VAL, X, X],
                src_stride: [0, 3, 3, 0, 0, 0],
                valnum_src: Some(3),
                dst_valnum_mask: 1,
                src_valnum_mask: 1 << 1,
                phase: Phase::Backend,
                ..OpInfo::BASE
            },
            Ld => OpInfo {
                name: "ld",
                num_dsts: 1,
                num_srcs: 3,
                dst_types: [REG, X, X],
                src_types: [DRC, VAL, RefTypes(ARR.0 | RefTypes::REG_INDEXED.0), X, X, X],
                src_stride: [0, 0, 1, 0, 0, 0],
                valnum_src: Some(1),
                dst_valnum_mask: 1,
                phase: Phase::Backend,
                ..OpInfo::BASE
            },
            St => OpInfo {
                name: "st",
                num_dsts: 0,
                num_srcs: 5,
                src_types: [REG, DRC, VAL, VAL, ARR, X],
                src_stride: [0, 0, 0, 0, 1, 0],
                valnum_src: Some(2),
                src_valnum_mask: 1,
                phase: Phase::Backend,
                side_effects: true,
                ..OpInfo::BASE
            },
            Smp1d => OpInfo::smp("smp1d"),
            Smp2d => OpInfo::smp("smp2d"),
            Smp3d => OpInfo::smp("smp3d"),
            Atst => OpInfo {
                name: "atst",
                num_dsts: 0,
                num_srcs: 2,
                supported_op_mods: BackendOpMod::ATST_FUNCS | BackendOpMod::Ifb.bit(),
                src_types: [SRC, SRC, X, X, X, X],
                phase: Phase::Backend,
                side_effects: true,
                ..OpInfo::BASE
            },
            Atomic => OpInfo {
                name: "atomic",
                num_dsts: 1,
                num_srcs: 2,
                supported_op_mods: BackendOpMod::ATOMIC_OPS,
                dst_types: [REG, X, X],
                src_types: [DRC, ARR, X, X, X, X],
                src_stride: [0, 2, 0, 0, 0, 0],
                phase: Phase::Backend,
                side_effects: true,
                ..OpInfo::BASE
            },
            Savmsk => OpInfo {
                name: "savmsk",
                num_dsts: 2,
                num_srcs: 0,
                supported_op_mods: BackendOpMod::Vm.bit() | BackendOpMod::Icm.bit(),
                dst_types: [REG, RefTypes(NONE.0 | REG.0), X],
                phase: Phase::Backend,
                ..OpInfo::BASE
            },
            UvswWrite => OpInfo {
                num_dsts: 1,
                num_srcs: 1,
                dst_types: [REG, X, X],
                src_types: [SRC, X, X, X, X, X],
                ..OpInfo::uvsw("uvsw.write")
            },
            UvswEmit => OpInfo::uvsw("uvsw.emit"),
            UvswEndtask => OpInfo::uvsw("uvsw.endtask"),
            UvswEmitthenendtask => OpInfo::uvsw("uvsw.emitthenendtask"),
        }
    }
}

impl CtrlOp {
    pub const fn info(self) -> OpInfo {
        use CtrlOp::*;
        match self {
            Nop => OpInfo::ctrl("nop"),
            Br => OpInfo {
                supported_op_mods: CtrlOpMod::AllInst.bit() | CtrlOpMod::AnyInst.bit(),
                has_target: true,
                ends_block: true,
                ..OpInfo::ctrl("br")
            },
            End => OpInfo {
                is_pseudo: true,
                ends_block: true,
                ..OpInfo::ctrl("end")
            },
            Cndst => OpInfo::cnd("cndst"),
            Cndef => OpInfo::cnd("cndef"),
            Cndend => OpInfo::cnd("cndend"),
            Cndlt => OpInfo {
                num_dsts: 3,
                dst_types: [IO, EMC, IO],
                src_types: [EMC, VAL, X, X, X, X],
                ..OpInfo::cnd("cndlt")
            },
            Wdf => OpInfo {
                num_srcs: 1,
                src_types: [DRC, X, X, X, X, X],
                ..OpInfo::ctrl("wdf")
            },
            Mutex => OpInfo {
                num_srcs: 1,
                supported_op_mods: CtrlOpMod::Lock.bit() | CtrlOpMod::Release.bit(),
                src_types: [VAL, X, X, X, X, X],
                ..OpInfo::ctrl("mutex")
            },
        }
    }
}

impl BitwiseOp {
    pub const fn info(self) -> OpInfo {
        use BitwiseOp::*;
        match self {
            Msk => OpInfo {
                num_dsts: 2,
                dst_types: [IO, IO, X],
                ..OpInfo::bitwise("msk", 2, Phase::P0Bitmask)
            },
            Byp0s => OpInfo::bitwise("byp0s", 1, Phase::P0Shift1),
            Lsl0 => OpInfo::bitwise("lsl0", 2, Phase::P0Shift1),
            Shr => OpInfo::bitwise("shr", 2, Phase::P2Shift2),
            Asr => OpInfo {
                supported_op_mods: BitwiseOpMod::Mtb.bit(),
                ..OpInfo::bitwise("asr", 2, Phase::P2Shift2)
            },
            Or => OpInfo::bitwise("or", 4, Phase::P1Logical),
            Xor => OpInfo::bitwise("xor", 2, Phase::P1Logical),
            Rev => OpInfo::bitwise("rev", 1, Phase::P0Shift1),
            Cbs => OpInfo::bitwise("cbs", 1, Phase::P0Shift1),
            Ftb => OpInfo::bitwise("ftb", 1, Phase::P0Shift1),

            Iand => OpInfo::bitwise("iand", 2, Phase::P1Logical).pseudo(),
            Ior => OpInfo::bitwise("ior", 2, Phase::P1Logical).pseudo(),
            Ixor => OpInfo::bitwise("ixor", 2, Phase::P1Logical).pseudo(),
            Inot => OpInfo::bitwise("inot", 1, Phase::P1Logical).pseudo(),
            Ishl => OpInfo::bitwise("ishl", 2, Phase::P0Shift1).pseudo(),
            Ishr => OpInfo::bitwise("ishr", 2, Phase::P2Shift2).pseudo(),
            Ushr => OpInfo::bitwise("ushr", 2, Phase::P2Shift2).pseudo(),
            Isxt => OpInfo::bitwise("isxt", 3, Phase::P2Shift2).pseudo(),
            Irev => OpInfo::bitwise("irev", 1, Phase::P0Shift1).pseudo(),
            Icbs => OpInfo::bitwise("icbs", 1, Phase::P0Shift1).pseudo(),
            Iftb => OpInfo::bitwise("iftb", 1, Phase::P0Shift1).pseudo(),
        }
    }
}

impl Op {
    pub const fn info(self) -> OpInfo {
        match self {
            Op::Alu(op) => op.info(),
            Op::Backend(op) => op.info(),
            Op::Ctrl(op) => op.info(),
            Op::Bitwise(op) => op.info(),
        }
    }

    pub const fn name(self) -> &'static str {
        self.info().name
    }

    pub const fn is_ctrl(self) -> bool {
        matches!(self, Op::Ctrl(_))
    }

    /// Validates an op modifier set against this opcode.
    pub fn check_op_mods(self, mods: u64) -> Result<(), String> {
        let supported = self.info().supported_op_mods;
        match self {
            Op::Alu(_) => check_mods::<AluOpMod>(mods, supported),
            Op::Backend(_) => check_mods::<BackendOpMod>(mods, supported),
            Op::Ctrl(_) => check_mods::<CtrlOpMod>(mods, supported),
            Op::Bitwise(_) => check_mods::<BitwiseOpMod>(mods, supported),
        }
    }

    pub fn op_mod_suffix(self, mods: u64) -> String {
        match self {
            Op::Alu(_) => mod_suffix::<AluOpMod>(mods),
            Op::Backend(_) => mod_suffix::<BackendOpMod>(mods),
            Op::Ctrl(_) => mod_suffix::<CtrlOpMod>(mods),
            Op::Bitwise(_) => mod_suffix::<BitwiseOpMod>(mods),
        }
    }

    /// Looks up an op modifier by name for this opcode's family.
    pub fn op_mod_bit(self, name: &str) -> Option<u64> {
        match self {
            Op::Alu(_) => AluOpMod::from_name(name).map(|m| m.bit()),
            Op::Backend(_) => BackendOpMod::from_name(name).map(|m| m.bit()),
            Op::Ctrl(_) => CtrlOpMod::from_name(name).map(|m| m.bit()),
            Op::Bitwise(_) => BitwiseOpMod::from_name(name).map(|m| m.bit()),
        }
    }
}

impl From<AluOp> for Op {
    fn from(op: AluOp) -> Op {
        Op::Alu(op)
    }
}

impl From<BackendOp> for Op {
    fn from(op: BackendOp) -> Op {
        Op::Backend(op)
    }
}

impl From<CtrlOp> for Op {
    fn from(op: CtrlOp) -> Op {
        Op::Ctrl(op)
    }
}

impl From<BitwiseOp> for Op {
    fn from(op: BitwiseOp) -> Op {
        Op::Bitwise(op)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_mods_exclusive() {
        let ok = AluOpMod::Gz.bit() | AluOpMod::F32.bit();
        assert!(check_mods::<AluOpMod>(ok, TEST_MODS).is_ok());

        let bad = AluOpMod::Gz.bit() | AluOpMod::E.bit();
        let err = check_mods::<AluOpMod>(bad, TEST_MODS).unwrap_err();
        assert!(err.contains("excluded"), "{err}");
    }

    #[test]
    fn test_fred_part_requires_trig() {
        let supported = AluOp::Fred.info().supported_op_mods;
        assert!(check_mods::<AluOpMod>(AluOpMod::PartA.bit(), supported).is_err());
        assert!(
            check_mods::<AluOpMod>(AluOpMod::PartA.bit() | AluOpMod::Sin.bit(), supported).is_ok()
        );
    }

    #[test]
    fn test_unsupported_mod_rejected() {
        let err = Op::Alu(AluOp::Fadd)
            .check_op_mods(AluOpMod::Scale.bit())
            .unwrap_err();
        assert!(err.contains("scale"), "{err}");
    }

    #[test]
    fn test_op_flags() {
        assert!(CtrlOp::Br.info().has_target);
        assert!(CtrlOp::End.info().is_pseudo);
        assert!(CtrlOp::Cndlt.info().ends_block);
        assert!(AluOp::Madd64.info().whole_pipeline);
        assert_eq!(BitwiseOp::Msk.info().phase, Phase::P0Bitmask);
        assert_eq!(Phase::P2Shift2.alu_type(), AluType::Bitwise);
        assert_eq!(AluOp::PckU8888.info().max_repeat, 4);
    }

    #[test]
    fn test_mod_suffix() {
        let mods = CtrlOpMod::Always.bit();
        assert_eq!(Op::Ctrl(CtrlOp::Cndst).op_mod_suffix(mods), ".always");
        assert_eq!(
            Op::Alu(AluOp::Tst).op_mod_bit("gez"),
            Some(AluOpMod::Gez.bit())
        );
    }
}
