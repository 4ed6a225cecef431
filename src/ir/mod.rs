//! Input IR: a single-function SSA shader in structured control-flow form.
//!
//! This is the contract with the front end. A shader is a tree of control
//! flow nodes (blocks, `if`, `loop`) whose blocks hold typed SSA operations.
//! Every SSA def carries a bit size (8/16/32/64) and a component count
//! (1-4, 64-bit restricted to 1). The textual form (`.rir`) is what the
//! tests and the `roguec` driver read.
//!
//! # RIR Format
//!
//! ```text
//! ; Comments start with semicolon
//! shader fs "name"
//! decl_input location=32 components=2 interp=smooth
//! decl_reg $0 bits=32 components=1
//!
//! %0:32x2 = @load_input() [location=32]
//! %1:32 = fadd %0.x, -%0.y
//! if %2 [dont_flatten] {
//!     $0 = mov %1
//! } else {
//!     $0 = fneg %1
//! }
//! loop {
//!     break
//! }
//! %3:32x4 = tex.tg4 (coord=%4) [dim=2d, texture=0, sampler=0, component=1]
//! @store_output($0) [base=0, component=0]
//! ```

use std::fmt;

use hashbrown::HashMap;
use thiserror::Error;

use crate::core::shader::Stage;

pub mod check;
pub mod parser;

pub use check::{CheckDirective, TestRunner, TestSpec};
pub use parser::parse_ir;

/// Varying slot of the fragment position.
pub const VARYING_SLOT_POS: u32 = 0;
/// First generic varying slot.
pub const VARYING_SLOT_VAR0: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("undefined value %{0}")]
    UndefinedValue(u32),
    #[error("undeclared register ${0}")]
    UndeclaredRegister(u32),
}

/// An SSA value or a front-end register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Ssa(u32),
    Reg(u32),
}

/// Operand read of a value with optional component swizzle and float modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Src {
    pub value: Value,
    /// Explicit swizzle; empty means identity.
    pub swizzle: Vec<u8>,
    pub negate: bool,
    pub abs: bool,
}

impl Src {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            swizzle: Vec::new(),
            negate: false,
            abs: false,
        }
    }

    pub fn ssa(index: u32) -> Self {
        Self::new(Value::Ssa(index))
    }

    /// Source component read for logical component `i`.
    pub fn comp(&self, i: u32) -> u32 {
        self.swizzle.get(i as usize).map_or(i, |&c| c as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dest {
    pub value: Value,
    pub bit_size: u32,
    pub num_components: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefInfo {
    pub bit_size: u32,
    pub num_components: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Int,
    Uint,
    Float,
    Bool,
}

impl BaseType {
    pub const fn prefix(self) -> char {
        match self {
            BaseType::Int => 'i',
            BaseType::Uint => 'u',
            BaseType::Float => 'f',
            BaseType::Bool => 'b',
        }
    }

    pub fn from_prefix(c: char) -> Option<BaseType> {
        match c {
            'i' => Some(BaseType::Int),
            'u' => Some(BaseType::Uint),
            'f' => Some(BaseType::Float),
            'b' => Some(BaseType::Bool),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<BaseType> {
        match name {
            "int" => Some(BaseType::Int),
            "uint" => Some(BaseType::Uint),
            "float" => Some(BaseType::Float),
            "bool" => Some(BaseType::Bool),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            BaseType::Int => "int",
            BaseType::Uint => "uint",
            BaseType::Float => "float",
            BaseType::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rounding {
    Undef,
    Rtne,
    Rtz,
}

impl Rounding {
    pub const fn name(self) -> &'static str {
        match self {
            Rounding::Undef => "undef",
            Rounding::Rtne => "rtne",
            Rounding::Rtz => "rtz",
        }
    }
}

/// A type conversion such as `f2i32` or `f2f16_rtz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Conversion {
    pub src: BaseType,
    pub dst: BaseType,
    pub dst_bits: u32,
    pub rounding: Rounding,
    pub saturate: bool,
}

impl Conversion {
    pub fn parse(name: &str) -> Option<Conversion> {
        let mut chars = name.chars();
        let src = BaseType::from_prefix(chars.next()?)?;
        if chars.next()? != '2' {
            return None;
        }
        let dst = BaseType::from_prefix(chars.next()?)?;
        let rest: String = chars.collect();
        let mut parts = rest.split('_');
        let dst_bits: u32 = parts.next()?.parse().ok()?;
        let mut conv = Conversion {
            src,
            dst,
            dst_bits,
            rounding: Rounding::Undef,
            saturate: false,
        };
        for part in parts {
            match part {
                "rtne" => conv.rounding = Rounding::Rtne,
                "rtz" => conv.rounding = Rounding::Rtz,
                "sat" => conv.saturate = true,
                _ => return None,
            }
        }
        Some(conv)
    }
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}2{}{}", self.src.prefix(), self.dst.prefix(), self.dst_bits)?;
        if self.rounding != Rounding::Undef {
            write!(f, "_{}", self.rounding.name())?;
        }
        if self.saturate {
            f.write_str("_sat")?;
        }
        Ok(())
    }
}

macro_rules! named_ops {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $str:literal / $srcs:expr),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            pub const fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $str),*
                }
            }

            pub const fn num_srcs(self) -> usize {
                match self {
                    $($name::$variant => $srcs),*
                }
            }

            pub fn from_name(name: &str) -> Option<$name> {
                Self::ALL.iter().copied().find(|op| op.name() == name)
            }
        }
    };
}

named_ops! {
    /// ALU opcodes other than conversions.
    AluOpcode {
        Mov = "mov" / 1,
        Vec2 = "vec2" / 2,
        Vec3 = "vec3" / 3,
        Vec4 = "vec4" / 4,
        Fadd = "fadd" / 2,
        Fmul = "fmul" / 2,
        Ffma = "ffma" / 3,
        Frcp = "frcp" / 1,
        Frsq = "frsq" / 1,
        Flog2 = "flog2" / 1,
        Fexp2 = "fexp2" / 1,
        Fsin = "fsin" / 1,
        Fcos = "fcos" / 1,
        Fddx = "fddx" / 1,
        FddxFine = "fddx_fine" / 1,
        Fddy = "fddy" / 1,
        FddyFine = "fddy_fine" / 1,
        Ffloor = "ffloor" / 1,
        Fabs = "fabs" / 1,
        Fneg = "fneg" / 1,
        Fmin = "fmin" / 2,
        Fmax = "fmax" / 2,
        Feq = "feq" / 2,
        Fneu = "fneu" / 2,
        Flt = "flt" / 2,
        Fge = "fge" / 2,
        Ieq = "ieq" / 2,
        Ine = "ine" / 2,
        Ilt = "ilt" / 2,
        Ige = "ige" / 2,
        Ult = "ult" / 2,
        Uge = "uge" / 2,
        Fcsel = "fcsel" / 3,
        FcselGt = "fcsel_gt" / 3,
        FcselGe = "fcsel_ge" / 3,
        B32csel = "b32csel" / 3,
        I32cselGt = "i32csel_gt" / 3,
        I32cselGe = "i32csel_ge" / 3,
        Iadd = "iadd" / 2,
        Imul = "imul" / 2,
        ImulHigh = "imul_high" / 2,
        UmulHigh = "umul_high" / 2,
        UmulLow = "umul_low" / 2,
        Ineg = "ineg" / 1,
        Iabs = "iabs" / 1,
        Imin = "imin" / 2,
        Imax = "imax" / 2,
        Umin = "umin" / 2,
        Umax = "umax" / 2,
        Iand = "iand" / 2,
        Ior = "ior" / 2,
        Ixor = "ixor" / 2,
        Inot = "inot" / 1,
        Ishl = "ishl" / 2,
        Ishr = "ishr" / 2,
        Ushr = "ushr" / 2,
        BitfieldInsert = "bitfield_insert" / 4,
        IbitfieldExtract = "ibitfield_extract" / 3,
        UbitfieldExtract = "ubitfield_extract" / 3,
        BitfieldReverse = "bitfield_reverse" / 1,
        BitCount = "bit_count" / 1,
        UfindMsb = "ufind_msb" / 1,
        PackUnorm4x8 = "pack_unorm_4x8" / 1,
        PackSnorm4x8 = "pack_snorm_4x8" / 1,
        UnpackUnorm4x8 = "unpack_unorm_4x8" / 1,
        UnpackSnorm4x8 = "unpack_snorm_4x8" / 1,
        PackUnorm2x16 = "pack_unorm_2x16" / 1,
        PackSnorm2x16 = "pack_snorm_2x16" / 1,
        UnpackUnorm2x16 = "unpack_unorm_2x16" / 1,
        UnpackSnorm2x16 = "unpack_snorm_2x16" / 1,
        PackHalf2x16 = "pack_half_2x16" / 1,
        PackHalf2x16Split = "pack_half_2x16_split" / 2,
        UnpackHalf2x16 = "unpack_half_2x16" / 1,
        Unpack64_2x32SplitX = "unpack_64_2x32_split_x" / 1,
        Unpack64_2x32SplitY = "unpack_64_2x32_split_y" / 1,
        Pack64_2x32Split = "pack_64_2x32_split" / 2,
        Pack64_2x32 = "pack_64_2x32" / 1,
        Unpack32_2x16SplitX = "unpack_32_2x16_split_x" / 1,
        Unpack32_2x16SplitY = "unpack_32_2x16_split_y" / 1,
    }
}

/// An ALU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluKind {
    Op(AluOpcode),
    Conv(Conversion),
}

impl AluKind {
    pub fn parse(name: &str) -> Option<AluKind> {
        AluOpcode::from_name(name)
            .map(AluKind::Op)
            .or_else(|| Conversion::parse(name).map(AluKind::Conv))
    }

    pub const fn num_srcs(self) -> usize {
        match self {
            AluKind::Op(op) => op.num_srcs(),
            AluKind::Conv(_) => 1,
        }
    }
}

impl fmt::Display for AluKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AluKind::Op(op) => f.write_str(op.name()),
            AluKind::Conv(conv) => write!(f, "{conv}"),
        }
    }
}

named_ops! {
    /// Intrinsic operations.
    IntrinsicOp {
        LoadInput = "load_input" / 0,
        LoadOutput = "load_output" / 0,
        StoreOutput = "store_output" / 1,
        LoadPreamble = "load_preamble" / 0,
        LoadDescSetTableBase = "load_desc_set_table_base" / 0,
        LoadPushConstsBase = "load_push_consts_base" / 0,
        LoadNumWorkgroupsBase = "load_num_workgroups_base" / 0,
        LoadVulkanDescriptor = "load_vulkan_descriptor" / 0,
        LoadGlobal = "load_global" / 1,
        StoreGlobal = "store_global" / 2,
        GlobalAtomic = "global_atomic" / 2,
        LoadSharedReg = "load_shared_reg" / 1,
        IsHelperInvocation = "is_helper_invocation" / 0,
        LoadSampleId = "load_sample_id" / 0,
        LoadLayerId = "load_layer_id" / 0,
        LoadInstanceNum = "load_instance_num" / 0,
        LoadLocalInvocationIndex = "load_local_invocation_index" / 0,
        LoadWorkgroupId = "load_workgroup_id" / 0,
        LoadVertexId = "load_vertex_id" / 0,
        LoadInstanceId = "load_instance_id" / 0,
        Discard = "discard" / 0,
        DiscardIf = "discard_if" / 1,
        MutexLock = "mutex_lock" / 0,
        MutexRelease = "mutex_release" / 0,
        ImageLoad = "image_load" / 4,
        ImageStore = "image_store" / 5,
        ImageSize = "image_size" / 1,
        ImageSamples = "image_samples" / 1,
        ImageTexelAddress = "image_texel_address" / 2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    D1,
    D2,
    D3,
    Cube,
}

impl Dim {
    pub const fn name(self) -> &'static str {
        match self {
            Dim::D1 => "1d",
            Dim::D2 => "2d",
            Dim::D3 => "3d",
            Dim::Cube => "cube",
        }
    }

    pub fn from_name(name: &str) -> Option<Dim> {
        match name {
            "1d" => Some(Dim::D1),
            "2d" => Some(Dim::D2),
            "3d" => Some(Dim::D3),
            "cube" => Some(Dim::Cube),
            _ => None,
        }
    }

    /// Coordinate components excluding the array layer.
    pub const fn coord_components(self) -> u32 {
        match self {
            Dim::D1 => 1,
            Dim::D2 => 2,
            Dim::D3 | Dim::Cube => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicOp {
    Iadd,
    Imin,
    Umin,
    Imax,
    Umax,
    Iand,
    Ior,
    Ixor,
    Xchg,
    Cmpxchg,
    Fadd,
}

impl AtomicOp {
    pub const ALL: [AtomicOp; 11] = [
        AtomicOp::Iadd,
        AtomicOp::Imin,
        AtomicOp::Umin,
        AtomicOp::Imax,
        AtomicOp::Umax,
        AtomicOp::Iand,
        AtomicOp::Ior,
        AtomicOp::Ixor,
        AtomicOp::Xchg,
        AtomicOp::Cmpxchg,
        AtomicOp::Fadd,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            AtomicOp::Iadd => "iadd",
            AtomicOp::Imin => "imin",
            AtomicOp::Umin => "umin",
            AtomicOp::Imax => "imax",
            AtomicOp::Umax => "umax",
            AtomicOp::Iand => "iand",
            AtomicOp::Ior => "ior",
            AtomicOp::Ixor => "ixor",
            AtomicOp::Xchg => "xchg",
            AtomicOp::Cmpxchg => "cmpxchg",
            AtomicOp::Fadd => "fadd",
        }
    }

    pub fn from_name(name: &str) -> Option<AtomicOp> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }
}

/// Constant indices attached to an intrinsic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Indices {
    pub base: Option<u32>,
    pub component: Option<u32>,
    pub location: Option<u32>,
    pub desc_set: Option<u32>,
    pub binding: Option<u32>,
    pub texture: Option<u32>,
    pub id: Option<u32>,
    pub dim: Option<Dim>,
    pub array: bool,
    pub atomic: Option<AtomicOp>,
    /// Image element type; float when absent.
    pub ty: Option<BaseType>,
}

impl fmt::Display for Indices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        let numbered = [
            ("base", self.base),
            ("component", self.component),
            ("location", self.location),
            ("desc_set", self.desc_set),
            ("binding", self.binding),
            ("texture", self.texture),
            ("id", self.id),
        ];
        for (name, value) in numbered {
            if let Some(v) = value {
                parts.push(format!("{name}={v}"));
            }
        }
        if let Some(dim) = self.dim {
            parts.push(format!("dim={}", dim.name()));
        }
        if self.array {
            parts.push("array=1".to_string());
        }
        if let Some(op) = self.atomic {
            parts.push(format!("atomic={}", op.name()));
        }
        if let Some(ty) = self.ty {
            parts.push(format!("type={}", ty.name()));
        }
        if !parts.is_empty() {
            write!(f, " [{}]", parts.join(", "))?;
        }
        Ok(())
    }
}

named_ops! {
    /// Texture operations.
    TexOp {
        Tex = "tex" / 0,
        Txb = "txb" / 0,
        Txl = "txl" / 0,
        Txd = "txd" / 0,
        Txf = "txf" / 0,
        TxfMs = "txf_ms" / 0,
        Tg4 = "tg4" / 0,
        Txs = "txs" / 0,
        QueryLevels = "query_levels" / 0,
        TextureSamples = "texture_samples" / 0,
        Lod = "lod" / 0,
    }
}

named_ops! {
    /// Texture source kinds.
    TexSrcKind {
        Coord = "coord" / 0,
        Projector = "projector" / 0,
        Bias = "bias" / 0,
        Lod = "lod" / 0,
        Ddx = "ddx" / 0,
        Ddy = "ddy" / 0,
        Comparator = "comparator" / 0,
        Offset = "offset" / 0,
        MsIndex = "ms_index" / 0,
        TextureOffset = "texture_offset" / 0,
        SamplerOffset = "sampler_offset" / 0,
        Secondary = "secondary" / 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TexInstr {
    pub op: TexOp,
    pub dest: Dest,
    pub srcs: Vec<(TexSrcKind, Src)>,
    pub dim: Dim,
    pub is_array: bool,
    pub texture_index: u32,
    pub sampler_index: u32,
    /// Gathered component for tg4.
    pub component: u32,
    pub dest_type: BaseType,
    pub point_sampler: bool,
}

impl TexInstr {
    pub fn src(&self, kind: TexSrcKind) -> Option<&Src> {
        self.srcs.iter().find(|(k, _)| *k == kind).map(|(_, s)| s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrInstr {
    Alu {
        op: AluKind,
        dest: Dest,
        srcs: Vec<Src>,
    },
    Intrinsic {
        op: IntrinsicOp,
        dest: Option<Dest>,
        srcs: Vec<Src>,
        indices: Indices,
    },
    LoadConst {
        dest: Dest,
        values: Vec<u64>,
    },
    Tex(TexInstr),
    Jump(JumpKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CfNode {
    Block(Vec<IrInstr>),
    If {
        condition: Src,
        then_list: Vec<CfNode>,
        else_list: Vec<CfNode>,
        dont_flatten: bool,
    },
    Loop {
        body: Vec<CfNode>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interp {
    Smooth,
    Flat,
    NoPerspective,
}

impl Interp {
    pub const fn name(self) -> &'static str {
        match self {
            Interp::Smooth => "smooth",
            Interp::Flat => "flat",
            Interp::NoPerspective => "noperspective",
        }
    }

    pub fn from_name(name: &str) -> Option<Interp> {
        match name {
            "smooth" => Some(Interp::Smooth),
            "flat" => Some(Interp::Flat),
            "noperspective" => Some(Interp::NoPerspective),
            _ => None,
        }
    }
}

/// A declared shader input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoVar {
    pub location: u32,
    pub components: u32,
    pub bit_size: u32,
    pub interp: Interp,
}

/// A front-end (non-SSA) register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegDecl {
    pub index: u32,
    pub bit_size: u32,
    pub num_components: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrShader {
    pub stage: Stage,
    pub name: String,
    pub inputs: Vec<IoVar>,
    pub outputs: Vec<IoVar>,
    pub registers: Vec<RegDecl>,
    pub defs: HashMap<u32, DefInfo>,
    pub body: Vec<CfNode>,
    /// Fragment shaders run per sample.
    pub per_sample: bool,
}

impl IrShader {
    pub fn new(stage: Stage, name: impl Into<String>) -> Self {
        Self {
            stage,
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            registers: Vec::new(),
            defs: HashMap::new(),
            body: Vec::new(),
            per_sample: false,
        }
    }

    pub fn def(&self, index: u32) -> Option<DefInfo> {
        self.defs.get(&index).copied()
    }

    pub fn register(&self, index: u32) -> Option<RegDecl> {
        self.registers.iter().copied().find(|r| r.index == index)
    }

    /// Bit size and component count of a value.
    pub fn value_info(&self, value: Value) -> Option<DefInfo> {
        match value {
            Value::Ssa(i) => self.def(i),
            Value::Reg(i) => self.register(i).map(|r| DefInfo {
                bit_size: r.bit_size,
                num_components: r.num_components,
            }),
        }
    }

    pub fn input(&self, location: u32) -> Option<IoVar> {
        self.inputs.iter().copied().find(|v| v.location == location)
    }

    /// One past the highest SSA index in use.
    pub fn ssa_alloc(&self) -> u32 {
        self.defs.keys().map(|&k| k + 1).max().unwrap_or(0)
    }
}

// ---- Printing ----

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Ssa(i) => write!(f, "%{i}"),
            Value::Reg(i) => write!(f, "${i}"),
        }
    }
}

impl fmt::Display for Src {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            f.write_str("-")?;
        }
        if self.abs {
            f.write_str("|")?;
        }
        write!(f, "{}", self.value)?;
        if !self.swizzle.is_empty() {
            f.write_str(".")?;
            for &c in &self.swizzle {
                f.write_str(["x", "y", "z", "w"][c as usize & 3])?;
            }
        }
        if self.abs {
            f.write_str("|")?;
        }
        Ok(())
    }
}

impl fmt::Display for Dest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Ssa(_) if self.num_components > 1 => {
                write!(f, "{}:{}x{}", self.value, self.bit_size, self.num_components)
            }
            Value::Ssa(_) => write!(f, "{}:{}", self.value, self.bit_size),
            Value::Reg(_) => write!(f, "{}", self.value),
        }
    }
}

fn join<T: fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for IrInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrInstr::Alu { op, dest, srcs } => write!(f, "{dest} = {op} {}", join(srcs)),
            IrInstr::Intrinsic {
                op,
                dest,
                srcs,
                indices,
            } => {
                if let Some(dest) = dest {
                    write!(f, "{dest} = ")?;
                }
                write!(f, "@{}({}){indices}", op.name(), join(srcs))
            }
            IrInstr::LoadConst { dest, values } => {
                let values = join(values.iter().map(|v| format!("0x{v:x}")));
                if dest.num_components > 1 {
                    write!(f, "{dest} = load_const ({values})")
                } else {
                    write!(f, "{dest} = load_const {values}")
                }
            }
            IrInstr::Tex(tex) => {
                let srcs = join(tex.srcs.iter().map(|(k, s)| format!("{}={s}", k.name())));
                write!(
                    f,
                    "{} = tex.{} ({srcs}) [dim={}, texture={}, sampler={}",
                    tex.dest,
                    tex.op.name(),
                    tex.dim.name(),
                    tex.texture_index,
                    tex.sampler_index
                )?;
                if tex.is_array {
                    f.write_str(", array=1")?;
                }
                if tex.op == TexOp::Tg4 {
                    write!(f, ", component={}", tex.component)?;
                }
                if tex.dest_type != BaseType::Float {
                    write!(f, ", type={}", tex.dest_type.name())?;
                }
                if tex.point_sampler {
                    f.write_str(", point_sampler=1")?;
                }
                f.write_str("]")
            }
            IrInstr::Jump(JumpKind::Break) => f.write_str("break"),
            IrInstr::Jump(JumpKind::Continue) => f.write_str("continue"),
        }
    }
}

fn write_cf_list(f: &mut fmt::Formatter<'_>, list: &[CfNode], depth: usize) -> fmt::Result {
    let pad = "    ".repeat(depth);
    for node in list {
        match node {
            CfNode::Block(instrs) => {
                for instr in instrs {
                    writeln!(f, "{pad}{instr}")?;
                }
            }
            CfNode::If {
                condition,
                then_list,
                else_list,
                dont_flatten,
            } => {
                write!(f, "{pad}if {condition}")?;
                if *dont_flatten {
                    f.write_str(" [dont_flatten]")?;
                }
                writeln!(f, " {{")?;
                write_cf_list(f, then_list, depth + 1)?;
                if else_list.iter().any(|n| !matches!(n, CfNode::Block(b) if b.is_empty())) {
                    writeln!(f, "{pad}}} else {{")?;
                    write_cf_list(f, else_list, depth + 1)?;
                }
                writeln!(f, "{pad}}}")?;
            }
            CfNode::Loop { body } => {
                writeln!(f, "{pad}loop {{")?;
                write_cf_list(f, body, depth + 1)?;
                writeln!(f, "{pad}}}")?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for IrShader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "shader {} \"{}\"", self.stage, self.name)?;
        if self.per_sample {
            writeln!(f, "option per_sample")?;
        }
        for (kw, vars) in [("decl_input", &self.inputs), ("decl_output", &self.outputs)] {
            for v in vars.iter() {
                writeln!(
                    f,
                    "{kw} location={} components={} bits={} interp={}",
                    v.location,
                    v.components,
                    v.bit_size,
                    v.interp.name()
                )?;
            }
        }
        for r in &self.registers {
            writeln!(
                f,
                "decl_reg ${} bits={} components={}",
                r.index, r.bit_size, r.num_components
            )?;
        }
        writeln!(f)?;
        write_cf_list(f, &self.body, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_names() {
        let conv = Conversion::parse("f2f16_rtz").unwrap();
        assert_eq!(conv.src, BaseType::Float);
        assert_eq!(conv.dst_bits, 16);
        assert_eq!(conv.rounding, Rounding::Rtz);
        assert_eq!(conv.to_string(), "f2f16_rtz");

        assert!(Conversion::parse("fadd").is_none());
        assert!(Conversion::parse("u2x32").is_none());
        assert_eq!(
            AluKind::parse("b2i32"),
            Some(AluKind::Conv(Conversion {
                src: BaseType::Bool,
                dst: BaseType::Int,
                dst_bits: 32,
                rounding: Rounding::Undef,
                saturate: false,
            }))
        );
    }

    #[test]
    fn test_src_swizzle() {
        let mut src = Src::ssa(3);
        assert_eq!(src.comp(2), 2);
        src.swizzle = vec![1, 1];
        src.negate = true;
        assert_eq!(src.comp(1), 1);
        assert_eq!(src.to_string(), "-%3.yy");
    }

    #[test]
    fn test_op_tables() {
        assert_eq!(AluOpcode::from_name("fcsel_gt"), Some(AluOpcode::FcselGt));
        assert_eq!(AluOpcode::BitfieldInsert.num_srcs(), 4);
        assert_eq!(IntrinsicOp::from_name("discard_if"), Some(IntrinsicOp::DiscardIf));
        assert_eq!(TexOp::from_name("tg4"), Some(TexOp::Tg4));
    }
}
