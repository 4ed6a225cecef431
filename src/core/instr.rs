// This module defines the Rogue instruction record and the issue groups built from it. An Instr
// carries its opcode (one of the four op families), ordered destination and source operands
// (each a Ref plus an operand modifier bit set), the op modifier bit set, the repeat count, the
// execution condition, the group linkage flag that chains it with the next instruction into one
// issue group, the end flag, a free-form provenance comment, an optional branch target block,
// loop back-edge links and its position (owning block and index) inside the shader. Operand
// refs must be changed through the Shader so register use-lists stay consistent; every other
// field is edited in place through the chainable InstrEdit setters. InstrGroup records the
// instructions of one issue group and its header (unit type, phases, end, condition, repeat).

//! Instructions and instruction groups.

use std::fmt;

use super::op_info::{AluType, Op, OpInfo, Phase};
use super::shader::BlockId;
use super::value_ref::Ref;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub u32);

/// A destination or source slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Operand {
    pub r: Ref,
    pub mods: u64,
}

impl Operand {
    pub const fn new(r: Ref) -> Self {
        Self { r, mods: 0 }
    }
}

/// Lane execution condition of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecCond {
    /// Lanes whose execution mask counter is zero.
    #[default]
    PeTrue,
    P0True,
    P0False,
    /// Every lane regardless of mask state.
    PeAny,
}

impl ExecCond {
    pub const fn name(self) -> &'static str {
        match self {
            ExecCond::PeTrue => "if(pe)",
            ExecCond::P0True => "if(p0)",
            ExecCond::P0False => "if(!p0)",
            ExecCond::PeAny => "if(1)",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Instr {
    pub op: Op,
    pub dsts: Vec<Operand>,
    pub srcs: Vec<Operand>,
    pub mods: u64,
    pub repeat: u32,
    pub exec_cond: ExecCond,
    /// Issued in the same group as the following instruction.
    pub group_next: bool,
    /// Last instruction of the shader.
    pub end: bool,
    pub atom: bool,
    pub comment: Option<String>,
    pub target: Option<BlockId>,
    pub loop_start: bool,
    /// Paired loop instruction (back-edge branch and loop test).
    pub loop_link: Option<InstrId>,
    pub block: BlockId,
    pub index: u32,
}

impl Instr {
    pub fn new(op: Op, num_dsts: usize, num_srcs: usize, block: BlockId) -> Self {
        Self {
            op,
            dsts: vec![Operand::default(); num_dsts],
            srcs: vec![Operand::default(); num_srcs],
            mods: 0,
            repeat: 1,
            exec_cond: ExecCond::default(),
            group_next: false,
            end: false,
            atom: false,
            comment: None,
            target: None,
            loop_start: false,
            loop_link: None,
            block,
            index: 0,
        }
    }

    pub const fn info(&self) -> OpInfo {
        self.op.info()
    }

    pub fn has_op_mod(&self, bit: u64) -> bool {
        self.mods & bit != 0
    }

    pub fn dst(&self, i: usize) -> Ref {
        self.dsts.get(i).map_or(Ref::Unset, |d| d.r)
    }

    pub fn src(&self, i: usize) -> Ref {
        self.srcs.get(i).map_or(Ref::Unset, |s| s.r)
    }

    /// Ends its block, either by opcode or by carrying the end flag.
    pub fn is_block_end(&self) -> bool {
        self.info().ends_block || self.end
    }

    /// Must be kept even when nothing reads its results.
    pub fn has_side_effects(&self) -> bool {
        use super::op_info::{BackendOp, BackendOpMod};
        if self.info().side_effects || self.end {
            return true;
        }
        matches!(
            self.op,
            Op::Backend(BackendOp::Smp1d | BackendOp::Smp2d | BackendOp::Smp3d)
        ) && self.has_op_mod(BackendOpMod::Wrt.bit())
    }

    pub fn phase(&self) -> Phase {
        self.info().phase
    }
}

/// Chainable setters for non-operand fields.
pub struct InstrEdit<'a> {
    pub(crate) instr: &'a mut Instr,
}

impl InstrEdit<'_> {
    pub fn set_mod(self, bit: u64) -> Self {
        self.instr.mods |= bit;
        self
    }

    pub fn clear_mod(self, bit: u64) -> Self {
        self.instr.mods &= !bit;
        self
    }

    pub fn set_dst_mod(self, i: usize, bit: u64) -> Self {
        self.instr.dsts[i].mods |= bit;
        self
    }

    pub fn set_src_mod(self, i: usize, bit: u64) -> Self {
        self.instr.srcs[i].mods |= bit;
        self
    }

    pub fn set_src_mods(self, i: usize, mods: u64) -> Self {
        self.instr.srcs[i].mods = mods;
        self
    }

    pub fn set_repeat(self, repeat: u32) -> Self {
        self.instr.repeat = repeat;
        self
    }

    pub fn set_exec_cond(self, cond: ExecCond) -> Self {
        self.instr.exec_cond = cond;
        self
    }

    pub fn set_group_next(self, group_next: bool) -> Self {
        self.instr.group_next = group_next;
        self
    }

    pub fn set_end(self, end: bool) -> Self {
        self.instr.end = end;
        self
    }

    pub fn set_comment(self, comment: impl Into<String>) -> Self {
        self.instr.comment = Some(comment.into());
        self
    }

    pub fn set_loop_start(self) -> Self {
        self.instr.loop_start = true;
        self
    }

    pub fn instr(&self) -> &Instr {
        self.instr
    }
}

/// Header of an issue group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupHeader {
    pub alu: AluType,
    pub phases: Vec<Phase>,
    pub end: bool,
    pub exec_cond: ExecCond,
    pub repeat: u32,
}

#[derive(Debug, Clone)]
pub struct InstrGroup {
    pub header: GroupHeader,
    pub instrs: Vec<InstrId>,
    pub block: BlockId,
}

impl fmt::Display for AluType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AluType::Main => "main",
            AluType::Bitwise => "bitwise",
            AluType::Control => "control",
        })
    }
}
