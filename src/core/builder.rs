// This module provides the instruction builder used by instruction selection and by the passes.
// A Builder borrows the shader mutably and keeps an insertion Cursor; every emit inserts at the
// cursor and advances it so consecutive emits come out in program order. Typed helpers exist for
// the four op families and for the most common single-instruction shapes, returning the new
// InstrId so callers can chain modifier, comment and condition setters through `edit`.

//! Instruction builder and insertion cursor.

use super::instr::{InstrEdit, InstrId};
use super::op_info::{AluOp, BackendOp, BitwiseOp, CtrlOp, Op};
use super::shader::{BlockId, Shader};
use super::value_ref::Ref;

/// Insertion point for new instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    BlockStart(BlockId),
    BlockEnd(BlockId),
    Before(InstrId),
    After(InstrId),
}

pub struct Builder<'s> {
    pub shader: &'s mut Shader,
    pub cursor: Cursor,
}

impl<'s> Builder<'s> {
    pub fn new(shader: &'s mut Shader, cursor: Cursor) -> Self {
        Self { shader, cursor }
    }

    /// Block the cursor currently points into.
    pub fn block(&self) -> BlockId {
        match self.cursor {
            Cursor::BlockStart(b) | Cursor::BlockEnd(b) => b,
            Cursor::Before(i) | Cursor::After(i) => self.shader.instr(i).block,
        }
    }

    pub fn emit(&mut self, op: impl Into<Op>, dsts: &[Ref], srcs: &[Ref]) -> InstrId {
        let id = self.shader.insert_instr(self.cursor, op.into(), dsts, srcs);
        match self.cursor {
            Cursor::BlockEnd(_) | Cursor::Before(_) => {}
            Cursor::BlockStart(_) | Cursor::After(_) => self.cursor = Cursor::After(id),
        }
        id
    }

    pub fn alu(&mut self, op: AluOp, dsts: &[Ref], srcs: &[Ref]) -> InstrId {
        self.emit(op, dsts, srcs)
    }

    pub fn backend(&mut self, op: BackendOp, dsts: &[Ref], srcs: &[Ref]) -> InstrId {
        self.emit(op, dsts, srcs)
    }

    pub fn ctrl(&mut self, op: CtrlOp, dsts: &[Ref], srcs: &[Ref]) -> InstrId {
        self.emit(op, dsts, srcs)
    }

    pub fn bitwise(&mut self, op: BitwiseOp, dsts: &[Ref], srcs: &[Ref]) -> InstrId {
        self.emit(op, dsts, srcs)
    }

    pub fn mov(&mut self, dst: Ref, src: Ref) -> InstrId {
        self.emit(AluOp::Mov, &[dst], &[src])
    }

    pub fn edit(&mut self, id: InstrId) -> InstrEdit<'_> {
        self.shader.edit(id)
    }

    /// Starts a new block after the current one and moves the cursor to its end.
    pub fn push_block(&mut self, label: Option<&str>) -> BlockId {
        let current = self.block();
        let block = self
            .shader
            .push_block_after(Some(current), label.map(str::to_string));
        self.cursor = Cursor::BlockEnd(block);
        block
    }

    /// Starts a new block placed right before `before` and moves the cursor to its end.
    pub fn push_block_before(&mut self, before: BlockId, label: Option<&str>) -> BlockId {
        let block = self
            .shader
            .push_block_before(before, label.map(str::to_string));
        self.cursor = Cursor::BlockEnd(block);
        block
    }
}
