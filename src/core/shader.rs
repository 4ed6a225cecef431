// This module implements the Rogue shader object, the owner of everything produced for one
// compiled function. Instructions and blocks live in index-addressed arenas (InstrId, BlockId)
// with a separate block layout order, and registers live in the RegisterFile. The shader is the
// only place that changes instruction operands: inserting, deleting or re-pointing an operand
// goes through methods here that update the per-register and per-regarray use and write lists in
// the same call, and branch targets keep a per-block list of the branches that reference it.
// The shader also carries the monotonic SSA index counter, the hardware constant table lookup,
// the grouped flag and issue groups produced by final scheduling, and the driver build data.

//! The shader object: blocks, instructions and operand bookkeeping.

use std::fmt;

use super::builder::Cursor;
use super::error::invalid;
use super::instr::{Instr, InstrEdit, InstrGroup, InstrId, Operand};
use super::op_info::Op;
use super::register_file::{
    ssa_vec_index, RegClass, RegId, RegUse, RegarrayId, RegisterFile,
};
use super::session::BuildData;
use super::value_ref::Ref;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Shader pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    Fragment,
    Compute,
}

impl Stage {
    pub const fn name(self) -> &'static str {
        match self {
            Stage::Vertex => "vs",
            Stage::Fragment => "fs",
            Stage::Compute => "cs",
        }
    }

    pub fn from_name(name: &str) -> Option<Stage> {
        match name {
            "vs" | "vertex" => Some(Stage::Vertex),
            "fs" | "fragment" => Some(Stage::Fragment),
            "cs" | "compute" => Some(Stage::Compute),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub label: Option<String>,
    pub instrs: Vec<InstrId>,
    pub index: u32,
    /// Branches targeting this block.
    pub uses: Vec<InstrId>,
}

/// Hardware constant table, in CONST register index order after the small integers.
const CONST_TABLE: [u32; 10] = [
    0x3f80_0000, // 1.0f
    0xbf80_0000, // -1.0f
    0x3f00_0000, // 0.5f
    0x4000_0000, // 2.0f
    0xff,
    0xffff,
    0x00ff_ffff,
    0x7fff_ffff,
    0x8000_0000,
    0xffff_ffff,
];

/// CONST register index holding `value`, if the table has it.
pub fn const_reg_index(value: u32) -> Option<u32> {
    if value < 32 {
        return Some(value);
    }
    CONST_TABLE
        .iter()
        .position(|&c| c == value)
        .map(|i| 32 + i as u32)
}

#[derive(Debug, Clone)]
pub struct Shader {
    pub stage: Stage,
    pub name: String,
    pub regs: RegisterFile,
    instrs: Vec<Option<Instr>>,
    blocks: Vec<Option<Block>>,
    layout: Vec<BlockId>,
    pub next_ssa_idx: u32,
    pub is_grouped: bool,
    pub groups: Vec<InstrGroup>,
    pub build_data: BuildData,
}

impl Shader {
    pub fn new(stage: Stage, name: impl Into<String>) -> Self {
        Self {
            stage,
            name: name.into(),
            regs: RegisterFile::new(),
            instrs: Vec::new(),
            blocks: Vec::new(),
            layout: Vec::new(),
            next_ssa_idx: 0,
            is_grouped: false,
            groups: Vec::new(),
            build_data: BuildData::default(),
        }
    }

    // ---- Blocks ----

    fn alloc_block(&mut self, label: Option<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Some(Block {
            label,
            ..Block::default()
        }));
        id
    }

    /// Creates a block placed after `after` (or at the end of the layout).
    pub fn push_block_after(&mut self, after: Option<BlockId>, label: Option<String>) -> BlockId {
        let id = self.alloc_block(label);
        let pos = match after {
            Some(a) => self.layout_position(a) + 1,
            None => self.layout.len(),
        };
        self.layout.insert(pos, id);
        self.renumber_blocks();
        id
    }

    /// Creates a block placed immediately before `before`.
    pub fn push_block_before(&mut self, before: BlockId, label: Option<String>) -> BlockId {
        let id = self.alloc_block(label);
        let pos = self.layout_position(before);
        self.layout.insert(pos, id);
        self.renumber_blocks();
        id
    }

    fn layout_position(&self, block: BlockId) -> usize {
        match self.layout.iter().position(|&b| b == block) {
            Some(p) => p,
            None => invalid(format!("block {} is not in the layout", block.0)),
        }
    }

    /// Removes an empty block from the layout.
    pub fn delete_block(&mut self, id: BlockId) {
        if !self.block(id).instrs.is_empty() {
            invalid(format!("deleting non-empty block {}", id.0));
        }
        self.layout.retain(|&b| b != id);
        self.blocks[id.0 as usize] = None;
        self.renumber_blocks();
    }

    pub fn block(&self, id: BlockId) -> &Block {
        match self.blocks.get(id.0 as usize) {
            Some(Some(b)) => b,
            _ => invalid(format!("dangling block id {}", id.0)),
        }
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        match self.blocks.get_mut(id.0 as usize) {
            Some(Some(b)) => b,
            _ => invalid(format!("dangling block id {}", id.0)),
        }
    }

    /// Blocks in layout order.
    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    pub fn next_block(&self, id: BlockId) -> Option<BlockId> {
        let pos = self.layout_position(id);
        self.layout.get(pos + 1).copied()
    }

    pub fn last_block(&self) -> Option<BlockId> {
        self.layout.last().copied()
    }

    fn renumber_blocks(&mut self) {
        let layout = self.layout.clone();
        for (i, id) in layout.into_iter().enumerate() {
            self.block_mut(id).index = i as u32;
        }
    }

    /// Renumbers blocks and instructions in layout order.
    pub fn renumber(&mut self) {
        self.renumber_blocks();
        let mut index = 0;
        for id in self.instrs_in_order() {
            self.instr_mut(id).index = index;
            index += 1;
        }
    }

    // ---- Instructions ----

    pub fn instr(&self, id: InstrId) -> &Instr {
        match self.instrs.get(id.0 as usize) {
            Some(Some(i)) => i,
            _ => invalid(format!("dangling instruction id {}", id.0)),
        }
    }

    /// Mutable access for non-operand fields; operand refs go through `set_src`/`set_dst`.
    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instr {
        match self.instrs.get_mut(id.0 as usize) {
            Some(Some(i)) => i,
            _ => invalid(format!("dangling instruction id {}", id.0)),
        }
    }

    pub fn edit(&mut self, id: InstrId) -> InstrEdit<'_> {
        InstrEdit {
            instr: self.instr_mut(id),
        }
    }

    /// Every live instruction in layout order.
    pub fn instrs_in_order(&self) -> Vec<InstrId> {
        self.layout
            .iter()
            .flat_map(|&b| self.block(b).instrs.iter().copied())
            .collect()
    }

    /// ID the next inserted instruction will receive.
    pub fn next_instr_id(&self) -> InstrId {
        InstrId(self.instrs.len() as u32)
    }

    /// Live instructions created at or after `first`, in creation order.
    pub fn instrs_since(&self, first: InstrId) -> Vec<InstrId> {
        (first.0..self.instrs.len() as u32)
            .map(InstrId)
            .filter(|id| matches!(self.instrs.get(id.0 as usize), Some(Some(_))))
            .collect()
    }

    pub fn num_instrs(&self) -> usize {
        self.layout.iter().map(|&b| self.block(b).instrs.len()).sum()
    }

    /// Inserts a new instruction with the given operands at `cursor`.
    pub fn insert_instr(&mut self, cursor: Cursor, op: Op, dsts: &[Ref], srcs: &[Ref]) -> InstrId {
        let info = op.info();
        if dsts.len() != info.num_dsts || srcs.len() != info.num_srcs {
            invalid(format!(
                "{} takes {} dsts and {} srcs, got {} and {}",
                info.name,
                info.num_dsts,
                info.num_srcs,
                dsts.len(),
                srcs.len()
            ));
        }

        let (block, pos) = self.cursor_position(cursor);
        let id = InstrId(self.instrs.len() as u32);
        let mut instr = Instr::new(op, dsts.len(), srcs.len(), block);
        instr.dsts = dsts.iter().map(|&r| Operand::new(r)).collect();
        instr.srcs = srcs.iter().map(|&r| Operand::new(r)).collect();
        self.instrs.push(Some(instr));
        self.block_mut(block).instrs.insert(pos, id);

        for (i, &r) in dsts.iter().enumerate() {
            self.link(id, i, r, true);
        }
        for (i, &r) in srcs.iter().enumerate() {
            self.link(id, i, r, false);
        }
        id
    }

    fn cursor_position(&self, cursor: Cursor) -> (BlockId, usize) {
        match cursor {
            Cursor::BlockStart(b) => (b, 0),
            Cursor::BlockEnd(b) => (b, self.block(b).instrs.len()),
            Cursor::Before(i) => {
                let block = self.instr(i).block;
                (block, self.position_in_block(i))
            }
            Cursor::After(i) => {
                let block = self.instr(i).block;
                (block, self.position_in_block(i) + 1)
            }
        }
    }

    pub fn position_in_block(&self, id: InstrId) -> usize {
        let block = self.instr(id).block;
        match self.block(block).instrs.iter().position(|&i| i == id) {
            Some(p) => p,
            None => invalid(format!("instruction {} missing from its block", id.0)),
        }
    }

    /// Removes an instruction, dropping its operand and branch links.
    pub fn delete_instr(&mut self, id: InstrId) {
        let (dsts, srcs, block, target) = {
            let instr = self.instr(id);
            (instr.dsts.clone(), instr.srcs.clone(), instr.block, instr.target)
        };
        for (i, d) in dsts.iter().enumerate() {
            self.unlink(id, i, d.r, true);
        }
        for (i, s) in srcs.iter().enumerate() {
            self.unlink(id, i, s.r, false);
        }
        if let Some(t) = target {
            self.block_mut(t).uses.retain(|&u| u != id);
        }
        if let Some(link) = self.instr(id).loop_link {
            if let Some(Some(other)) = self.instrs.get_mut(link.0 as usize) {
                other.loop_link = None;
            }
        }
        self.block_mut(block).instrs.retain(|&i| i != id);
        self.instrs[id.0 as usize] = None;
    }

    /// Moves an instruction to `cursor`, keeping its links.
    pub fn move_instr(&mut self, id: InstrId, cursor: Cursor) {
        let old_block = self.instr(id).block;
        self.block_mut(old_block).instrs.retain(|&i| i != id);
        let (block, pos) = self.cursor_position(cursor);
        self.block_mut(block).instrs.insert(pos, id);
        self.instr_mut(id).block = block;
    }

    pub fn set_src(&mut self, id: InstrId, i: usize, r: Ref) {
        let old = self.instr(id).srcs[i].r;
        self.unlink(id, i, old, false);
        self.instr_mut(id).srcs[i].r = r;
        self.link(id, i, r, false);
    }

    pub fn set_dst(&mut self, id: InstrId, i: usize, r: Ref) {
        let old = self.instr(id).dsts[i].r;
        self.unlink(id, i, old, true);
        self.instr_mut(id).dsts[i].r = r;
        self.link(id, i, r, true);
    }

    pub fn set_target(&mut self, id: InstrId, target: BlockId) {
        if let Some(old) = self.instr(id).target {
            self.block_mut(old).uses.retain(|&u| u != id);
        }
        self.instr_mut(id).target = Some(target);
        self.block_mut(target).uses.push(id);
    }

    /// Links two loop instructions to each other.
    pub fn link_loop(&mut self, a: InstrId, b: InstrId) {
        self.instr_mut(a).loop_link = Some(b);
        self.instr_mut(b).loop_link = Some(a);
    }

    fn link(&mut self, id: InstrId, operand: usize, r: Ref, write: bool) {
        let entry = RegUse {
            instr: id,
            operand: operand as u8,
        };
        let push = |list: &mut Vec<RegUse>| list.push(entry);
        match r {
            Ref::Reg(reg) => {
                let reg = self.regs.reg_mut(reg);
                push(if write { &mut reg.writes } else { &mut reg.uses });
            }
            Ref::Regarray(ra) => {
                let regs = {
                    let regarray = self.regs.regarray_mut(ra);
                    push(if write { &mut regarray.writes } else { &mut regarray.uses });
                    regarray.regs.clone()
                };
                for reg in regs {
                    let reg = self.regs.reg_mut(reg);
                    push(if write { &mut reg.writes } else { &mut reg.uses });
                }
            }
            Ref::RegIndexed { reg, index } => {
                let reg = self.regs.reg_mut(reg);
                push(if write { &mut reg.writes } else { &mut reg.uses });
                let idx = self.regs.reg_cached(RegClass::Index, index);
                self.regs.reg_mut(idx).uses.push(entry);
            }
            _ => {}
        }
    }

    fn unlink(&mut self, id: InstrId, operand: usize, r: Ref, write: bool) {
        let entry = RegUse {
            instr: id,
            operand: operand as u8,
        };
        let remove = |list: &mut Vec<RegUse>| {
            if let Some(p) = list.iter().position(|&u| u == entry) {
                list.swap_remove(p);
            }
        };
        match r {
            Ref::Reg(reg) => {
                let reg = self.regs.reg_mut(reg);
                remove(if write { &mut reg.writes } else { &mut reg.uses });
            }
            Ref::Regarray(ra) => {
                let regs = {
                    let regarray = self.regs.regarray_mut(ra);
                    remove(if write { &mut regarray.writes } else { &mut regarray.uses });
                    regarray.regs.clone()
                };
                for reg in regs {
                    let reg = self.regs.reg_mut(reg);
                    remove(if write { &mut reg.writes } else { &mut reg.uses });
                }
            }
            Ref::RegIndexed { reg, index } => {
                let reg = self.regs.reg_mut(reg);
                remove(if write { &mut reg.writes } else { &mut reg.uses });
                if let Some(idx) = self.regs.find_reg(RegClass::Index, index) {
                    remove(&mut self.regs.reg_mut(idx).uses);
                }
            }
            _ => {}
        }
    }

    /// Replaces every source operand that reads `old` directly with `new`.
    pub fn replace_reg_uses(&mut self, old: RegId, new: Ref) -> usize {
        let uses = self.regs.reg(old).uses.clone();
        let mut replaced = 0;
        for u in uses {
            if self.instr(u.instr).src(u.operand as usize) == Ref::Reg(old) {
                self.set_src(u.instr, u.operand as usize, new);
                replaced += 1;
            }
        }
        replaced
    }

    // ---- Registers ----

    pub fn reg_ref(&mut self, class: RegClass, index: u32) -> Ref {
        Ref::Reg(self.regs.reg_cached(class, index))
    }

    pub fn regarray_ref(&mut self, size: u32, class: RegClass, start: u32) -> Ref {
        Ref::Regarray(self.regs.regarray_cached(size, class, start))
    }

    pub fn ssa(&mut self, index: u32) -> Ref {
        self.reg_ref(RegClass::Ssa, index)
    }

    /// `size` components of SSA vector `index`, starting at `component`.
    pub fn ssa_vec(&mut self, size: u32, index: u32, component: u32) -> Ref {
        self.regarray_ref(size, RegClass::Ssa, ssa_vec_index(index, component))
    }

    /// A fresh SSA register.
    pub fn new_ssa(&mut self) -> Ref {
        let index = self.next_ssa_idx;
        self.next_ssa_idx += 1;
        self.ssa(index)
    }

    /// A fresh SSA vector of `size` components.
    pub fn new_ssa_vec(&mut self, size: u32) -> Ref {
        let index = self.next_ssa_idx;
        self.next_ssa_idx += 1;
        self.ssa_vec(size, index, 0)
    }

    /// CONST register holding `value`, if the hardware table has one.
    pub fn const_ref(&mut self, value: u32) -> Option<Ref> {
        const_reg_index(value).map(|index| self.reg_ref(RegClass::Const, index))
    }

    /// CONST register holding `value`; aborts when the table has none.
    pub fn const_ref_or_abort(&mut self, value: u32) -> Ref {
        match self.const_ref(value) {
            Some(r) => r,
            None => super::error::unsupported(format!("constant 0x{value:08x} without a const register")),
        }
    }

    pub fn ref_class(&self, r: Ref) -> Option<RegClass> {
        match r {
            Ref::Reg(reg) | Ref::RegIndexed { reg, .. } => Some(self.regs.reg(reg).class),
            Ref::Regarray(ra) => Some(self.regs.regarray(ra).class),
            _ => None,
        }
    }

    pub fn is_ssa(&self, r: Ref) -> bool {
        self.ref_class(r) == Some(RegClass::Ssa)
    }

    /// Registers covered by a ref.
    pub fn ref_regs(&self, r: Ref) -> Vec<RegId> {
        match r {
            Ref::Reg(reg) | Ref::RegIndexed { reg, .. } => vec![reg],
            Ref::Regarray(ra) => self.regs.regarray(ra).regs.clone(),
            _ => Vec::new(),
        }
    }

    pub fn regarray_of(&self, r: Ref) -> Option<RegarrayId> {
        r.as_regarray()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::op_info::{AluOp, CtrlOp};

    fn shader_with_block() -> (Shader, BlockId) {
        let mut shader = Shader::new(Stage::Fragment, "test");
        let block = shader.push_block_after(None, None);
        (shader, block)
    }

    #[test]
    fn test_use_lists_follow_operands() {
        let (mut shader, block) = shader_with_block();
        let a = shader.ssa(0);
        let b = shader.ssa(1);
        let dst = shader.ssa(2);
        let id = shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Fadd), &[dst], &[a, b]);

        let a_id = a.as_reg().unwrap();
        assert_eq!(shader.regs.reg(a_id).uses.len(), 1);
        assert_eq!(shader.regs.reg(dst.as_reg().unwrap()).writes.len(), 1);

        let c = shader.ssa(3);
        shader.set_src(id, 0, c);
        assert!(shader.regs.reg(a_id).uses.is_empty());
        assert_eq!(shader.regs.reg(c.as_reg().unwrap()).uses.len(), 1);

        shader.delete_instr(id);
        assert!(shader.regs.reg(c.as_reg().unwrap()).uses.is_empty());
        assert_eq!(shader.num_instrs(), 0);
    }

    #[test]
    fn test_regarray_operand_links_members() {
        let (mut shader, block) = shader_with_block();
        let vec = shader.ssa_vec(2, 4, 0);
        let src = shader.ssa(0);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Mov), &[vec], &[src]);
        let ra = shader.regs.regarray(vec.as_regarray().unwrap()).clone();
        assert_eq!(ra.writes.len(), 1);
        for reg in ra.regs {
            assert_eq!(shader.regs.reg(reg).writes.len(), 1);
        }
    }

    #[test]
    fn test_block_layout_and_targets() {
        let (mut shader, first) = shader_with_block();
        let last = shader.push_block_after(Some(first), None);
        let mid = shader.push_block_before(last, Some("mid".into()));
        assert_eq!(shader.layout(), &[first, mid, last]);
        assert_eq!(shader.block(last).index, 2);

        let br = shader.insert_instr(Cursor::BlockEnd(first), Op::Ctrl(CtrlOp::Br), &[], &[]);
        shader.set_target(br, last);
        assert_eq!(shader.block(last).uses, vec![br]);
        shader.set_target(br, mid);
        assert!(shader.block(last).uses.is_empty());
    }

    #[test]
    fn test_const_table() {
        assert_eq!(const_reg_index(7), Some(7));
        assert_eq!(const_reg_index(1.0f32.to_bits()), Some(32));
        assert_eq!(const_reg_index(0xffff_ffff), Some(41));
        assert_eq!(const_reg_index(0x1234), None);
    }

    #[test]
    #[should_panic(expected = "takes 1 dsts and 2 srcs")]
    fn test_operand_count_mismatch_aborts() {
        let (mut shader, block) = shader_with_block();
        let a = shader.ssa(0);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Fadd), &[a], &[a]);
    }
}
