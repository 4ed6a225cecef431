// This module implements the shader validator. It checks a Rogue shader against the static op
// tables and the structural invariants every pass must preserve: register bookkeeping (class
// lists, capacities, cache identity, usage bit sets, single SSA writes, register array
// contiguity and sub-array nesting), each block's instructions or issue groups (operand ref
// types, operand modifiers, operand sizes derived from stride, repeat and value number, op
// modifier rules, repeat limits, pseudo op placement, branch targets and per-op rules for
// unpack, ST and ATST) and block termination. Every message carries the block, instruction and
// operand being checked. In the default mode the first violation logs the messages and the
// shader and aborts; in nonfatal mode every violation is collected and returned so tooling can
// show them all.

//! Shader validation.

use thiserror::Error;

use crate::core::error::{abort, CompileError};
use crate::core::op_info::STRIDE_ANY;
use crate::core::{
    AluOp, AluType, BackendOp, BackendOpMod, BlockId, BuildContext, CtrlOp, InstrId, Op, Operand,
    Ref, RefTypes, RegBitSet, RegClass, Shader, SrcMod,
};

/// Violations found by a nonfatal validation run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} validation error(s) {when}", .messages.len())]
pub struct ValidationErrors {
    pub when: String,
    pub messages: Vec<String>,
}

impl ValidationErrors {
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.iter().any(|m| m.contains(needle))
    }
}

/// Validates `shader`, honoring the context's debug flags.
///
/// Skipped entirely with `vld_skip`. With `vld_nonfatal` every violation is collected and
/// reported before aborting; otherwise the first one aborts.
pub fn validate(ctx: &BuildContext<'_>, shader: &Shader, when: &str) {
    let debug = ctx.debug();
    if debug.vld_skip {
        return;
    }
    if let Err(errors) = validate_shader(shader, when, debug.vld_nonfatal) {
        report_and_abort(shader, &errors);
    }
}

/// Runs every check on `shader`.
///
/// When `nonfatal` is false the first violation aborts, so `Ok` is the only value returned.
pub fn validate_shader(shader: &Shader, when: &str, nonfatal: bool) -> Result<(), ValidationErrors> {
    let mut v = Validator {
        shader,
        when,
        nonfatal,
        block: None,
        instr: None,
        operand: None,
        atst_noifbs: 0,
        messages: Vec::new(),
    };

    v.validate_reg_state();
    for &block in shader.layout() {
        v.validate_block(block);
    }
    if v.atst_noifbs > 1 {
        v.log("Multiple ATST.IFBs are not permitted.");
    }

    if v.messages.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors {
            when: when.to_string(),
            messages: v.messages,
        })
    }
}

fn report_and_abort(shader: &Shader, errors: &ValidationErrors) -> ! {
    for msg in &errors.messages {
        log::error!("{msg}");
    }
    log::error!("\n{}", shader.display(true));
    abort(CompileError::Validation {
        context: errors.when.clone(),
        errors: errors.messages.join("\n"),
    })
}

struct Validator<'s> {
    shader: &'s Shader,
    when: &'s str,
    nonfatal: bool,
    block: Option<BlockId>,
    instr: Option<InstrId>,
    /// (is source, slot) of the operand being checked.
    operand: Option<(bool, usize)>,
    atst_noifbs: u32,
    messages: Vec<String>,
}

/// Legal shape of one operand slot.
struct OperandRule {
    types: RefTypes,
    mods: u64,
    stride: u32,
    repeat_masked: bool,
    valnum_masked: bool,
}

impl Validator<'_> {
    fn log(&mut self, msg: impl AsRef<str>) {
        let mut full = String::from("Validation error");
        if let Some(block) = self.block {
            let b = self.shader.block(block);
            match &b.label {
                Some(label) => full.push_str(&format!(" block \"{label}\"")),
                None => full.push_str(&format!(" block{}", b.index)),
            }
        }
        if let Some(instr) = self.instr {
            full.push_str(&format!(" instr {}", self.shader.instr(instr).index));
        }
        if let Some((src, i)) = self.operand {
            full.push_str(&format!(" {} {i}", if src { "src" } else { "dst" }));
        }
        full.push_str(": ");
        full.push_str(msg.as_ref());
        self.messages.push(full);

        if !self.nonfatal {
            let errors = ValidationErrors {
                when: self.when.to_string(),
                messages: std::mem::take(&mut self.messages),
            };
            report_and_abort(self.shader, &errors);
        }
    }

    // -------- registers ---------

    fn validate_reg_state(&mut self) {
        let shader = self.shader;
        for class in RegClass::ALL {
            let capacity = class.capacity();
            let mut used = RegBitSet::new();
            for &id in shader.regs.class_regs(class) {
                let reg = shader.regs.reg(id);
                if capacity.is_some_and(|cap| reg.index >= cap) {
                    self.log(format!("{} register index out of range.", class.name()));
                }
                if reg.class != class {
                    self.log(format!(
                        "{} register found in {} register list.",
                        reg.class.name(),
                        class.name()
                    ));
                }
                if capacity.is_some() {
                    used.set(reg.index);
                }
                match shader.regs.reg_cache_entry(class, reg.index) {
                    None => self.log(format!(
                        "Missing {} register {} cache entry.",
                        class.name(),
                        reg.index
                    )),
                    Some(cached) if cached != id => self.log(format!(
                        "Mismatching {} register {} cache entry.",
                        class.name(),
                        reg.index
                    )),
                    Some(_) => {}
                }
            }
            if capacity.is_some() && !used.iter().eq(shader.regs.used(class).iter()) {
                self.log(format!("Incorrect {} register usage list.", class.name()));
            }
        }

        for &id in shader.regs.class_regs(RegClass::Ssa) {
            if shader.regs.reg(id).writes.len() > 1 {
                self.log(format!(
                    "SSA register {} is written to more than once.",
                    shader.display_ref(Ref::Reg(id))
                ));
            }
        }

        for (id, ra) in shader.regs.live_regarrays() {
            let Some(&first) = ra.regs.first() else {
                self.log("Register array is empty.");
                continue;
            };
            let base = shader.regs.reg(first);
            for (u, &reg) in ra.regs.iter().enumerate() {
                let reg = shader.regs.reg(reg);
                if reg.class != base.class {
                    self.log("Register class mismatch in register array.");
                }
                if reg.index != base.index + u as u32 {
                    self.log("Non-contiguous registers in register array.");
                }
            }

            match shader.regs.regarray_cache_entry(&ra.key()) {
                None => self.log("Missing regarray cache entry."),
                Some(cached) if cached != id => self.log("Mismatching regarray cache entry."),
                Some(_) => {}
            }

            if let Some(parent) = ra.parent {
                let p = shader.regs.regarray(parent);
                if p.size <= ra.size || p.parent.is_some() {
                    self.log("Invalid sub-regarray.");
                }
            }
        }
    }

    // -------- blocks ---------

    fn validate_block(&mut self, block: BlockId) {
        self.block = Some(block);
        let shader = self.shader;

        let ends: Vec<bool> = if shader.is_grouped {
            let groups: Vec<usize> = (0..shader.groups.len())
                .filter(|&g| shader.groups[g].block == block)
                .collect();
            groups.into_iter().map(|g| self.validate_group(g)).collect()
        } else {
            let instrs = shader.block(block).instrs.clone();
            instrs
                .into_iter()
                .map(|id| self.validate_instr(id, false))
                .collect()
        };

        if ends.is_empty() {
            self.log("Block is empty.");
            self.block = None;
            return;
        }

        let count = ends.iter().filter(|&&e| e).count();
        if count == 0 {
            if !self.next_block_is_lone_terminator(block) {
                self.log("Block does not end with a control flow instruction.");
            }
        } else if count > 1 {
            self.log("Block contains multiple control flow instructions.");
        } else if ends.last() != Some(&true) {
            self.log("Control flow instruction is present prior to the end of the block.");
        }

        self.block = None;
    }

    /// A block may fall through into a block made of nothing but its terminator.
    fn next_block_is_lone_terminator(&self, block: BlockId) -> bool {
        let shader = self.shader;
        let Some(next) = shader.next_block(block) else {
            return false;
        };
        if shader.is_grouped {
            let mut groups = shader.groups.iter().filter(|g| g.block == next);
            match (groups.next(), groups.next()) {
                (Some(g), None) => {
                    g.header.end
                        || g.instrs
                            .last()
                            .is_some_and(|&id| shader.instr(id).is_block_end())
                }
                _ => false,
            }
        } else {
            match shader.block(next).instrs.as_slice() {
                [only] => shader.instr(*only).is_block_end(),
                _ => false,
            }
        }
    }

    fn validate_group(&mut self, index: usize) -> bool {
        let shader = self.shader;
        let group = &shader.groups[index];
        if group.instrs.len() != group.header.phases.len() {
            self.log("Missing instruction where phase was set.");
        }
        let mut ends_block = false;
        for &id in &group.instrs {
            ends_block = self.validate_instr(id, true);
        }
        if group.header.alu != AluType::Control {
            return group.header.end;
        }
        ends_block
    }

    // -------- instructions ---------

    /// Checks one instruction, returning whether it ends its block.
    fn validate_instr(&mut self, id: InstrId, grouped: bool) -> bool {
        self.instr = Some(id);
        let shader = self.shader;
        let instr = shader.instr(id);
        let info = instr.info();
        let family = match instr.op {
            Op::Alu(_) => "ALU",
            Op::Backend(_) => "backend",
            Op::Ctrl(_) => "CTRL",
            Op::Bitwise(_) => "bitwise",
        };

        if info.is_pseudo {
            if grouped {
                self.log("Pseudo-op encountered in instruction group.");
            }
            if instr.end || instr.atom {
                self.log("Pseudo-op cannot have flags set.");
            }
        }

        if let Err(msg) = instr.op.check_op_mods(instr.mods) {
            self.log(format!("Unsupported {family} op modifiers. {msg}"));
        }

        if instr.repeat == 0 {
            self.log("Repeat count must be at least one.");
        }
        if instr.repeat > 1 && info.dst_repeat_mask == 0 && info.src_repeat_mask == 0 {
            self.log(format!("Repeat set for {family} op without repeat support."));
        }
        if instr.repeat > info.max_repeat {
            self.log(format!(
                "Repeat {} set for {family} op with max repeat of {}.",
                instr.repeat, info.max_repeat
            ));
        }
        if instr.group_next && info.whole_pipeline && !grouped {
            self.log("Cannot group whole-pipeline instructions.");
        }

        if !shader.is_grouped {
            let valnum = info
                .valnum_src
                .and_then(|s| instr.src(s).as_val())
                .unwrap_or(1);
            for (i, op) in instr.dsts.iter().enumerate() {
                let rule = OperandRule {
                    types: info.dst_types[i],
                    mods: info.supported_dst_mods[i],
                    stride: info.dst_stride[i],
                    repeat_masked: info.dst_repeat_mask & (1 << i) != 0,
                    valnum_masked: info.dst_valnum_mask & (1 << i) != 0,
                };
                self.validate_operand(false, i, op, &rule, instr.repeat, valnum);
            }
            for (i, op) in instr.srcs.iter().enumerate() {
                let rule = OperandRule {
                    types: info.src_types[i],
                    mods: info.supported_src_mods[i],
                    stride: info.src_stride[i],
                    repeat_masked: info.src_repeat_mask & (1 << i) != 0,
                    valnum_masked: info.src_valnum_mask & (1 << i) != 0,
                };
                self.validate_operand(true, i, op, &rule, instr.repeat, valnum);
            }

            match instr.op {
                Op::Alu(
                    AluOp::UpckU8888
                    | AluOp::UpckS8888
                    | AluOp::UpckU1616
                    | AluOp::UpckS1616
                    | AluOp::UpckF16F16,
                ) => self.validate_upck(id),
                Op::Backend(BackendOp::St) => self.validate_st(id),
                _ => {}
            }
        }

        if instr.op == Op::Backend(BackendOp::Atst) && !instr.has_op_mod(BackendOpMod::Ifb.bit()) {
            self.atst_noifbs += 1;
        }

        let mut ends_block = false;
        if let Op::Ctrl(op) = instr.op {
            ends_block = self.validate_ctrl(id, op);
        }
        if !ends_block {
            ends_block = instr.end;
        }

        self.instr = None;
        ends_block
    }

    fn validate_ctrl(&mut self, id: InstrId, op: CtrlOp) -> bool {
        let instr = self.shader.instr(id);
        let info = instr.info();
        if info.has_target && instr.target.is_none() {
            self.log("Ctrl op expected target block, but none provided.");
        } else if !info.has_target && instr.target.is_some() {
            self.log("Ctrl op did not expect target block, but one provided.");
        }

        if op == CtrlOp::Nop && instr.end {
            return true;
        }
        if instr.end {
            self.log("CTRL ops have no end flag.");
        }
        if instr.atom {
            self.log("CTRL ops have no atomic flag.");
        }
        info.ends_block
    }

    fn validate_operand(
        &mut self,
        is_src: bool,
        i: usize,
        op: &Operand,
        rule: &OperandRule,
        repeat: u32,
        valnum: u32,
    ) {
        self.operand = Some((is_src, i));
        let (kind, capitalized) = if is_src {
            ("source", "Source")
        } else {
            ("destination", "Destination")
        };

        if op.r.is_unset() {
            self.log(format!("{capitalized} has not been set."));
        }
        if !rule.types.contains(op.r.ty()) {
            self.log(format!("Unsupported {kind} type."));
        }
        if op.mods & !rule.mods != 0 {
            self.log(format!("Unsupported {kind} modifiers."));
        }

        if rule.stride != STRIDE_ANY {
            let mut size = rule.stride + 1;
            if rule.repeat_masked {
                size *= repeat;
            }
            if rule.valnum_masked {
                size *= valnum;
            }
            match op.r {
                Ref::Regarray(ra) => {
                    let actual = self.shader.regs.regarray(ra).size;
                    if actual != size {
                        self.log(format!("Expected regarray size {size}, got {actual}."));
                    }
                }
                Ref::Reg(_) if size > 1 => {
                    self.log(format!("Expected regarray type for {kind}."));
                }
                _ => {}
            }
        }

        self.operand = None;
    }

    fn validate_upck(&mut self, id: InstrId) {
        let instr = self.shader.instr(id);
        let elems_set = instr.srcs[0].mods & SrcMod::ELEMENTS != 0;
        if elems_set && instr.repeat > 1 {
            self.log("Unpack element must not be selected with repeat > 1.");
        } else if !elems_set && instr.repeat == 1 {
            self.log("Unpack element must be selected with repeat == 1.");
        }
    }

    /// Data in temps or vertex inputs must directly follow the two address words.
    fn validate_st(&mut self, id: InstrId) {
        let shader = self.shader;
        let instr = shader.instr(id);
        let Some((data_class, data_index)) = self.reg_info(instr.src(0)) else {
            self.log("Invalid type for ST data.");
            return;
        };
        if !matches!(data_class, RegClass::Temp | RegClass::Vtxin) {
            return;
        }
        let Some((addr_class, addr_index)) = self.reg_info(instr.src(4)) else {
            self.log("Invalid type for ST address.");
            return;
        };
        if addr_class == RegClass::Ssa {
            return;
        }
        if !matches!(addr_class, RegClass::Temp | RegClass::Vtxin) {
            self.log("Invalid address register class for ST op.");
        }
        if data_index != addr_index + 2 {
            self.log("ST address and data are not contiguous.");
        }
    }

    /// Class and first register index of a register or register array ref.
    fn reg_info(&self, r: Ref) -> Option<(RegClass, u32)> {
        let regs = &self.shader.regs;
        match r {
            Ref::Reg(id) => {
                let reg = regs.reg(id);
                Some((reg.class, reg.index))
            }
            Ref::Regarray(id) => {
                let ra = regs.regarray(id);
                Some((ra.class, ra.start))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Cursor, ExecCond};

    fn shader_with_block() -> (Shader, BlockId) {
        let mut shader = Shader::new(crate::core::Stage::Compute, "vld");
        let block = shader.push_block_after(None, None);
        (shader, block)
    }

    fn end(shader: &mut Shader, block: BlockId) {
        shader.insert_instr(Cursor::BlockEnd(block), Op::Ctrl(CtrlOp::End), &[], &[]);
    }

    #[test]
    fn test_valid_shader_passes() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, block) = shader_with_block();
        let (a, b, dst) = (shader.ssa(0), shader.ssa(1), shader.ssa(2));
        let sh0 = shader.reg_ref(RegClass::Shared, 0);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Mov), &[a], &[sh0]);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Mov), &[b], &[sh0]);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Fadd), &[dst], &[a, b]);
        end(&mut shader, block);
        assert_eq!(validate_shader(&shader, "in test", true), Ok(()));
    }

    #[test]
    fn test_double_ssa_write_reported() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, block) = shader_with_block();
        let a = shader.ssa(0);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Mov), &[a], &[Ref::imm(1)]);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Mov), &[a], &[Ref::imm(2)]);
        end(&mut shader, block);
        let errors = validate_shader(&shader, "in test", true).unwrap_err();
        assert!(errors.contains("is written to more than once"), "{errors:?}");
    }

    #[test]
    fn test_missized_regarray_reported() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, block) = shader_with_block();
        let dst = shader.ssa(0);
        // LD of two words into a three-word array.
        let addr = shader.ssa_vec(3, 1, 0);
        shader.insert_instr(
            Cursor::BlockEnd(block),
            Op::Backend(BackendOp::Ld),
            &[dst],
            &[Ref::drc(0), Ref::val(1), addr],
        );
        end(&mut shader, block);
        let errors = validate_shader(&shader, "in test", true).unwrap_err();
        assert!(errors.contains("src 2: Expected regarray size 2, got 3."), "{errors:?}");
    }

    #[test]
    fn test_unset_and_mistyped_operands() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, block) = shader_with_block();
        let id = shader.insert_instr(
            Cursor::BlockEnd(block),
            Op::Alu(AluOp::Fadd),
            &[Ref::drc(0)],
            &[Ref::imm(0), Ref::imm(1)],
        );
        shader.set_src(id, 1, Ref::Unset);
        end(&mut shader, block);
        let errors = validate_shader(&shader, "in test", true).unwrap_err();
        assert!(errors.contains("instr 0 dst 0: Unsupported destination type."), "{errors:?}");
        assert!(errors.contains("src 1: Source has not been set."), "{errors:?}");
    }

    #[test]
    fn test_block_termination_rules() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, block) = shader_with_block();
        let a = shader.ssa(0);
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Mov), &[a], &[Ref::imm(1)]);
        let errors = validate_shader(&shader, "in test", true).unwrap_err();
        assert!(errors.contains("Block does not end with a control flow instruction."));

        // Falling through into a lone terminator is accepted.
        let next = shader.push_block_after(Some(block), None);
        end(&mut shader, next);
        assert_eq!(validate_shader(&shader, "in test", true), Ok(()));

        // A terminator in the middle is not.
        let early = shader.next_instr_id();
        end(&mut shader, block);
        shader.move_instr(early, Cursor::BlockStart(block));
        let errors = validate_shader(&shader, "in test", true).unwrap_err();
        assert!(errors.contains("prior to the end of the block"), "{errors:?}");
    }

    #[test]
    fn test_lone_non_terminator_does_not_excuse_fallthrough() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, block) = shader_with_block();
        let (a, b) = (shader.ssa(0), shader.ssa(1));
        shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Mov), &[a], &[Ref::imm(1)]);
        let next = shader.push_block_after(Some(block), None);
        shader.insert_instr(Cursor::BlockEnd(next), Op::Alu(AluOp::Mov), &[b], &[Ref::imm(2)]);
        let errors = validate_shader(&shader, "in test", true).unwrap_err();
        assert!(errors.contains("block0: Block does not end"), "{errors:?}");
    }

    #[test]
    fn test_empty_block_reported() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, block) = shader_with_block();
        end(&mut shader, block);
        shader.push_block_after(Some(block), Some("tail".into()));
        let errors = validate_shader(&shader, "in test", true).unwrap_err();
        assert!(errors.contains("block \"tail\": Block is empty."), "{errors:?}");
    }

    #[test]
    fn test_pseudo_op_flags_and_repeat() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, block) = shader_with_block();
        let a = shader.ssa(0);
        let id = shader.insert_instr(Cursor::BlockEnd(block), Op::Alu(AluOp::Mov), &[a], &[Ref::imm(1)]);
        shader.edit(id).set_end(true).set_repeat(2);
        let errors = validate_shader(&shader, "in test", true).unwrap_err();
        assert!(errors.contains("Pseudo-op cannot have flags set."), "{errors:?}");
        assert!(errors.contains("Repeat set for ALU op without repeat support."));
        assert!(errors.contains("Repeat 2 set for ALU op with max repeat of 1."));
    }

    #[test]
    fn test_branch_needs_target() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, block) = shader_with_block();
        let br = shader.insert_instr(Cursor::BlockEnd(block), Op::Ctrl(CtrlOp::Br), &[], &[]);
        shader.edit(br).set_exec_cond(ExecCond::P0True);
        let next = shader.push_block_after(Some(block), None);
        end(&mut shader, next);
        let errors = validate_shader(&shader, "in test", true).unwrap_err();
        assert!(errors.contains("Ctrl op expected target block, but none provided."));

        shader.set_target(br, next);
        assert_eq!(validate_shader(&shader, "in test", true), Ok(()));
    }

    #[test]
    fn test_multiple_discards_rejected() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = Shader::new(crate::core::Stage::Fragment, "vld");
        let block = shader.push_block_after(None, None);
        for _ in 0..2 {
            let id = shader.insert_instr(
                Cursor::BlockEnd(block),
                Op::Backend(BackendOp::Atst),
                &[],
                &[Ref::imm(0), Ref::imm(0)],
            );
            shader.edit(id).set_mod(BackendOpMod::Never.bit());
        }
        end(&mut shader, block);
        let errors = validate_shader(&shader, "in test", true).unwrap_err();
        assert!(errors.contains("Multiple ATST.IFBs are not permitted."), "{errors:?}");
    }

    #[test]
    #[should_panic(expected = "Shader validation failed after passes")]
    fn test_fatal_mode_aborts() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut shader, block) = shader_with_block();
        shader.push_block_after(Some(block), None);
        let _ = validate_shader(&shader, "after passes", false);
    }
}
