// Control-flow lowering onto the execution mask counter (EMC). Rogue has no per-lane program
// counter: every lane walks every block, and a lane only executes an instruction while its EMC
// is zero. Conditional mask instructions (CNDST/CNDEF/CNDEND/CNDLT) adjust the counter of the
// lanes that fail or pass a predicate, always with the PE_ANY condition so masked lanes take
// part in their own bookkeeping. An if bumps the counter for lanes whose condition is false,
// flips it for the else side and restores it at the end. A loop reserves two counter levels
// per iteration: continue parks a lane at nesting+1 and break at nesting+2, the end of the
// body decrements by one so running and continuing lanes come back to zero, and the
// back-edge is taken while any lane is still below two. Optional branches with ALLINST skip a
// body entirely when no lane in the group needs it.

use crate::core::{CtrlOp, CtrlOpMod, Cursor, ExecCond, Io, Ref};
use crate::core::{AluOp, BlockId};
use crate::ir::{CfNode, JumpKind, Src};

use super::Isel;

/// True when a control-flow list contains no operation at all.
fn cf_list_is_empty(list: &[CfNode]) -> bool {
    list.iter()
        .all(|node| matches!(node, CfNode::Block(instrs) if instrs.is_empty()))
}

impl Isel<'_, '_> {
    /// Translates a list of control-flow nodes, returning the block it started in.
    pub(super) fn translate_cf_list(&mut self, nodes: &[CfNode]) -> BlockId {
        let start = self.ensure_open_block();
        for node in nodes {
            match node {
                CfNode::Block(instrs) => {
                    self.ensure_open_block();
                    for instr in instrs {
                        self.translate_instr(instr);
                    }
                }
                CfNode::If {
                    condition,
                    then_list,
                    else_list,
                    dont_flatten,
                } => self.translate_if(condition, then_list, else_list, *dont_flatten),
                CfNode::Loop { body } => self.translate_loop(body),
            }
        }
        start
    }

    /// Makes sure the cursor is in a block that has not been terminated yet.
    pub(super) fn ensure_open_block(&mut self) -> BlockId {
        let block = self.b.block();
        let terminated = self
            .b
            .shader
            .block(block)
            .instrs
            .last()
            .is_some_and(|&id| self.b.shader.instr(id).is_block_end());
        if terminated {
            self.b.push_block(None)
        } else {
            self.b.cursor = Cursor::BlockEnd(block);
            block
        }
    }

    /// Emits a mask counter instruction on every lane.
    fn cnd(&mut self, op: CtrlOp, src: Ref, val: u32, cond: Option<CtrlOpMod>) -> crate::core::InstrId {
        let id = self
            .b
            .ctrl(op, &[Ref::io(Io::Pe), Ref::Emc], &[src, Ref::val(val)]);
        let edit = self.b.edit(id).set_exec_cond(ExecCond::PeAny);
        if let Some(cond) = cond {
            edit.set_mod(cond.bit());
        }
        id
    }

    fn init_emc(&mut self) {
        if self.emc_initialized {
            return;
        }
        self.emc_initialized = true;
        self.ensure_open_block();
        let id = self.cnd(CtrlOp::Cndst, Ref::imm(0), 1, Some(CtrlOpMod::Always));
        self.b.edit(id).set_comment("cf_init");
        self.b.push_block(None);
    }

    /// Branch placed in a fresh block right before `before`, skipping to `target` when no
    /// lane needs the code in between.
    fn emit_skip(&mut self, before: BlockId, target: BlockId) {
        self.b.push_block_before(before, None);
        let br = self.b.ctrl(CtrlOp::Br, &[], &[]);
        self.b.edit(br).set_mod(CtrlOpMod::AllInst.bit()).set_comment("skip");
        self.b.shader.set_target(br, target);
    }

    fn translate_if(&mut self, condition: &Src, then_list: &[CfNode], else_list: &[CfNode], dont_flatten: bool) {
        self.init_emc();
        self.ensure_open_block();
        self.loop_nestings += 1;

        let has_then = !cf_list_is_empty(then_list);
        let has_else = !cf_list_is_empty(else_list);
        if !has_then && !has_else {
            log::debug!("eliding if with two empty branches");
            self.loop_nestings -= 1;
            return;
        }

        let cond = self.src_comp(condition, 0);
        let setpred = self.b.alu(AluOp::Setpred, &[Ref::io(Io::P0)], &[cond]);
        self.b.edit(setpred).set_comment("if_cond");

        // Mask off the lanes that must not run the first emitted branch.
        let first = if has_then {
            CtrlOpMod::P0True
        } else {
            CtrlOpMod::P0False
        };
        let enter = self.cnd(CtrlOp::Cndst, Ref::Emc, 1, Some(first));
        self.b.edit(enter).set_comment("if");

        let if_then = has_then.then(|| self.translate_cf_list(then_list));

        let mut else_check = None;
        if has_then && has_else {
            else_check = Some(self.b.push_block(None));
            let flip = self.cnd(CtrlOp::Cndef, Ref::Emc, 1, Some(CtrlOpMod::Always));
            self.b.edit(flip).set_comment("else");
        }

        let if_else = has_else.then(|| self.translate_cf_list(else_list));

        let end_if = self.b.push_block(None);
        let restore = self.cnd(CtrlOp::Cndend, Ref::Emc, 1, None);
        self.b.edit(restore).set_comment("end_if");

        if dont_flatten {
            let cursor = self.b.cursor;
            if let Some(then_block) = if_then {
                self.emit_skip(then_block, else_check.unwrap_or(end_if));
            }
            if let Some(else_block) = if_else {
                self.emit_skip(else_block, end_if);
            }
            self.b.cursor = cursor;
        }

        self.loop_nestings -= 1;
    }

    fn translate_loop(&mut self, body: &[CfNode]) {
        self.init_emc();
        self.ensure_open_block();

        let pushed_nestings = self.loop_nestings;
        self.loop_nestings = 0;

        // Lanes already masked before the loop sit two levels further out.
        let loop_start = self.cnd(CtrlOp::Cndst, Ref::Emc, 2, Some(CtrlOpMod::Always));
        self.b.edit(loop_start).set_comment("loop_init").set_loop_start();

        let loop_body = self.b.push_block(Some("loop_body"));
        self.translate_cf_list(body);
        self.ensure_open_block();

        // emc is now 0 (run again), 1 (continue), 2 (break) or n + 2 (masked before the loop).
        let body_end = self.cnd(CtrlOp::Cndend, Ref::Emc, 1, None);
        self.b.edit(body_end).set_comment("loop_end");
        self.b.push_block(None);
        let repark = self.cnd(CtrlOp::Cndst, Ref::Emc, 1, Some(CtrlOpMod::Always));
        self.b.edit(repark).set_comment("loop_repark");

        let loop_end = self.b.push_block(None);
        let test = self.b.ctrl(
            CtrlOp::Cndlt,
            &[Ref::io(Io::Pe), Ref::Emc, Ref::io(Io::P0)],
            &[Ref::Emc, Ref::val(2)],
        );
        self.b
            .edit(test)
            .set_mod(CtrlOpMod::Always.bit())
            .set_exec_cond(ExecCond::PeAny)
            .set_comment("loop_test");

        self.b.push_block(None);
        let br = self.b.ctrl(CtrlOp::Br, &[], &[]);
        self.b.edit(br).set_exec_cond(ExecCond::P0True).set_comment("loop_back");
        self.b.shader.set_target(br, loop_body);
        self.b.shader.link_loop(loop_start, br);

        let cursor = self.b.cursor;
        self.emit_skip(loop_body, loop_end);
        self.b.cursor = cursor;

        debug_assert_eq!(self.loop_nestings, 0);
        self.loop_nestings = pushed_nestings;
    }

    pub(super) fn translate_jump(&mut self, kind: JumpKind) {
        let (level, name) = match kind {
            JumpKind::Continue => (self.loop_nestings + 1, "continue"),
            JumpKind::Break => (self.loop_nestings + 2, "break"),
        };
        let mov = self.b.mov(Ref::Emc, Ref::imm(level));
        self.b.edit(mov).set_comment(name);

        let flush = self.cnd(CtrlOp::Cndef, Ref::Emc, 0, Some(CtrlOpMod::Never));
        self.b.edit(flush).set_comment("flush_Pe");
        self.b.push_block(None);
        self.ctx.record_instruction_selected(name);
    }
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;

    use crate::core::{BuildContext, CompilerOptions, CtrlOp, Op, Shader};
    use crate::ir::parse_ir;

    fn select_src(src: &str) -> Shader {
        let ir = parse_ir(src).unwrap();
        let arena = Bump::new();
        let ctx = BuildContext::new(&arena, CompilerOptions::default());
        super::super::select(&ctx, &ir)
    }

    fn ctrl_ops(shader: &Shader) -> Vec<CtrlOp> {
        shader
            .instrs_in_order()
            .into_iter()
            .filter_map(|id| match shader.instr(id).op {
                Op::Ctrl(op) => Some(op),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_if_else_mask_sequence() {
        let _ = env_logger::builder().is_test(true).try_init();
        let shader = select_src(
            "shader fs \"if\"\n\
             decl_reg $0\n\
             %0:32 = @load_preamble() [base=0]\n\
             if %0 {\n  $0 = mov %0\n} else {\n  $0 = fneg %0\n}\n",
        );
        assert_eq!(
            ctrl_ops(&shader),
            vec![CtrlOp::Cndst, CtrlOp::Cndst, CtrlOp::Cndef, CtrlOp::Cndend, CtrlOp::End]
        );
    }

    #[test]
    fn test_empty_then_flips_condition() {
        let _ = env_logger::builder().is_test(true).try_init();
        let shader = select_src(
            "shader fs \"if\"\n\
             decl_reg $0\n\
             %0:32 = @load_preamble() [base=0]\n\
             if %0 {\n} else {\n  $0 = fneg %0\n}\n",
        );
        let text = shader.display(false).to_string();
        assert!(text.contains("cndst.p0_false pe, emc, emc, 1 {if}"), "{text}");
        assert!(!text.contains("cndef"), "{text}");
    }

    #[test]
    fn test_loop_back_edge_is_linked() {
        let _ = env_logger::builder().is_test(true).try_init();
        let shader = select_src("shader cs \"loop\"\nloop {\n  break\n}\n");
        let br = shader
            .instrs_in_order()
            .into_iter()
            .find(|&id| {
                let instr = shader.instr(id);
                instr.op == Op::Ctrl(CtrlOp::Br) && instr.loop_link.is_some()
            })
            .unwrap();
        let start = shader.instr(br).loop_link.unwrap();
        assert!(shader.instr(start).loop_start);
        let body = shader.instr(br).target.unwrap();
        assert_eq!(shader.block(body).label.as_deref(), Some("loop_body"));
    }

    #[test]
    fn test_mask_instructions_name_their_construct() {
        let _ = env_logger::builder().is_test(true).try_init();
        let shader = select_src(
            "shader fs \"if\"\n\
             decl_reg $0\n\
             %0:32 = @load_preamble() [base=0]\n\
             if %0 {\n  $0 = mov %0\n} else {\n  $0 = fneg %0\n}\n\
             loop {\n  break\n}\n",
        );
        let text = shader.display(false).to_string();
        for expected in [
            "setpred p0, %r0 {if_cond}",
            "cndst.p0_true pe, emc, emc, 1 {if}",
            "cndef.always pe, emc, emc, 1 {else}",
            "cndend pe, emc, emc, 1 {end_if}",
            "cndend pe, emc, emc, 1 {loop_end}",
            "cndst.always pe, emc, emc, 1 {loop_repark}",
        ] {
            assert!(text.contains(expected), "missing `{expected}` in\n{text}");
        }

        // Every mask counter instruction says which construct emitted it.
        for id in shader.instrs_in_order() {
            let instr = shader.instr(id);
            if matches!(
                instr.op,
                Op::Ctrl(CtrlOp::Cndst | CtrlOp::Cndef | CtrlOp::Cndend | CtrlOp::Cndlt)
            ) {
                assert!(instr.comment.is_some(), "uncommented {}", shader.display_instr(id));
            }
        }
    }
}
