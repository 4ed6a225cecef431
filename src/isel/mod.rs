// This module is the entry point of instruction selection: it turns one input IR shader into a
// Rogue shader. Selection first derives the driver I/O layout (coefficient iterators, vertex
// input/output registers, compute id registers) from the declared inputs and outputs, reserves
// the SSA registers and register arrays of every IR def so that vector arrays exist before any
// of their components is referenced, then walks the structured control-flow tree. Blocks of IR
// operations are translated one operation at a time by the alu, conversion, intrinsic and
// texture submodules; if and loop nodes are lowered onto the execution mask counter by the cf
// submodule, which re-enters the node walk for nested bodies. Each IR operation is translated
// by exhaustive matching: anything without a lowering aborts. Every instruction produced for an
// IR operation is tagged with the operation's name unless the lowering chose a more specific
// comment. The per-shader selection state (loop nesting depth, mask counter initialization,
// mutex state, known constants) lives on the Isel context, one per compile.

//! Instruction selection and control-flow lowering.

mod alu;
mod cf;
mod conversion;
mod intrinsic;
mod texture;

use hashbrown::HashMap;

use crate::core::error::{invalid, unsupported};
use crate::core::session::{MsaaMode, VsInput};
use crate::core::{
    BuildContext, BuildData, Builder, CtrlOp, Cursor, PipelineLayout, Ref, Ref64, RegClass,
    Shader, SrcMod, Stage,
};
use crate::core::{BackendOp, BackendOpMod, Op};
use crate::ir::{
    AluKind, DefInfo, Dest, Interp, IrInstr, IrShader, Src, Value, VARYING_SLOT_POS,
};

/// Selection state for one shader.
pub(crate) struct Isel<'s, 'c> {
    b: Builder<'s>,
    ctx: &'c BuildContext<'c>,
    ir: &'c IrShader,
    layout: PipelineLayout,
    /// Nesting depth of ifs inside the innermost loop.
    loop_nestings: u32,
    emc_initialized: bool,
    mutex_locked: bool,
    /// Values of `load_const` defs, per SSA index.
    consts: HashMap<u32, Vec<u64>>,
}

/// Translates `ir` into a Rogue shader without running any pass.
pub fn select(ctx: &BuildContext<'_>, ir: &IrShader) -> Shader {
    let mut shader = Shader::new(ir.stage, ir.name.clone());
    collect_io_data(ir, ctx.options.pipeline_layout.as_ref(), &mut shader.build_data);

    let entry = shader.push_block_after(None, None);
    reserve_values(&mut shader, ir);
    shader.next_ssa_idx = shader.next_ssa_idx.max(ir.ssa_alloc());

    {
        let mut isel = Isel {
            b: Builder::new(&mut shader, Cursor::BlockEnd(entry)),
            ctx,
            ir,
            layout: ctx.layout(),
            loop_nestings: 0,
            emc_initialized: false,
            mutex_locked: false,
            consts: HashMap::new(),
        };

        isel.translate_cf_list(&ir.body);
        isel.ensure_open_block();
        isel.b.ctrl(CtrlOp::End, &[], &[]);

        if isel.mutex_locked {
            invalid("shader ends with the mutex still locked");
        }
    }

    crate::passes::trim_empty_blocks(&mut shader);
    log::debug!(
        "selected {} instructions for {} shader \"{}\"",
        shader.num_instrs(),
        shader.stage,
        shader.name
    );
    shader
}

/// Creates the registers of every front-end register and SSA def up front.
fn reserve_values(shader: &mut Shader, ir: &IrShader) {
    for reg in &ir.registers {
        if reg.num_components != 1 || reg.bit_size > 32 {
            unsupported(format!(
                "{}-bit x{} register ${}",
                reg.bit_size, reg.num_components, reg.index
            ));
        }
        shader.reg_ref(RegClass::Temp, reg.index);
    }

    let mut defs: Vec<(u32, DefInfo)> = ir.defs.iter().map(|(&i, &d)| (i, d)).collect();
    defs.sort_by_key(|&(i, _)| i);
    for (index, def) in defs {
        match (def.bit_size, def.num_components) {
            (64, 1) => {
                shader.ssa_vec(2, index, 0);
            }
            (64, n) => unsupported(format!("{n}-component 64-bit value %{index}")),
            (_, 1) => {
                shader.ssa(index);
            }
            (_, n) => {
                shader.ssa_vec(n, index, 0);
            }
        }
    }
}

/// Fills the driver I/O maps from the shader's declared inputs and outputs.
pub fn collect_io_data(ir: &IrShader, layout: Option<&PipelineLayout>, data: &mut BuildData) {
    match ir.stage {
        Stage::Fragment => {
            let fs = &mut data.fs;
            fs.msaa_mode = if ir.per_sample {
                MsaaMode::Sample
            } else {
                MsaaMode::Pixel
            };

            let mut inputs: Vec<_> = ir
                .inputs
                .iter()
                .filter(|v| v.location != VARYING_SLOT_POS)
                .collect();
            inputs.sort_by_key(|v| v.location);

            let mut next = 0;
            if inputs.iter().any(|v| v.interp == Interp::Smooth) {
                fs.w_coeff = Some(0);
                next = 4;
            }
            for input in inputs {
                fs.iterator_base.insert(input.location, next);
                next += input.components * 4;
            }
            fs.num_coeffs = next;
        }

        Stage::Vertex => {
            let vs = &mut data.vs;
            let mut inputs = ir.inputs.clone();
            inputs.sort_by_key(|v| v.location);

            let mut next = 0;
            for input in &inputs {
                let base = layout
                    .and_then(|l| l.vs_input_base.get(&input.location).copied())
                    .unwrap_or(next);
                vs.inputs.insert(
                    input.location,
                    VsInput {
                        base,
                        components: input.components,
                    },
                );
                next = next.max(base + input.components);
            }
            vs.vertex_id_reg = next;
            vs.instance_id_reg = next + 1;

            // Position always comes first in the vertex output buffer.
            let mut outputs = ir.outputs.clone();
            outputs.sort_by_key(|v| (v.location != VARYING_SLOT_POS, v.location));
            let mut next = 0;
            for output in &outputs {
                for c in 0..output.components {
                    vs.outputs.insert((output.location, c), next);
                    next += 1;
                }
            }
            vs.num_vertex_outputs = next;
        }

        Stage::Compute => {
            data.cs.local_id_regs = [0, 1, 2];
            data.cs.workgroup_regs = [0, 1, 2];
        }
    }
}

/// Fills the build data that depends on the final instructions.
pub fn collect_late_build_data(shader: &mut Shader) {
    if shader.stage == Stage::Fragment {
        let mut discard = false;
        for id in shader.instrs_in_order() {
            let instr = shader.instr(id);
            if instr.op == Op::Backend(BackendOp::Atst) && !instr.has_op_mod(BackendOpMod::Ifb.bit()) {
                discard = true;
            }
        }
        shader.build_data.fs.discard = discard;
        shader.build_data.fs.side_effects = discard;
    }

    shader.build_data.temps = shader.regs.count_used(RegClass::Temp);
    shader.build_data.internals = shader.regs.count_used(RegClass::Internal);
}

fn elements_name(c: u32) -> char {
    (b'x' + c as u8) as char
}

impl<'s, 'c> Isel<'s, 'c> {
    fn shader(&mut self) -> &mut Shader {
        self.b.shader
    }

    /// Translates one IR operation, tagging what it produced.
    fn translate_instr(&mut self, instr: &IrInstr) {
        let first = self.b.shader.next_instr_id();

        let name: &'static str = match instr {
            IrInstr::Alu { op, dest, srcs } => match op {
                AluKind::Op(opcode) => {
                    self.translate_alu(*opcode, dest, srcs);
                    opcode.name()
                }
                AluKind::Conv(conv) => {
                    self.translate_conversion(*conv, dest, srcs);
                    "conversion"
                }
            },
            IrInstr::Intrinsic {
                op,
                dest,
                srcs,
                indices,
            } => {
                self.translate_intrinsic(*op, dest.as_ref(), srcs, indices);
                op.name()
            }
            IrInstr::LoadConst { dest, values } => {
                self.translate_load_const(dest, values);
                "load_const"
            }
            IrInstr::Tex(tex) => {
                self.translate_tex(tex);
                tex.op.name()
            }
            IrInstr::Jump(kind) => {
                self.translate_jump(*kind);
                return;
            }
        };

        for id in self.b.shader.instrs_since(first) {
            if self.b.shader.instr(id).comment.is_none() {
                self.b.shader.edit(id).set_comment(name);
            }
        }
        self.ctx.record_instruction_selected(name);
    }

    fn translate_load_const(&mut self, dest: &Dest, values: &[u64]) {
        let Value::Ssa(index) = dest.value else {
            invalid("load_const into a register");
        };
        let bits = dest.bit_size;
        for (c, &value) in values.iter().enumerate() {
            let c = c as u32;
            if bits == 64 {
                let dst = self.dest64(dest);
                let imm = Ref64::imm(value);
                let lo = self.b.mov(dst.lo, imm.lo);
                self.b.edit(lo).set_comment("load_const_64.lo32");
                let hi = self.b.mov(dst.hi, imm.hi);
                self.b.edit(hi).set_comment("load_const_64.hi32");
            } else {
                let dst = self.value_word(dest.value, c);
                let id = self.b.mov(dst, Ref::imm(value as u32));
                self.b.edit(id).set_comment(format!("load_const_{bits}"));
            }
        }
        self.consts.insert(index, values.to_vec());
    }

    // ---- Value helpers ----

    fn info(&self, value: Value) -> DefInfo {
        match self.ir.value_info(value) {
            Some(info) => info,
            None => invalid(format!("use of undefined value {value}")),
        }
    }

    /// Number of 32-bit words a value occupies.
    fn words(&self, value: Value) -> u32 {
        let info = self.info(value);
        if info.bit_size == 64 {
            2
        } else {
            info.num_components
        }
    }

    fn bits(&self, value: Value) -> u32 {
        self.info(value).bit_size
    }

    /// The whole register or register array of a value.
    fn value_ref(&mut self, value: Value) -> Ref {
        let words = self.words(value);
        match value {
            Value::Ssa(i) if words == 1 => self.shader().ssa(i),
            Value::Ssa(i) => self.shader().ssa_vec(words, i, 0),
            Value::Reg(i) => self.shader().reg_ref(RegClass::Temp, i),
        }
    }

    /// Word `w` of a value.
    fn value_word(&mut self, value: Value, w: u32) -> Ref {
        let words = self.words(value);
        if w >= words {
            invalid(format!("word {w} of {words}-word value {value}"));
        }
        match value {
            Value::Ssa(i) if words == 1 => self.shader().ssa(i),
            Value::Ssa(i) => self.shader().ssa_vec(1, i, w),
            Value::Reg(i) => self.shader().reg_ref(RegClass::Temp, i + w),
        }
    }

    fn dest_ref(&mut self, dest: &Dest) -> Ref {
        self.value_ref(dest.value)
    }

    fn dest_comp(&mut self, dest: &Dest, c: u32) -> Ref {
        self.value_word(dest.value, c)
    }

    fn dest64(&mut self, dest: &Dest) -> Ref64 {
        Ref64::new(self.value_word(dest.value, 0), self.value_word(dest.value, 1))
    }

    /// Logical component `c` of a source, after swizzling.
    fn src_comp(&mut self, src: &Src, c: u32) -> Ref {
        self.value_word(src.value, src.comp(c))
    }

    fn src64(&mut self, src: &Src) -> Ref64 {
        Ref64::new(self.value_word(src.value, 0), self.value_word(src.value, 1))
    }

    /// `n` contiguous components of a source as one operand.
    fn src_ref(&mut self, src: &Src, n: u32) -> Ref {
        let first = src.comp(0);
        if n == 1 {
            return self.value_word(src.value, first);
        }
        if (0..n).any(|i| src.comp(i) != first + i) {
            unsupported(format!("non-contiguous swizzle on {}-component source {src}", n));
        }
        let words = self.words(src.value);
        if first == 0 && n == words {
            return self.value_ref(src.value);
        }
        match src.value {
            Value::Ssa(i) => self.shader().ssa_vec(n, i, first),
            Value::Reg(i) => self.shader().regarray_ref(n, RegClass::Temp, i + first),
        }
    }

    /// Abs/neg source modifiers of a source.
    fn src_mods(src: &Src) -> u64 {
        let mut mods = 0;
        if src.negate {
            mods |= SrcMod::Neg.bit();
        }
        if src.abs {
            mods |= SrcMod::Abs.bit();
        }
        mods
    }

    /// Constant value of a source component, when it comes from `load_const`.
    fn const_value(&self, src: &Src, c: u32) -> Option<u64> {
        match src.value {
            Value::Ssa(i) => self
                .consts
                .get(&i)
                .and_then(|values| values.get(src.comp(c) as usize).copied()),
            Value::Reg(_) => None,
        }
    }

    /// Shared register `offset + src`, through the index register when `src` is not constant.
    fn shared_indexed(&mut self, src: &Src, c: u32, offset: u32) -> Ref {
        if let Some(value) = self.const_value(src, c) {
            return self.shader().reg_ref(RegClass::Shared, offset + value as u32);
        }
        let index = self.src_comp(src, c);
        let idx0 = self.shader().reg_ref(RegClass::Index, 0);
        self.b.mov(idx0, index);
        let base = self.shader().regs.reg_cached(RegClass::Shared, offset);
        let tmp = self.shader().new_ssa();
        self.b.mov(tmp, Ref::RegIndexed { reg: base, index: 0 });
        tmp
    }

    fn dummy_layout_used(&self, what: &str) {
        if self.layout.is_dummy {
            log::warn!("{what} uses the dummy pipeline layout; the result is not usable on hardware");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CompilerOptions;
    use crate::ir::parse_ir;
    use bumpalo::Bump;

    fn select_src(src: &str) -> Shader {
        let ir = parse_ir(src).unwrap();
        let arena = Bump::new();
        let ctx = BuildContext::new(&arena, CompilerOptions::default());
        select(&ctx, &ir)
    }

    #[test]
    fn test_fs_iterators_follow_locations() {
        let _ = env_logger::builder().is_test(true).try_init();
        let shader = select_src(
            "shader fs \"io\"\n\
             decl_input location=33 components=2 interp=flat\n\
             decl_input location=32 components=4 interp=smooth\n",
        );
        let fs = &shader.build_data.fs;
        assert_eq!(fs.w_coeff, Some(0));
        assert_eq!(fs.iterator_base.get(&32), Some(&4));
        assert_eq!(fs.iterator_base.get(&33), Some(&20));
        assert_eq!(fs.num_coeffs, 28);
    }

    #[test]
    fn test_vs_outputs_position_first() {
        let _ = env_logger::builder().is_test(true).try_init();
        let shader = select_src(
            "shader vs \"io\"\n\
             decl_input location=0 components=3\n\
             decl_output location=32 components=2\n\
             decl_output location=0 components=4\n",
        );
        let vs = &shader.build_data.vs;
        assert_eq!(vs.outputs.get(&(0, 0)), Some(&0));
        assert_eq!(vs.outputs.get(&(32, 1)), Some(&5));
        assert_eq!(vs.num_vertex_outputs, 6);
        assert_eq!(vs.vertex_id_reg, 3);
        assert_eq!(vs.instance_id_reg, 4);
    }

    #[test]
    fn test_empty_shader_is_single_end() {
        let _ = env_logger::builder().is_test(true).try_init();
        let shader = select_src("shader cs \"empty\"\n");
        let instrs = shader.instrs_in_order();
        assert_eq!(instrs.len(), 1);
        assert_eq!(shader.instr(instrs[0]).op, Op::Ctrl(CtrlOp::End));
    }

    #[test]
    fn test_provenance_comment_defaults_to_op_name() {
        let _ = env_logger::builder().is_test(true).try_init();
        let shader = select_src(
            "shader fs \"c\"\n\
             %0:32 = @load_preamble() [base=0]\n\
             %1:32 = @load_preamble() [base=1]\n\
             %2:32 = fmul %0, %1\n",
        );
        let fmul = shader
            .instrs_in_order()
            .into_iter()
            .find(|&id| shader.instr(id).op == Op::Alu(crate::core::AluOp::Fmul))
            .unwrap();
        assert_eq!(shader.instr(fmul).comment.as_deref(), Some("fmul"));
    }
}
