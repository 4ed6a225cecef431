// Intrinsic selection: shader I/O, driver-provided addresses, memory access, special registers,
// discard and the mutex. Fragment inputs are read from the coefficient registers laid out by
// collect_io_data (four coefficients per component, the C term at +2); vertex inputs and
// outputs use the vtxin/vtxout maps. Addresses of driver tables live in shared register pairs
// whose offsets come from the pipeline layout, or from the dummy layout when compiling offline.

use crate::core::error::{invalid, unsupported, unsupported_bits};
use crate::core::register_file::special;
use crate::core::session::MsaaMode;
use crate::core::{
    AluOp, AluOpMod, BackendOp, BackendOpMod, CtrlOp, CtrlOpMod, InstrId, Ref, RegClass, Stage,
};
use crate::ir::{AtomicOp, Dest, Indices, Interp, IntrinsicOp, Src, Value, VARYING_SLOT_POS};

use super::{elements_name, Isel};

/// Coefficient registers per interpolated component.
const COEFF_ALIGN: u32 = 4;
/// Offset of the constant term within a component's coefficients.
const COEFF_COMPONENT_C: u32 = 2;

impl Isel<'_, '_> {
    pub(super) fn translate_intrinsic(
        &mut self,
        op: IntrinsicOp,
        dest: Option<&Dest>,
        srcs: &[Src],
        indices: &Indices,
    ) {
        use IntrinsicOp::*;

        let dest_of = |dest: Option<&Dest>| -> Dest {
            match dest {
                Some(dest) => *dest,
                None => invalid(format!("{} without a destination", op.name())),
            }
        };

        match op {
            LoadInput => self.load_input(&dest_of(dest), indices),
            LoadOutput => self.load_output(&dest_of(dest), indices),
            StoreOutput => self.store_output(&srcs[0], indices),

            LoadPreamble => {
                let dst = self.dest_ref(&dest_of(dest));
                let src = self
                    .shader()
                    .reg_ref(RegClass::Shared, indices.base.unwrap_or(0));
                self.b.mov(dst, src);
            }

            LoadDescSetTableBase | LoadPushConstsBase | LoadNumWorkgroupsBase => {
                let offset = match op {
                    LoadDescSetTableBase => self.layout.desc_set_table_offset,
                    LoadPushConstsBase => self.layout.push_consts_offset,
                    _ => self.layout.num_workgroups_offset,
                };
                self.dummy_layout_used(op.name());
                self.load_shared64(&dest_of(dest), offset, op.name());
            }

            LoadVulkanDescriptor => {
                let dest = dest_of(dest);
                let set = indices.desc_set.unwrap_or(0);
                let binding = indices.binding.unwrap_or(0);
                self.dummy_layout_used(op.name());

                let table = self.layout.desc_set_table_offset + 2 * set;
                let offset = self.layout.binding_offset(set, binding) * 4;
                let dst = self.dest64(&dest);
                let lo = self.shader().reg_ref(RegClass::Shared, table);
                let hi = self.shader().reg_ref(RegClass::Shared, table + 1);
                let id = self.b.alu(
                    AluOp::Iadd64,
                    &[dst.lo, dst.hi],
                    &[lo, hi, Ref::imm(offset), Ref::imm(0)],
                );
                self.b
                    .edit(id)
                    .set_comment(format!("load_vulkan_descriptor.{set}.{binding}"));
            }

            LoadGlobal => self.load_global(&dest_of(dest), &srcs[0]),
            StoreGlobal => self.store_global(&srcs[0], &srcs[1]),
            GlobalAtomic => self.global_atomic(&dest_of(dest), srcs, indices),

            LoadSharedReg => {
                let dst = self.dest_ref(&dest_of(dest));
                let value = self.shared_indexed(&srcs[0], 0, indices.base.unwrap_or(0));
                self.b.mov(dst, value);
            }

            IsHelperInvocation => {
                let dst = self.dest_ref(&dest_of(dest));
                let valid = self.shader().new_ssa();
                let savmsk = self.b.backend(BackendOp::Savmsk, &[valid, Ref::None], &[]);
                self.b.edit(savmsk).set_mod(BackendOpMod::Vm.bit());
                let cmp = self.b.alu(AluOp::Cmp, &[dst], &[valid, Ref::imm(0)]);
                self.b
                    .edit(cmp)
                    .set_mod(AluOpMod::E.bit() | AluOpMod::U32.bit())
                    .set_comment("load_helper_invocation");
            }

            LoadSampleId => {
                self.load_reg(&dest_of(dest), RegClass::Special, special::SAMP_NUM);
            }
            LoadLayerId => {
                self.load_reg(&dest_of(dest), RegClass::Special, special::RENDER_TGT_ID);
            }
            LoadInstanceNum => {
                self.load_reg(&dest_of(dest), RegClass::Special, special::INST_NUM);
            }

            LoadLocalInvocationIndex => {
                self.require_stage(op, Stage::Compute);
                let index = self.shader().build_data.cs.local_id_regs[0];
                self.load_reg(&dest_of(dest), RegClass::Vtxin, index);
            }

            LoadWorkgroupId => {
                self.require_stage(op, Stage::Compute);
                let component = indices.component.unwrap_or(0);
                if component > 2 {
                    invalid(format!("workgroup id component {component}"));
                }
                let index = self.shader().build_data.cs.workgroup_regs[component as usize];
                let id = self.load_reg(&dest_of(dest), RegClass::Coeff, index);
                self.b
                    .edit(id)
                    .set_comment(format!("load_workgroup_id.{}", elements_name(component)));
            }

            LoadVertexId | LoadInstanceId => {
                self.require_stage(op, Stage::Vertex);
                let vs = &self.shader().build_data.vs;
                let index = if op == LoadVertexId {
                    vs.vertex_id_reg
                } else {
                    vs.instance_id_reg
                };
                self.load_reg(&dest_of(dest), RegClass::Vtxin, index);
            }

            Discard => {
                self.require_stage(op, Stage::Fragment);
                let atst = self
                    .b
                    .backend(BackendOp::Atst, &[], &[Ref::imm(0), Ref::imm(0)]);
                self.b.edit(atst).set_mod(BackendOpMod::Never.bit());
            }

            DiscardIf => {
                self.require_stage(op, Stage::Fragment);
                // The test passes, keeping the fragment, while the condition is zero.
                let cond = self.src_comp(&srcs[0], 0);
                let atst = self.b.backend(BackendOp::Atst, &[], &[cond, Ref::imm(0)]);
                self.b.edit(atst).set_mod(BackendOpMod::Equal.bit());
            }

            MutexLock | MutexRelease => {
                let lock = op == MutexLock;
                if lock && self.mutex_locked {
                    invalid("mutex locked twice");
                }
                if !lock && !self.mutex_locked {
                    invalid("mutex released without being locked");
                }
                self.mutex_locked = lock;
                let id = indices.id.unwrap_or(0);
                let mutex = self.b.ctrl(CtrlOp::Mutex, &[], &[Ref::val(id)]);
                let m = if lock {
                    CtrlOpMod::Lock
                } else {
                    CtrlOpMod::Release
                };
                self.b.edit(mutex).set_mod(m.bit());
            }

            ImageLoad | ImageStore | ImageSize | ImageSamples => {
                self.translate_image(op, dest, srcs, indices)
            }

            ImageTexelAddress => unsupported(format!("intrinsic {}", op.name())),
        }
    }

    fn require_stage(&self, op: IntrinsicOp, stage: Stage) {
        let actual = self.b.shader.stage;
        if actual != stage {
            unsupported(format!("{} in a {actual} shader", op.name()));
        }
    }

    /// Moves a scalar from a fixed register.
    fn load_reg(&mut self, dest: &Dest, class: RegClass, index: u32) -> InstrId {
        let dst = self.dest_ref(dest);
        let src = self.shader().reg_ref(class, index);
        self.b.mov(dst, src)
    }

    /// Moves a 64-bit value out of a shared register pair.
    fn load_shared64(&mut self, dest: &Dest, offset: u32, name: &str) {
        let dst = self.dest64(dest);
        let lo = self.shader().reg_ref(RegClass::Shared, offset);
        let hi = self.shader().reg_ref(RegClass::Shared, offset + 1);
        let id = self.b.mov(dst.lo, lo);
        self.b.edit(id).set_comment(format!("{name}.lo32"));
        let id = self.b.mov(dst.hi, hi);
        self.b.edit(id).set_comment(format!("{name}.hi32"));
    }

    fn load_input(&mut self, dest: &Dest, indices: &Indices) {
        let location = indices.location.unwrap_or(0);
        let component = indices.component.unwrap_or(0);
        match self.b.shader.stage {
            Stage::Fragment => self.load_input_fs(dest, location, component),
            Stage::Vertex => self.load_input_vs(dest, location, component),
            stage => unsupported(format!("load_input in a {stage} shader")),
        }
    }

    fn load_input_fs(&mut self, dest: &Dest, location: u32, component: u32) {
        let n = dest.num_components;
        let dst = self.dest_ref(dest);

        if location == VARYING_SLOT_POS && component < 2 {
            let sample_rate = self.shader().build_data.fs.msaa_mode == MsaaMode::Sample;
            let index = match (component, sample_rate) {
                (0, false) => special::X_P,
                (0, true) => special::X_S,
                (_, false) => special::Y_P,
                (_, true) => special::Y_S,
            };
            let src = self.shader().reg_ref(RegClass::Special, index);
            let id = self.b.mov(dst, src);
            self.b
                .edit(id)
                .set_comment(format!("load_input_fs_coord_{}", elements_name(component)));
            return;
        }

        let Some(var) = self.ir.input(location) else {
            invalid(format!("load_input from undeclared location {location}"));
        };
        let Some(&base) = self.shader().build_data.fs.iterator_base.get(&location) else {
            invalid(format!("no iterator for input location {location}"));
        };
        let coeff = base + component * COEFF_ALIGN;

        match var.interp {
            Interp::Smooth => {
                let Some(w) = self.shader().build_data.fs.w_coeff else {
                    invalid("smooth input without W coefficients");
                };
                let coeffs = self
                    .shader()
                    .regarray_ref(COEFF_ALIGN * n, RegClass::Coeff, coeff);
                let wcoeffs = self.shader().regarray_ref(COEFF_ALIGN, RegClass::Coeff, w);
                let id = self.b.backend(
                    BackendOp::FitrpPixel,
                    &[dst],
                    &[Ref::drc(0), coeffs, wcoeffs, Ref::val(n)],
                );
                self.b.edit(id).set_comment("load_input_fs_smooth");
            }
            Interp::NoPerspective => {
                let coeffs = self
                    .shader()
                    .regarray_ref(COEFF_ALIGN * n, RegClass::Coeff, coeff);
                let id = self.b.backend(
                    BackendOp::FitrPixel,
                    &[dst],
                    &[Ref::drc(0), coeffs, Ref::val(n)],
                );
                self.b.edit(id).set_comment("load_input_fs_npc");
            }
            Interp::Flat => {
                for u in 0..n {
                    let c = self
                        .shader()
                        .reg_ref(RegClass::Coeff, coeff + u * COEFF_ALIGN + COEFF_COMPONENT_C);
                    let d = self.dest_comp(dest, u);
                    let id = self.b.mov(d, c);
                    let comment = if n > 1 {
                        format!("load_input_fs_flat.{}", elements_name(u))
                    } else {
                        "load_input_fs_flat".to_string()
                    };
                    self.b.edit(id).set_comment(comment);
                }
            }
        }
    }

    fn load_input_vs(&mut self, dest: &Dest, location: u32, component: u32) {
        let Some(&input) = self.shader().build_data.vs.inputs.get(&location) else {
            invalid(format!("load_input from undeclared location {location}"));
        };
        for c in 0..dest.num_components {
            let dst = self.dest_comp(dest, c);
            let comp = component + c;
            // Components the vertex format does not provide read as 1.0.
            if comp >= input.components {
                let id = self.b.mov(dst, Ref::imm_f32(1.0));
                self.b.edit(id).set_comment("load_input_vs (1.0f)");
                continue;
            }
            let src = self.shader().reg_ref(RegClass::Vtxin, input.base + comp);
            let id = self.b.mov(dst, src);
            self.b.edit(id).set_comment("load_input_vs");
        }
    }

    fn load_output(&mut self, dest: &Dest, indices: &Indices) {
        self.require_stage(IntrinsicOp::LoadOutput, Stage::Fragment);
        let index = indices.base.unwrap_or(0) + indices.component.unwrap_or(0);
        let dst = self.dest_ref(dest);
        let src = self.shader().reg_ref(RegClass::Pixout, index);
        let id = self.b.mov(dst, src);
        self.b.edit(id).set_comment("load_output_fs");
    }

    fn store_output(&mut self, src: &Src, indices: &Indices) {
        let components = if src.swizzle.is_empty() {
            self.info(src.value).num_components
        } else {
            src.swizzle.len() as u32
        };
        let component = indices.component.unwrap_or(0);

        for c in 0..components {
            let value = self.src_comp(src, c);
            let (dst, comment) = match self.b.shader.stage {
                Stage::Fragment => {
                    let index = indices.base.unwrap_or(0) + component + c;
                    (self.shader().reg_ref(RegClass::Pixout, index), "store_output_fs")
                }
                Stage::Vertex => {
                    let location = indices.location.unwrap_or(0);
                    let key = (location, component + c);
                    let Some(&index) = self.shader().build_data.vs.outputs.get(&key) else {
                        invalid(format!(
                            "store_output to undeclared output {location}.{}",
                            component + c
                        ));
                    };
                    (self.shader().reg_ref(RegClass::Vtxout, index), "store_output_vs")
                }
                stage => unsupported(format!("store_output in a {stage} shader")),
            };
            let id = self.b.mov(dst, value);
            self.b.edit(id).set_comment(comment);
        }
    }

    /// Operand of `src` covering all of its words.
    fn whole_src(&mut self, src: &Src) -> (Ref, u32, u32) {
        let bits = self.bits(src.value);
        if bits == 64 {
            return (self.value_ref(src.value), 2, 1);
        }
        let n = if src.swizzle.is_empty() {
            self.info(src.value).num_components
        } else {
            src.swizzle.len() as u32
        };
        (self.src_ref(src, n), n, n)
    }

    fn address(&mut self, src: &Src, what: &str) -> Ref {
        if self.bits(src.value) != 64 {
            invalid(format!("{what} address is not 64-bit"));
        }
        self.value_ref(src.value)
    }

    fn load_global(&mut self, dest: &Dest, addr: &Src) {
        let bits = dest.bit_size;
        if bits < 32 {
            unsupported_bits("load_global", bits);
        }
        let words = self.words(dest.value);
        let dst = self.dest_ref(dest);
        let addr = self.address(addr, "load_global");
        let id = self
            .b
            .backend(BackendOp::Ld, &[dst], &[Ref::drc(0), Ref::val(words), addr]);
        self.b
            .edit(id)
            .set_comment(format!("load_global{bits}x{}", dest.num_components));
    }

    fn store_global(&mut self, data: &Src, addr: &Src) {
        let bits = self.bits(data.value);
        if bits < 32 {
            unsupported_bits("store_global", bits);
        }
        let (value, words, components) = self.whole_src(data);
        let addr = self.address(addr, "store_global");
        let id = self.b.backend(
            BackendOp::St,
            &[],
            &[value, Ref::drc(0), Ref::val(words), Ref::val(0), addr],
        );
        self.b
            .edit(id)
            .set_comment(format!("store_global{bits}x{components}"));
    }

    /// The atomic unit reads address and data from one contiguous three-word operand.
    fn global_atomic(&mut self, dest: &Dest, srcs: &[Src], indices: &Indices) {
        let atomic = indices.atomic.unwrap_or(AtomicOp::Iadd);
        let m = match atomic {
            AtomicOp::Iadd => BackendOpMod::Iadd,
            AtomicOp::Imin => BackendOpMod::Imin,
            AtomicOp::Umin => BackendOpMod::Umin,
            AtomicOp::Imax => BackendOpMod::Imax,
            AtomicOp::Umax => BackendOpMod::Umax,
            AtomicOp::Iand => BackendOpMod::And,
            AtomicOp::Ior => BackendOpMod::Or,
            AtomicOp::Ixor => BackendOpMod::Xor,
            AtomicOp::Xchg => BackendOpMod::Xchg,
            AtomicOp::Cmpxchg | AtomicOp::Fadd => {
                unsupported(format!("atomic op {}", atomic.name()))
            }
        };
        if dest.bit_size != 32 {
            unsupported_bits("global_atomic", dest.bit_size);
        }

        let dst = self.dest_ref(dest);
        let addr = self.src64(&srcs[0]);
        let data = self.src_comp(&srcs[1], 0);

        let index = self.shader().next_ssa_idx;
        self.shader().next_ssa_idx += 1;
        let packed = self.shader().ssa_vec(3, index, 0);
        for (c, value) in [addr.lo, addr.hi, data].into_iter().enumerate() {
            let word = self.shader().ssa_vec(1, index, c as u32);
            self.b.mov(word, value);
        }

        let id = self
            .b
            .backend(BackendOp::Atomic, &[dst], &[Ref::drc(0), packed]);
        self.b.edit(id).set_mod(m.bit());
    }

    /// Value of a source that must be a compile-time constant.
    pub(super) fn require_const(&self, src: &Src, what: &str) -> u64 {
        match self.const_value(src, 0) {
            Some(value) => value,
            None => match src.value {
                Value::Ssa(i) => unsupported(format!("non-constant {what} %{i}")),
                Value::Reg(i) => unsupported(format!("non-constant {what} ${i}")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;

    use crate::core::session::DescriptorSetLayout;
    use crate::core::{BuildContext, CompilerOptions, PipelineLayout, Shader};
    use crate::ir::parse_ir;

    fn select_with(src: &str, options: CompilerOptions) -> Shader {
        let ir = parse_ir(src).unwrap();
        let arena = Bump::new();
        let ctx = BuildContext::new(&arena, options);
        super::super::select(&ctx, &ir)
    }

    fn select_src(src: &str) -> Shader {
        select_with(src, CompilerOptions::default())
    }

    /// Set 1 binding 2 lives four words into the set.
    fn driver_layout() -> PipelineLayout {
        PipelineLayout {
            desc_set_table_offset: 2,
            push_consts_offset: 10,
            num_workgroups_offset: 12,
            sets: vec![
                DescriptorSetLayout::default(),
                DescriptorSetLayout {
                    binding_offsets: [(2, 4)].into_iter().collect(),
                },
            ],
            ..PipelineLayout::default()
        }
    }

    const DRIVER_ADDRESSES: &str = "shader cs \"addresses\"\n\
                                    %0:64 = @load_vulkan_descriptor() [desc_set=1, binding=2]\n\
                                    %1:64 = @load_push_consts_base()\n\
                                    %2:64 = @load_num_workgroups_base()\n";

    #[test]
    fn test_fs_position_reads_special_registers() {
        let _ = env_logger::builder().is_test(true).try_init();
        let text = select_src(
            "shader fs \"pos\"\n\
             decl_input location=0 components=4\n\
             %0:32 = @load_input() [location=0, component=1]\n",
        )
        .to_string();
        assert!(text.contains("mov %r0, sr98 {load_input_fs_coord_y}"), "{text}");
    }

    #[test]
    fn test_smooth_input_uses_fitrp() {
        let _ = env_logger::builder().is_test(true).try_init();
        let text = select_src(
            "shader fs \"smooth\"\n\
             decl_input location=32 components=2\n\
             %0:32x2 = @load_input() [location=32, component=0]\n",
        )
        .to_string();
        assert!(
            text.contains("fitrp.pixel %r0[0..1], drc0, cf[4..11], cf[0..3], 2 {load_input_fs_smooth}"),
            "{text}"
        );
    }

    #[test]
    fn test_atomic_packs_contiguous_operand() {
        let _ = env_logger::builder().is_test(true).try_init();
        let text = select_src(
            "shader cs \"atomic\"\n\
             %0:64 = @load_push_consts_base()\n\
             %1:32 = load_const 1\n\
             %2:32 = @global_atomic(%0, %1) [atomic=umax]\n",
        )
        .to_string();
        assert!(text.contains("atomic.umax %r2, drc0, %r3[0..2]"), "{text}");
    }

    #[test]
    #[should_panic(expected = "mutex locked twice")]
    fn test_double_lock_aborts() {
        let _ = env_logger::builder().is_test(true).try_init();
        select_src("shader cs \"mutex\"\n@mutex_lock()\n@mutex_lock()\n");
    }

    #[test]
    #[should_panic(expected = "mutex released without being locked")]
    fn test_release_without_lock_aborts() {
        let _ = env_logger::builder().is_test(true).try_init();
        select_src("shader cs \"mutex\"\n@mutex_release()\n");
    }

    #[test]
    fn test_driver_addresses_follow_pipeline_layout() {
        let _ = env_logger::builder().is_test(true).try_init();
        let options = CompilerOptions {
            pipeline_layout: Some(driver_layout()),
            ..CompilerOptions::default()
        };
        let text = select_with(DRIVER_ADDRESSES, options).to_string();
        // Table pair of set 1 at 2 + 2 * 1, binding offset in bytes.
        assert!(
            text.contains("sh4, sh5, 0x10, 0x0 {load_vulkan_descriptor.1.2}"),
            "{text}"
        );
        assert!(text.contains("iadd64 "), "{text}");
        assert!(text.contains("sh10 {load_push_consts_base.lo32}"), "{text}");
        assert!(text.contains("sh11 {load_push_consts_base.hi32}"), "{text}");
        assert!(text.contains("sh12 {load_num_workgroups_base.lo32}"), "{text}");
        assert!(text.contains("sh13 {load_num_workgroups_base.hi32}"), "{text}");
    }

    #[test]
    fn test_driver_addresses_with_dummy_layout() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dummy = select_src(DRIVER_ADDRESSES).to_string();
        // Every pair starts at zero and no binding has an offset.
        assert!(
            dummy.contains("sh2, sh3, 0x0, 0x0 {load_vulkan_descriptor.1.2}"),
            "{dummy}"
        );
        assert!(dummy.contains("sh0 {load_push_consts_base.lo32}"), "{dummy}");
        assert!(dummy.contains("sh1 {load_num_workgroups_base.hi32}"), "{dummy}");

        let options = CompilerOptions {
            pipeline_layout: Some(driver_layout()),
            ..CompilerOptions::default()
        };
        let real = select_with(DRIVER_ADDRESSES, options).to_string();
        assert_ne!(dummy, real);
    }
}
