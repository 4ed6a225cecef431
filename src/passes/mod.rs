// This module runs the pass pipeline that turns a freshly selected shader into a register
// allocated, grouped one. Passes are plain functions over the shader returning whether they
// changed anything, listed in a fixed table and executed in order: constant rematerialization,
// copy propagation and dead code elimination on the SSA form, ST operand packing, pseudo op
// lowering (followed by a second constant pass for the immediates lowering introduces),
// WDF and UVSW scheduling, block and register trimming, register allocation, late lowering
// that depends on physical registers, a final dead code pass and issue group construction.
// The shader is validated before the first pass, after every pass that made progress and
// after the last one; with `ir_passes` the shader is printed after each progressing pass.

//! The pass pipeline.

mod constreg;
mod copy_prop;
mod dce;
mod lower_late_ops;
mod lower_pseudo_ops;
mod regalloc;
mod schedule_instr_groups;
mod schedule_st_regs;
mod schedule_uvsw;
mod schedule_wdf;
mod trim;

pub use constreg::constreg;
pub use copy_prop::copy_prop;
pub use dce::dce;
pub use lower_late_ops::lower_late_ops;
pub use lower_pseudo_ops::lower_pseudo_ops;
pub use regalloc::regalloc;
pub use schedule_instr_groups::schedule_instr_groups;
pub use schedule_st_regs::schedule_st_regs;
pub use schedule_uvsw::schedule_uvsw;
pub use schedule_wdf::schedule_wdf;
pub use trim::{trim, trim_empty_blocks};

use crate::core::{BuildContext, Shader};
use crate::validate::validate;

/// A whole-shader pass; returns true when it changed the shader.
pub type Pass = fn(&BuildContext<'_>, &mut Shader) -> bool;

/// Passes in execution order.
pub const PIPELINE: &[(&str, Pass)] = &[
    ("constreg", constreg),
    ("copy_prop", copy_prop),
    ("dce", dce),
    ("schedule_st_regs", schedule_st_regs),
    ("lower_pseudo_ops", lower_pseudo_ops),
    ("constreg", constreg),
    ("schedule_wdf", schedule_wdf),
    ("schedule_uvsw", schedule_uvsw),
    ("trim", trim),
    ("regalloc", regalloc),
    ("lower_late_ops", lower_late_ops),
    ("dce", dce),
    ("schedule_instr_groups", schedule_instr_groups),
];

/// Runs the whole pipeline on `shader`.
pub fn run(ctx: &BuildContext<'_>, shader: &mut Shader) {
    validate(ctx, shader, "before passes");

    let debug = ctx.debug();
    for &(name, pass) in PIPELINE {
        let progress = pass(ctx, shader);
        ctx.record_pass(progress);
        log::debug!(
            "pass {name}: {}",
            if progress { "progress" } else { "no progress" }
        );
        if !progress {
            continue;
        }

        shader.renumber();
        if debug.ir_passes {
            eprintln!("after {name}:\n{}", shader.display(debug.ir_details));
        }
        validate(ctx, shader, &format!("after {name}"));
    }

    validate(ctx, shader, "after passes");
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;
    use bumpalo::Bump;

    use crate::core::CompilerOptions;

    #[test]
    fn test_pipeline_grouped_and_allocated() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = select(
            "shader fs \"add\"\n\
             %0:32 = @load_preamble() [base=0]\n\
             %1:32 = @load_preamble() [base=1]\n\
             %2:32 = fadd %0, %1\n\
             @store_output(%2) [base=0, component=0]\n",
        );
        let arena = Bump::new();
        let ctx = BuildContext::new(&arena, CompilerOptions::default());
        run(&ctx, &mut shader);

        assert!(shader.is_grouped);
        let out = text(&shader);
        assert!(!out.contains("%r"), "{out}");
        assert!(out.contains("fadd"), "{out}");
        assert!(out.contains("mbyp.end o0, r"), "{out}");
        assert_eq!(ctx.stats().passes_run, PIPELINE.len());
    }
}
