//! Rogue - shader compiler backend for PowerVR Rogue GPUs.
//!
//! Takes one shader in the structured SSA input IR ([`ir`]) and produces the
//! backend's own instruction form: instruction selection with the execution
//! mask counter control-flow lowering ([`isel`]), a fixed pipeline of
//! optimization and lowering passes ending in register allocation and issue
//! grouping ([`passes`]), and an invariant checker run between passes
//! ([`validate`]).
//!
//! # Primary Usage
//!
//! ```ignore
//! use bumpalo::Bump;
//! use rogue::core::{BuildContext, CompilerOptions};
//! use rogue::ir::parse_ir;
//!
//! let ir = parse_ir(&source)?;
//! let arena = Bump::new();
//! let ctx = BuildContext::new(&arena, CompilerOptions::from_env());
//! let shader = rogue::compile(&ctx, &ir);
//! println!("{shader}");
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Shader model: registers, instructions, op tables, builder, printing
//! - [`ir`] - Input IR, its text parser and the filetest checker
//! - [`isel`] - Input IR to Rogue instructions
//! - [`passes`] - The pass pipeline
//! - [`validate`] - Shader invariant checks
//!
//! Errors inside the compiler are abort-class: unsupported input and
//! invalid shaders are logged and panic with a [`core::CompileError`]
//! message, leaving no partial output.

pub mod core;
pub mod ir;
pub mod isel;
pub mod passes;
pub mod validate;

pub use core::{BuildContext, CompileError, CompilerOptions, Shader};
pub use ir::{parse_ir, IrShader};

/// Compiles `ir` through selection and the full pass pipeline.
pub fn compile(ctx: &BuildContext<'_>, ir: &IrShader) -> Shader {
    let debug = ctx.debug();
    if debug.nir {
        eprintln!("{ir}");
    }

    let mut shader = isel::select(ctx, ir);
    passes::run(ctx, &mut shader);

    if debug.ir {
        eprintln!("{}", shader.display(debug.ir_details));
    }
    ctx.record_shader_compiled(shader.num_instrs(), shader.build_data.temps);
    log::info!(
        "compiled {} shader \"{}\": {} instructions, {} temps",
        shader.stage,
        shader.name,
        shader.num_instrs(),
        shader.build_data.temps
    );
    shader
}
