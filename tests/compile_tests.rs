//! End-to-end tests: textual IR through selection and the pass pipeline.

use bumpalo::Bump;
use rogue::core::{BuildContext, CompilerOptions, CtrlOp, DebugFlags, Op, Ref, Shader};
use rogue::ir::parse_ir;

fn compile_with(src: &str, options: CompilerOptions) -> (Shader, usize) {
    let ir = parse_ir(src).unwrap();
    let arena = Bump::new();
    let ctx = BuildContext::new(&arena, options);
    let shader = rogue::compile(&ctx, &ir);
    let compiled = ctx.stats().shaders_compiled;
    (shader, compiled)
}

fn compile(src: &str) -> Shader {
    compile_with(src, CompilerOptions::default()).0
}

fn select(src: &str) -> Shader {
    let ir = parse_ir(src).unwrap();
    let arena = Bump::new();
    let ctx = BuildContext::new(&arena, CompilerOptions::default());
    rogue::isel::select(&ctx, &ir)
}

fn ctrl_count(shader: &Shader, op: CtrlOp) -> usize {
    shader
        .instrs_in_order()
        .into_iter()
        .filter(|&id| shader.instr(id).op == Op::Ctrl(op))
        .count()
}

/// Instructions reading or writing the execution mask counter.
fn emc_count(shader: &Shader) -> usize {
    shader
        .instrs_in_order()
        .into_iter()
        .filter(|&id| {
            let instr = shader.instr(id);
            instr
                .dsts
                .iter()
                .chain(&instr.srcs)
                .any(|operand| matches!(operand.r, Ref::Emc))
        })
        .count()
}

const FADD: &str = "shader fs \"add\"\n\
                    %0:32 = @load_preamble() [base=0]\n\
                    %1:32 = @load_preamble() [base=1]\n\
                    %2:32 = fadd %0, %1\n\
                    @store_output(%2) [base=0, component=0]\n";

#[test]
fn test_fadd_and_store() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (shader, compiled) = compile_with(FADD, CompilerOptions::default());
    assert_eq!(compiled, 1);
    assert!(shader.is_grouped);

    let text = shader.to_string();
    assert!(text.contains("mbyp r0, sh0"), "{text}");
    assert!(text.contains("mbyp r1, sh1"), "{text}");
    assert!(text.contains("fadd r2, r0, r1 {fadd}"), "{text}");
    assert!(text.contains("mbyp.end o0, r2"), "{text}");
    assert!(!text.contains(": end"), "{text}");
    assert_eq!(shader.build_data.temps, 3);
}

#[test]
fn test_empty_shader_ends_with_nop() {
    let _ = env_logger::builder().is_test(true).try_init();
    let shader = compile("shader cs \"empty\"\n");
    let text = shader.to_string();
    assert!(text.contains("{ (control: ctrl) end"), "{text}");
    assert!(text.contains("0: nop.end"), "{text}");
    assert_eq!(shader.build_data.temps, 0);
}

#[test]
fn test_if_else_mask_counter() {
    let _ = env_logger::builder().is_test(true).try_init();
    let src = "shader fs \"if\"\n\
               decl_reg $0\n\
               %0:32 = @load_preamble() [base=0]\n\
               if %0 {\n  $0 = mov %0\n} else {\n  $0 = fneg %0\n}\n\
               @store_output($0) [base=0, component=0]\n";

    let selected = select(src);
    // One initialization, one entry into the if, one flip and one restore.
    assert_eq!(ctrl_count(&selected, CtrlOp::Cndst), 2);
    assert_eq!(ctrl_count(&selected, CtrlOp::Cndef), 1);
    assert_eq!(ctrl_count(&selected, CtrlOp::Cndend), 1);
    let text = selected.to_string();
    assert!(text.contains("cndst.always pe, emc, 0x0, 1 {cf_init}"), "{text}");
    assert!(text.contains("setpred p0, %r0"), "{text}");

    let shader = compile(src);
    assert_eq!(ctrl_count(&shader, CtrlOp::Cndst), 2);
    assert_eq!(ctrl_count(&shader, CtrlOp::Cndend), 1);
    // The front-end register keeps r0; the SSA value goes next to it.
    let text = shader.to_string();
    assert!(text.contains("mbyp r0, r1"), "{text}");
    assert!(text.contains("mbyp r0, r1.neg"), "{text}");
    assert!(text.contains("mbyp.end o0, r0"), "{text}");
}

#[test]
fn test_dont_flatten_adds_skip_branches() {
    let _ = env_logger::builder().is_test(true).try_init();
    let src = "shader fs \"if\"\n\
               decl_reg $0\n\
               %0:32 = @load_preamble() [base=0]\n\
               if %0 [dont_flatten] {\n  $0 = mov %0\n} else {\n  $0 = fneg %0\n}\n";
    let selected = select(src);
    assert_eq!(ctrl_count(&selected, CtrlOp::Br), 2);
    assert!(selected.to_string().contains("br.allinst"));

    let flat = select(&src.replace(" [dont_flatten]", ""));
    assert_eq!(ctrl_count(&flat, CtrlOp::Br), 0);
}

#[test]
fn test_loop_jumps_park_lanes() {
    let _ = env_logger::builder().is_test(true).try_init();
    let src = "shader cs \"loop\"\n\
               %0:32 = @load_preamble() [base=0]\n\
               loop {\n  if %0 {\n    break\n  }\n  continue\n}\n";

    let text = select(src).to_string();
    // Break inside one if: nesting 1, parked at nesting + 2.
    assert!(text.contains("mov emc, 0x3 {break}"), "{text}");
    assert!(text.contains("mov emc, 0x1 {continue}"), "{text}");
    assert!(text.contains("cndst.always pe, emc, emc, 2 {loop_init}"), "{text}");
    assert!(text.contains("cndlt.always pe, emc, p0, emc, 2 {loop_test}"), "{text}");

    let shader = compile(src);
    assert!(shader.is_grouped);
    let text = shader.to_string();
    assert!(text.contains("mbyp emc, sc3 {break}"), "{text}");
    assert!(text.contains("mbyp emc, sc1 {continue}"), "{text}");
}

#[test]
fn test_swapped_if_else_costs_the_same() {
    let _ = env_logger::builder().is_test(true).try_init();
    let branches = |cmp: &str, first: &str, second: &str| {
        format!(
            "shader fs \"if\"\n\
             decl_reg $0\n\
             %0:32 = @load_preamble() [base=0]\n\
             %1:32 = @load_preamble() [base=1]\n\
             %2:32 = {cmp} %0, %1\n\
             if %2 {{\n  $0 = {first} %0\n}} else {{\n  $0 = {second} %0\n}}\n\
             @store_output($0) [base=0, component=0]\n"
        )
    };
    let straight = branches("ieq", "mov", "fneg");
    let swapped = branches("ine", "fneg", "mov");

    for (a, b) in [
        (select(&straight), select(&swapped)),
        (compile(&straight), compile(&swapped)),
    ] {
        for op in [CtrlOp::Cndst, CtrlOp::Cndef, CtrlOp::Cndend] {
            assert_eq!(ctrl_count(&a, op), ctrl_count(&b, op), "{op:?}");
        }
        assert_eq!(emc_count(&a), emc_count(&b), "{a}\n{b}");
        assert!(emc_count(&a) > 0);
    }
}

#[test]
fn test_unconditional_break_parks_lanes_two_levels_out() {
    let _ = env_logger::builder().is_test(true).try_init();
    let src = "shader cs \"brk\"\nloop {\n  break\n}\n";

    let text = select(src).to_string();
    // Not nested in any if: nesting 0, parked at 0 + 2.
    assert!(text.contains("mov emc, 0x2 {break}"), "{text}");
    assert!(!text.contains("{continue}"), "{text}");

    let shader = compile(src);
    let text = shader.to_string();
    assert!(text.contains("mbyp emc, sc2 {break}"), "{text}");
    assert!(text.contains("{loop_test}"), "{text}");
}

#[test]
fn test_load_const_64_splits_words() {
    let _ = env_logger::builder().is_test(true).try_init();
    let text = select(
        "shader cs \"c64\"\n\
         %0:64 = load_const 0x0123456789abcdef\n",
    )
    .to_string();
    assert!(text.contains("0x89abcdef {load_const_64.lo32}"), "{text}");
    assert!(text.contains("0x1234567 {load_const_64.hi32}"), "{text}");
}

#[test]
fn test_gather_texel_order() {
    let _ = env_logger::builder().is_test(true).try_init();
    let text = select(
        "shader fs \"tg4\"\n\
         %0:32 = @load_preamble() [base=0]\n\
         %1:32 = @load_preamble() [base=1]\n\
         %2:32x2 = vec2 %0, %1\n\
         %3:32x4 = tex.tg4(coord=%2) [component=2]\n",
    )
    .to_string();
    // Texels come back in (2, 3, 1, 0) order, four channels each.
    for (dst, src) in [(0, 10), (1, 14), (2, 6), (3, 2)] {
        let line = format!("mov %r3[{dst}], %r4[{src}]");
        assert!(text.contains(&line), "missing {line} in {text}");
    }
}

#[test]
fn test_dead_code_pass_is_idempotent() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut shader = select(
        "shader fs \"dce\"\n\
         %0:32 = @load_preamble() [base=0]\n\
         %1:32 = fmul %0, %0\n\
         %2:32 = fadd %1, %0\n\
         @store_output(%0) [base=0, component=0]\n",
    );
    let arena = Bump::new();
    let ctx = BuildContext::new(&arena, CompilerOptions::default());
    let before = shader.num_instrs();

    assert!(rogue::passes::dce(&ctx, &mut shader));
    shader.renumber();
    let once = shader.to_string();
    assert_eq!(shader.num_instrs(), before - 2);
    assert!(!once.contains("fmul"), "{once}");

    assert!(!rogue::passes::dce(&ctx, &mut shader));
    shader.renumber();
    assert_eq!(shader.to_string(), once);
}

#[test]
#[should_panic(expected = "Unsupported conversion from float64x1 -> float32x1")]
fn test_unsupported_conversion_aborts() {
    select(
        "shader cs \"conv\"\n\
         %0:64 = load_const 0\n\
         %1:32 = f2f32 %0\n",
    );
}

#[test]
fn test_debug_flags_reach_the_pipeline() {
    let _ = env_logger::builder().is_test(true).try_init();
    let options = CompilerOptions {
        debug: DebugFlags::parse("vld_nonfatal,ir_details"),
        ..CompilerOptions::default()
    };
    let (shader, _) = compile_with(FADD, options);
    let text = shader.display(true).to_string();
    assert!(text.contains("regs:"), "{text}");
    assert!(text.contains("r2 (temp, uses 1, writes 1)"), "{text}");
}
