// A vertex shader hands its outputs to the next stage by emitting the USC vertex store buffer
// and ending the task. The emit goes right before END, after every output has been written.

use crate::core::{BackendOp, BuildContext, CtrlOp, Cursor, Op, Shader, Stage};

pub fn schedule_uvsw(_ctx: &BuildContext<'_>, shader: &mut Shader) -> bool {
    if shader.stage != Stage::Vertex {
        return false;
    }

    let ends: Vec<_> = shader
        .instrs_in_order()
        .into_iter()
        .filter(|&id| shader.instr(id).op == Op::Ctrl(CtrlOp::End))
        .collect();
    for &end in &ends {
        let emit = shader.insert_instr(
            Cursor::Before(end),
            Op::Backend(BackendOp::UvswEmitthenendtask),
            &[],
            &[],
        );
        let cond = shader.instr(end).exec_cond;
        shader.edit(emit).set_exec_cond(cond);
    }

    !ends.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::test_util::{run_pass, select, text};

    #[test]
    fn test_vertex_shader_emits_before_end() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = select("shader vs \"emit\"\n");
        assert!(run_pass(&mut shader, schedule_uvsw));
        let out = text(&shader);
        let emit = out.find("uvsw.emitthenendtask").unwrap();
        let end = out.find(": end").unwrap();
        assert!(emit < end, "{out}");
    }

    #[test]
    fn test_other_stages_untouched() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut shader = select("shader fs \"emit\"\n");
        assert!(!run_pass(&mut shader, schedule_uvsw));
        assert!(!text(&shader).contains("uvsw"));
    }
}
