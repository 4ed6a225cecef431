// Issue group construction, the last pass. Every instruction starts a group; an instruction
// flagged to group with its successor pulls that successor into the same group. A group takes its
// ALU kind and execution condition from its first instruction, its repeat from the widest
// instruction, and ends its block when any member carries the end flag. Members must run on one
// ALU kind and occupy strictly ascending phases; anything else is an invalid chain. Once grouped
// the shader is final, so the build data that depends on the final code is collected here.

use crate::core::error::invalid;
use crate::core::{BuildContext, GroupHeader, InstrGroup, InstrId, Shader};
use crate::isel::collect_late_build_data;

pub fn schedule_instr_groups(_ctx: &BuildContext<'_>, shader: &mut Shader) -> bool {
    if shader.is_grouped {
        return false;
    }

    let mut groups = Vec::new();
    for &block in shader.layout() {
        let mut chain: Vec<InstrId> = Vec::new();
        for &id in &shader.block(block).instrs {
            chain.push(id);
            if !shader.instr(id).group_next {
                groups.push(group(shader, std::mem::take(&mut chain)));
            }
        }
        if !chain.is_empty() {
            invalid(format!(
                "issue chain runs past the end of block{}",
                shader.block(block).index
            ));
        }
    }

    log::debug!(
        "schedule_instr_groups: {} group(s) from {} instruction(s)",
        groups.len(),
        shader.num_instrs()
    );
    shader.groups = groups;
    shader.is_grouped = true;
    collect_late_build_data(shader);
    true
}

fn group(shader: &Shader, instrs: Vec<InstrId>) -> InstrGroup {
    let first = shader.instr(instrs[0]);
    let alu = first.phase().alu_type();
    let mut phases = Vec::with_capacity(instrs.len());
    let mut end = false;
    let mut repeat = 1;

    for &id in &instrs {
        let instr = shader.instr(id);
        let phase = instr.phase();
        if phase.alu_type() != alu {
            invalid(format!(
                "{} cannot share a {alu} group",
                shader.display_instr(id)
            ));
        }
        if phases.last().is_some_and(|&last| last >= phase) {
            invalid(format!(
                "{} is out of phase order in its group",
                shader.display_instr(id)
            ));
        }
        phases.push(phase);
        end |= instr.end;
        repeat = repeat.max(instr.repeat);
    }

    InstrGroup {
        header: GroupHeader {
            alu,
            phases,
            end,
            exec_cond: first.exec_cond,
            repeat,
        },
        block: first.block,
        instrs,
    }
}
