// Trimming drops what the shader no longer needs before registers are allocated. Empty blocks
// are removed from the layout, with any branch that targeted one redirected to the block that
// follows it. Register arrays none of whose registers is read or written are deleted from the
// register file, then free-standing registers with empty use lists. An array stays as long as
// any member is live since it is what keeps its members contiguous.

use crate::core::error::invalid;
use crate::core::{BlockId, BuildContext, RegId, RegarrayId, Shader};

/// Removes empty blocks, retargeting branches to the following block.
pub fn trim_empty_blocks(shader: &mut Shader) -> bool {
    let empty: Vec<BlockId> = shader
        .layout()
        .iter()
        .copied()
        .filter(|&b| shader.block(b).instrs.is_empty())
        .collect();

    for &block in &empty {
        let uses = shader.block(block).uses.clone();
        if !uses.is_empty() {
            let Some(next) = shader.next_block(block) else {
                invalid(format!(
                    "branch to empty block {} at the end of the shader",
                    shader.block(block).index
                ));
            };
            for br in uses {
                shader.set_target(br, next);
            }
        }
        shader.delete_block(block);
    }

    if !empty.is_empty() {
        log::trace!("trimmed {} empty block(s)", empty.len());
    }
    !empty.is_empty()
}

pub fn trim(_ctx: &BuildContext<'_>, shader: &mut Shader) -> bool {
    let mut progress = trim_empty_blocks(shader);

    let regarrays: Vec<RegarrayId> = shader
        .regs
        .live_regarrays()
        .filter(|(_, ra)| {
            ra.regs.iter().all(|&reg| {
                let reg = shader.regs.reg(reg);
                reg.uses.is_empty() && reg.writes.is_empty()
            })
        })
        .map(|(id, _)| id)
        .collect();
    for &id in &regarrays {
        shader.regs.delete_regarray(id);
    }

    let regs: Vec<RegId> = shader
        .regs
        .live_regs()
        .filter(|(_, r)| r.regarray.is_none() && r.uses.is_empty() && r.writes.is_empty())
        .map(|(id, _)| id)
        .collect();
    for &id in &regs {
        shader.regs.delete_reg(id);
    }

    log::trace!(
        "trim: {} regarray(s), {} register(s) deleted",
        regarrays.len(),
        regs.len()
    );
    progress |= !regarrays.is_empty() || !regs.is_empty();
    shader.renumber();
    progress
}
