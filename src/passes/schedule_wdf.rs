// Data fence scheduling. Backend instructions that go through a data return channel complete
// asynchronously; before anything reads what they wrote the shader has to wait on that channel
// with WDF. The fence goes right before the first later instruction in the same block that
// reads one of the destination registers (before the start of its issue chain), and otherwise
// before the block's terminator, so no access is left outstanding across a block boundary.

use crate::core::{BuildContext, CtrlOp, Cursor, InstrId, Op, Ref, RegId, Shader};

use super::constreg::chain_head;

pub fn schedule_wdf(_ctx: &BuildContext<'_>, shader: &mut Shader) -> bool {
    let mut progress = false;

    for id in shader.instrs_in_order() {
        let instr = shader.instr(id);
        if !matches!(instr.op, Op::Backend(_)) {
            continue;
        }
        let Some(drc) = instr.srcs.iter().find_map(|s| s.r.as_drc()) else {
            continue;
        };

        let written: Vec<RegId> = instr
            .dsts
            .iter()
            .flat_map(|d| shader.ref_regs(d.r))
            .collect();
        let cursor = match first_reader(shader, id, &written) {
            Some(reader) => Cursor::Before(chain_head(shader, reader)),
            None => block_exit(shader, id),
        };

        shader.insert_instr(cursor, Op::Ctrl(CtrlOp::Wdf), &[], &[Ref::drc(drc)]);
        log::trace!("schedule_wdf: drc{drc} fence for {}", shader.display_instr(id));
        progress = true;
    }

    progress
}

/// First instruction after `id` in its block that reads any of `regs`.
fn first_reader(shader: &Shader, id: InstrId, regs: &[RegId]) -> Option<InstrId> {
    if regs.is_empty() {
        return None;
    }
    let block = &shader.block(shader.instr(id).block).instrs;
    let pos = shader.position_in_block(id);
    block[pos + 1..].iter().copied().find(|&next| {
        shader
            .instr(next)
            .srcs
            .iter()
            .any(|s| shader.ref_regs(s.r).iter().any(|r| regs.contains(r)))
    })
}

/// Insertion point at the end of `id`'s block, ahead of its terminator.
fn block_exit(shader: &Shader, id: InstrId) -> Cursor {
    let block = shader.instr(id).block;
    match shader.block(block).instrs.last() {
        Some(&last) if shader.instr(last).is_block_end() && last != id => {
            Cursor::Before(chain_head(shader, last))
        }
        _ => Cursor::BlockEnd(block),
    }
}
