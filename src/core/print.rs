// This module renders shaders as text. The dump is stable and used both for debugging (the
// ROGUE_DEBUG ir/ir_passes switches) and by the file tests, which match CHECK lines against it.
// Each block prints as `blockN:` (with its label in parentheses), followed by one instruction per
// line: index, non-default execution condition, opcode with op modifier suffixes, end/atom flags
// and repeat, destination and source operands with their modifier suffixes, the branch target
// and the provenance comment in braces. Grouped shaders wrap each issue group in braces with its
// header. With details enabled the register and register array tables follow the blocks.

//! Textual shader dump.

use std::fmt;

use super::instr::{ExecCond, Instr, InstrId, Operand};
use super::op_info::{mod_suffix, DstMod, Op, SrcMod};
use super::register_file::{decode_ssa_vec_index, RegClass, RegId};
use super::shader::{BlockId, Shader};
use super::value_ref::Ref;

/// Display adapter for one operand ref.
pub struct RefDisplay<'a> {
    pub shader: &'a Shader,
    pub r: Ref,
}

fn write_reg(f: &mut fmt::Formatter<'_>, shader: &Shader, reg: RegId) -> fmt::Result {
    let r = shader.regs.reg(reg);
    let prefix = r.class.info().prefix;
    match (r.class, decode_ssa_vec_index(r.index)) {
        (RegClass::Ssa, Some((index, component))) => write!(f, "{prefix}{index}.{component}"),
        _ => write!(f, "{prefix}{}", r.index),
    }
}

impl fmt::Display for RefDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.r {
            Ref::Unset => f.write_str("<unset>"),
            Ref::None => f.write_str("_"),
            Ref::Reg(reg) => write_reg(f, self.shader, reg),
            Ref::Regarray(ra) => {
                let ra = self.shader.regs.regarray(ra);
                let prefix = ra.class.info().prefix;
                let (name, first) = match (ra.class, decode_ssa_vec_index(ra.start)) {
                    (RegClass::Ssa, Some((index, component))) => (format!("{prefix}{index}"), component),
                    _ => (prefix.to_string(), ra.start),
                };
                if ra.size == 1 {
                    write!(f, "{name}[{first}]")
                } else {
                    write!(f, "{name}[{first}..{}]", first + ra.size - 1)
                }
            }
            Ref::Imm(value) => write!(f, "0x{value:x}"),
            Ref::Io(io) => write!(f, "{io}"),
            Ref::Drc(n) => write!(f, "drc{n}"),
            Ref::Val(n) => write!(f, "{n}"),
            Ref::Emc => f.write_str("emc"),
            Ref::RegIndexed { reg, index } => {
                write_reg(f, self.shader, reg)?;
                write!(f, "[idx{index}]")
            }
        }
    }
}

fn block_name(shader: &Shader, block: BlockId) -> String {
    format!("block{}", shader.block(block).index)
}

/// Display adapter for one instruction.
pub struct InstrDisplay<'a> {
    pub shader: &'a Shader,
    pub id: InstrId,
}

impl InstrDisplay<'_> {
    fn write_operand(&self, f: &mut fmt::Formatter<'_>, op: &Operand, dst: bool, alu: bool) -> fmt::Result {
        write!(f, "{}", RefDisplay { shader: self.shader, r: op.r })?;
        if alu && op.mods != 0 {
            let suffix = if dst {
                mod_suffix::<DstMod>(op.mods)
            } else {
                mod_suffix::<SrcMod>(op.mods)
            };
            f.write_str(&suffix)?;
        }
        Ok(())
    }
}

impl fmt::Display for InstrDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instr: &Instr = self.shader.instr(self.id);
        write!(f, "{}: ", instr.index)?;
        if instr.exec_cond != ExecCond::PeTrue {
            write!(f, "{} ", instr.exec_cond.name())?;
        }
        write!(f, "{}{}", instr.op, instr.op.op_mod_suffix(instr.mods))?;
        if instr.end {
            f.write_str(".end")?;
        }
        if instr.atom {
            f.write_str(".atom")?;
        }
        if instr.repeat > 1 {
            write!(f, ".r{}", instr.repeat)?;
        }

        let alu = matches!(instr.op, Op::Alu(_));
        let mut first = true;
        for (operands, dst) in [(&instr.dsts, true), (&instr.srcs, false)] {
            for op in operands.iter() {
                f.write_str(if first { " " } else { ", " })?;
                first = false;
                self.write_operand(f, op, dst, alu)?;
            }
        }
        if let Some(target) = instr.target {
            write!(f, "{}{}", if first { " " } else { ", " }, block_name(self.shader, target))?;
        }
        if instr.group_next && !self.shader.is_grouped {
            f.write_str(" +")?;
        }
        if let Some(comment) = &instr.comment {
            write!(f, " {{{comment}}}")?;
        }
        Ok(())
    }
}

/// Display adapter with optional register tables.
pub struct ShaderDisplay<'a> {
    pub shader: &'a Shader,
    pub details: bool,
}

impl ShaderDisplay<'_> {
    fn write_block_header(&self, f: &mut fmt::Formatter<'_>, block: BlockId) -> fmt::Result {
        let b = self.shader.block(block);
        match &b.label {
            Some(label) => writeln!(f, "{} ({label}):", block_name(self.shader, block)),
            None => writeln!(f, "{}:", block_name(self.shader, block)),
        }
    }

    fn write_details(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shader = self.shader;
        writeln!(f, "regs:")?;
        for class in RegClass::ALL {
            for &reg in shader.regs.class_regs(class) {
                let r = shader.regs.reg(reg);
                writeln!(
                    f,
                    "  {} ({}, uses {}, writes {})",
                    RefDisplay { shader, r: Ref::Reg(reg) },
                    class.name(),
                    r.uses.len(),
                    r.writes.len()
                )?;
            }
        }
        writeln!(f, "regarrays:")?;
        for (id, ra) in shader.regs.live_regarrays() {
            write!(f, "  {}", RefDisplay { shader, r: Ref::Regarray(id) })?;
            if let Some(parent) = ra.parent {
                write!(f, " (parent {})", RefDisplay { shader, r: Ref::Regarray(parent) })?;
            }
            writeln!(f, " uses {}, writes {}", ra.uses.len(), ra.writes.len())?;
        }
        Ok(())
    }
}

impl fmt::Display for ShaderDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shader = self.shader;
        writeln!(f, "{} shader \"{}\"", shader.stage, shader.name)?;

        if shader.is_grouped {
            let mut current = None;
            for group in &shader.groups {
                if current != Some(group.block) {
                    self.write_block_header(f, group.block)?;
                    current = Some(group.block);
                }
                let h = &group.header;
                let phases: Vec<&str> = h.phases.iter().map(|p| p.name()).collect();
                write!(f, "  {{ ({}: {})", h.alu, phases.join(", "))?;
                if h.exec_cond != ExecCond::PeTrue {
                    write!(f, " {}", h.exec_cond.name())?;
                }
                if h.repeat > 1 {
                    write!(f, " r{}", h.repeat)?;
                }
                if h.end {
                    f.write_str(" end")?;
                }
                writeln!(f)?;
                for &id in &group.instrs {
                    writeln!(f, "    {}", InstrDisplay { shader, id })?;
                }
                writeln!(f, "  }}")?;
            }
        } else {
            for &block in shader.layout() {
                self.write_block_header(f, block)?;
                for &id in &shader.block(block).instrs {
                    writeln!(f, "  {}", InstrDisplay { shader, id })?;
                }
            }
        }

        if self.details {
            self.write_details(f)?;
        }
        Ok(())
    }
}

impl Shader {
    pub fn display(&self, details: bool) -> ShaderDisplay<'_> {
        ShaderDisplay {
            shader: self,
            details,
        }
    }

    pub fn display_ref(&self, r: Ref) -> RefDisplay<'_> {
        RefDisplay { shader: self, r }
    }

    pub fn display_instr(&self, id: InstrId) -> InstrDisplay<'_> {
        InstrDisplay { shader: self, id }
    }
}

impl fmt::Display for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::{Builder, Cursor};
    use crate::core::op_info::{AluOp, CtrlOp};
    use crate::core::shader::Stage;

    #[test]
    fn test_print_instructions() {
        let mut shader = Shader::new(Stage::Fragment, "print");
        let block = shader.push_block_after(None, None);
        let (a, b, c) = (shader.ssa(0), shader.ssa(1), shader.ssa(2));
        let vec = shader.ssa_vec(4, 3, 0);
        let x = shader.ssa_vec(1, 3, 2);
        let sh = shader.regarray_ref(2, RegClass::Shared, 4);

        let mut builder = Builder::new(&mut shader, Cursor::BlockEnd(block));
        let fadd = builder.alu(AluOp::Fadd, &[c], &[a, b]);
        builder.edit(fadd).set_src_mod(1, SrcMod::Neg.bit()).set_comment("fadd");
        builder.mov(x, sh);
        builder.mov(vec, Ref::imm(0x89ab_cdef));
        builder.ctrl(CtrlOp::End, &[], &[]);
        shader.renumber();

        let text = shader.to_string();
        assert!(text.contains("fs shader \"print\""), "{text}");
        assert!(text.contains("0: fadd %r2, %r0, %r1.neg {fadd}"), "{text}");
        assert!(text.contains("1: mov %r3[2], sh[4..5]"), "{text}");
        assert!(text.contains("2: mov %r3[0..3], 0x89abcdef"), "{text}");
        assert!(text.contains("3: end"), "{text}");
    }

    #[test]
    fn test_print_vec_component_reg() {
        let mut shader = Shader::new(Stage::Fragment, "print");
        let vec = shader.ssa_vec(2, 7, 0);
        let member = shader.regs.regarray(vec.as_regarray().unwrap()).regs[1];
        assert_eq!(shader.display_ref(Ref::Reg(member)).to_string(), "%r7.1");
    }
}
