//! Instruction dispatch

use sq_core::ExecError;

use crate::instructions::texture::TexModifier;
use crate::instructions::{alu, control, memory, texture};
use crate::machine::Machine;
use crate::tokens::{Instruction, Opcode};

/// What the run loop should do after an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// BARRIER or MEMBAR was executed
    Barrier,
}

/// Execute one instruction. The pc is advanced before dispatch so that
/// jumps simply overwrite it.
pub fn execute(mach: &mut Machine, inst: &Instruction) -> Result<Step, ExecError> {
    mach.pc += 1;

    match inst.opcode {
        Opcode::Nop | Opcode::Bgnsub => {}
        Opcode::End => mach.pc = -1,

        Opcode::If => control::if_(mach, inst)?,
        Opcode::Uif => control::uif(mach, inst)?,
        Opcode::Else => control::else_(mach, inst)?,
        Opcode::Endif => control::endif(mach)?,
        Opcode::Bgnloop => control::bgnloop(mach)?,
        Opcode::Endloop => control::endloop(mach)?,
        Opcode::Brk => control::brk(mach)?,
        Opcode::Cont => control::cont(mach)?,
        Opcode::Switch => control::switch(mach, inst)?,
        Opcode::Case => control::case(mach, inst)?,
        Opcode::Default => control::default(mach)?,
        Opcode::Endswitch => control::endswitch(mach)?,
        Opcode::Cal => control::cal(mach, inst)?,
        Opcode::Ret => control::ret(mach)?,
        Opcode::Endsub => control::endsub(mach)?,
        Opcode::Kill => control::kill(mach)?,
        Opcode::KillIf => control::kill_if(mach, inst)?,
        Opcode::Barrier | Opcode::Membar => return Ok(Step::Barrier),

        Opcode::Tex => texture::tex(mach, inst, TexModifier::None, 1)?,
        Opcode::Txp => texture::tex(mach, inst, TexModifier::Projected, 1)?,
        Opcode::Txb => texture::tex(mach, inst, TexModifier::Bias, 1)?,
        Opcode::Txl => texture::tex(mach, inst, TexModifier::Explicit, 1)?,
        Opcode::TexLz => texture::tex(mach, inst, TexModifier::LevelZero, 1)?,
        Opcode::Tg4 => texture::tex(mach, inst, TexModifier::Gather, 2)?,
        Opcode::Tex2 => texture::tex(mach, inst, TexModifier::None, 2)?,
        Opcode::Txb2 => texture::tex(mach, inst, TexModifier::Bias, 2)?,
        Opcode::Txl2 => texture::tex(mach, inst, TexModifier::Explicit, 2)?,
        Opcode::Txd => texture::txd(mach, inst)?,
        Opcode::Txf => texture::txf(mach, inst)?,
        Opcode::Txq => texture::txq(mach, inst)?,
        Opcode::Lodq => texture::lodq(mach, inst)?,

        Opcode::Load => memory::load(mach, inst)?,
        Opcode::Store => memory::store(mach, inst)?,
        Opcode::Resq => memory::resq(mach, inst)?,
        op if op.is_atomic() => memory::atomic(mach, inst)?,

        op => {
            if !alu::execute(mach, inst)? {
                return Err(ExecError::invalid(
                    (mach.pc - 1).max(0) as usize,
                    format!("unhandled opcode {op:?}"),
                ));
            }
        }
    }
    Ok(Step::Continue)
}
