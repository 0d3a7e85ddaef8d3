//! Flow control instructions
//!
//! Divergence is handled entirely with lane masks. A branch only moves the
//! pc when no lane wants the code being skipped; otherwise execution falls
//! through with the masks narrowed.

use sq_core::ExecError;

use crate::machine::{DataType, Machine};
use crate::stacks::{BreakType, CallRecord};
use crate::tokens::Instruction;
use crate::vector::{CHAN_X, QUAD_SIZE};

fn jump(mach: &mut Machine, inst: &Instruction) {
    if let Some(label) = inst.label {
        mach.pc = label as i32;
    }
}

/// If (float) - IF src0.x
pub fn if_(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    mach.cond_stack.push(mach.cond_mask)?;
    let cond = mach.fetch(inst, 0, CHAN_X, DataType::Float);
    for lane in 0..QUAD_SIZE {
        if cond.f(lane) == 0.0 {
            mach.cond_mask &= !(1 << lane);
        }
    }
    mach.update_exec_mask();
    if mach.cond_mask == 0 {
        jump(mach, inst);
    }
    Ok(())
}

/// If (integer) - UIF src0.x
pub fn uif(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    mach.cond_stack.push(mach.cond_mask)?;
    let cond = mach.fetch(inst, 0, CHAN_X, DataType::Uint);
    for lane in 0..QUAD_SIZE {
        if cond.u(lane) == 0 {
            mach.cond_mask &= !(1 << lane);
        }
    }
    mach.update_exec_mask();
    if mach.cond_mask == 0 {
        jump(mach, inst);
    }
    Ok(())
}

/// Else - ELSE
pub fn else_(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    let prev = mach.cond_stack.top()?;
    mach.cond_mask = !mach.cond_mask & prev;
    mach.update_exec_mask();
    if mach.cond_mask == 0 {
        jump(mach, inst);
    }
    Ok(())
}

/// End if - ENDIF
pub fn endif(mach: &mut Machine) -> Result<(), ExecError> {
    mach.cond_mask = mach.cond_stack.pop()?;
    mach.update_exec_mask();
    Ok(())
}

/// Begin loop - BGNLOOP
pub fn bgnloop(mach: &mut Machine) -> Result<(), ExecError> {
    mach.loop_stack.push(mach.loop_mask)?;
    mach.cont_stack.push(mach.cont_mask)?;
    // pc already points past BGNLOOP
    mach.loop_label_stack.push(mach.pc - 1)?;
    mach.break_stack.push(mach.break_type)?;
    mach.break_type = BreakType::Loop;
    Ok(())
}

/// End loop - ENDLOOP
///
/// Re-enters the body while any lane is still live, otherwise pops the
/// loop state. Back-edges are counted against the configured cap.
pub fn endloop(mach: &mut Machine) -> Result<(), ExecError> {
    mach.cont_mask = mach.cont_stack.top()?;
    mach.update_exec_mask();

    if mach.exec_mask != 0 {
        let label = mach.loop_label_stack.top()?;
        mach.loop_iterations += 1;
        if mach.loop_iterations > mach.config.max_loop_iterations {
            return Err(ExecError::LoopIterationLimit {
                pc: label.max(0) as usize,
                limit: mach.config.max_loop_iterations,
            });
        }
        mach.pc = label + 1;
    } else {
        mach.loop_mask = mach.loop_stack.pop()?;
        mach.cont_mask = mach.cont_stack.pop()?;
        mach.loop_label_stack.pop()?;
        mach.break_type = mach.break_stack.pop()?;
    }
    mach.update_exec_mask();
    Ok(())
}

/// Break - BRK
pub fn brk(mach: &mut Machine) -> Result<(), ExecError> {
    match mach.break_type {
        BreakType::Loop => mach.loop_mask &= !mach.exec_mask,
        BreakType::Switch => mach.switch.mask = 0,
    }
    mach.update_exec_mask();
    Ok(())
}

/// Continue - CONT
pub fn cont(mach: &mut Machine) -> Result<(), ExecError> {
    mach.cont_mask &= !mach.exec_mask;
    mach.update_exec_mask();
    Ok(())
}

/// Switch - SWITCH src0.x
pub fn switch(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    mach.switch_stack.push(mach.switch)?;
    mach.switch.selector = mach.fetch(inst, 0, CHAN_X, DataType::Uint).to_u();
    mach.switch.mask = 0;
    mach.switch.default_mask = 0;

    mach.break_stack.push(mach.break_type)?;
    mach.break_type = BreakType::Switch;

    mach.update_exec_mask();
    Ok(())
}

/// Case - CASE src0.x
pub fn case(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    let prev = mach.switch_stack.top()?.mask;
    let value = mach.fetch(inst, 0, CHAN_X, DataType::Uint);

    let mut mask = 0;
    for lane in 0..QUAD_SIZE {
        if mach.switch.selector[lane] == value.u(lane) {
            mask |= 1 << lane;
        }
    }

    mach.switch.default_mask |= mask;
    mach.switch.mask |= mask & prev;
    mach.update_exec_mask();
    Ok(())
}

/// Default - DEFAULT
///
/// Enables the lanes no CASE matched. Only correct when DEFAULT is the
/// last label of the switch.
pub fn default(mach: &mut Machine) -> Result<(), ExecError> {
    let prev = mach.switch_stack.top()?.mask;
    mach.switch.mask |= !mach.switch.default_mask & prev;
    mach.update_exec_mask();
    Ok(())
}

/// End switch - ENDSWITCH
pub fn endswitch(mach: &mut Machine) -> Result<(), ExecError> {
    mach.switch = mach.switch_stack.pop()?;
    mach.break_type = mach.break_stack.pop()?;
    mach.update_exec_mask();
    Ok(())
}

/// Call subroutine - CAL label
pub fn cal(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    if mach.exec_mask == 0 {
        return Ok(());
    }

    mach.call_stack.push(CallRecord {
        cond: mach.cond_stack.depth(),
        loop_: mach.loop_stack.depth(),
        cont: mach.cont_stack.depth(),
        loop_label: mach.loop_label_stack.depth(),
        switch: mach.switch_stack.depth(),
        brk: mach.break_stack.depth(),
        return_pc: mach.pc,
    })?;

    mach.cond_stack.push(mach.cond_mask)?;
    mach.loop_stack.push(mach.loop_mask)?;
    mach.cont_stack.push(mach.cont_mask)?;
    mach.switch_stack.push(mach.switch)?;
    mach.break_stack.push(mach.break_type)?;
    mach.func_stack.push(mach.func_mask)?;

    jump(mach, inst);
    Ok(())
}

/// Unwind every stack to the depths saved by the matching CAL
fn return_to_caller(mach: &mut Machine) -> Result<(), ExecError> {
    let record = mach.call_stack.pop()?;

    mach.cond_mask = mach.cond_stack.restore(record.cond)?;
    mach.loop_mask = mach.loop_stack.restore(record.loop_)?;
    mach.cont_mask = mach.cont_stack.restore(record.cont)?;
    mach.loop_label_stack.truncate(record.loop_label);
    mach.switch = mach.switch_stack.restore(record.switch)?;
    mach.break_type = mach.break_stack.restore(record.brk)?;
    mach.func_mask = mach.func_stack.pop()?;

    mach.pc = record.return_pc;
    mach.update_exec_mask();
    Ok(())
}

/// Return - RET
///
/// Lanes that return are parked in the function mask; control only leaves
/// the subroutine once every lane has returned.
pub fn ret(mach: &mut Machine) -> Result<(), ExecError> {
    mach.func_mask &= !mach.exec_mask;
    mach.update_exec_mask();

    if mach.func_mask != 0 {
        return Ok(());
    }

    if mach.call_stack.is_empty() {
        // Returning from main
        mach.cond_stack.clear();
        mach.loop_stack.clear();
        mach.cont_stack.clear();
        mach.loop_label_stack.clear();
        mach.switch_stack.clear();
        mach.break_stack.clear();
        mach.pc = -1;
        return Ok(());
    }

    return_to_caller(mach)
}

/// End subroutine - ENDSUB
pub fn endsub(mach: &mut Machine) -> Result<(), ExecError> {
    return_to_caller(mach)
}

/// Kill - KILL
pub fn kill(mach: &mut Machine) -> Result<(), ExecError> {
    mach.kill_mask |= mach.exec_mask;
    Ok(())
}

/// Conditional kill - KILL_IF src0
///
/// A lane dies when any swizzled component is negative. Each distinct
/// source component is tested once.
pub fn kill_if(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    let Some(src) = inst.src.first() else {
        return Ok(());
    };

    let mut tested = 0u32;
    let mut kill = 0u32;
    for chan in 0..4 {
        let swizzle = src.swizzle_for(chan);
        if tested & (1 << swizzle) != 0 {
            continue;
        }
        tested |= 1 << swizzle;

        let value = mach.fetch_src(src, chan, DataType::Float);
        for lane in 0..QUAD_SIZE {
            if value.f(lane) < 0.0 {
                kill |= 1 << lane;
            }
        }
    }

    mach.kill_mask |= kill & mach.exec_mask;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::Resources;
    use crate::tokens::{Opcode, ShaderTokens, ShaderType, SrcRegister};
    use sq_core::ExecConfig;

    fn machine() -> Machine {
        let mut program = ShaderTokens::new(ShaderType::Fragment);
        program.push(Instruction::new(Opcode::End));
        let mut mach = Machine::new(ShaderType::Fragment, ExecConfig::default());
        mach.bind_shader(Some(&program), Resources::default()).unwrap();
        mach.run(0).unwrap();
        mach
    }

    #[test]
    fn test_brk_in_loop_clears_exec_lanes() {
        let mut mach = machine();
        bgnloop(&mut mach).unwrap();
        mach.cond_mask = 0b0101;
        mach.update_exec_mask();
        brk(&mut mach).unwrap();
        assert_eq!(mach.loop_mask, 0b1010);
        assert_eq!(mach.exec_mask, 0);
    }

    #[test]
    fn test_cont_then_endloop_restores_cont_mask() {
        let mut mach = machine();
        bgnloop(&mut mach).unwrap();
        mach.cond_mask = 0b0011;
        mach.update_exec_mask();
        cont(&mut mach).unwrap();
        assert_eq!(mach.cont_mask, 0b1100);
        mach.cond_mask = 0xF;
        endloop(&mut mach).unwrap();
        assert_eq!(mach.cont_mask, 0xF);
        assert_eq!(mach.exec_mask, 0xF);
    }

    #[test]
    fn test_kill_if_restricted_to_exec_mask() {
        let mut mach = machine();
        mach.exec_mask = 0b0011;
        let inst = Instruction::new(Opcode::KillIf).src(SrcRegister::temp(0));
        mach.temps[0].xyzw[2] = crate::vector::Channel::from_f([-1.0, 1.0, -1.0, -1.0]);
        kill_if(&mut mach, &inst).unwrap();
        assert_eq!(mach.kill_mask, 0b0001);
    }

    #[test]
    fn test_endsub_without_call_underflows() {
        let mut mach = machine();
        assert!(matches!(
            endsub(&mut mach),
            Err(ExecError::StackUnderflow { stack: "call" })
        ));
    }
}
