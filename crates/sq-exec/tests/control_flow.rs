//! Divergent control flow through complete programs

use sq_core::{ExecConfig, ExecError};
use sq_exec::{
    Channel, DstRegister, Instruction, Machine, Opcode, Resources, RunStatus, ShaderTokens,
    ShaderType, SrcRegister, StackDepths, Token,
};

fn bind(program: &ShaderTokens) -> Machine {
    let mut mach = Machine::new(program.shader_type, ExecConfig::default());
    mach.bind_shader(Some(program), Resources::default()).unwrap();
    mach
}

fn set_input_x(mach: &mut Machine, values: [f32; 4]) {
    mach.inputs_mut()[0].xyzw[0] = Channel::from_f(values);
}

fn assert_mask_algebra(mach: &Machine) {
    let m = mach.masks();
    assert_eq!(m.exec, m.cond & m.loop_ & m.cont & m.switch & m.func);
}

#[test]
fn test_if_else_diverges_per_lane() {
    let mut program = ShaderTokens::new(ShaderType::Fragment);
    program
        .immediate(Token::imm_f([1.0; 4]))
        .immediate(Token::imm_f([2.0; 4]))
        .push(Instruction::new(Opcode::If).src(SrcRegister::input(0).scalar(0)).label(2))
        .push(Instruction::new(Opcode::Mov).dst(DstRegister::output(0)).src(SrcRegister::imm(0)))
        .push(Instruction::new(Opcode::Else).label(4))
        .push(Instruction::new(Opcode::Mov).dst(DstRegister::output(0)).src(SrcRegister::imm(1)))
        .push(Instruction::new(Opcode::Endif))
        .push(Instruction::new(Opcode::End));

    let mut mach = bind(&program);
    set_input_x(&mut mach, [1.0, 0.0, 1.0, 0.0]);
    let status = mach.run(0).unwrap();

    assert_eq!(status, RunStatus::Finished { alive_mask: 0xF });
    assert_eq!(mach.outputs()[0].xyzw[0].to_f(), [1.0, 2.0, 1.0, 2.0]);
    assert_eq!(mach.stack_depths(), StackDepths::default());
    assert_mask_algebra(&mach);
}

#[test]
fn test_loop_runs_until_every_lane_breaks() {
    // TEMP[0] counts up until it reaches the per-lane limit in IN[0].x
    let mut program = ShaderTokens::new(ShaderType::Fragment);
    program
        .immediate(Token::imm_f([0.0; 4]))
        .immediate(Token::imm_f([1.0; 4]))
        .push(Instruction::new(Opcode::Mov).dst(DstRegister::temp(0)).src(SrcRegister::imm(0)))
        .push(Instruction::new(Opcode::Bgnloop))
        .push(
            Instruction::new(Opcode::Add)
                .dst(DstRegister::temp(0))
                .src(SrcRegister::temp(0))
                .src(SrcRegister::imm(1)),
        )
        .push(
            Instruction::new(Opcode::Sge)
                .dst(DstRegister::temp(1))
                .src(SrcRegister::temp(0))
                .src(SrcRegister::input(0).scalar(0)),
        )
        .push(Instruction::new(Opcode::If).src(SrcRegister::temp(1).scalar(0)).label(6))
        .push(Instruction::new(Opcode::Brk))
        .push(Instruction::new(Opcode::Endif))
        .push(Instruction::new(Opcode::Endloop))
        .push(Instruction::new(Opcode::Mov).dst(DstRegister::output(0)).src(SrcRegister::temp(0)))
        .push(Instruction::new(Opcode::End));

    let mut mach = bind(&program);
    set_input_x(&mut mach, [1.0, 2.0, 3.0, 4.0]);
    mach.run(0).unwrap();

    assert_eq!(mach.outputs()[0].xyzw[0].to_f(), [1.0, 2.0, 3.0, 4.0]);
    assert_eq!(mach.stack_depths(), StackDepths::default());
    assert_eq!(mach.masks().loop_, 0xF);
    assert_mask_algebra(&mach);
}

#[test]
fn test_switch_with_default() {
    let mut program = ShaderTokens::new(ShaderType::Fragment);
    program
        .immediate(Token::imm_i([1, 0, 0, 0]))
        .immediate(Token::imm_f([10.0; 4]))
        .immediate(Token::imm_f([20.0; 4]))
        .push(Instruction::new(Opcode::Switch).src(SrcRegister::input(0).scalar(0)))
        .push(Instruction::new(Opcode::Case).src(SrcRegister::imm(0).scalar(0)))
        .push(Instruction::new(Opcode::Mov).dst(DstRegister::output(0)).src(SrcRegister::imm(1)))
        .push(Instruction::new(Opcode::Brk))
        .push(Instruction::new(Opcode::Default))
        .push(Instruction::new(Opcode::Mov).dst(DstRegister::output(0)).src(SrcRegister::imm(2)))
        .push(Instruction::new(Opcode::Brk))
        .push(Instruction::new(Opcode::Endswitch))
        .push(Instruction::new(Opcode::End));

    let mut mach = bind(&program);
    mach.inputs_mut()[0].xyzw[0] = Channel::from_u([0, 1, 2, 3]);
    mach.run(0).unwrap();

    assert_eq!(mach.outputs()[0].xyzw[0].to_f(), [20.0, 10.0, 20.0, 20.0]);
    assert_eq!(mach.stack_depths(), StackDepths::default());
    assert_eq!(mach.masks().switch, 0xF);
}

#[test]
fn test_subroutine_return_is_per_lane() {
    let mut program = ShaderTokens::new(ShaderType::Fragment);
    program
        .immediate(Token::imm_f([1.0; 4]))
        .immediate(Token::imm_f([5.0; 4]))
        .push(Instruction::new(Opcode::Mov).dst(DstRegister::output(0)).src(SrcRegister::imm(0)))
        .push(Instruction::new(Opcode::Cal).label(3))
        .push(Instruction::new(Opcode::End))
        .push(Instruction::new(Opcode::Bgnsub))
        .push(Instruction::new(Opcode::If).src(SrcRegister::input(0).scalar(0)).label(6))
        .push(Instruction::new(Opcode::Ret))
        .push(Instruction::new(Opcode::Endif))
        .push(Instruction::new(Opcode::Mov).dst(DstRegister::output(1)).src(SrcRegister::imm(1)))
        .push(Instruction::new(Opcode::Endsub));

    let mut mach = bind(&program);
    set_input_x(&mut mach, [1.0, 0.0, 0.0, 1.0]);
    mach.run(0).unwrap();

    assert_eq!(mach.outputs()[0].xyzw[0].to_f(), [1.0; 4]);
    assert_eq!(mach.outputs()[1].xyzw[0].to_f(), [0.0, 5.0, 5.0, 0.0]);
    assert_eq!(mach.stack_depths(), StackDepths::default());
    assert_eq!(mach.masks().func, 0xF);
    assert_eq!(mach.pc(), -1);
}

#[test]
fn test_ret_from_main_ends_program() {
    let mut program = ShaderTokens::new(ShaderType::Fragment);
    program
        .immediate(Token::imm_f([3.0; 4]))
        .push(Instruction::new(Opcode::Ret))
        .push(Instruction::new(Opcode::Mov).dst(DstRegister::output(0)).src(SrcRegister::imm(0)));

    let mut mach = bind(&program);
    mach.run(0).unwrap();
    assert_eq!(mach.outputs()[0].xyzw[0].to_f(), [0.0; 4]);
    assert_eq!(mach.pc(), -1);
}

#[test]
fn test_kill_if_reports_alive_lanes() {
    let mut program = ShaderTokens::new(ShaderType::Fragment);
    program
        .push(Instruction::new(Opcode::KillIf).src(SrcRegister::input(0).scalar(0)))
        .push(Instruction::new(Opcode::End));

    let mut mach = bind(&program);
    set_input_x(&mut mach, [-1.0, 1.0, -0.5, 0.0]);
    assert_eq!(mach.run(0).unwrap(), RunStatus::Finished { alive_mask: 0b1010 });

    // Masks are reset on the next run from the top
    set_input_x(&mut mach, [1.0; 4]);
    assert_eq!(mach.run(0).unwrap(), RunStatus::Finished { alive_mask: 0xF });
}

#[test]
fn test_infinite_loop_hits_iteration_cap() {
    let mut program = ShaderTokens::new(ShaderType::Fragment);
    program
        .push(Instruction::new(Opcode::Bgnloop))
        .push(Instruction::new(Opcode::Endloop))
        .push(Instruction::new(Opcode::End));

    let config = ExecConfig {
        max_loop_iterations: 100,
        ..ExecConfig::default()
    };
    let mut mach = Machine::new(ShaderType::Fragment, config);
    mach.bind_shader(Some(&program), Resources::default()).unwrap();

    assert_eq!(
        mach.run(0),
        Err(ExecError::LoopIterationLimit { pc: 0, limit: 100 })
    );
}

#[test]
fn test_barrier_outside_compute_does_not_suspend() {
    let mut program = ShaderTokens::new(ShaderType::Fragment);
    program
        .immediate(Token::imm_f([4.0; 4]))
        .push(Instruction::new(Opcode::Barrier))
        .push(Instruction::new(Opcode::Mov).dst(DstRegister::output(0)).src(SrcRegister::imm(0)))
        .push(Instruction::new(Opcode::End));

    let mut mach = bind(&program);
    assert!(mach.run(0).unwrap().is_finished());
    assert_eq!(mach.outputs()[0].xyzw[3].to_f(), [4.0; 4]);
}

#[test]
fn test_indirect_temp_addressing() {
    // ADDR[0].x = IN[0].x, then read TEMP[ADDR[0].x + 1]
    let mut program = ShaderTokens::new(ShaderType::Fragment);
    program
        .immediate(Token::imm_f([7.0; 4]))
        .immediate(Token::imm_f([9.0; 4]))
        .push(Instruction::new(Opcode::Mov).dst(DstRegister::temp(1)).src(SrcRegister::imm(0)))
        .push(Instruction::new(Opcode::Mov).dst(DstRegister::temp(2)).src(SrcRegister::imm(1)))
        .push(
            Instruction::new(Opcode::Arl)
                .dst(DstRegister::address(0))
                .src(SrcRegister::input(0).scalar(0)),
        )
        .push(
            Instruction::new(Opcode::Mov)
                .dst(DstRegister::output(0))
                .src(SrcRegister::temp(1).with_indirect(0, 0)),
        )
        .push(Instruction::new(Opcode::End));

    let mut mach = bind(&program);
    set_input_x(&mut mach, [0.0, 1.0, 1.5, 0.0]);
    mach.run(0).unwrap();
    assert_eq!(mach.outputs()[0].xyzw[0].to_f(), [7.0, 9.0, 9.0, 7.0]);
}

#[test]
fn test_recursive_call_overflows_at_run_time() {
    let mut program = ShaderTokens::new(ShaderType::Fragment);
    program
        .push(Instruction::new(Opcode::Cal).label(2))
        .push(Instruction::new(Opcode::End))
        .push(Instruction::new(Opcode::Bgnsub))
        .push(Instruction::new(Opcode::Cal).label(2))
        .push(Instruction::new(Opcode::Endsub));

    // Call depth is only known at run time, so the program binds
    let mut mach = bind(&program);
    let err = mach.run(0).unwrap_err();
    assert!(matches!(err, ExecError::StackOverflow { stack: "call", .. }), "{err}");
}

#[test]
fn test_call_from_full_nesting_overflows_at_run_time() {
    const DEPTH: u32 = 32;
    let endif = |i: u32| 2 * DEPTH - i;
    let sub = 2 * DEPTH + 2;

    let mut program = ShaderTokens::new(ShaderType::Fragment);
    program.immediate(Token::imm_f([1.0; 4]));
    for i in 0..DEPTH {
        let cond = SrcRegister::imm(0).scalar(0);
        program.push(Instruction::new(Opcode::If).src(cond).label(endif(i)));
    }
    program.push(Instruction::new(Opcode::Cal).label(sub));
    for _ in 0..DEPTH {
        program.push(Instruction::new(Opcode::Endif));
    }
    program
        .push(Instruction::new(Opcode::End))
        .push(Instruction::new(Opcode::Bgnsub))
        .push(Instruction::new(Opcode::Endsub));

    let mut mach = bind(&program);
    let err = mach.run(0).unwrap_err();
    assert!(matches!(err, ExecError::StackOverflow { .. }), "{err}");
}
