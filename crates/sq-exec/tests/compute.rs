//! Compute barriers, shared memory and grid dispatch

use std::sync::Arc;

use sq_core::{ComputeConfig, ExecConfig, ExecError};
use sq_exec::{
    launch_grid, shared_buffer, Buffer, Declaration, DstRegister, GridInfo, Instruction, Machine,
    Opcode, RegisterFile, Resources, RunStatus, Semantic, SharedBuffer, ShaderTokens, ShaderType,
    SrcRegister, Token, WriteMask,
};

struct Ssbo(SharedBuffer);

impl Buffer for Ssbo {
    fn lookup(&self, unit: u32) -> Option<SharedBuffer> {
        (unit == 0).then(|| self.0.clone())
    }
}

fn words(buf: &SharedBuffer) -> Vec<u32> {
    buf.lock()
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn sv(index: i32) -> SrcRegister {
    SrcRegister::new(RegisterFile::SystemValue, index).scalar(0)
}

fn tx(index: i32) -> DstRegister {
    DstRegister::temp(index).with_mask(WriteMask::X)
}

fn declare_ids(program: &mut ShaderTokens) {
    program
        .declare(
            Declaration::new(RegisterFile::SystemValue, 0, 0).with_semantic(Semantic::ThreadId, 0),
        )
        .declare(
            Declaration::new(RegisterFile::SystemValue, 1, 1).with_semantic(Semantic::BlockId, 0),
        );
}

#[test]
fn test_barrier_round_trip() {
    let mut program = ShaderTokens::new(ShaderType::Compute);
    program
        .immediate(Token::imm_f([6.0; 4]))
        .push(Instruction::new(Opcode::Barrier))
        .push(Instruction::new(Opcode::Mov).dst(DstRegister::temp(0)).src(SrcRegister::imm(0)))
        .push(Instruction::new(Opcode::End));

    let mut mach = Machine::new(ShaderType::Compute, ExecConfig::default());
    mach.bind_shader(Some(&program), Resources::default()).unwrap();

    assert_eq!(mach.run(0).unwrap(), RunStatus::Suspended { pc: 1 });
    assert_eq!(mach.temp(0).unwrap().lane_f(0), [0.0; 4]);

    assert!(mach.run(1).unwrap().is_finished());
    assert_eq!(mach.pc(), -1);
    assert_eq!(mach.temp(0).unwrap().lane_f(3), [6.0; 4]);
}

#[test]
fn test_barrier_orders_shared_memory_across_quads() {
    // Each thread publishes its id, waits, then reads the id of the thread
    // four slots away (which lives in the other quad of the block).
    let mut program = ShaderTokens::new(ShaderType::Compute);
    declare_ids(&mut program);
    program
        .immediate(Token::imm_i([4, 8, 4, 0]))
        .push(
            Instruction::new(Opcode::Umul)
                .dst(tx(0))
                .src(sv(0))
                .src(SrcRegister::imm(0).scalar(0)),
        )
        .push(
            Instruction::new(Opcode::Store)
                .dst(DstRegister::new(RegisterFile::Memory, 0).with_mask(WriteMask::X))
                .src(SrcRegister::temp(0).scalar(0))
                .src(sv(0)),
        )
        .push(Instruction::new(Opcode::Barrier))
        .push(
            Instruction::new(Opcode::Xor)
                .dst(tx(1))
                .src(sv(0))
                .src(SrcRegister::imm(0).scalar(2)),
        )
        .push(
            Instruction::new(Opcode::Umul)
                .dst(tx(1))
                .src(SrcRegister::temp(1).scalar(0))
                .src(SrcRegister::imm(0).scalar(0)),
        )
        .push(
            Instruction::new(Opcode::Load)
                .dst(tx(2))
                .src(SrcRegister::new(RegisterFile::Memory, 0))
                .src(SrcRegister::temp(1).scalar(0)),
        )
        .push(
            Instruction::new(Opcode::Umad)
                .dst(tx(3))
                .src(sv(1))
                .src(SrcRegister::imm(0).scalar(1))
                .src(sv(0)),
        )
        .push(
            Instruction::new(Opcode::Umul)
                .dst(tx(3))
                .src(SrcRegister::temp(3).scalar(0))
                .src(SrcRegister::imm(0).scalar(0)),
        )
        .push(
            Instruction::new(Opcode::Store)
                .dst(DstRegister::new(RegisterFile::Buffer, 0).with_mask(WriteMask::X))
                .src(SrcRegister::temp(3).scalar(0))
                .src(SrcRegister::temp(2).scalar(0)),
        )
        .push(Instruction::new(Opcode::End));

    let out = shared_buffer(16 * 4);
    let resources = Resources::new().with_buffer(Arc::new(Ssbo(out.clone())));
    let info = GridInfo::new([8, 1, 1], [2, 1, 1]).with_shared_memory(8 * 4);

    let stats = launch_grid(
        &program,
        &info,
        &resources,
        &ExecConfig::default(),
        &ComputeConfig::default(),
    )
    .unwrap();

    assert_eq!(stats.blocks, 2);
    assert_eq!(stats.machines_per_block, 2);
    assert_eq!(stats.barrier_rounds, 2);

    let expected: Vec<u32> = (0..16).map(|i| (i % 8) ^ 4).collect();
    assert_eq!(words(&out), expected);
}

#[test]
fn test_partial_quad_lanes_are_helpers() {
    let mut program = ShaderTokens::new(ShaderType::Compute);
    program
        .immediate(Token::imm_i([0, 1, 0, 0]))
        .push(
            Instruction::new(Opcode::AtomUadd)
                .dst(tx(0))
                .src(SrcRegister::new(RegisterFile::Buffer, 0))
                .src(SrcRegister::imm(0).scalar(0))
                .src(SrcRegister::imm(0).scalar(1)),
        )
        .push(Instruction::new(Opcode::End));

    let counter = shared_buffer(4);
    let resources = Resources::new().with_buffer(Arc::new(Ssbo(counter.clone())));

    launch_grid(
        &program,
        &GridInfo::new([3, 1, 1], [2, 1, 1]),
        &resources,
        &ExecConfig::default(),
        &ComputeConfig::default(),
    )
    .unwrap();

    assert_eq!(words(&counter), vec![6]);
}

#[test]
fn test_thread_ids_cover_the_block() {
    let mut program = ShaderTokens::new(ShaderType::Compute);
    declare_ids(&mut program);
    program
        .declare(
            Declaration::new(RegisterFile::SystemValue, 2, 2)
                .with_semantic(Semantic::BlockSize, 0),
        )
        .immediate(Token::imm_i([4, 0, 0, 0]))
        // slot = (tid.z * bw * bh + tid.y * bw + tid.x) * 4
        .push(
            Instruction::new(Opcode::Umul)
                .dst(tx(0))
                .src(SrcRegister::new(RegisterFile::SystemValue, 0).scalar(2))
                .src(SrcRegister::new(RegisterFile::SystemValue, 2).scalar(1)),
        )
        .push(
            Instruction::new(Opcode::Uadd)
                .dst(tx(0))
                .src(SrcRegister::temp(0).scalar(0))
                .src(SrcRegister::new(RegisterFile::SystemValue, 0).scalar(1)),
        )
        .push(
            Instruction::new(Opcode::Umad)
                .dst(tx(0))
                .src(SrcRegister::temp(0).scalar(0))
                .src(SrcRegister::new(RegisterFile::SystemValue, 2).scalar(0))
                .src(sv(0)),
        )
        .push(
            Instruction::new(Opcode::Umul)
                .dst(tx(0))
                .src(SrcRegister::temp(0).scalar(0))
                .src(SrcRegister::imm(0).scalar(0)),
        )
        .push(
            Instruction::new(Opcode::AtomUadd)
                .dst(tx(1))
                .src(SrcRegister::new(RegisterFile::Buffer, 0))
                .src(SrcRegister::temp(0).scalar(0))
                .src(SrcRegister::imm(0).scalar(0)),
        )
        .push(Instruction::new(Opcode::End));

    let out = shared_buffer(12 * 4);
    let resources = Resources::new().with_buffer(Arc::new(Ssbo(out.clone())));

    launch_grid(
        &program,
        &GridInfo::new([3, 2, 2], [1, 1, 1]),
        &resources,
        &ExecConfig::default(),
        &ComputeConfig::default(),
    )
    .unwrap();

    // Every thread hit its own slot exactly once
    assert_eq!(words(&out), vec![4; 12]);
}

#[test]
fn test_unbalanced_barrier_deadlock_is_reported() {
    // Loops forever over a barrier; only the round cap ends it
    let mut program = ShaderTokens::new(ShaderType::Compute);
    program
        .push(Instruction::new(Opcode::Bgnloop))
        .push(Instruction::new(Opcode::Barrier))
        .push(Instruction::new(Opcode::Endloop))
        .push(Instruction::new(Opcode::End));

    let err = launch_grid(
        &program,
        &GridInfo::new([4, 1, 1], [1, 1, 1]),
        &Resources::default(),
        &ExecConfig::default(),
        &ComputeConfig {
            max_barrier_rounds: 8,
        },
    )
    .unwrap_err();

    assert_eq!(err, ExecError::BarrierDeadlock(8));
}

#[test]
fn test_empty_grid_runs_nothing() {
    let mut program = ShaderTokens::new(ShaderType::Compute);
    program.push(Instruction::new(Opcode::End));

    let stats = launch_grid(
        &program,
        &GridInfo::new([4, 1, 1], [0, 1, 1]),
        &Resources::default(),
        &ExecConfig::default(),
        &ComputeConfig::default(),
    )
    .unwrap();
    assert_eq!(stats.blocks, 0);
}
