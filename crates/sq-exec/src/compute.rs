//! Compute grid dispatch
//!
//! A workgroup is split into quads of threads, one [`Machine`] per quad.
//! Barriers are realised cooperatively: every machine is run until it
//! finishes or suspends, and suspended machines are resumed round-robin
//! until the whole group has finished.

use sq_core::{ComputeConfig, ExecConfig, ExecError};
use tracing::{debug, trace};

use crate::contracts::{shared_buffer, Resources, SharedBuffer};
use crate::machine::{Machine, RunStatus};
use crate::tokens::{Semantic, ShaderTokens, ShaderType};
use crate::vector::{Channel, Vector, QUAD_SIZE};

/// Grid launch parameters
#[derive(Debug, Clone)]
pub struct GridInfo {
    /// Threads per block
    pub block: [u32; 3],
    /// Blocks per grid, ignored when `indirect` is set
    pub grid: [u32; 3],
    /// Buffer holding the grid size as three u32s at a byte offset
    pub indirect: Option<(SharedBuffer, usize)>,
    /// Bytes of workgroup-shared memory per block
    pub shared_mem_size: usize,
}

impl GridInfo {
    pub fn new(block: [u32; 3], grid: [u32; 3]) -> Self {
        Self {
            block,
            grid,
            indirect: None,
            shared_mem_size: 0,
        }
    }

    pub fn with_shared_memory(mut self, size: usize) -> Self {
        self.shared_mem_size = size;
        self
    }

    pub fn with_indirect(mut self, buffer: SharedBuffer, offset: usize) -> Self {
        self.indirect = Some((buffer, offset));
        self
    }

    /// Grid dimensions, read from the indirect buffer when present.
    /// A buffer too small to hold them yields an empty grid.
    pub fn grid_size(&self) -> [u32; 3] {
        let Some((buffer, offset)) = &self.indirect else {
            return self.grid;
        };
        let data = buffer.lock();
        let mut grid = [0u32; 3];
        for (i, dim) in grid.iter_mut().enumerate() {
            let start = offset + i * 4;
            match data.get(start..start + 4) {
                Some(bytes) => *dim = bytemuck::pod_read_unaligned(bytes),
                None => return [0; 3],
            }
        }
        grid
    }

    /// `None` when the block size does not fit in a u32
    pub fn threads_per_block(&self) -> Option<u32> {
        self.block[0]
            .checked_mul(self.block[1])?
            .checked_mul(self.block[2])
    }
}

/// Per-dispatch summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridStats {
    pub blocks: u32,
    pub machines_per_block: u32,
    /// Resume passes needed beyond the initial run, summed over blocks
    pub barrier_rounds: u32,
}

/// Run `program` over the whole grid
pub fn launch_grid(
    program: &ShaderTokens,
    info: &GridInfo,
    resources: &Resources,
    exec: &ExecConfig,
    compute: &ComputeConfig,
) -> Result<GridStats, ExecError> {
    if program.shader_type != ShaderType::Compute {
        return Err(ExecError::invalid(0, "launch_grid requires a compute program"));
    }

    let grid = info.grid_size();
    let threads = info.threads_per_block().ok_or_else(|| {
        ExecError::invalid(0, format!("block size {:?} overflows", info.block))
    })?;
    let num_machines = threads.div_ceil(QUAD_SIZE as u32);

    let mut stats = GridStats {
        blocks: 0,
        machines_per_block: num_machines,
        barrier_rounds: 0,
    };
    if num_machines == 0 || grid.contains(&0) {
        debug!(?grid, block = ?info.block, "empty grid");
        return Ok(stats);
    }

    let mut machines = Vec::with_capacity(num_machines as usize);
    for _ in 0..num_machines {
        let mut mach = Machine::new(ShaderType::Compute, exec.clone());
        mach.bind_shader(Some(program), resources.clone())?;
        machines.push(mach);
    }

    debug!(
        ?grid,
        block = ?info.block,
        machines = num_machines,
        shared_mem = info.shared_mem_size,
        "launch_grid"
    );

    for z in 0..grid[2] {
        for y in 0..grid[1] {
            for x in 0..grid[0] {
                let rounds =
                    run_block(&mut machines, info, threads, grid, [x, y, z], compute)?;
                stats.blocks += 1;
                stats.barrier_rounds += rounds;
            }
        }
    }

    Ok(stats)
}

fn run_block(
    machines: &mut [Machine],
    info: &GridInfo,
    threads: u32,
    grid: [u32; 3],
    block_id: [u32; 3],
    compute: &ComputeConfig,
) -> Result<u32, ExecError> {
    let shared = (info.shared_mem_size > 0).then(|| shared_buffer(info.shared_mem_size));

    for (i, mach) in machines.iter_mut().enumerate() {
        seed_machine(mach, info.block, grid, block_id, i as u32, threads);
        mach.set_local_memory(shared.clone());
    }

    let mut pending: Vec<Option<usize>> = Vec::with_capacity(machines.len());
    for mach in machines.iter_mut() {
        pending.push(suspended_pc(mach.run(0)?));
    }

    let mut rounds = 0;
    while pending.iter().any(Option::is_some) {
        if rounds >= compute.max_barrier_rounds {
            return Err(ExecError::BarrierDeadlock(rounds));
        }
        rounds += 1;
        trace!(?block_id, round = rounds, "resuming after barrier");

        for (mach, slot) in machines.iter_mut().zip(pending.iter_mut()) {
            if let Some(pc) = *slot {
                *slot = suspended_pc(mach.run(pc)?);
            }
        }
    }

    Ok(rounds)
}

fn suspended_pc(status: RunStatus) -> Option<usize> {
    match status {
        RunStatus::Suspended { pc } => Some(pc),
        RunStatus::Finished { .. } => None,
    }
}

/// Seed the ids of quad `quad` of a block. Lanes past the end of the
/// block are helpers.
fn seed_machine(
    mach: &mut Machine,
    block: [u32; 3],
    grid: [u32; 3],
    block_id: [u32; 3],
    quad: u32,
    threads: u32,
) {
    let mut tid = [Channel::default(); 3];
    let mut valid = 0u32;
    for lane in 0..QUAD_SIZE {
        let linear = quad * QUAD_SIZE as u32 + lane as u32;
        if linear < threads {
            valid |= 1 << lane;
        }
        tid[0].set_u(lane, linear % block[0]);
        tid[1].set_u(lane, (linear / block[0]) % block[1]);
        tid[2].set_u(lane, linear / (block[0] * block[1]));
    }

    let thread_id = Vector {
        xyzw: [tid[0], tid[1], tid[2], Channel::default()],
    };
    mach.set_system_value(Semantic::ThreadId, thread_id);
    mach.set_system_value(
        Semantic::BlockId,
        Vector::splat_u([block_id[0], block_id[1], block_id[2], 0]),
    );
    mach.set_system_value(
        Semantic::BlockSize,
        Vector::splat_u([block[0], block[1], block[2], 0]),
    );
    mach.set_system_value(
        Semantic::GridSize,
        Vector::splat_u([grid[0], grid[1], grid[2], 0]),
    );
    mach.set_non_helper_mask(valid);
}
