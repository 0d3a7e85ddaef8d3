//! Quad execution machine
//!
//! A [`Machine`] holds the register files, masks and control-flow stacks
//! of one 2x2 SIMD group. Programs are bound once and then run any number
//! of times; a compute program can suspend at a barrier and be resumed at
//! the returned pc.

use std::sync::Arc;

use sq_core::{ExecConfig, ExecError};
use tracing::{debug, trace};

use crate::contracts::{Resources, SharedBuffer};
use crate::interpreter::{self, Step};
use crate::stacks::{BoundedStack, BreakType, CallRecord, SwitchRecord, MAX_NESTING};
use crate::tokens::{
    Declaration, DstRegister, Instruction, Interpolation, Opcode, RegisterFile, SamplerViewDecl,
    Semantic, ShaderTokens, ShaderType, SrcRegister, Token, TextureTarget,
};
use crate::vector::{Channel, Vector, ALL_LANES, CHAN_W, CHAN_X, CHAN_Y, NUM_CHANNELS, QUAD_SIZE};

/// Number of temporary registers
pub const NUM_TEMPS: usize = 4096;
/// Number of address registers
pub const NUM_ADDRS: usize = 3;
/// Input attributes per vertex (stride of the 2-D input index)
pub const MAX_INPUTS: usize = 32;
pub const MAX_OUTPUTS: usize = 32;
pub const MAX_SYSTEM_VALUES: usize = 16;
pub const MAX_CONST_BUFFERS: usize = 16;
pub const MAX_SAMPLER_VIEWS: usize = 128;

/// Initial immediate storage; grows by doubling
const IMMS_INITIAL: usize = 128;

/// How a source operand is interpreted for absolute/negate modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Float,
    Int,
    Uint,
}

/// Fragment input interpolation coefficients for one attribute
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InterpCoef {
    pub a0: [f32; NUM_CHANNELS],
    pub dadx: [f32; NUM_CHANNELS],
    pub dady: [f32; NUM_CHANNELS],
}

/// Read-only constant buffer
#[derive(Debug, Clone, Default)]
pub struct ConstantBuffer {
    words: Arc<[u32]>,
}

impl ConstantBuffer {
    pub fn from_words(words: Vec<u32>) -> Self {
        Self {
            words: words.into(),
        }
    }

    pub fn from_f32(values: &[f32]) -> Self {
        Self::from_words(values.iter().map(|v| v.to_bits()).collect())
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.words.len() * 4
    }

    pub fn word(&self, pos: usize) -> Option<u32> {
        self.words.get(pos).copied()
    }

    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }
}

/// Outcome of one [`Machine::run`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The program ended; lanes set in `alive_mask` were not killed
    Finished { alive_mask: u32 },
    /// A compute barrier was reached; resume with `run(pc)`
    Suspended { pc: usize },
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunStatus::Finished { .. })
    }
}

/// Snapshot of the execution masks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskState {
    pub cond: u32,
    pub loop_: u32,
    pub cont: u32,
    pub func: u32,
    pub switch: u32,
    pub exec: u32,
    pub kill: u32,
    pub non_helper: u32,
}

/// Depth of every control-flow stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackDepths {
    pub cond: usize,
    pub loop_: usize,
    pub cont: usize,
    pub loop_label: usize,
    pub switch: usize,
    pub brk: usize,
    pub func: usize,
    pub call: usize,
}

/// Quad SIMD execution machine
pub struct Machine {
    pub(crate) shader_type: ShaderType,
    pub(crate) config: ExecConfig,

    pub(crate) temps: Vec<Vector>,
    pub(crate) addrs: [Vector; NUM_ADDRS],
    pub(crate) imms: Vec<[u32; NUM_CHANNELS]>,
    pub(crate) inputs: Vec<Vector>,
    pub(crate) outputs: Vec<Vector>,
    pub(crate) system_values: Vec<Vector>,
    sys_semantic_to_index: [i32; Semantic::COUNT],
    num_outputs: usize,

    pub(crate) consts: Vec<ConstantBuffer>,
    interp_coefs: Vec<InterpCoef>,
    quad_pos: Vector,
    face: f32,
    flatshade_color: bool,

    pub(crate) cond_mask: u32,
    pub(crate) loop_mask: u32,
    pub(crate) cont_mask: u32,
    pub(crate) func_mask: u32,
    pub(crate) exec_mask: u32,
    pub(crate) kill_mask: u32,
    pub(crate) non_helper_mask: u32,
    pub(crate) switch: SwitchRecord,
    pub(crate) break_type: BreakType,

    pub(crate) cond_stack: BoundedStack<u32>,
    pub(crate) loop_stack: BoundedStack<u32>,
    pub(crate) cont_stack: BoundedStack<u32>,
    pub(crate) loop_label_stack: BoundedStack<i32>,
    pub(crate) switch_stack: BoundedStack<SwitchRecord>,
    pub(crate) break_stack: BoundedStack<BreakType>,
    pub(crate) func_stack: BoundedStack<u32>,
    pub(crate) call_stack: BoundedStack<CallRecord>,

    pub(crate) pc: i32,
    pub(crate) loop_iterations: u32,

    declarations: Vec<Declaration>,
    instructions: Arc<[Instruction]>,
    bound: bool,
    pub(crate) sampler_views: Vec<SamplerViewDecl>,
    pub(crate) resources: Resources,
    pub(crate) local_mem: Option<SharedBuffer>,
}

impl Machine {
    /// Create a machine for one shader stage. Nothing is bound yet and
    /// the masks are initialised by the first `run(0)`.
    pub fn new(shader_type: ShaderType, config: ExecConfig) -> Self {
        let flatshade_color = config.flatshade_color;
        Self {
            shader_type,
            config,
            temps: vec![Vector::ZERO; NUM_TEMPS],
            addrs: [Vector::ZERO; NUM_ADDRS],
            imms: Vec::new(),
            inputs: vec![Vector::ZERO; MAX_INPUTS],
            outputs: vec![Vector::ZERO; MAX_OUTPUTS],
            system_values: vec![Vector::ZERO; MAX_SYSTEM_VALUES],
            sys_semantic_to_index: [-1; Semantic::COUNT],
            num_outputs: 0,
            consts: Vec::new(),
            interp_coefs: Vec::new(),
            quad_pos: Vector::ZERO,
            face: 1.0,
            flatshade_color,
            cond_mask: 0,
            loop_mask: 0,
            cont_mask: 0,
            func_mask: 0,
            exec_mask: 0,
            kill_mask: 0,
            non_helper_mask: 0,
            switch: SwitchRecord::default(),
            break_type: BreakType::Loop,
            cond_stack: BoundedStack::new("cond"),
            loop_stack: BoundedStack::new("loop"),
            cont_stack: BoundedStack::new("cont"),
            loop_label_stack: BoundedStack::new("loop label"),
            switch_stack: BoundedStack::new("switch"),
            break_stack: BoundedStack::new("break"),
            func_stack: BoundedStack::new("func"),
            call_stack: BoundedStack::new("call"),
            pc: -1,
            loop_iterations: 0,
            declarations: Vec::new(),
            instructions: Arc::from(Vec::new()),
            bound: false,
            sampler_views: vec![SamplerViewDecl::default(); MAX_SAMPLER_VIEWS],
            resources: Resources::default(),
            local_mem: None,
        }
    }

    pub fn shader_type(&self) -> ShaderType {
        self.shader_type
    }

    /// Bind a program and the resources it calls out to.
    ///
    /// `None` unbinds and clears all program state. A program that fails
    /// validation is rejected and the machine is left unbound.
    pub fn bind_shader(
        &mut self,
        tokens: Option<&ShaderTokens>,
        resources: Resources,
    ) -> Result<(), ExecError> {
        self.resources = resources;
        self.declarations.clear();
        self.instructions = Arc::from(Vec::new());
        self.imms.clear();
        self.num_outputs = 0;
        self.sys_semantic_to_index = [-1; Semantic::COUNT];
        self.bound = false;
        self.pc = -1;

        let Some(tokens) = tokens else {
            debug!("unbinding shader");
            return Ok(());
        };

        let mut declarations = Vec::new();
        let mut instructions = Vec::new();
        let mut imms: Vec<[u32; NUM_CHANNELS]> = Vec::with_capacity(IMMS_INITIAL);

        for token in &tokens.tokens {
            match token {
                Token::Declaration(decl) => {
                    match decl.file {
                        RegisterFile::Output => {
                            self.num_outputs = self.num_outputs.max(decl.last as usize + 1);
                        }
                        RegisterFile::SystemValue => {
                            if let Some(semantic) = decl.semantic {
                                self.sys_semantic_to_index[semantic.name as usize] =
                                    decl.first as i32;
                            }
                        }
                        _ => {}
                    }
                    declarations.push(decl.clone());
                }
                Token::Immediate(values) => {
                    if imms.len() == imms.capacity() {
                        imms.reserve_exact(imms.capacity().max(IMMS_INITIAL));
                    }
                    imms.push(*values);
                }
                Token::Instruction(inst) => instructions.push(inst.clone()),
            }
        }

        validate(tokens.shader_type, &declarations, &instructions)?;

        debug!(
            shader_type = ?tokens.shader_type,
            declarations = declarations.len(),
            instructions = instructions.len(),
            immediates = imms.len(),
            outputs = self.num_outputs,
            "bound shader"
        );

        self.shader_type = tokens.shader_type;
        self.declarations = declarations;
        self.instructions = instructions.into();
        self.imms = imms;
        self.bound = true;
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn num_instructions(&self) -> usize {
        self.instructions.len()
    }

    /// Highest declared output index plus one
    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    pub fn set_resources(&mut self, resources: Resources) {
        self.resources = resources;
    }

    /// Bind constant buffers to slots `0..bufs.len()`
    pub fn set_constant_buffers(&mut self, bufs: &[ConstantBuffer]) {
        let count = bufs.len().min(MAX_CONST_BUFFERS);
        if count < bufs.len() {
            tracing::warn!(
                requested = bufs.len(),
                max = MAX_CONST_BUFFERS,
                "ignoring extra constant buffers"
            );
        }
        self.consts = bufs[..count].to_vec();
    }

    pub fn set_interp_coefs(&mut self, coefs: Vec<InterpCoef>) {
        self.interp_coefs = coefs;
    }

    /// Window position of the quad; x/y of lane 0 anchor the interpolation
    /// and w holds the per-lane 1/w divisor
    pub fn set_quad_pos(&mut self, pos: Vector) {
        self.quad_pos = pos;
    }

    pub fn set_face(&mut self, face: f32) {
        self.face = face;
    }

    pub fn set_flatshade_color(&mut self, flatshade: bool) {
        self.flatshade_color = flatshade;
    }

    /// Lanes that are real invocations rather than derivative helpers.
    /// Zero means "all lanes" on the next fresh run.
    pub fn set_non_helper_mask(&mut self, mask: u32) {
        self.non_helper_mask = mask & ALL_LANES;
    }

    /// Slot declared for a system-value semantic
    pub fn system_value_index(&self, semantic: Semantic) -> Option<usize> {
        let index = self.sys_semantic_to_index[semantic as usize];
        (index >= 0).then_some(index as usize)
    }

    /// Seed a system value. Returns false when the program does not
    /// declare the semantic.
    pub fn set_system_value(&mut self, semantic: Semantic, value: Vector) -> bool {
        match self.system_value_index(semantic) {
            Some(index) if index < self.system_values.len() => {
                self.system_values[index] = value;
                true
            }
            _ => false,
        }
    }

    pub fn inputs_mut(&mut self) -> &mut [Vector] {
        &mut self.inputs
    }

    pub fn outputs(&self) -> &[Vector] {
        &self.outputs
    }

    pub fn temp(&self, index: usize) -> Option<&Vector> {
        self.temps.get(index)
    }

    /// Workgroup-shared memory backing the MEMORY register file
    pub fn set_local_memory(&mut self, mem: Option<SharedBuffer>) {
        self.local_mem = mem;
    }

    pub fn local_memory(&self) -> Option<&SharedBuffer> {
        self.local_mem.as_ref()
    }

    pub fn pc(&self) -> i32 {
        self.pc
    }

    pub fn masks(&self) -> MaskState {
        MaskState {
            cond: self.cond_mask,
            loop_: self.loop_mask,
            cont: self.cont_mask,
            func: self.func_mask,
            switch: self.switch.mask,
            exec: self.exec_mask,
            kill: self.kill_mask,
            non_helper: self.non_helper_mask,
        }
    }

    pub fn stack_depths(&self) -> StackDepths {
        StackDepths {
            cond: self.cond_stack.depth(),
            loop_: self.loop_stack.depth(),
            cont: self.cont_stack.depth(),
            loop_label: self.loop_label_stack.depth(),
            switch: self.switch_stack.depth(),
            brk: self.break_stack.depth(),
            func: self.func_stack.depth(),
            call: self.call_stack.depth(),
        }
    }

    /// Execute from `start_pc` until the program ends or a compute barrier
    /// is reached. Masks are reset and declarations evaluated only when
    /// `start_pc` is 0.
    pub fn run(&mut self, start_pc: usize) -> Result<RunStatus, ExecError> {
        if !self.bound {
            return Err(ExecError::NotBound);
        }
        let program = Arc::clone(&self.instructions);
        if start_pc > program.len() {
            return Err(ExecError::PcOutOfRange(start_pc as i32));
        }

        self.pc = start_pc as i32;
        self.loop_iterations = 0;

        if start_pc == 0 {
            self.setup_masks();
            self.exec_declarations();
        }

        while self.pc != -1 {
            let pc = self.pc as usize;
            let Some(inst) = program.get(pc) else {
                // Falling off the end acts as END
                self.pc = -1;
                break;
            };

            if self.config.trace_execution {
                trace!(pc, opcode = ?inst.opcode, exec_mask = self.exec_mask, "exec");
            }

            if interpreter::execute(self, inst)? == Step::Barrier
                && self.shader_type == ShaderType::Compute
            {
                return Ok(RunStatus::Suspended {
                    pc: self.pc as usize,
                });
            }
        }

        Ok(RunStatus::Finished {
            alive_mask: !self.kill_mask & ALL_LANES,
        })
    }

    fn setup_masks(&mut self) {
        self.kill_mask = 0;
        if self.non_helper_mask == 0 {
            self.non_helper_mask = ALL_LANES;
        }
        self.cond_mask = ALL_LANES;
        self.loop_mask = ALL_LANES;
        self.cont_mask = ALL_LANES;
        self.func_mask = ALL_LANES;
        self.exec_mask = ALL_LANES;
        self.switch.mask = ALL_LANES;
        self.break_type = BreakType::Loop;

        self.cond_stack.clear();
        self.loop_stack.clear();
        self.cont_stack.clear();
        self.loop_label_stack.clear();
        self.switch_stack.clear();
        self.break_stack.clear();
        self.func_stack.clear();
        self.call_stack.clear();
    }

    fn exec_declarations(&mut self) {
        for i in 0..self.declarations.len() {
            let decl = &self.declarations[i];
            match decl.file {
                RegisterFile::SamplerView => {
                    if let (Some(view), Some(slot)) =
                        (decl.sampler_view, self.sampler_views.get_mut(decl.first as usize))
                    {
                        *slot = view;
                    }
                }
                RegisterFile::Input if self.shader_type == ShaderType::Fragment => {
                    let decl = decl.clone();
                    self.interpolate_input(&decl);
                }
                _ => {}
            }
        }
    }

    fn interpolate_input(&mut self, decl: &Declaration) {
        let first = decl.first as usize;
        let last = (decl.last as usize).min(MAX_INPUTS - 1);

        if decl.semantic.map(|s| s.name) == Some(Semantic::Face) {
            if let Some(input) = self.inputs.get_mut(first) {
                input.xyzw[CHAN_X] = Channel::splat_f(self.face);
            }
            return;
        }

        let interpolation = match decl.interpolation {
            Interpolation::Color if self.flatshade_color => Interpolation::Constant,
            Interpolation::Color => Interpolation::Perspective,
            other => other,
        };

        let x = self.quad_pos.xyzw[CHAN_X].f(0);
        let y = self.quad_pos.xyzw[CHAN_Y].f(0);
        let w = self.quad_pos.xyzw[CHAN_W].to_f();

        for chan in 0..NUM_CHANNELS {
            if decl.usage_mask & (1 << chan) == 0 {
                continue;
            }
            for attrib in first..=last {
                let coef = self.interp_coefs.get(attrib).copied().unwrap_or_default();
                let (a0, dadx, dady) = (coef.a0[chan], coef.dadx[chan], coef.dady[chan]);
                let value = match interpolation {
                    Interpolation::Constant => [a0; QUAD_SIZE],
                    Interpolation::Linear | Interpolation::Perspective | Interpolation::Color => {
                        let base = a0 + dadx * x + dady * y;
                        let mut lanes = [base, base + dadx, base + dady, base + dadx + dady];
                        if interpolation != Interpolation::Linear {
                            for (lane, v) in lanes.iter_mut().enumerate() {
                                *v /= w[lane];
                            }
                        }
                        lanes
                    }
                };
                self.inputs[attrib].xyzw[chan] = Channel::from_f(value);
            }
        }
    }

    pub(crate) fn update_exec_mask(&mut self) {
        self.exec_mask =
            self.cond_mask & self.loop_mask & self.cont_mask & self.switch.mask & self.func_mask;
    }

    /// Lanes allowed to touch memory: executing, not helpers, not killed
    pub(crate) fn memory_mask(&self) -> u32 {
        self.exec_mask & self.non_helper_mask & !self.kill_mask
    }

    fn index_registers(&self, reg: &SrcRegister) -> ([i32; QUAD_SIZE], [i32; QUAD_SIZE]) {
        let mut index = [reg.index; QUAD_SIZE];
        if let Some(ind) = reg.indirect {
            let addr = self.address_channel(ind.index, ind.swizzle);
            for lane in 0..QUAD_SIZE {
                index[lane] = if self.exec_mask & (1 << lane) != 0 {
                    index[lane].wrapping_add(addr.i(lane))
                } else {
                    0
                };
            }
        }

        let mut index2d = [0; QUAD_SIZE];
        if let Some(dim) = reg.dimension {
            index2d = [dim.index; QUAD_SIZE];
            if let Some(ind) = dim.indirect {
                let addr = self.address_channel(ind.index, ind.swizzle);
                for lane in 0..QUAD_SIZE {
                    index2d[lane] = if self.exec_mask & (1 << lane) != 0 {
                        index2d[lane].wrapping_add(addr.i(lane))
                    } else {
                        0
                    };
                }
            }
        }
        (index, index2d)
    }

    fn address_channel(&self, index: i32, swizzle: u8) -> Channel {
        self.addrs
            .get(index as usize)
            .map(|a| a.xyzw[(swizzle & 3) as usize])
            .unwrap_or_default()
    }

    /// Read one channel of a register file with per-lane indices.
    /// Out-of-range reads yield zero.
    pub(crate) fn fetch_file_channel(
        &self,
        file: RegisterFile,
        swizzle: usize,
        index: &[i32; QUAD_SIZE],
        index2d: &[i32; QUAD_SIZE],
    ) -> Channel {
        let mut out = Channel::ZERO;
        for lane in 0..QUAD_SIZE {
            let idx = index[lane];
            let value = match file {
                RegisterFile::Constant => {
                    let pos = (idx as i64) * 4 + swizzle as i64;
                    self.consts
                        .get(index2d[lane] as usize)
                        .filter(|_| index2d[lane] >= 0 && pos >= 0)
                        .and_then(|buf| buf.word(pos as usize))
                        .unwrap_or(0)
                }
                RegisterFile::Input => {
                    let pos = index2d[lane] as i64 * MAX_INPUTS as i64 + idx as i64;
                    lane_of(&self.inputs, pos, swizzle, lane)
                }
                RegisterFile::SystemValue => {
                    lane_of(&self.system_values, idx as i64, swizzle, lane)
                }
                RegisterFile::Temporary => lane_of(&self.temps, idx as i64, swizzle, lane),
                RegisterFile::Address => lane_of(&self.addrs, idx as i64, swizzle, lane),
                RegisterFile::Output => lane_of(&self.outputs, idx as i64, swizzle, lane),
                RegisterFile::Immediate => usize::try_from(idx)
                    .ok()
                    .and_then(|i| self.imms.get(i))
                    .map(|imm| imm[swizzle])
                    .unwrap_or(0),
                _ => 0,
            };
            out.set_u(lane, value);
        }
        out
    }

    /// Fetch source operand `reg`, channel `chan`, applying swizzle,
    /// indirection and modifiers
    pub(crate) fn fetch_src(&self, reg: &SrcRegister, chan: usize, ty: DataType) -> Channel {
        let (index, index2d) = self.index_registers(reg);
        let mut value = self.fetch_file_channel(reg.file, reg.swizzle_for(chan), &index, &index2d);

        if reg.absolute && ty == DataType::Float {
            value = value.map_f(f32::abs);
        }
        if reg.negate {
            value = match ty {
                DataType::Float => value.map_f(|v| -v),
                DataType::Int | DataType::Uint => value.map_i(i32::wrapping_neg),
            };
        }
        value
    }

    /// Fetch `inst.src[idx]`; a missing operand reads as zero
    pub(crate) fn fetch(
        &self,
        inst: &Instruction,
        idx: usize,
        chan: usize,
        ty: DataType,
    ) -> Channel {
        inst.src
            .get(idx)
            .map(|reg| self.fetch_src(reg, chan, ty))
            .unwrap_or_default()
    }

    /// Write `value` into channel `chan` of `dst` for every lane in the
    /// execution mask
    pub(crate) fn store(
        &mut self,
        value: &Channel,
        dst: &DstRegister,
        saturate: bool,
        chan: usize,
    ) {
        let offset = dst
            .indirect
            .map(|ind| self.address_channel(ind.index, ind.swizzle).i(0))
            .unwrap_or(0);

        let exec_mask = self.exec_mask;
        let target = match dst.file {
            RegisterFile::Output => {
                slot_mut(&mut self.outputs, dst.index as i64 + offset as i64)
            }
            RegisterFile::Temporary => {
                slot_mut(&mut self.temps, dst.index as i64 + offset as i64)
            }
            RegisterFile::Address => slot_mut(&mut self.addrs, dst.index as i64),
            _ => None,
        };
        let Some(target) = target else {
            return;
        };

        let target = &mut target.xyzw[chan];
        for lane in 0..QUAD_SIZE {
            if exec_mask & (1 << lane) == 0 {
                continue;
            }
            if saturate {
                target.set_f(lane, value.f(lane).max(0.0).min(1.0));
            } else {
                target.set_u(lane, value.u(lane));
            }
        }
    }

    /// Store every channel enabled in the first destination's write mask
    pub(crate) fn store_dst(&mut self, inst: &Instruction, values: &[Channel; NUM_CHANNELS]) {
        let Some(dst) = inst.dst.first().copied() else {
            return;
        };
        for chan in dst.write_mask.channels() {
            self.store(&values[chan], &dst, inst.saturate, chan);
        }
    }

    /// Store one value to every enabled channel of the first destination
    pub(crate) fn store_dst_scalar(&mut self, inst: &Instruction, value: &Channel) {
        let Some(dst) = inst.dst.first().copied() else {
            return;
        };
        for chan in dst.write_mask.channels() {
            self.store(value, &dst, inst.saturate, chan);
        }
    }

    /// Resource unit of a source operand; an indirect unit is taken from
    /// the first executing lane
    pub(crate) fn resource_unit(&self, reg: &SrcRegister) -> u32 {
        self.unit_of(reg.index, reg.indirect.map(|i| (i.index, i.swizzle)))
    }

    pub(crate) fn dst_unit(&self, reg: &DstRegister) -> u32 {
        self.unit_of(reg.index, reg.indirect.map(|i| (i.index, i.swizzle)))
    }

    fn unit_of(&self, index: i32, indirect: Option<(i32, u8)>) -> u32 {
        match indirect {
            Some((addr_index, swizzle)) => {
                let addr = self.address_channel(addr_index, swizzle);
                crate::vector::lanes(self.exec_mask)
                    .next()
                    .map(|lane| index.wrapping_add(addr.i(lane)) as u32)
                    .unwrap_or(0)
            }
            None => index as u32,
        }
    }

    /// Constant texel offsets of a texture instruction (lane 0)
    pub(crate) fn tex_offsets(&self, inst: &Instruction) -> [i32; 3] {
        let Some(offset) = inst.texture.as_ref().and_then(|t| t.offsets.first()) else {
            return [0; 3];
        };
        let index = [offset.index; QUAD_SIZE];
        let zero = [0; QUAD_SIZE];
        offset.swizzle.map(|swz| {
            self.fetch_file_channel(offset.file, (swz & 3) as usize, &index, &zero)
                .i(0)
        })
    }

    /// Target of the sampler view declared at `unit`
    pub(crate) fn sampler_view_target(&self, unit: u32) -> TextureTarget {
        self.sampler_views
            .get(unit as usize)
            .map(|v| v.target)
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("shader_type", &self.shader_type)
            .field("bound", &self.bound)
            .field("pc", &self.pc)
            .field("instructions", &self.instructions.len())
            .field("masks", &self.masks())
            .finish()
    }
}

fn lane_of(regs: &[Vector], index: i64, swizzle: usize, lane: usize) -> u32 {
    usize::try_from(index)
        .ok()
        .and_then(|i| regs.get(i))
        .map(|r| r.xyzw[swizzle].u(lane))
        .unwrap_or(0)
}

fn slot_mut(regs: &mut [Vector], index: i64) -> Option<&mut Vector> {
    usize::try_from(index).ok().and_then(move |i| regs.get_mut(i))
}

/// Reject programs the interpreter cannot execute safely
fn validate(
    shader_type: ShaderType,
    declarations: &[Declaration],
    instructions: &[Instruction],
) -> Result<(), ExecError> {
    for decl in declarations {
        if decl.last < decl.first {
            return Err(ExecError::invalid(
                0,
                format!("declaration range {}..{} is inverted", decl.first, decl.last),
            ));
        }
        let limit = match decl.file {
            RegisterFile::Input => MAX_INPUTS,
            RegisterFile::Output => MAX_OUTPUTS,
            RegisterFile::Temporary => NUM_TEMPS,
            RegisterFile::Address => NUM_ADDRS,
            RegisterFile::SystemValue => MAX_SYSTEM_VALUES,
            RegisterFile::SamplerView | RegisterFile::Sampler => MAX_SAMPLER_VIEWS,
            _ => usize::MAX,
        };
        if decl.last as usize >= limit {
            return Err(ExecError::invalid(
                0,
                format!("{:?} declaration {} exceeds limit {}", decl.file, decl.last, limit),
            ));
        }
        if decl.file == RegisterFile::SystemValue && decl.semantic.is_none() {
            return Err(ExecError::invalid(0, "system value declared without a semantic"));
        }
    }

    // Static nesting of structured control flow
    let mut cond = 0usize;
    let mut loops = 0usize;
    let mut switches = 0usize;
    let mut breakable: Vec<Opcode> = Vec::new();

    for (pc, inst) in instructions.iter().enumerate() {
        let (ndst, nsrc) = inst.opcode.operand_counts();
        if inst.dst.len() < ndst || inst.src.len() < nsrc {
            return Err(ExecError::invalid(
                pc,
                format!(
                    "{:?} needs {} dst / {} src operands, got {} / {}",
                    inst.opcode,
                    ndst,
                    nsrc,
                    inst.dst.len(),
                    inst.src.len()
                ),
            ));
        }

        if inst.opcode.has_label() {
            match inst.label {
                Some(label) if (label as usize) < instructions.len() => {
                    if inst.opcode == Opcode::Cal
                        && instructions[label as usize].opcode != Opcode::Bgnsub
                    {
                        return Err(ExecError::invalid(pc, "CAL target is not BGNSUB"));
                    }
                }
                _ => {
                    return Err(ExecError::invalid(
                        pc,
                        format!("{:?} has no valid label", inst.opcode),
                    ));
                }
            }
        }

        for src in &inst.src {
            if src.swizzle.iter().any(|s| *s > 3) {
                return Err(ExecError::invalid(pc, "swizzle component out of range"));
            }
            let indirects = [src.indirect, src.dimension.and_then(|d| d.indirect)];
            if indirects.iter().flatten().any(|i| i.file != RegisterFile::Address) {
                return Err(ExecError::invalid(pc, "indirect addressing must use ADDR"));
            }
            if src.file == RegisterFile::Temporary
                && src.indirect.is_none()
                && !(0..NUM_TEMPS as i32).contains(&src.index)
            {
                return Err(ExecError::invalid(pc, format!("TEMP[{}] out of range", src.index)));
            }
        }

        for dst in &inst.dst {
            let memory_store = inst.opcode == Opcode::Store
                && matches!(
                    dst.file,
                    RegisterFile::Image | RegisterFile::Buffer | RegisterFile::Memory
                );
            let ok = match dst.file {
                RegisterFile::Null => true,
                RegisterFile::Temporary => {
                    dst.indirect.is_some() || (0..NUM_TEMPS as i32).contains(&dst.index)
                }
                RegisterFile::Output => {
                    dst.indirect.is_some() || (0..MAX_OUTPUTS as i32).contains(&dst.index)
                }
                RegisterFile::Address => (0..NUM_ADDRS as i32).contains(&dst.index),
                _ => memory_store,
            };
            if !ok {
                return Err(ExecError::invalid(
                    pc,
                    format!("bad destination {:?}[{}]", dst.file, dst.index),
                ));
            }
            if dst.indirect.is_some_and(|i| i.file != RegisterFile::Address) {
                return Err(ExecError::invalid(pc, "indirect addressing must use ADDR"));
            }
        }

        if inst.opcode.is_texture()
            && !matches!(inst.opcode, Opcode::Txf | Opcode::Txq)
            && inst.texture_target() == TextureTarget::Buffer
        {
            return Err(ExecError::invalid(pc, "buffer targets can only be fetched with TXF"));
        }

        let too_deep = |depth: usize| depth > MAX_NESTING;
        match inst.opcode {
            Opcode::If | Opcode::Uif => {
                cond += 1;
                if too_deep(cond) {
                    return Err(nesting(pc, "IF"));
                }
            }
            Opcode::Else if cond == 0 => return Err(ExecError::invalid(pc, "ELSE without IF")),
            Opcode::Endif => {
                cond = cond
                    .checked_sub(1)
                    .ok_or_else(|| ExecError::invalid(pc, "ENDIF without IF"))?;
            }
            Opcode::Bgnloop => {
                loops += 1;
                breakable.push(Opcode::Bgnloop);
                if too_deep(loops) || too_deep(breakable.len()) {
                    return Err(nesting(pc, "BGNLOOP"));
                }
            }
            Opcode::Endloop => {
                loops = loops
                    .checked_sub(1)
                    .ok_or_else(|| ExecError::invalid(pc, "ENDLOOP without BGNLOOP"))?;
                if breakable.pop() != Some(Opcode::Bgnloop) {
                    return Err(ExecError::invalid(pc, "ENDLOOP closes a SWITCH"));
                }
            }
            Opcode::Switch => {
                switches += 1;
                breakable.push(Opcode::Switch);
                if too_deep(switches) || too_deep(breakable.len()) {
                    return Err(nesting(pc, "SWITCH"));
                }
            }
            Opcode::Case | Opcode::Default if breakable.last() != Some(&Opcode::Switch) => {
                return Err(ExecError::invalid(pc, format!("{:?} outside SWITCH", inst.opcode)));
            }
            Opcode::Endswitch => {
                switches = switches
                    .checked_sub(1)
                    .ok_or_else(|| ExecError::invalid(pc, "ENDSWITCH without SWITCH"))?;
                if breakable.pop() != Some(Opcode::Switch) {
                    return Err(ExecError::invalid(pc, "ENDSWITCH closes a loop"));
                }
            }
            Opcode::Brk if breakable.is_empty() => {
                return Err(ExecError::invalid(pc, "BRK outside loop or switch"));
            }
            Opcode::Cont if loops == 0 => {
                return Err(ExecError::invalid(pc, "CONT outside loop"));
            }
            Opcode::Barrier if shader_type != ShaderType::Compute => {
                debug!(pc, "BARRIER outside a compute shader is a no-op");
            }
            _ => {}
        }
    }

    if cond != 0 || loops != 0 || switches != 0 {
        return Err(ExecError::invalid(
            instructions.len(),
            "unterminated control-flow block",
        ));
    }
    Ok(())
}

fn nesting(pc: usize, what: &str) -> ExecError {
    ExecError::invalid(pc, format!("{what} nested deeper than {MAX_NESTING}"))
}
